//! Congestion scale: level boundaries and level assignment.
//!
//! A [`BinSet`] for `N` levels has `N + 3` strictly increasing boundaries:
//!
//! | Index          | Boundary                    |
//! |----------------|-----------------------------|
//! | 0              | 0                           |
//! | 1              | 1                           |
//! | 2              | `min`                       |
//! | 3 ..           | lower interpolation         |
//! | 2 + (N-1)/2    | `middle`                    |
//! | ..             | upper interpolation         |
//! | N + 1          | `max`                       |
//! | N + 2          | +inf                        |
//!
//! A count lands on level `i` when `bins[i] <= count < bins[i + 1]`, capped
//! at `N`. Level 0 means "no data" and is only produced for a zero count.

use serde::Serialize;

use crate::analyzers::utility::{mean, mean_nonzero};
use crate::config::MiddleStrategy;
use crate::error::{EngineError, EngineResult};

/// Minimum gap enforced between neighbouring boundaries.
pub const EPSILON: f64 = 1e-6;

/// Smallest level count that leaves room for `min < middle < max`.
pub const MIN_LEVEL_COUNT: u8 = 3;

/// Strictly increasing level boundaries for one scale.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BinSet {
    boundaries: Vec<f64>,
    levels: u8,
    middle_index: usize,
}

impl BinSet {
    /// Builds the boundaries for `levels` levels from the calibrated
    /// `min`/`max` and a data-driven `middle`.
    ///
    /// A degenerate `max <= max(min, 1)` is raised to `max(min, 1) + 1`, so
    /// the top level stays reachable when `min` sits under the fixed `1`
    /// boundary. A non-finite `middle` falls back to the midpoint of `min`
    /// and `max`.
    ///
    /// # Errors
    ///
    /// Fails when `levels` is below [`MIN_LEVEL_COUNT`] or when `min`/`max`
    /// are negative or not finite.
    pub fn build(min: f64, middle: f64, max: f64, levels: u8) -> EngineResult<Self> {
        if levels < MIN_LEVEL_COUNT {
            return Err(EngineError::InvalidLevelCount {
                min: MIN_LEVEL_COUNT,
                got: levels,
            });
        }
        if !min.is_finite() || !max.is_finite() || min < 0.0 {
            return Err(EngineError::InvalidBinBounds { min, max });
        }

        let max = degenerate_max(min, max);
        let middle = if middle.is_finite() {
            middle
        } else {
            (min + max) / 2.0
        };
        let middle = middle.max(min + EPSILON).min(max - EPSILON);

        // N - 1 segments span min..max; the upper half takes the odd one.
        let segments = usize::from(levels) - 1;
        let lower = segments / 2;
        let upper = segments - lower;

        let mut boundaries = Vec::with_capacity(usize::from(levels) + 3);
        boundaries.push(0.0);
        boundaries.push(1.0);
        push_increasing(&mut boundaries, min);

        let step_lower = (middle - min) / lower as f64;
        for i in 1..lower {
            push_increasing(&mut boundaries, min + i as f64 * step_lower);
        }

        let middle_index = boundaries.len();
        push_increasing(&mut boundaries, middle);

        let step_upper = (max - middle) / upper as f64;
        for i in 1..upper {
            push_increasing(&mut boundaries, middle + i as f64 * step_upper);
        }

        push_increasing(&mut boundaries, max);
        boundaries.push(f64::INFINITY);

        Ok(Self {
            boundaries,
            levels,
            middle_index,
        })
    }

    pub fn boundaries(&self) -> &[f64] {
        &self.boundaries
    }

    /// Number of levels `N`; levels run `0..=N`.
    pub fn levels(&self) -> u8 {
        self.levels
    }

    /// The (possibly nudged) middle boundary.
    pub fn middle(&self) -> f64 {
        self.boundaries[self.middle_index]
    }

    pub fn min(&self) -> f64 {
        self.boundaries[2]
    }

    /// The last finite boundary.
    pub fn max(&self) -> f64 {
        self.boundaries[self.boundaries.len() - 2]
    }

    /// Maps a count onto `0..=N`.
    ///
    /// Zero, negative and non-finite counts are level 0. Any positive count
    /// is at least level 1, so fractional averages below 1 still read as
    /// "present".
    pub fn level_of(&self, count: f64) -> u8 {
        if !(count > 0.0) || !count.is_finite() {
            return 0;
        }

        // boundaries[0] == 0 <= count, so the partition point is at least 1.
        let index = self.boundaries.partition_point(|b| *b <= count) - 1;
        let capped = index.min(usize::from(self.levels));
        (capped as u8).max(1)
    }
}

/// Level for an optional count; a missing count is "no data".
pub fn assign(count: Option<f64>, bins: &BinSet) -> u8 {
    count.map_or(0, |c| bins.level_of(c))
}

/// Middle boundary from the observed totals, or `None` when the strategy has
/// nothing to average.
pub fn middle_of(values: &[f64], strategy: MiddleStrategy) -> Option<f64> {
    match strategy {
        MiddleStrategy::NonZeroMean => mean_nonzero(values),
        MiddleStrategy::Mean => mean(values),
    }
}

/// `max`, or `max(min, 1) + 1` when it does not clear both `min` and the
/// fixed `1` boundary.
pub(crate) fn degenerate_max(min: f64, max: f64) -> f64 {
    let floor = min.max(1.0);
    if max <= floor { floor + 1.0 } else { max }
}

/// Appends `value`, nudging it above the previous boundary when needed.
fn push_increasing(boundaries: &mut Vec<f64>, value: f64) {
    let value = match boundaries.last() {
        Some(&prev) if value <= prev => next_above(prev),
        _ => value,
    };
    boundaries.push(value);
}

/// `prev + EPSILON`, or the next representable float when the epsilon is
/// lost to rounding.
fn next_above(prev: f64) -> f64 {
    let candidate = prev + EPSILON;
    if candidate > prev {
        candidate
    } else {
        f64::from_bits(prev.to_bits() + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn assert_strictly_increasing(bins: &[f64]) {
        for pair in bins.windows(2) {
            assert!(pair[0] < pair[1], "not increasing: {:?}", bins);
        }
    }

    #[test]
    fn test_reference_scale() {
        let bins = BinSet::build(10.0, 120.0, 500.0, 10).unwrap();
        let b = bins.boundaries();

        assert_eq!(b.len(), 13);
        assert_eq!(&b[..3], &[0.0, 1.0, 10.0]);
        assert_eq!(bins.middle(), 120.0);
        assert_eq!(b[6], 120.0);
        assert_eq!(b[11], 500.0);
        assert!(b[12].is_infinite());
        assert_strictly_increasing(b);

        assert_eq!(bins.level_of(600.0), 10);
        assert_eq!(bins.level_of(0.0), 0);
        assert_eq!(bins.level_of(5.0), 1);
    }

    #[test]
    fn test_lower_half_is_linear() {
        let bins = BinSet::build(10.0, 120.0, 500.0, 10).unwrap();
        let b = bins.boundaries();
        assert_eq!(b[3], 37.5);
        assert_eq!(b[4], 65.0);
        assert_eq!(b[5], 92.5);
    }

    #[test]
    fn test_half_open_intervals() {
        let bins = BinSet::build(10.0, 120.0, 500.0, 10).unwrap();
        // Exactly on a boundary belongs to the upper level.
        assert_eq!(bins.level_of(10.0), 2);
        assert_eq!(bins.level_of(37.5), 3);
        assert_eq!(bins.level_of(37.4), 2);
        assert_eq!(bins.level_of(120.0), 6);
        assert_eq!(bins.level_of(500.0), 10);
    }

    #[test]
    fn test_middle_is_clamped_inside_range() {
        let below = BinSet::build(100.0, 5.0, 200.0, 10).unwrap();
        assert!(below.middle() > 100.0);
        assert_strictly_increasing(below.boundaries());

        let above = BinSet::build(100.0, 10_000.0, 200.0, 10).unwrap();
        assert!(above.middle() < 200.0);
        assert_strictly_increasing(above.boundaries());
    }

    #[test]
    fn test_degenerate_max_is_raised() {
        let bins = BinSet::build(50.0, 50.0, 10.0, 10).unwrap();
        assert_eq!(bins.max(), 51.0);
        assert_strictly_increasing(bins.boundaries());
    }

    #[test]
    fn test_min_below_one_is_nudged() {
        let bins = BinSet::build(0.0, 3.0, 20.0, 4).unwrap();
        assert_eq!(bins.boundaries().len(), 7);
        assert!(bins.min() > 1.0);
        assert_strictly_increasing(bins.boundaries());
    }

    #[test]
    fn test_sub_one_pair_keeps_top_level_reachable() {
        let bins = BinSet::build(0.0, 0.5, 1.0, 10).unwrap();
        assert_eq!(bins.max(), 2.0);
        assert_eq!(bins.level_of(bins.max()), 10);
        assert_eq!(bins.level_of(1.0), 1);
        assert_strictly_increasing(bins.boundaries());

        let fractional = BinSet::build(0.25, 0.5, 0.75, 4).unwrap();
        assert_eq!(fractional.max(), 2.0);
        assert_eq!(fractional.level_of(5.0), 4);
    }

    #[test]
    fn test_nan_middle_uses_midpoint() {
        let bins = BinSet::build(0.0, f64::NAN, 100.0, 3).unwrap();
        assert_eq!(bins.middle(), 50.0);
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(matches!(
            BinSet::build(10.0, 20.0, 30.0, 2),
            Err(EngineError::InvalidLevelCount { got: 2, .. })
        ));
        assert!(matches!(
            BinSet::build(-1.0, 20.0, 30.0, 10),
            Err(EngineError::InvalidBinBounds { .. })
        ));
        assert!(BinSet::build(1.0, 2.0, f64::INFINITY, 10).is_err());
    }

    #[test]
    fn test_huge_values_stay_increasing() {
        let bins = BinSet::build(1e17, 1e17, 1e17, 20).unwrap();
        assert_eq!(bins.boundaries().len(), 23);
        assert_strictly_increasing(bins.boundaries());
    }

    #[test]
    fn test_assign_missing_is_zero() {
        let bins = BinSet::build(10.0, 120.0, 500.0, 10).unwrap();
        assert_eq!(assign(None, &bins), 0);
        assert_eq!(assign(Some(0.5), &bins), 1);
        assert_eq!(assign(Some(f64::NAN), &bins), 0);
    }

    #[test]
    fn test_middle_strategies() {
        let values = [0.0, 10.0, 20.0];
        assert_eq!(middle_of(&values, MiddleStrategy::NonZeroMean), Some(15.0));
        assert_eq!(middle_of(&values, MiddleStrategy::Mean), Some(10.0));
        assert_eq!(middle_of(&[], MiddleStrategy::Mean), None);
    }

    proptest! {
        #[test]
        fn prop_bins_are_well_formed(
            min in 0.0f64..1e7,
            span in 0.0f64..1e7,
            middle in -1e7f64..2e7,
            levels in 3u8..40,
        ) {
            let bins = BinSet::build(min, middle, min + span, levels).unwrap();
            let b = bins.boundaries();

            prop_assert_eq!(b.len(), usize::from(levels) + 3);
            prop_assert_eq!(b[0], 0.0);
            prop_assert_eq!(b[1], 1.0);
            prop_assert!(b[b.len() - 1].is_infinite());
            for pair in b.windows(2) {
                prop_assert!(pair[0] < pair[1]);
            }
        }

        #[test]
        fn prop_top_level_reachable_for_any_pair(
            min in 0.0f64..5.0,
            max in 0.0f64..5.0,
            middle in 0.0f64..5.0,
            levels in 3u8..30,
            above in 0.0f64..1e3,
        ) {
            let bins = BinSet::build(min, middle, max, levels).unwrap();
            prop_assert_eq!(bins.level_of(bins.max() + above), levels);
            prop_assert!(bins.max() >= max);
        }

        #[test]
        fn prop_levels_respect_thresholds(
            min in 2.0f64..1e5,
            span in 1.0f64..1e5,
            levels in 3u8..30,
            above in 0.0f64..1e6,
        ) {
            let max = min + span;
            let bins = BinSet::build(min, (min + max) / 2.0, max, levels).unwrap();

            prop_assert_eq!(bins.level_of(max + above), levels);
            prop_assert_eq!(bins.level_of(0.0), 0);
            prop_assert_eq!(bins.level_of(min / 2.0), 1);
        }
    }
}
