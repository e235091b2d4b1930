use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use tracing::debug;

use crate::analyzers::scale::{BinSet, middle_of};
use crate::analyzers::types::{ProfileCell, WeekdayProfile, WeekdayRow};
use crate::analyzers::utility::SUNDAY_FIRST;
use crate::config::{HourWindow, MiddleStrategy};
use crate::error::{EngineError, EngineResult};
use crate::thresholds::ThresholdPair;

/// Averages hourly totals per weekday and hour of day.
///
/// Cells are leveled on the hour scale; the middle boundary is derived from
/// the cell means. Every hour of the window gets a cell, so rows are always
/// the same width.
#[derive(Debug, Clone, Copy)]
pub struct WeekdayHourProfile {
    window: HourWindow,
    thresholds: ThresholdPair,
    levels: u8,
    middle: MiddleStrategy,
}

impl WeekdayHourProfile {
    pub fn new(
        window: HourWindow,
        thresholds: ThresholdPair,
        levels: u8,
        middle: MiddleStrategy,
    ) -> Self {
        Self {
            window,
            thresholds,
            levels,
            middle,
        }
    }

    /// Builds the profile from per-hour totals over `from..=to`.
    ///
    /// # Errors
    ///
    /// Fails when `from` is after `to` or the scale cannot be built.
    pub fn build(
        &self,
        hourly: &BTreeMap<NaiveDateTime, u64>,
        from: NaiveDate,
        to: NaiveDate,
    ) -> EngineResult<WeekdayProfile> {
        if from > to {
            return Err(EngineError::InvalidDateRange { from, to });
        }

        // (weekday from Sunday, hour) -> (sum, samples)
        let mut sums: BTreeMap<(u32, u32), (u64, u32)> = BTreeMap::new();
        for (ts, total) in hourly {
            let date = ts.date();
            if date < from || date > to || !self.window.contains(ts.hour()) {
                continue;
            }
            let slot = sums
                .entry((date.weekday().num_days_from_sunday(), ts.hour()))
                .or_default();
            slot.0 += total;
            slot.1 += 1;
        }

        let means: Vec<f64> = sums
            .values()
            .map(|(sum, n)| *sum as f64 / f64::from(*n))
            .collect();
        let middle = middle_of(&means, self.middle).unwrap_or(f64::NAN);
        let bins = BinSet::build(self.thresholds.min, middle, self.thresholds.max, self.levels)?;

        let rows = SUNDAY_FIRST
            .iter()
            .map(|&weekday| {
                let hours = self
                    .window
                    .hours()
                    .map(|hour| {
                        let key = (weekday.num_days_from_sunday(), hour);
                        let (mean_count, samples) = match sums.get(&key) {
                            Some(&(sum, n)) => (sum as f64 / f64::from(n), n),
                            None => (0.0, 0),
                        };
                        let level = if samples == 0 {
                            0
                        } else {
                            bins.level_of(mean_count)
                        };
                        ProfileCell {
                            weekday,
                            hour,
                            mean_count,
                            samples,
                            level,
                        }
                    })
                    .collect();
                WeekdayRow { weekday, hours }
            })
            .collect();

        debug!(%from, %to, cells = sums.len(), middle = bins.middle(), "Weekday profile built");
        Ok(WeekdayProfile { from, to, rows })
    }
}
