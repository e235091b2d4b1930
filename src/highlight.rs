//! Highlight selection over leveled entries.
//!
//! An [`ExtremalSelector`] picks the entries worth marking for a given
//! [`Purpose`]: the quietest or busiest periods, everything past a level
//! threshold, quiet days on quiet weekdays, or the peak hours of each day.
//!
//! Entries with level 0 carry no data and are never selected. Input order is
//! taken as chronological order and breaks every tie.

use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::{NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::analyzers::types::{Bucket, ProfileCell};
use crate::analyzers::utility::SUNDAY_FIRST;
use crate::error::EngineError;

/// Number of weekdays considered by [`Purpose::WeekdayThresholdBelow`].
pub const QUIET_WEEKDAY_COUNT: usize = 2;

/// Why an entry was highlighted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    Lowest,
    Highest,
    QuietWeekday,
    BelowThreshold,
    AboveThreshold,
    PeakHour,
}

impl ReasonCode {
    /// Short human-readable explanation.
    pub fn describe(&self) -> &'static str {
        match self {
            ReasonCode::Lowest => "least crowded",
            ReasonCode::Highest => "most crowded",
            ReasonCode::QuietWeekday => "quiet day on a quiet weekday",
            ReasonCode::BelowThreshold => "at or below threshold",
            ReasonCode::AboveThreshold => "at or above threshold",
            ReasonCode::PeakHour => "peak hour",
        }
    }
}

/// Value an entry is ranked by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankMetric {
    #[default]
    Level,
    Count,
}

/// What the highlight is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "condition", rename_all = "snake_case")]
pub enum Purpose {
    Lowest { count: usize },
    Highest { count: usize },
    /// `count` lowest followed by `count` highest.
    Extremes { count: usize },
    ThresholdBelow { threshold: u8 },
    ThresholdAbove { threshold: u8 },
    /// Entries at/below `threshold` on the quietest weekdays.
    WeekdayThresholdBelow { threshold: u8 },
    /// Top `count` entries of every day.
    PeakHours { count: usize },
}

impl Purpose {
    /// Named purposes of the dashboard, with the metric they rank by.
    pub fn preset(name: &str) -> Option<(Purpose, RankMetric)> {
        use Purpose::*;
        use RankMetric::{Count, Level};

        let preset = match name {
            "cal_holiday" => (WeekdayThresholdBelow { threshold: 10 }, Level),
            "cal_shoping_holiday" => (WeekdayThresholdBelow { threshold: 3 }, Level),
            "cal_event" => (ThresholdBelow { threshold: 4 }, Level),
            "cal_long_holiday" => (ThresholdBelow { threshold: 2 }, Level),
            "cal_training" => (Lowest { count: 2 }, Level),
            "cal_cog" => (Extremes { count: 3 }, Level),
            "wti_event_effect" => (Highest { count: 3 }, Level),
            "dti_event_time" => (Highest { count: 5 }, Level),
            "wti_shift" | "wti_cog" => (Extremes { count: 3 }, Level),
            "wti_count" => (Extremes { count: 3 }, Count),
            "dti_open_hour" | "dti_shoping_open_hour" => (PeakHours { count: 2 }, Level),
            "dti_cog" => (Extremes { count: 2 }, Level),
            "dti_count" => (Extremes { count: 2 }, Count),
            _ => return None,
        };
        Some(preset)
    }

    /// Like [`Purpose::preset`], but an unknown name is an error.
    pub fn from_preset(name: &str) -> Result<(Purpose, RankMetric), EngineError> {
        Self::preset(name).ok_or_else(|| EngineError::UnknownPurpose(name.to_string()))
    }
}

/// Groups entries that belong to the same day row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DayGroup {
    Date(NaiveDate),
    Weekday(Weekday),
}

/// An entry the selector can rank.
pub trait Highlightable {
    fn level(&self) -> u8;

    fn count(&self) -> f64;

    fn weekday(&self) -> Option<Weekday>;

    /// Row used by [`Purpose::PeakHours`]; entries without one are ignored.
    fn day_group(&self) -> Option<DayGroup>;
}

impl Highlightable for Bucket {
    fn level(&self) -> u8 {
        self.level
    }

    fn count(&self) -> f64 {
        self.total_count as f64
    }

    fn weekday(&self) -> Option<Weekday> {
        self.period.weekday()
    }

    fn day_group(&self) -> Option<DayGroup> {
        self.period.hour().and(self.period.date()).map(DayGroup::Date)
    }
}

impl Highlightable for ProfileCell {
    fn level(&self) -> u8 {
        self.level
    }

    fn count(&self) -> f64 {
        self.mean_count
    }

    fn weekday(&self) -> Option<Weekday> {
        Some(self.weekday)
    }

    fn day_group(&self) -> Option<DayGroup> {
        Some(DayGroup::Weekday(self.weekday))
    }
}

impl<T: Highlightable> Highlightable for &T {
    fn level(&self) -> u8 {
        (**self).level()
    }

    fn count(&self) -> f64 {
        (**self).count()
    }

    fn weekday(&self) -> Option<Weekday> {
        (**self).weekday()
    }

    fn day_group(&self) -> Option<DayGroup> {
        (**self).day_group()
    }
}

/// A selected entry: its index in the input slice and the reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HighlightSelection {
    pub index: usize,
    pub reason: ReasonCode,
}

/// Picks highlight entries for one purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtremalSelector {
    purpose: Purpose,
    metric: RankMetric,
}

impl ExtremalSelector {
    pub fn new(purpose: Purpose) -> Self {
        Self {
            purpose,
            metric: RankMetric::default(),
        }
    }

    pub fn with_metric(mut self, metric: RankMetric) -> Self {
        self.metric = metric;
        self
    }

    pub fn purpose(&self) -> Purpose {
        self.purpose
    }

    /// Returns the selected entries in rank order.
    pub fn select<T: Highlightable>(&self, entries: &[T]) -> Vec<HighlightSelection> {
        match self.purpose {
            Purpose::Lowest { count } => self
                .ranked(entries, Ordering::Less)
                .into_iter()
                .take(count)
                .map(|index| tag(index, ReasonCode::Lowest))
                .collect(),
            Purpose::Highest { count } => self
                .ranked(entries, Ordering::Greater)
                .into_iter()
                .take(count)
                .map(|index| tag(index, ReasonCode::Highest))
                .collect(),
            Purpose::Extremes { count } => self.extremes(entries, count),
            Purpose::ThresholdBelow { threshold } => {
                threshold_select(entries, |l| l <= threshold, ReasonCode::BelowThreshold)
            }
            Purpose::ThresholdAbove { threshold } => {
                threshold_select(entries, |l| l >= threshold, ReasonCode::AboveThreshold)
            }
            Purpose::WeekdayThresholdBelow { threshold } => quiet_weekdays(entries, threshold),
            Purpose::PeakHours { count } => self.peak_hours(entries, count),
        }
    }

    fn key<T: Highlightable>(&self, entry: &T) -> f64 {
        match self.metric {
            RankMetric::Level => f64::from(entry.level()),
            RankMetric::Count => entry.count(),
        }
    }

    /// Indices of non-zero entries, ascending for `Less`, descending for
    /// `Greater`. The sort is stable, so ties keep input order.
    fn ranked<T: Highlightable>(&self, entries: &[T], direction: Ordering) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..entries.len())
            .filter(|&i| entries[i].level() > 0)
            .collect();
        self.sort_indices(entries, &mut indices, direction);
        indices
    }

    fn sort_indices<T: Highlightable>(
        &self,
        entries: &[T],
        indices: &mut [usize],
        direction: Ordering,
    ) {
        indices.sort_by(|&a, &b| {
            let ord = self
                .key(&entries[a])
                .partial_cmp(&self.key(&entries[b]))
                .unwrap_or(Ordering::Equal);
            if direction == Ordering::Greater {
                ord.reverse()
            } else {
                ord
            }
        });
    }

    fn extremes<T: Highlightable>(&self, entries: &[T], count: usize) -> Vec<HighlightSelection> {
        let lowest: Vec<usize> = self
            .ranked(entries, Ordering::Less)
            .into_iter()
            .take(count)
            .collect();
        let highest = self
            .ranked(entries, Ordering::Greater)
            .into_iter()
            .take(count)
            .filter(|i| !lowest.contains(i));

        lowest
            .iter()
            .map(|&index| tag(index, ReasonCode::Lowest))
            .chain(highest.map(|index| tag(index, ReasonCode::Highest)))
            .collect()
    }

    fn peak_hours<T: Highlightable>(&self, entries: &[T], count: usize) -> Vec<HighlightSelection> {
        let mut order: Vec<DayGroup> = Vec::new();
        let mut groups: HashMap<DayGroup, Vec<usize>> = HashMap::new();
        for (i, entry) in entries.iter().enumerate() {
            let Some(group) = entry.day_group() else {
                continue;
            };
            if entry.level() == 0 {
                continue;
            }
            groups
                .entry(group)
                .or_insert_with(|| {
                    order.push(group);
                    Vec::new()
                })
                .push(i);
        }

        let mut selected = Vec::new();
        for group in order {
            let Some(mut indices) = groups.remove(&group) else {
                continue;
            };
            self.sort_indices(entries, &mut indices, Ordering::Greater);
            selected.extend(
                indices
                    .into_iter()
                    .take(count)
                    .map(|index| tag(index, ReasonCode::PeakHour)),
            );
        }
        selected
    }
}

fn tag(index: usize, reason: ReasonCode) -> HighlightSelection {
    HighlightSelection { index, reason }
}

fn threshold_select<T: Highlightable>(
    entries: &[T],
    passes: impl Fn(u8) -> bool,
    reason: ReasonCode,
) -> Vec<HighlightSelection> {
    entries
        .iter()
        .enumerate()
        .filter(|(_, e)| e.level() > 0 && passes(e.level()))
        .map(|(index, _)| tag(index, reason))
        .collect()
}

/// Average level per weekday over non-zero entries, then entries at/below
/// `threshold` on the [`QUIET_WEEKDAY_COUNT`] quietest weekdays.
fn quiet_weekdays<T: Highlightable>(entries: &[T], threshold: u8) -> Vec<HighlightSelection> {
    let weekdays = quietest_weekdays(entries, QUIET_WEEKDAY_COUNT);

    entries
        .iter()
        .enumerate()
        .filter(|(_, e)| {
            e.level() > 0
                && e.level() <= threshold
                && e.weekday().is_some_and(|wd| weekdays.contains(&wd))
        })
        .map(|(index, _)| tag(index, ReasonCode::QuietWeekday))
        .collect()
}

/// The `n` weekdays with the lowest mean level, Sunday first among ties.
pub fn quietest_weekdays<T: Highlightable>(entries: &[T], n: usize) -> Vec<Weekday> {
    let mut sums = [(0u64, 0u32); 7];
    for entry in entries {
        if entry.level() == 0 {
            continue;
        }
        if let Some(wd) = entry.weekday() {
            let slot = &mut sums[wd.num_days_from_sunday() as usize];
            slot.0 += u64::from(entry.level());
            slot.1 += 1;
        }
    }

    let mut averages: Vec<(Weekday, f64)> = SUNDAY_FIRST
        .iter()
        .filter_map(|&wd| {
            let (sum, n) = sums[wd.num_days_from_sunday() as usize];
            (n > 0).then(|| (wd, sum as f64 / f64::from(n)))
        })
        .collect();
    averages.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));
    averages.into_iter().take(n).map(|(wd, _)| wd).collect()
}
