//! Data types used by the rollup pipeline.

use std::fmt;

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike, Weekday};
use serde::Serialize;

use crate::analyzers::utility::{days_in_month, days_in_year};
use crate::config::HourWindow;
use crate::highlight::ReasonCode;
use crate::thresholds::Granularity;

/// Identifies the calendar period a bucket covers.
///
/// Keys of the same granularity order chronologically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(tag = "granularity", rename_all = "lowercase")]
pub enum PeriodKey {
    Hour { date: NaiveDate, hour: u32 },
    Day { date: NaiveDate },
    Week { iso_year: i32, week: u32 },
    Month { year: i32, month: u32 },
    Year { year: i32 },
}

impl PeriodKey {
    /// Key of the period containing `timestamp`.
    pub fn of(granularity: Granularity, timestamp: NaiveDateTime) -> Self {
        let date = timestamp.date();
        match granularity {
            Granularity::Hour => PeriodKey::Hour {
                date,
                hour: timestamp.hour(),
            },
            _ => Self::of_date(granularity, date),
        }
    }

    /// Key of the period containing `date`. Hour keys use hour 0.
    pub fn of_date(granularity: Granularity, date: NaiveDate) -> Self {
        match granularity {
            Granularity::Hour => PeriodKey::Hour { date, hour: 0 },
            Granularity::Day => PeriodKey::Day { date },
            Granularity::Week => {
                let iso = date.iso_week();
                PeriodKey::Week {
                    iso_year: iso.year(),
                    week: iso.week(),
                }
            }
            Granularity::Month => PeriodKey::Month {
                year: date.year(),
                month: date.month(),
            },
            Granularity::Year => PeriodKey::Year { year: date.year() },
        }
    }

    pub fn granularity(&self) -> Granularity {
        match self {
            PeriodKey::Hour { .. } => Granularity::Hour,
            PeriodKey::Day { .. } => Granularity::Day,
            PeriodKey::Week { .. } => Granularity::Week,
            PeriodKey::Month { .. } => Granularity::Month,
            PeriodKey::Year { .. } => Granularity::Year,
        }
    }

    /// The calendar date for hour and day keys.
    pub fn date(&self) -> Option<NaiveDate> {
        match *self {
            PeriodKey::Hour { date, .. } | PeriodKey::Day { date } => Some(date),
            _ => None,
        }
    }

    pub fn hour(&self) -> Option<u32> {
        match *self {
            PeriodKey::Hour { hour, .. } => Some(hour),
            _ => None,
        }
    }

    /// First calendar day the period covers, `None` for keys that name no
    /// real period (month 13, ISO week 54).
    pub fn first_day(&self) -> Option<NaiveDate> {
        match *self {
            PeriodKey::Hour { date, .. } | PeriodKey::Day { date } => Some(date),
            PeriodKey::Week { iso_year, week } => {
                NaiveDate::from_isoywd_opt(iso_year, week, Weekday::Mon)
            }
            PeriodKey::Month { year, month } => NaiveDate::from_ymd_opt(year, month, 1),
            PeriodKey::Year { year } => NaiveDate::from_ymd_opt(year, 1, 1),
        }
    }

    /// Last calendar day the period covers, inclusive.
    pub fn last_day(&self) -> Option<NaiveDate> {
        match *self {
            PeriodKey::Hour { date, .. } | PeriodKey::Day { date } => Some(date),
            PeriodKey::Week { iso_year, week } => {
                NaiveDate::from_isoywd_opt(iso_year, week, Weekday::Sun)
            }
            PeriodKey::Month { year, month } => {
                NaiveDate::from_ymd_opt(year, month, days_in_month(year, month))
            }
            PeriodKey::Year { year } => NaiveDate::from_ymd_opt(year, 12, 31),
        }
    }

    pub fn weekday(&self) -> Option<Weekday> {
        self.date().map(|d| d.weekday())
    }

    /// Number of subunits (hours or days) a fully observed period holds.
    pub fn expected_subunits(&self, window: HourWindow) -> u32 {
        match *self {
            PeriodKey::Hour { .. } => 1,
            PeriodKey::Day { .. } => window.len(),
            PeriodKey::Week { .. } => 7,
            PeriodKey::Month { year, month } => days_in_month(year, month),
            PeriodKey::Year { year } => days_in_year(year),
        }
    }

    /// Display label used by the serving layer.
    pub fn label(&self) -> String {
        match *self {
            PeriodKey::Hour { date, hour } => format!("{}T{:02}:00", date.format("%Y-%m-%d"), hour),
            PeriodKey::Day { date } => date.format("%Y-%m-%d").to_string(),
            PeriodKey::Week { iso_year, week } => format!("{iso_year}-W{week:02}"),
            PeriodKey::Month { year, month } => format!("{year}-{month:02}"),
            PeriodKey::Year { year } => year.to_string(),
        }
    }
}

impl fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// Unleveled rollup of one period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Aggregate {
    pub(crate) period: PeriodKey,
    pub(crate) total_count: u64,
    pub(crate) observed: u32,
    pub(crate) expected: u32,
}

impl Aggregate {
    pub fn new(period: PeriodKey, total_count: u64, observed: u32, expected: u32) -> Self {
        Self {
            period,
            total_count,
            observed,
            expected,
        }
    }

    pub fn period(&self) -> PeriodKey {
        self.period
    }

    pub fn total_count(&self) -> u64 {
        self.total_count
    }

    /// Subunits with at least one reading.
    pub fn observed(&self) -> u32 {
        self.observed
    }

    pub fn expected(&self) -> u32 {
        self.expected
    }

    /// Share of the period backed by data, `0.0` when nothing is expected.
    pub fn coverage_ratio(&self) -> f64 {
        if self.expected == 0 {
            0.0
        } else {
            self.observed as f64 / self.expected as f64
        }
    }
}

/// A leveled rollup of one period.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bucket {
    pub(crate) period: PeriodKey,
    pub(crate) total_count: u64,
    pub(crate) level: u8,
    pub(crate) coverage_ratio: f64,
}

impl Bucket {
    pub fn new(period: PeriodKey, total_count: u64, level: u8, coverage_ratio: f64) -> Self {
        Self {
            period,
            total_count,
            level,
            coverage_ratio,
        }
    }

    pub fn period(&self) -> PeriodKey {
        self.period
    }

    pub fn total_count(&self) -> u64 {
        self.total_count
    }

    pub fn level(&self) -> u8 {
        self.level
    }

    pub fn coverage_ratio(&self) -> f64 {
        self.coverage_ratio
    }
}

/// Mean hourly count for one weekday and hour.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileCell {
    pub(crate) weekday: Weekday,
    pub(crate) hour: u32,
    pub(crate) mean_count: f64,
    pub(crate) samples: u32,
    pub(crate) level: u8,
}

impl ProfileCell {
    pub fn weekday(&self) -> Weekday {
        self.weekday
    }

    pub fn hour(&self) -> u32 {
        self.hour
    }

    pub fn mean_count(&self) -> f64 {
        self.mean_count
    }

    /// Number of dated hours averaged into the cell.
    pub fn samples(&self) -> u32 {
        self.samples
    }

    pub fn level(&self) -> u8 {
        self.level
    }
}

/// One weekday row of the weekday-by-hour heat map.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeekdayRow {
    pub weekday: Weekday,
    pub hours: Vec<ProfileCell>,
}

/// Weekday-by-hour heat map, Sunday first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeekdayProfile {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub rows: Vec<WeekdayRow>,
}

impl WeekdayProfile {
    /// All cells in row order.
    pub fn cells(&self) -> Vec<&ProfileCell> {
        self.rows.iter().flat_map(|r| r.hours.iter()).collect()
    }
}

/// One hour of a [`DateHourGrid`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GridCell {
    pub hour: u32,
    pub total_count: u64,
    /// 0 for hours without readings.
    pub level: u8,
    pub highlighted: bool,
    pub highlight_reason: Option<ReasonCode>,
}

/// One date row of a [`DateHourGrid`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DateHourRow {
    pub date: NaiveDate,
    pub hours: Vec<GridCell>,
}

/// Date-by-hour grid of one month: a row for every day, a cell for every
/// hour of the window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DateHourGrid {
    pub year: i32,
    pub month: u32,
    pub rows: Vec<DateHourRow>,
}

impl DateHourGrid {
    pub fn cells(&self) -> impl Iterator<Item = &GridCell> {
        self.rows.iter().flat_map(|r| r.hours.iter())
    }

    pub fn cell(&self, date: NaiveDate, hour: u32) -> Option<&GridCell> {
        self.rows
            .iter()
            .find(|r| r.date == date)?
            .hours
            .iter()
            .find(|c| c.hour == hour)
    }
}

/// Rollup entry handed to the serving layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RollupRow {
    pub period_label: String,
    pub total_count: u64,
    pub level: u8,
    pub coverage_ratio: f64,
    pub highlighted: bool,
    pub highlight_reason: Option<ReasonCode>,
}
