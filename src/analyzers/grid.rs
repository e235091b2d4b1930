use std::collections::BTreeMap;

use chrono::{Days, NaiveDateTime, NaiveTime, Timelike};
use tracing::debug;

use crate::analyzers::scale::{BinSet, middle_of};
use crate::analyzers::types::{Bucket, DateHourGrid, DateHourRow, GridCell, PeriodKey};
use crate::config::{HourWindow, MiddleStrategy};
use crate::error::{EngineError, EngineResult};
use crate::highlight::{ExtremalSelector, ReasonCode};
use crate::thresholds::ThresholdPair;

/// Lays out the hourly totals of one month as a date-by-hour grid.
///
/// Hours are leveled on the hour scale with the middle boundary taken from
/// the month's observed hours. Highlights are chosen among the cells of the
/// month, so [`crate::highlight::Purpose::PeakHours`] picks the busiest hours
/// of each date.
#[derive(Debug, Clone, Copy)]
pub struct MonthHourGrid {
    window: HourWindow,
    thresholds: ThresholdPair,
    levels: u8,
    middle: MiddleStrategy,
}

impl MonthHourGrid {
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

    /// Builds the grid for `year`/`month` from per-hour totals.
    ///
    /// # Errors
    ///
    /// Fails on a month outside 1..=12 or when the scale cannot be built.
    pub fn build(
        &self,
        hourly: &BTreeMap<NaiveDateTime, u64>,
        year: i32,
        month: u32,
        selector: Option<&ExtremalSelector>,
    ) -> EngineResult<DateHourGrid> {
        let period = PeriodKey::Month { year, month };
        let (Some(first), Some(last)) = (period.first_day(), period.last_day()) else {
            return Err(EngineError::InvalidMonth { year, month });
        };

        let start = first.and_time(NaiveTime::MIN);
        let end = (last + Days::new(1)).and_time(NaiveTime::MIN);
        let observed: BTreeMap<NaiveDateTime, u64> = hourly
            .range(start..end)
            .filter(|(ts, _)| self.window.contains(ts.hour()))
            .map(|(ts, total)| (*ts, *total))
            .collect();

        let totals: Vec<f64> = observed.values().map(|&t| t as f64).collect();
        let middle = middle_of(&totals, self.middle).unwrap_or(f64::NAN);
        let bins = BinSet::build(self.thresholds.min, middle, self.thresholds.max, self.levels)?;

        let mut buckets = Vec::new();
        for date in first.iter_days().take_while(|d| *d <= last) {
            for hour in self.window.hours() {
                let key = PeriodKey::Hour { date, hour };
                let bucket = match date
                    .and_hms_opt(hour, 0, 0)
                    .and_then(|ts| observed.get(&ts))
                {
                    Some(&total) => Bucket::new(key, total, bins.level_of(total as f64), 1.0),
                    None => Bucket::new(key, 0, 0, 0.0),
                };
                buckets.push(bucket);
            }
        }

        let mut reasons: Vec<Option<ReasonCode>> = vec![None; buckets.len()];
        if let Some(selector) = selector {
            for selection in selector.select(&buckets) {
                reasons[selection.index] = Some(selection.reason);
            }
        }

        let width = self.window.len() as usize;
        let rows = buckets
            .chunks(width)
            .zip(reasons.chunks(width))
            .filter_map(|(cells, reasons)| {
                let date = cells.first()?.period().date()?;
                let hours = cells
                    .iter()
                    .zip(reasons)
                    .map(|(b, reason)| GridCell {
                        hour: b.period().hour().unwrap_or_default(),
                        total_count: b.total_count(),
                        level: b.level(),
                        highlighted: reason.is_some(),
                        highlight_reason: *reason,
                    })
                    .collect();
                Some(DateHourRow { date, hours })
            })
            .collect();

        debug!(
            year,
            month,
            observed = observed.len(),
            middle = bins.middle(),
            "Date-hour grid built"
        );
        Ok(DateHourGrid { year, month, rows })
    }
}
