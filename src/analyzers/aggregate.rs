use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime};
use tracing::debug;

use crate::analyzers::types::{Aggregate, PeriodKey};
use crate::config::HourWindow;
use crate::error::EngineResult;
use crate::readings::{RawReading, validate_readings};
use crate::thresholds::Granularity;

/// Groups raw readings into period aggregates.
///
/// Only readings of one category inside the hour window are counted.
/// Directions are summed. Output is sorted chronologically, so the same input
/// always yields the same aggregates.
#[derive(Debug, Clone, Copy)]
pub struct TemporalAggregator<'a> {
    category: &'a str,
    window: HourWindow,
}

impl<'a> TemporalAggregator<'a> {
    pub fn new(category: &'a str, window: HourWindow) -> Self {
        Self { category, window }
    }

    pub fn window(&self) -> HourWindow {
        self.window
    }

    /// Per-hour totals of the counted category within the window. An hour is
    /// present when at least one reading exists for it, even with count 0.
    pub fn hourly_totals(&self, readings: &[RawReading]) -> BTreeMap<NaiveDateTime, u64> {
        let mut hours = BTreeMap::new();
        for r in readings {
            if r.category != self.category || !self.window.contains(r.hour()) {
                continue;
            }
            // Validated readings are non-negative.
            *hours.entry(r.timestamp).or_insert(0u64) += r.count.max(0) as u64;
        }
        hours
    }

    /// Validates `readings` for `location` and aggregates them at
    /// `granularity`.
    ///
    /// # Errors
    ///
    /// Returns the first contract violation found by
    /// [`validate_readings`].
    pub fn aggregate(
        &self,
        location: &str,
        readings: &[RawReading],
        granularity: Granularity,
    ) -> EngineResult<Vec<Aggregate>> {
        validate_readings(location, readings)?;

        let hourly = self.hourly_totals(readings);
        let aggregates = match granularity {
            Granularity::Hour => hourly
                .iter()
                .map(|(ts, total)| {
                    Aggregate::new(PeriodKey::of(Granularity::Hour, *ts), *total, 1, 1)
                })
                .collect(),
            Granularity::Day => self
                .daily(&hourly)
                .into_iter()
                .map(|(date, (total, hours))| {
                    let period = PeriodKey::Day { date };
                    Aggregate::new(period, total, hours, period.expected_subunits(self.window))
                })
                .collect(),
            _ => self.by_days(&hourly, granularity),
        };

        debug!(
            location,
            %granularity,
            readings = readings.len(),
            aggregates = aggregates.len(),
            "Readings aggregated"
        );
        Ok(aggregates)
    }

    /// Daily `(total, observed hours)`.
    fn daily(&self, hourly: &BTreeMap<NaiveDateTime, u64>) -> BTreeMap<NaiveDate, (u64, u32)> {
        let mut days: BTreeMap<NaiveDate, (u64, u32)> = BTreeMap::new();
        for (ts, total) in hourly {
            let entry = days.entry(ts.date()).or_default();
            entry.0 += total;
            entry.1 += 1;
        }
        days
    }

    /// Week, month and year aggregates, observed in distinct days.
    fn by_days(
        &self,
        hourly: &BTreeMap<NaiveDateTime, u64>,
        granularity: Granularity,
    ) -> Vec<Aggregate> {
        let mut periods: BTreeMap<PeriodKey, (u64, u32)> = BTreeMap::new();
        for (date, (total, _)) in self.daily(hourly) {
            let entry = periods
                .entry(PeriodKey::of_date(granularity, date))
                .or_default();
            entry.0 += total;
            entry.1 += 1;
        }

        periods
            .into_iter()
            .map(|(period, (total, days))| {
                Aggregate::new(period, total, days, period.expected_subunits(self.window))
            })
            .collect()
    }
}
