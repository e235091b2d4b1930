use std::collections::BTreeMap;
use std::hash::Hash;

use chrono::{Datelike, NaiveDate};
use tracing::{debug, info};

use crate::analyzers::aggregate::TemporalAggregator;
use crate::analyzers::coverage::filter_coverage;
use crate::analyzers::grid::MonthHourGrid;
use crate::analyzers::profile::WeekdayHourProfile;
use crate::analyzers::scale::{BinSet, middle_of};
use crate::analyzers::types::{Aggregate, Bucket, DateHourGrid, RollupRow, WeekdayProfile};
use crate::cache::MemoCache;
use crate::calendar::{Annotation, CalendarLayoutBuilder, CalendarMonth, WeekStart};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::highlight::{ExtremalSelector, HighlightSelection};
use crate::readings::{RawReading, validate_readings};
use crate::thresholds::{Granularity, ThresholdRegistry};

/// Options for [`CongestionEngine::calendar`].
#[derive(Debug, Clone, Default)]
pub struct CalendarOptions {
    pub week_start: WeekStart,
    /// Annotations keyed by day of month.
    pub annotations: BTreeMap<u32, Annotation>,
    /// Highlight overlay, chosen among the days of the month.
    pub highlight: Option<ExtremalSelector>,
}

/// Scores readings for one deployment.
///
/// Holds only read-only configuration; every call is a pure function of its
/// inputs, so one engine can serve any number of requests.
#[derive(Debug, Clone)]
pub struct CongestionEngine {
    config: EngineConfig,
    registry: ThresholdRegistry,
}

impl CongestionEngine {
    /// Validates `config` and builds its threshold registry.
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        let registry = ThresholdRegistry::from_config(&config.thresholds)?;
        Ok(Self { config, registry })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &ThresholdRegistry {
        &self.registry
    }

    pub fn aggregator(&self) -> TemporalAggregator<'_> {
        TemporalAggregator::new(&self.config.category, self.config.hour_window)
    }

    /// Empty memo cache with the configured lifetime.
    pub fn new_cache<K: Eq + Hash, V: Clone>(&self) -> MemoCache<K, V> {
        MemoCache::new(self.config.cache_ttl())
    }

    /// Scale for `location` at `granularity`, with the middle boundary taken
    /// from `aggregates`.
    pub fn bins_for(
        &self,
        location: &str,
        granularity: Granularity,
        aggregates: &[Aggregate],
    ) -> EngineResult<BinSet> {
        if !self.registry.knows(location) {
            debug!(location, "No thresholds configured, using defaults");
        }
        let pair = self.registry.lookup(location, granularity);

        let totals: Vec<f64> = aggregates.iter().map(|a| a.total_count() as f64).collect();
        let middle = middle_of(&totals, self.config.middle).unwrap_or(f64::NAN);

        BinSet::build(
            pair.min,
            middle,
            pair.max,
            self.config.levels_for(granularity),
        )
    }

    /// Aggregates, filters by coverage and levels the readings of one
    /// location. Buckets are in chronological order.
    #[tracing::instrument(skip(self, readings), fields(readings = readings.len(), %granularity))]
    pub fn rollup(
        &self,
        location: &str,
        readings: &[RawReading],
        granularity: Granularity,
    ) -> EngineResult<Vec<Bucket>> {
        let aggregates = self.aggregator().aggregate(location, readings, granularity)?;
        let total = aggregates.len();
        let kept = filter_coverage(aggregates, self.config.coverage_for(granularity));

        let bins = self.bins_for(location, granularity, &kept)?;
        let buckets: Vec<Bucket> = kept
            .iter()
            .map(|a| {
                let level = bins.level_of(a.total_count() as f64);
                debug!(period = %a.period(), total = a.total_count(), level, "Bucket leveled");
                Bucket::new(a.period(), a.total_count(), level, a.coverage_ratio())
            })
            .collect();

        info!(
            buckets = buckets.len(),
            dropped = total - buckets.len(),
            middle = bins.middle(),
            "Rollup complete"
        );
        Ok(buckets)
    }

    /// Rollup rows with the highlight overlay of `selector` applied.
    pub fn rollup_rows(
        &self,
        location: &str,
        readings: &[RawReading],
        granularity: Granularity,
        selector: Option<&ExtremalSelector>,
    ) -> EngineResult<Vec<RollupRow>> {
        let buckets = self.rollup(location, readings, granularity)?;
        let highlights = selector.map(|s| s.select(&buckets)).unwrap_or_default();
        Ok(rollup_rows(&buckets, &highlights))
    }

    /// Calendar grid for one month. Days are leveled against the whole
    /// dataset; highlights are chosen among the days of the month only.
    #[tracing::instrument(skip(self, readings, options), fields(readings = readings.len()))]
    pub fn calendar(
        &self,
        location: &str,
        readings: &[RawReading],
        year: i32,
        month: u32,
        options: &CalendarOptions,
    ) -> EngineResult<CalendarMonth> {
        if !(1..=12).contains(&month) {
            return Err(EngineError::InvalidMonth { year, month });
        }

        let days: Vec<Bucket> = self
            .rollup(location, readings, Granularity::Day)?
            .into_iter()
            .filter(|b| {
                b.period()
                    .date()
                    .is_some_and(|d| d.year() == year && d.month() == month)
            })
            .collect();

        let highlights = options
            .highlight
            .map(|s| s.select(&days))
            .unwrap_or_default();

        CalendarLayoutBuilder::new(year, month)
            .week_start(options.week_start)
            .annotations(&options.annotations)
            .highlights(&highlights)
            .build(&days)
    }

    /// Weekday-by-hour heat map over `from..=to`.
    #[tracing::instrument(skip(self, readings), fields(readings = readings.len(), %from, %to))]
    pub fn weekday_profile(
        &self,
        location: &str,
        readings: &[RawReading],
        from: NaiveDate,
        to: NaiveDate,
    ) -> EngineResult<WeekdayProfile> {
        validate_readings(location, readings)?;
        let hourly = self.aggregator().hourly_totals(readings);

        WeekdayHourProfile::new(
            self.config.hour_window,
            self.registry.lookup(location, Granularity::Hour),
            self.config.levels_for(Granularity::Hour),
            self.config.middle,
        )
        .build(&hourly, from, to)
    }

    /// Date-by-hour grid of one month, with highlights chosen among its
    /// cells.
    #[tracing::instrument(skip(self, readings, selector), fields(readings = readings.len()))]
    pub fn date_hour_grid(
        &self,
        location: &str,
        readings: &[RawReading],
        year: i32,
        month: u32,
        selector: Option<&ExtremalSelector>,
    ) -> EngineResult<DateHourGrid> {
        if !(1..=12).contains(&month) {
            return Err(EngineError::InvalidMonth { year, month });
        }
        validate_readings(location, readings)?;
        let hourly = self.aggregator().hourly_totals(readings);

        MonthHourGrid::new(
            self.config.hour_window,
            self.registry.lookup(location, Granularity::Hour),
            self.config.levels_for(Granularity::Hour),
            self.config.middle,
        )
        .build(&hourly, year, month, selector)
    }
}

/// Flattens buckets into serving rows, marking the selected ones.
pub fn rollup_rows(buckets: &[Bucket], highlights: &[HighlightSelection]) -> Vec<RollupRow> {
    buckets
        .iter()
        .enumerate()
        .map(|(index, b)| {
            let reason = highlights
                .iter()
                .find(|h| h.index == index)
                .map(|h| h.reason);
            RollupRow {
                period_label: b.period().label(),
                total_count: b.total_count(),
                level: b.level(),
                coverage_ratio: b.coverage_ratio(),
                highlighted: reason.is_some(),
                highlight_reason: reason,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzers::types::PeriodKey;
    use crate::highlight::{Purpose, ReasonCode};
    use crate::thresholds::{LocationThresholds, ThresholdPair};
    use chrono::NaiveDateTime;

    fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn engine() -> CongestionEngine {
        let mut config = EngineConfig::default();
        config.thresholds.locations.insert(
            "a".to_string(),
            LocationThresholds {
                hour: Some(ThresholdPair::new(10.0, 500.0)),
                day: Some(ThresholdPair::new(100.0, 1000.0)),
                ..LocationThresholds::default()
            },
        );
        CongestionEngine::new(config).unwrap()
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = EngineConfig::default();
        config.levels.month = 1;
        assert!(CongestionEngine::new(config).is_err());
    }

    #[test]
    fn test_rollup_levels_days() {
        let readings: Vec<RawReading> = (1..=5)
            .map(|d| RawReading::new("a", at(2025, 6, d, 9), "person", "in", i64::from(d) * 200))
            .collect();
        let buckets = engine().rollup("a", &readings, Granularity::Day).unwrap();

        assert_eq!(buckets.len(), 5);
        let levels: Vec<u8> = buckets.iter().map(|b| b.level()).collect();
        assert!(levels.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(buckets[4].level(), 10);
    }

    #[test]
    fn test_rollup_of_empty_input_is_empty() {
        for g in Granularity::ALL {
            assert!(engine().rollup("a", &[], g).unwrap().is_empty());
        }
    }

    #[test]
    fn test_unknown_location_uses_defaults() {
        let engine = engine();
        let bins = engine.bins_for("nowhere", Granularity::Day, &[]).unwrap();
        assert_eq!(bins.min(), 2300.0);
        assert_eq!(bins.max(), 9500.0);
    }

    #[test]
    fn test_bins_use_nonzero_mean() {
        let date = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let aggregates = vec![
            Aggregate::new(PeriodKey::Day { date }, 0, 1, 24),
            Aggregate::new(PeriodKey::Day { date }, 300, 1, 24),
            Aggregate::new(PeriodKey::Day { date }, 500, 1, 24),
        ];
        let bins = engine().bins_for("a", Granularity::Day, &aggregates).unwrap();
        assert_eq!(bins.middle(), 400.0);
    }

    #[test]
    fn test_partial_week_is_dropped() {
        // Five observed days out of seven.
        let readings: Vec<RawReading> = (2..=6)
            .map(|d| RawReading::new("a", at(2025, 6, d, 9), "person", "in", 100))
            .collect();
        let weeks = engine().rollup("a", &readings, Granularity::Week).unwrap();
        assert!(weeks.is_empty());
    }

    #[test]
    fn test_calendar_filters_to_month_and_highlights() {
        let mut readings = Vec::new();
        for d in 1..=30 {
            readings.push(RawReading::new("a", at(2025, 6, d, 9), "person", "in", i64::from(d) * 30));
        }
        readings.push(RawReading::new("a", at(2025, 7, 1, 9), "person", "in", 5000));

        let options = CalendarOptions {
            highlight: Some(ExtremalSelector::new(Purpose::Extremes { count: 3 })),
            ..CalendarOptions::default()
        };
        let month = engine().calendar("a", &readings, 2025, 6, &options).unwrap();

        assert_eq!(month.cells().count(), 30);
        assert!(month.cells().all(|c| c.level > 0));
        let highlighted = month.cells().filter(|c| c.highlight.is_some()).count();
        assert_eq!(highlighted, 6);
        assert_eq!(month.cell(1).and_then(|c| c.highlight), Some(ReasonCode::Lowest));
    }

    #[test]
    fn test_calendar_rejects_bad_month() {
        assert!(matches!(
            engine().calendar("a", &[], 2025, 0, &CalendarOptions::default()),
            Err(EngineError::InvalidMonth { month: 0, .. })
        ));
    }

    #[test]
    fn test_rollup_rows_mark_highlights() {
        let date = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let buckets = vec![
            Bucket::new(PeriodKey::Day { date }, 10, 1, 1.0),
            Bucket::new(PeriodKey::Day { date: date.succ_opt().unwrap() }, 900, 9, 1.0),
        ];
        let highlights = [HighlightSelection {
            index: 1,
            reason: ReasonCode::Highest,
        }];

        let rows = rollup_rows(&buckets, &highlights);
        assert_eq!(rows[0].period_label, "2025-06-01");
        assert!(!rows[0].highlighted);
        assert!(rows[1].highlighted);
        assert_eq!(rows[1].highlight_reason, Some(ReasonCode::Highest));
    }

    #[test]
    fn test_weekday_profile_uses_hour_scale() {
        let readings = vec![
            RawReading::new("a", at(2025, 6, 1, 9), "person", "in", 600),
            RawReading::new("a", at(2025, 6, 2, 9), "person", "in", 5),
        ];
        let from = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let to = NaiveDate::from_ymd_opt(2025, 6, 30).unwrap();
        let profile = engine().weekday_profile("a", &readings, from, to).unwrap();

        assert_eq!(profile.rows[0].hours[9].level(), 10);
        assert_eq!(profile.rows[1].hours[9].level(), 1);
    }

    #[test]
    fn test_date_hour_grid_uses_hour_scale() {
        let readings = vec![
            RawReading::new("a", at(2025, 6, 1, 9), "person", "in", 600),
            RawReading::new("a", at(2025, 6, 2, 9), "person", "in", 5),
            RawReading::new("a", at(2025, 5, 31, 9), "person", "in", 50),
        ];
        let grid = engine()
            .date_hour_grid("a", &readings, 2025, 6, None)
            .unwrap();

        assert_eq!(grid.rows.len(), 30);
        assert!(grid.rows.iter().all(|r| r.hours.len() == 24));
        let first = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        assert_eq!(grid.cell(first, 9).map(|c| c.level), Some(10));
        assert_eq!(grid.cell(first.succ_opt().unwrap(), 9).map(|c| c.level), Some(1));
        assert_eq!(grid.cells().filter(|c| c.level > 0).count(), 2);
    }

    #[test]
    fn test_date_hour_grid_rejects_bad_month() {
        assert!(matches!(
            engine().date_hour_grid("a", &[], 2025, 0, None),
            Err(EngineError::InvalidMonth { month: 0, .. })
        ));
    }

    #[test]
    fn test_new_cache_uses_configured_ttl() {
        let mut config = EngineConfig::default();
        config.cache_ttl_hours = 2;
        let engine = CongestionEngine::new(config).unwrap();
        let cache: MemoCache<String, u64> = engine.new_cache();
        assert_eq!(cache.ttl(), chrono::TimeDelta::hours(2));
    }

    #[test]
    fn test_nonpositive_cache_ttl_is_rejected() {
        let mut config = EngineConfig::default();
        config.cache_ttl_hours = 0;
        assert!(matches!(
            CongestionEngine::new(config),
            Err(EngineError::InvalidCacheTtl(0))
        ));
    }
}
