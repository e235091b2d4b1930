//! Engine configuration.
//!
//! One JSON document holds the deployment settings and the threshold table.
//! Every field has a default, so `{}` is a valid configuration.

use std::path::Path;

use chrono::TimeDelta;
use serde::{Deserialize, Deserializer, Serialize};

use crate::analyzers::coverage::CoveragePolicy;
use crate::cache::DEFAULT_TTL_HOURS;
use crate::analyzers::scale::MIN_LEVEL_COUNT;
use crate::error::{EngineError, EngineResult};
use crate::thresholds::{Granularity, GranularityOverrides, GranularityTable, ThresholdConfig};

/// Hours of the day that contribute to a rollup.
///
/// Fixed per deployment. Every granularity uses the same window so levels are
/// never computed over a mix of full-day and daytime sums.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HourWindow {
    /// 00:00 through 23:00.
    #[default]
    FullDay,
    /// 07:00 through 22:00 inclusive.
    Daytime,
    /// Any inclusive range of hours.
    Custom { first: u32, last: u32 },
}

impl HourWindow {
    pub fn bounds(&self) -> (u32, u32) {
        match *self {
            HourWindow::FullDay => (0, 23),
            HourWindow::Daytime => (7, 22),
            HourWindow::Custom { first, last } => (first, last),
        }
    }

    pub fn contains(&self, hour: u32) -> bool {
        let (first, last) = self.bounds();
        (first..=last).contains(&hour)
    }

    /// Number of hours in the window.
    pub fn len(&self) -> u32 {
        let (first, last) = self.bounds();
        last.saturating_sub(first) + 1
    }

    pub fn hours(&self) -> impl Iterator<Item = u32> {
        let (first, last) = self.bounds();
        first..=last
    }

    fn validate(&self) -> EngineResult<()> {
        let (first, last) = self.bounds();
        if first > last || last > 23 {
            return Err(EngineError::InvalidHourWindow { first, last });
        }
        Ok(())
    }
}

/// How the data-driven middle boundary is derived from the aggregates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MiddleStrategy {
    /// Mean of aggregates with a non-zero total.
    #[default]
    NonZeroMean,
    /// Mean of every aggregate, zeros included.
    Mean,
}

pub const DEFAULT_LEVELS: GranularityTable<u8> = GranularityTable {
    hour: 10,
    day: 10,
    week: 20,
    month: 10,
    year: 20,
};

pub const DEFAULT_COVERAGE: GranularityTable<CoveragePolicy> = GranularityTable {
    hour: CoveragePolicy::NONE,
    day: CoveragePolicy::NONE,
    week: CoveragePolicy {
        min_ratio: 0.8,
        min_observed: Some(5),
    },
    month: CoveragePolicy {
        min_ratio: 0.6,
        min_observed: None,
    },
    year: CoveragePolicy::NONE,
};

/// Deployment settings for [`crate::CongestionEngine`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Reading category that is counted; other categories are ignored.
    pub category: String,
    pub hour_window: HourWindow,
    pub middle: MiddleStrategy,
    /// Number of congestion levels `N` per granularity. Granularities left
    /// out keep their defaults.
    #[serde(deserialize_with = "levels_over_defaults")]
    pub levels: GranularityTable<u8>,
    #[serde(deserialize_with = "coverage_over_defaults")]
    pub coverage: GranularityTable<CoveragePolicy>,
    /// Lifetime of memoized results, in hours.
    pub cache_ttl_hours: i64,
    pub thresholds: ThresholdConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            category: "person".to_string(),
            hour_window: HourWindow::default(),
            middle: MiddleStrategy::default(),
            levels: DEFAULT_LEVELS,
            coverage: DEFAULT_COVERAGE,
            cache_ttl_hours: DEFAULT_TTL_HOURS,
            thresholds: ThresholdConfig::default(),
        }
    }
}

fn levels_over_defaults<'de, D>(deserializer: D) -> Result<GranularityTable<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(GranularityOverrides::deserialize(deserializer)?.overlay(DEFAULT_LEVELS))
}

fn coverage_over_defaults<'de, D>(
    deserializer: D,
) -> Result<GranularityTable<CoveragePolicy>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(GranularityOverrides::deserialize(deserializer)?.overlay(DEFAULT_COVERAGE))
}

impl EngineConfig {
    /// Loads the configuration from a JSON file at `path`.
    pub fn load(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| EngineError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&content).map_err(|source| EngineError::ConfigParse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn from_json(content: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }

    pub fn levels_for(&self, granularity: Granularity) -> u8 {
        *self.levels.get(granularity)
    }

    pub fn coverage_for(&self, granularity: Granularity) -> &CoveragePolicy {
        self.coverage.get(granularity)
    }

    /// Lifetime of memoized results. Out-of-range values fall back to the
    /// default; [`EngineConfig::validate`] reports them.
    pub fn cache_ttl(&self) -> TimeDelta {
        TimeDelta::try_hours(self.cache_ttl_hours)
            .filter(|ttl| *ttl > TimeDelta::zero())
            .unwrap_or(TimeDelta::hours(DEFAULT_TTL_HOURS))
    }

    /// Checks settings that would otherwise surface mid-request.
    pub fn validate(&self) -> EngineResult<()> {
        self.hour_window.validate()?;
        if self.cache_ttl_hours <= 0 || TimeDelta::try_hours(self.cache_ttl_hours).is_none() {
            return Err(EngineError::InvalidCacheTtl(self.cache_ttl_hours));
        }
        for granularity in Granularity::ALL {
            let got = self.levels_for(granularity);
            if got < MIN_LEVEL_COUNT {
                return Err(EngineError::InvalidLevelCount {
                    min: MIN_LEVEL_COUNT,
                    got,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object_is_default() {
        let config = EngineConfig::from_json("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_hour_window_bounds() {
        assert_eq!(HourWindow::FullDay.len(), 24);
        assert_eq!(HourWindow::Daytime.len(), 16);
        assert!(HourWindow::Daytime.contains(7));
        assert!(HourWindow::Daytime.contains(22));
        assert!(!HourWindow::Daytime.contains(23));
        assert_eq!(HourWindow::Daytime.hours().count(), 16);
    }

    #[test]
    fn test_partial_override() {
        let config = EngineConfig::from_json(
            r#"{"category": "car", "hour_window": "daytime", "middle": "mean"}"#,
        )
        .unwrap();
        assert_eq!(config.category, "car");
        assert_eq!(config.hour_window, HourWindow::Daytime);
        assert_eq!(config.middle, MiddleStrategy::Mean);
        assert_eq!(config.levels_for(Granularity::Week), 20);
    }

    #[test]
    fn test_partial_levels_and_coverage_keep_defaults() {
        let config = EngineConfig::from_json(
            r#"{"levels": {"week": 12}, "coverage": {"month": {"min_ratio": 0.9}}}"#,
        )
        .unwrap();

        assert_eq!(config.levels_for(Granularity::Week), 12);
        assert_eq!(config.levels_for(Granularity::Hour), 10);
        assert_eq!(config.levels_for(Granularity::Year), 20);

        assert_eq!(config.coverage_for(Granularity::Month).min_ratio, 0.9);
        assert_eq!(config.coverage_for(Granularity::Month).min_observed, None);
        assert_eq!(config.coverage_for(Granularity::Week), &DEFAULT_COVERAGE.week);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_cache_ttl() {
        let config = EngineConfig::from_json(r#"{"cache_ttl_hours": 6}"#).unwrap();
        assert_eq!(config.cache_ttl(), TimeDelta::hours(6));
        assert_eq!(EngineConfig::default().cache_ttl(), TimeDelta::hours(24));

        for bad in [0, -3, i64::MAX] {
            let config = EngineConfig {
                cache_ttl_hours: bad,
                ..EngineConfig::default()
            };
            assert!(matches!(
                config.validate(),
                Err(EngineError::InvalidCacheTtl(got)) if got == bad
            ));
        }
    }

    #[test]
    fn test_custom_window_is_validated() {
        let config = EngineConfig::from_json(
            r#"{"hour_window": {"custom": {"first": 20, "last": 8}}}"#,
        )
        .unwrap();
        assert!(matches!(
            config.validate(),
            Err(EngineError::InvalidHourWindow { first: 20, last: 8 })
        ));
    }

    #[test]
    fn test_too_few_levels_is_rejected() {
        let mut config = EngineConfig::default();
        config.levels.day = 2;
        assert!(matches!(
            config.validate(),
            Err(EngineError::InvalidLevelCount { got: 2, .. })
        ));
    }
}
