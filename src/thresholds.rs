//! Per-location calibration thresholds.
//!
//! Every location has a `(min, max)` pair per [`Granularity`]. `min` is the
//! boundary between level 1 and level 2, `max` the lower edge of the top
//! level. Pairs grow with the bucket size, so an hourly pair is useless for
//! yearly totals and vice versa.
//!
//! Stored as a JSON object:
//! ```json
//! {
//!   "default": { "hour": [10, 500], "day": [2300, 9500], "week": [16100, 66500],
//!                "month": [69000, 285000], "year": [838500, 3467500] },
//!   "locations": {
//!     "yottekan": { "day": [300, 3500], "week": [2100, 24500] }
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::analyzers::scale::degenerate_max;
use crate::error::{EngineError, EngineResult};

/// Aggregation bucket size.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Hour,
    Day,
    Week,
    Month,
    Year,
}

impl Granularity {
    pub const ALL: [Granularity; 5] = [
        Granularity::Hour,
        Granularity::Day,
        Granularity::Week,
        Granularity::Month,
        Granularity::Year,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Hour => "hour",
            Granularity::Day => "day",
            Granularity::Week => "week",
            Granularity::Month => "month",
            Granularity::Year => "year",
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Granularity::ALL
            .into_iter()
            .find(|g| g.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| EngineError::UnknownGranularity(s.to_string()))
    }
}

/// One value per granularity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GranularityTable<T> {
    pub hour: T,
    pub day: T,
    pub week: T,
    pub month: T,
    pub year: T,
}

impl<T> GranularityTable<T> {
    pub fn get(&self, granularity: Granularity) -> &T {
        match granularity {
            Granularity::Hour => &self.hour,
            Granularity::Day => &self.day,
            Granularity::Week => &self.week,
            Granularity::Month => &self.month,
            Granularity::Year => &self.year,
        }
    }

    fn get_mut(&mut self, granularity: Granularity) -> &mut T {
        match granularity {
            Granularity::Hour => &mut self.hour,
            Granularity::Day => &mut self.day,
            Granularity::Week => &mut self.week,
            Granularity::Month => &mut self.month,
            Granularity::Year => &mut self.year,
        }
    }
}

/// A [`GranularityTable`] as written in configuration, where any
/// granularity may be left out.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct GranularityOverrides<T> {
    pub hour: Option<T>,
    pub day: Option<T>,
    pub week: Option<T>,
    pub month: Option<T>,
    pub year: Option<T>,
}

impl<T> Default for GranularityOverrides<T> {
    fn default() -> Self {
        Self {
            hour: None,
            day: None,
            week: None,
            month: None,
            year: None,
        }
    }
}

impl<T> GranularityOverrides<T> {
    /// Fills the granularities left out with `base`.
    pub fn overlay(self, base: GranularityTable<T>) -> GranularityTable<T> {
        GranularityTable {
            hour: self.hour.unwrap_or(base.hour),
            day: self.day.unwrap_or(base.day),
            week: self.week.unwrap_or(base.week),
            month: self.month.unwrap_or(base.month),
            year: self.year.unwrap_or(base.year),
        }
    }
}

/// A calibrated `(min, max)` pair, written as a two-element JSON array.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "(f64, f64)", into = "(f64, f64)")]
pub struct ThresholdPair {
    pub min: f64,
    pub max: f64,
}

impl ThresholdPair {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Rejects non-finite or negative values and lifts `max` to
    /// `max(min, 1) + 1` when the pair is degenerate.
    fn checked(self, location: &str, granularity: Granularity) -> EngineResult<Self> {
        if !self.min.is_finite() || !self.max.is_finite() || self.min < 0.0 {
            return Err(EngineError::InvalidThresholds {
                location: location.to_string(),
                granularity,
                min: self.min,
                max: self.max,
            });
        }

        let max = degenerate_max(self.min, self.max);
        if max != self.max {
            warn!(
                location,
                %granularity,
                min = self.min,
                max = self.max,
                corrected = max,
                "Degenerate thresholds, raising max above max(min, 1)"
            );
            return Ok(Self::new(self.min, max));
        }

        Ok(self)
    }
}

impl From<(f64, f64)> for ThresholdPair {
    fn from((min, max): (f64, f64)) -> Self {
        Self { min, max }
    }
}

impl From<ThresholdPair> for (f64, f64) {
    fn from(pair: ThresholdPair) -> Self {
        (pair.min, pair.max)
    }
}

/// Fallback pairs used when neither the location nor the configured default
/// names a granularity.
pub const DEFAULT_THRESHOLDS: GranularityTable<ThresholdPair> = GranularityTable {
    hour: ThresholdPair { min: 10.0, max: 500.0 },
    day: ThresholdPair { min: 2300.0, max: 9500.0 },
    week: ThresholdPair { min: 16100.0, max: 66500.0 },
    month: ThresholdPair { min: 69000.0, max: 285000.0 },
    year: ThresholdPair { min: 838500.0, max: 3467500.0 },
};

/// Thresholds for a single location; missing granularities use the default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationThresholds {
    pub hour: Option<ThresholdPair>,
    pub day: Option<ThresholdPair>,
    pub week: Option<ThresholdPair>,
    pub month: Option<ThresholdPair>,
    pub year: Option<ThresholdPair>,
}

impl LocationThresholds {
    fn get(&self, granularity: Granularity) -> Option<ThresholdPair> {
        match granularity {
            Granularity::Hour => self.hour,
            Granularity::Day => self.day,
            Granularity::Week => self.week,
            Granularity::Month => self.month,
            Granularity::Year => self.year,
        }
    }

    fn slot(&mut self, granularity: Granularity) -> &mut Option<ThresholdPair> {
        match granularity {
            Granularity::Hour => &mut self.hour,
            Granularity::Day => &mut self.day,
            Granularity::Week => &mut self.week,
            Granularity::Month => &mut self.month,
            Granularity::Year => &mut self.year,
        }
    }
}

/// Serialized form of the threshold table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    pub default: LocationThresholds,
    pub locations: BTreeMap<String, LocationThresholds>,
}

/// Read-only lookup of calibrated threshold pairs.
#[derive(Debug, Clone)]
pub struct ThresholdRegistry {
    default: GranularityTable<ThresholdPair>,
    locations: BTreeMap<String, LocationThresholds>,
}

impl ThresholdRegistry {
    /// Builds the registry, validating and correcting every pair once so
    /// lookups stay pure.
    pub fn from_config(config: &ThresholdConfig) -> EngineResult<Self> {
        let mut default = DEFAULT_THRESHOLDS;
        for granularity in Granularity::ALL {
            if let Some(pair) = config.default.get(granularity) {
                *default.get_mut(granularity) = pair.checked("default", granularity)?;
            }
        }

        let mut locations = BTreeMap::new();
        for (location, thresholds) in &config.locations {
            let mut checked = thresholds.clone();
            for granularity in Granularity::ALL {
                if let Some(pair) = thresholds.get(granularity) {
                    *checked.slot(granularity) = Some(pair.checked(location, granularity)?);
                }
            }
            locations.insert(location.clone(), checked);
        }

        debug!(locations = locations.len(), "Threshold registry built");
        Ok(Self { default, locations })
    }

    /// Returns the `(min, max)` pair for `location` at `granularity`, falling
    /// back to the default pair when the location is unknown or does not
    /// configure that granularity.
    pub fn lookup(&self, location: &str, granularity: Granularity) -> ThresholdPair {
        self.locations
            .get(location)
            .and_then(|t| t.get(granularity))
            .unwrap_or_else(|| *self.default.get(granularity))
    }

    /// Returns `true` if the location has at least one configured pair.
    pub fn knows(&self, location: &str) -> bool {
        self.locations.contains_key(location)
    }

    /// Iterates over the configured location ids.
    pub fn locations(&self) -> impl Iterator<Item = &str> {
        self.locations.keys().map(String::as_str)
    }

    /// Pairs used for locations without their own.
    pub fn default_table(&self) -> GranularityTable<ThresholdPair> {
        self.default
    }

    /// Every granularity's pair for `location`, defaults filled in.
    pub fn table_for(&self, location: &str) -> GranularityTable<ThresholdPair> {
        GranularityTable {
            hour: self.lookup(location, Granularity::Hour),
            day: self.lookup(location, Granularity::Day),
            week: self.lookup(location, Granularity::Week),
            month: self.lookup(location, Granularity::Month),
            year: self.lookup(location, Granularity::Year),
        }
    }
}

impl Default for ThresholdRegistry {
    fn default() -> Self {
        Self {
            default: DEFAULT_THRESHOLDS,
            locations: BTreeMap::new(),
        }
    }
}
