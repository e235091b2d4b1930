//! Congestion scoring for hourly people-counter data.
//!
//! Raw readings are rolled up into hour/day/week/month/year buckets, filtered
//! by data coverage, and mapped onto discrete congestion levels using
//! per-location thresholds plus a data-driven midpoint. The leveled buckets
//! feed calendar grids, weekday heat maps and highlight overlays.

pub mod analyzers;
pub mod cache;
pub mod calendar;
pub mod config;
pub mod error;
pub mod highlight;
pub mod output;
pub mod readings;
pub mod thresholds;

pub use analyzers::analyzer::{CongestionEngine, rollup_rows};
pub use config::EngineConfig;
pub use error::{EngineError, EngineResult};
pub use thresholds::{Granularity, ThresholdRegistry};
