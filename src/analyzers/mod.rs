//! Reading aggregation and congestion scoring.
//!
//! This module rolls hourly readings up into periods, drops periods with
//! too little data, builds the level scale for each location and
//! granularity, and levels the result.

pub mod aggregate;
pub mod analyzer;
pub mod coverage;
pub mod grid;
pub mod profile;
pub mod scale;
pub mod types;
pub mod utility;
