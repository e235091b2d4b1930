//! Error types for the congestion engine.

use chrono::NaiveDateTime;

use crate::thresholds::Granularity;

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Contract violations and configuration failures.
///
/// Missing location thresholds, degenerate threshold pairs, low coverage and
/// empty input are not errors; they are handled where they occur.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(
        "reading #{index} ({location} @ {timestamp}, {category}/{direction}) has negative count {count}"
    )]
    NegativeCount {
        index: usize,
        location: String,
        timestamp: NaiveDateTime,
        category: String,
        direction: String,
        count: i64,
    },

    #[error("reading #{index} ({location}) timestamp {timestamp} is not aligned to the hour")]
    MisalignedTimestamp {
        index: usize,
        location: String,
        timestamp: NaiveDateTime,
    },

    #[error(
        "reading #{index} duplicates reading #{first} ({location} @ {timestamp}, {category}/{direction})"
    )]
    DuplicateReading {
        index: usize,
        first: usize,
        location: String,
        timestamp: NaiveDateTime,
        category: String,
        direction: String,
    },

    #[error("reading #{index} belongs to location {found:?}, expected {expected:?}")]
    ForeignLocation {
        index: usize,
        expected: String,
        found: String,
    },

    #[error("reading #{index} has malformed timestamp {value:?}")]
    MalformedTimestamp { index: usize, value: String },

    #[error("level count must be at least {min}, got {got}")]
    InvalidLevelCount { min: u8, got: u8 },

    #[error("invalid thresholds for {location}/{granularity}: min={min}, max={max}")]
    InvalidThresholds {
        location: String,
        granularity: Granularity,
        min: f64,
        max: f64,
    },

    #[error("bin bounds must be finite and non-negative: min={min}, max={max}")]
    InvalidBinBounds { min: f64, max: f64 },

    #[error("invalid calendar month {year}-{month:02}")]
    InvalidMonth { year: i32, month: u32 },

    #[error("invalid hour window {first}..={last}")]
    InvalidHourWindow { first: u32, last: u32 },

    #[error("cache TTL must be a positive number of hours, got {0}")]
    InvalidCacheTtl(i64),

    #[error("invalid date range {from}..={to}")]
    InvalidDateRange {
        from: chrono::NaiveDate,
        to: chrono::NaiveDate,
    },

    #[error("unknown granularity {0:?}")]
    UnknownGranularity(String),

    #[error("unknown highlight purpose {0:?}")]
    UnknownPurpose(String),

    #[error("I/O error on {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration {path}")]
    ConfigParse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to read readings CSV {path}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },

    #[error("failed to write CSV {path}")]
    CsvWrite {
        path: String,
        #[source]
        source: csv::Error,
    },

    #[error("failed to serialize output")]
    Json(#[from] serde_json::Error),
}
