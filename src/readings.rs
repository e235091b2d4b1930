//! Raw counter readings and their contract checks.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{EngineError, EngineResult};

/// One hourly count for a location, category and direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawReading {
    pub location_id: String,
    pub timestamp: NaiveDateTime,
    pub category: String,
    pub direction: String,
    pub count: i64,
}

impl RawReading {
    pub fn new(
        location_id: &str,
        timestamp: NaiveDateTime,
        category: &str,
        direction: &str,
        count: i64,
    ) -> Self {
        Self {
            location_id: location_id.to_string(),
            timestamp,
            category: category.to_string(),
            direction: direction.to_string(),
            count,
        }
    }

    pub fn date(&self) -> NaiveDate {
        self.timestamp.date()
    }

    pub fn hour(&self) -> u32 {
        self.timestamp.hour()
    }
}

/// Checks the input contract for `location`: every reading belongs to it,
/// counts are non-negative, timestamps sit on the hour, and each
/// `(timestamp, category, direction)` appears once.
///
/// The first offending record is reported; nothing is repaired.
pub fn validate_readings(location: &str, readings: &[RawReading]) -> EngineResult<()> {
    let mut seen: HashMap<(NaiveDateTime, &str, &str), usize> =
        HashMap::with_capacity(readings.len());

    for (index, r) in readings.iter().enumerate() {
        if r.location_id != location {
            return Err(EngineError::ForeignLocation {
                index,
                expected: location.to_string(),
                found: r.location_id.clone(),
            });
        }

        if r.count < 0 {
            return Err(EngineError::NegativeCount {
                index,
                location: r.location_id.clone(),
                timestamp: r.timestamp,
                category: r.category.clone(),
                direction: r.direction.clone(),
                count: r.count,
            });
        }

        if r.timestamp.minute() != 0 || r.timestamp.second() != 0 || r.timestamp.nanosecond() != 0
        {
            return Err(EngineError::MisalignedTimestamp {
                index,
                location: r.location_id.clone(),
                timestamp: r.timestamp,
            });
        }

        let key = (r.timestamp, r.category.as_str(), r.direction.as_str());
        if let Some(&first) = seen.get(&key) {
            return Err(EngineError::DuplicateReading {
                index,
                first,
                location: r.location_id.clone(),
                timestamp: r.timestamp,
                category: r.category.clone(),
                direction: r.direction.clone(),
            });
        }
        seen.insert(key, index);
    }

    Ok(())
}

/// A row of a counter export. Column names of the device exports
/// (`datetime_jst`, `name`, `count_1_hour`) are accepted as aliases.
#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(alias = "datetime_jst")]
    timestamp: String,
    #[serde(alias = "name")]
    category: String,
    #[serde(default)]
    direction: String,
    #[serde(alias = "count_1_hour")]
    count: i64,
}

const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

fn parse_timestamp(index: usize, value: &str) -> EngineResult<NaiveDateTime> {
    let trimmed = value.trim();
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
        .ok_or_else(|| EngineError::MalformedTimestamp {
            index,
            value: value.to_string(),
        })
}

/// Reads readings for `location` from CSV with a header row.
pub fn read_csv<R: Read>(reader: R, location: &str) -> EngineResult<Vec<RawReading>> {
    read_rows(reader, location, "<reader>")
}

/// Loads a readings CSV from disk. The location id is taken from the caller,
/// not from the file.
pub fn load_csv(path: impl AsRef<Path>, location: &str) -> EngineResult<Vec<RawReading>> {
    let path = path.as_ref();
    let file = std::fs::File::open(path).map_err(|source| EngineError::Io {
        path: path.display().to_string(),
        source,
    })?;

    let rows = read_rows(file, location, &path.display().to_string())?;

    debug!(path = %path.display(), rows = rows.len(), "Readings loaded");
    Ok(rows)
}

fn read_rows<R: Read>(reader: R, location: &str, source: &str) -> EngineResult<Vec<RawReading>> {
    let mut rdr = csv::Reader::from_reader(reader);
    let mut rows = Vec::new();

    for (index, result) in rdr.deserialize().enumerate() {
        let row: CsvRow = result.map_err(|e| EngineError::Csv {
            path: source.to_string(),
            source: e,
        })?;
        rows.push(RawReading {
            location_id: location.to_string(),
            timestamp: parse_timestamp(index, &row.timestamp)?,
            category: row.category,
            direction: row.direction,
            count: row.count,
        });
    }

    Ok(rows)
}
