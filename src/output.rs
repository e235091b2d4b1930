//! Output formatting and persistence for computed views.
//!
//! Supports JSON serialization of any view and CSV append of rollup rows.

use std::fs::{self, OpenOptions};
use std::io::Write;

use csv::WriterBuilder;
use serde::Serialize;
use tracing::debug;

use crate::analyzers::types::RollupRow;
use crate::error::{EngineError, EngineResult};

/// Writes `value` as pretty-printed JSON followed by a newline.
pub fn write_json<W: Write, T: Serialize>(mut writer: W, value: &T) -> EngineResult<()> {
    serde_json::to_writer_pretty(&mut writer, value)?;
    writeln!(writer).map_err(|source| EngineError::Io {
        path: "<output>".to_string(),
        source,
    })
}

/// Prints `value` as pretty-printed JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) -> EngineResult<()> {
    write_json(std::io::stdout().lock(), value)
}

/// Appends rollup rows to a CSV file.
///
/// Writes the header when the file is missing or empty. An empty `rows`
/// leaves the file untouched.
pub fn append_rows(path: &str, rows: &[RollupRow]) -> EngineResult<()> {
    if rows.is_empty() {
        debug!(path, "No rows to append");
        return Ok(());
    }

    let has_content = fs::metadata(path).is_ok_and(|m| m.len() > 0);
    debug!(path, has_content, rows = rows.len(), "Appending CSV rows");

    let file = OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .map_err(|source| EngineError::Io {
            path: path.to_string(),
            source,
        })?;

    let csv_error = |source| EngineError::CsvWrite {
        path: path.to_string(),
        source,
    };

    let mut writer = WriterBuilder::new()
        .has_headers(!has_content)
        .from_writer(file);

    for row in rows {
        writer.serialize(row).map_err(csv_error)?;
    }
    writer.flush().map_err(|source| EngineError::Io {
        path: path.to_string(),
        source,
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::highlight::ReasonCode;
    use std::env;
    use std::path::Path;

    fn temp_path(name: &str) -> String {
        format!("{}/{}", env::temp_dir().display(), name)
    }

    fn row(label: &str, reason: Option<ReasonCode>) -> RollupRow {
        RollupRow {
            period_label: label.to_string(),
            total_count: 1200,
            level: 4,
            coverage_ratio: 1.0,
            highlighted: reason.is_some(),
            highlight_reason: reason,
        }
    }

    #[test]
    fn test_write_json() {
        let mut buf = Vec::new();
        write_json(&mut buf, &row("2025-06-01", Some(ReasonCode::Lowest))).unwrap();

        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("\"period_label\": \"2025-06-01\""));
        assert!(text.contains("\"highlight_reason\": \"lowest\""));
        assert!(text.ends_with('\n'));
    }

    #[test]
    fn test_append_rows_creates_file() {
        let path = temp_path("congestion_rater_test_create.csv");
        let _ = fs::remove_file(&path);

        append_rows(&path, &[row("2025-06-01", None)]).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("period_label,"));
        assert!(content.contains("2025-06-01,1200,4"));

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_append_rows_writes_header_once() {
        let path = temp_path("congestion_rater_test_header.csv");
        let _ = fs::remove_file(&path);

        append_rows(&path, &[row("2025-06-01", None)]).unwrap();
        append_rows(&path, &[row("2025-06-02", Some(ReasonCode::Highest))]).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let header_count = content.lines().filter(|l| l.contains("period_label")).count();
        assert_eq!(header_count, 1);
        assert_eq!(content.lines().count(), 3);

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_append_no_rows_then_rows_keeps_header() {
        let path = temp_path("congestion_rater_test_empty_first.csv");
        let _ = fs::remove_file(&path);

        append_rows(&path, &[]).unwrap();
        assert!(!Path::new(&path).exists());

        append_rows(&path, &[row("2025-06-01", None)]).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("period_label,"));
        assert_eq!(content.lines().count(), 2);

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_append_to_empty_file_writes_header() {
        let path = temp_path("congestion_rater_test_zero_length.csv");
        fs::write(&path, "").unwrap();

        append_rows(&path, &[row("2025-06-01", None)]).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("period_label,"));

        fs::remove_file(&path).unwrap();
    }
}
