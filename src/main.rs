//! CLI entry point for the congestion rater.
//!
//! Loads a readings CSV for one location and prints rollups, calendar
//! grids, date-by-hour grids, weekday heat maps or the level scale as JSON.

use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use congestion_rater::analyzers::analyzer::CalendarOptions;
use congestion_rater::analyzers::coverage::filter_coverage;
use congestion_rater::analyzers::types::RollupRow;
use congestion_rater::calendar::WeekStart;
use congestion_rater::highlight::{ExtremalSelector, Purpose};
use congestion_rater::output::{append_rows, print_json};
use congestion_rater::readings::{RawReading, load_csv};
use congestion_rater::{CongestionEngine, EngineConfig, Granularity};
use tracing::info;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "congestion_rater")]
#[command(about = "Score people-counter readings into congestion levels", long_about = None)]
struct Cli {
    /// Engine configuration (JSON). Falls back to CONGESTION_CONFIG, then defaults
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Roll readings up into leveled buckets
    Rollup {
        /// Location id the readings belong to
        #[arg(short, long)]
        location: String,

        /// Readings CSV
        #[arg(value_name = "FILE")]
        readings: PathBuf,

        /// hour, day, week, month or year
        #[arg(short, long, default_value = "day")]
        granularity: Granularity,

        /// Highlight preset (e.g. "cal_cog", "wti_count")
        #[arg(short, long)]
        purpose: Option<String>,

        /// Optional: CSV file to append rows to instead of printing JSON
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Lay out one month as a calendar grid
    Calendar {
        #[arg(short, long)]
        location: String,

        #[arg(value_name = "FILE")]
        readings: PathBuf,

        #[arg(short, long)]
        year: i32,

        #[arg(short, long)]
        month: u32,

        /// Highlight preset (e.g. "cal_holiday")
        #[arg(short, long)]
        purpose: Option<String>,

        /// Start weeks on Monday instead of Sunday
        #[arg(long, default_value_t = false)]
        monday_first: bool,
    },
    /// Lay out one month as a date-by-hour grid
    Grid {
        #[arg(short, long)]
        location: String,

        #[arg(value_name = "FILE")]
        readings: PathBuf,

        #[arg(short, long)]
        year: i32,

        #[arg(short, long)]
        month: u32,

        /// Highlight preset (e.g. "dti_open_hour", "wti_cog")
        #[arg(short, long)]
        purpose: Option<String>,
    },
    /// Weekday-by-hour heat map over a date range
    Profile {
        #[arg(short, long)]
        location: String,

        #[arg(value_name = "FILE")]
        readings: PathBuf,

        /// First day, inclusive (YYYY-MM-DD)
        #[arg(long)]
        from: NaiveDate,

        /// Last day, inclusive (YYYY-MM-DD)
        #[arg(long)]
        to: NaiveDate,
    },
    /// Print the level boundaries for a location
    Bins {
        #[arg(short, long)]
        location: String,

        #[arg(value_name = "FILE")]
        readings: PathBuf,

        #[arg(short, long, default_value = "day")]
        granularity: Granularity,
    },
    /// List configured locations with their resolved thresholds
    Locations,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path = std::env::var("LOG_FILE_PATH")
        .unwrap_or_else(|_| "logs/congestion_rater.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("congestion_rater.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();
    let engine = CongestionEngine::new(load_config(cli.config)?)
        .context("Invalid engine configuration")?;

    match cli.command {
        Commands::Rollup {
            location,
            readings,
            granularity,
            purpose,
            output,
        } => {
            let readings = load_readings(&readings, &location)?;
            let selector = purpose.as_deref().map(selector_for).transpose()?;
            let rows = engine.rollup_rows(&location, &readings, granularity, selector.as_ref())?;
            log_highlights(&rows);

            match output {
                Some(path) => {
                    append_rows(&path, &rows)
                        .with_context(|| format!("Failed to append rows to {path}"))?;
                    info!(path = %path, rows = rows.len(), "Rows written");
                }
                None => print_json(&rows)?,
            }
        }
        Commands::Calendar {
            location,
            readings,
            year,
            month,
            purpose,
            monday_first,
        } => {
            let readings = load_readings(&readings, &location)?;
            let options = CalendarOptions {
                week_start: if monday_first {
                    WeekStart::Monday
                } else {
                    WeekStart::Sunday
                },
                highlight: purpose.as_deref().map(selector_for).transpose()?,
                ..CalendarOptions::default()
            };
            let calendar = engine.calendar(&location, &readings, year, month, &options)?;
            print_json(&calendar)?;
        }
        Commands::Grid {
            location,
            readings,
            year,
            month,
            purpose,
        } => {
            let readings = load_readings(&readings, &location)?;
            let selector = purpose.as_deref().map(selector_for).transpose()?;
            let grid = engine.date_hour_grid(&location, &readings, year, month, selector.as_ref())?;
            for row in &grid.rows {
                for cell in &row.hours {
                    if let Some(reason) = cell.highlight_reason {
                        info!(
                            date = %row.date,
                            hour = cell.hour,
                            level = cell.level,
                            reason = reason.describe(),
                            "Highlighted"
                        );
                    }
                }
            }
            print_json(&grid)?;
        }
        Commands::Profile {
            location,
            readings,
            from,
            to,
        } => {
            let readings = load_readings(&readings, &location)?;
            let profile = engine.weekday_profile(&location, &readings, from, to)?;
            print_json(&profile)?;
        }
        Commands::Bins {
            location,
            readings,
            granularity,
        } => {
            let readings = load_readings(&readings, &location)?;
            let aggregates = filter_coverage(
                engine.aggregator().aggregate(&location, &readings, granularity)?,
                engine.config().coverage_for(granularity),
            );
            let bins = engine.bins_for(&location, granularity, &aggregates)?;
            print_json(&bins)?;
        }
        Commands::Locations => {
            let registry = engine.registry();
            let mut tables = BTreeMap::new();
            tables.insert("default".to_string(), registry.default_table());
            for location in registry.locations() {
                tables.insert(location.to_string(), registry.table_for(location));
            }
            info!(locations = tables.len() - 1, "Configured locations");
            print_json(&tables)?;
        }
    }

    Ok(())
}

fn load_config(path: Option<PathBuf>) -> Result<EngineConfig> {
    let path = path.or_else(|| std::env::var_os("CONGESTION_CONFIG").map(PathBuf::from));
    match path {
        Some(path) => {
            info!(path = %path.display(), "Loading configuration");
            EngineConfig::load(&path)
                .with_context(|| format!("Failed to load configuration {}", path.display()))
        }
        None => {
            info!("No configuration given, using defaults");
            Ok(EngineConfig::default())
        }
    }
}

fn load_readings(path: &Path, location: &str) -> Result<Vec<RawReading>> {
    let readings = load_csv(path, location)
        .with_context(|| format!("Failed to load readings from {}", path.display()))?;
    info!(location, readings = readings.len(), "Readings loaded");
    Ok(readings)
}

fn selector_for(name: &str) -> Result<ExtremalSelector> {
    let (purpose, metric) = Purpose::from_preset(name)?;
    Ok(ExtremalSelector::new(purpose).with_metric(metric))
}

fn log_highlights(rows: &[RollupRow]) {
    for row in rows {
        if let Some(reason) = row.highlight_reason {
            info!(
                period = %row.period_label,
                level = row.level,
                reason = reason.describe(),
                "Highlighted"
            );
        }
    }
}
