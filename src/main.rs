//! CLI entry point for the AQHI snapshot builder.
//!
//! Provides subcommands for building the pollutant payload from a directory
//! of raw sensor partitions and for listing the sensors found there.

use anyhow::{Context, Result, anyhow};
use aqhi_snapshot::{
    config::Config,
    kiosk,
    metadata::MetadataTable,
    output::{Payload, append_record, print_pretty, write_json},
    parser::parse_timestamp,
    pipeline,
    snapshot::SensorStatus,
    source::{DirSource, PartitionSource},
};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    filter::Directive,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "aqhi_snapshot")]
#[command(about = "Builds AQHI snapshots from raw air-quality sensor data", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute the AQHI snapshot and history of every sensor
    Build {
        /// Directory containing raw sensor partitions
        #[arg(short, long, default_value = "data")]
        data_dir: String,

        /// JSON config file (falls back to AQHI_CONFIG)
        #[arg(short, long)]
        config: Option<String>,

        /// File to write the pollutant payload to
        #[arg(short, long, default_value = "pollutant_data.json")]
        output: String,

        /// Optional: also write the kiosk summary to this file
        #[arg(long)]
        kiosk_output: Option<String>,

        /// Optional: CSV file to append per-sensor processing stats to
        #[arg(long)]
        stats_csv: Option<String>,

        /// Optional: sensor metadata CSV (id,name,lat,lon,sensor_number)
        #[arg(short, long)]
        metadata: Option<String>,

        /// Reference instant, e.g. "2025-06-30 14:00" (default: now)
        #[arg(long)]
        as_of: Option<String>,

        /// Maximum number of sensors processed concurrently
        #[arg(short = 'j', long, default_value_t = 8)]
        concurrency: usize,
    },
    /// List the sensors and partitions found in a data directory
    ListSensors {
        /// Directory containing raw sensor partitions
        #[arg(short, long, default_value = "data")]
        data_dir: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/aqhi_snapshot.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("aqhi_snapshot.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse::<Directive>()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(
            EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse::<Directive>()?),
        );

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Build {
            data_dir,
            config,
            output,
            kiosk_output,
            stats_csv,
            metadata,
            as_of,
            concurrency,
        } => {
            build(
                &data_dir,
                config,
                &output,
                kiosk_output.as_deref(),
                stats_csv.as_deref(),
                metadata.as_deref(),
                as_of.as_deref(),
                concurrency,
            )
            .await?;
        }
        Commands::ListSensors { data_dir } => {
            list_sensors(&data_dir)?;
        }
    }

    Ok(())
}

/// Runs the pipeline over `data_dir` and writes the payload files.
#[allow(clippy::too_many_arguments)]
#[tracing::instrument(skip_all, fields(data_dir = %data_dir, output = %output, concurrency = concurrency))]
async fn build(
    data_dir: &str,
    config_path: Option<String>,
    output: &str,
    kiosk_output: Option<&str>,
    stats_csv: Option<&str>,
    metadata_path: Option<&str>,
    as_of: Option<&str>,
    concurrency: usize,
) -> Result<()> {
    let config_path = config_path
        .or_else(|| std::env::var("AQHI_CONFIG").ok())
        .context("no config given, pass --config or set AQHI_CONFIG")?;
    let settings = Config::load(&config_path)?.validate()?;
    info!(
        config = %config_path,
        sources = settings.sources.len(),
        sensors = settings.sensors.len(),
        tz = %settings.tz,
        "Config loaded"
    );

    let as_of = match as_of {
        Some(raw) => parse_timestamp(raw, settings.tz)
            .ok_or_else(|| anyhow!("could not parse --as-of '{raw}'"))?,
        None => Utc::now().with_timezone(&settings.tz),
    };

    let metadata = match metadata_path {
        Some(path) => {
            let table = MetadataTable::load(path)?;
            info!(path, rows = table.len(), "Sensor metadata loaded");
            Some(table)
        }
        None => None,
    };

    let source: Arc<dyn PartitionSource> = Arc::new(DirSource::new(data_dir));
    let mut reports = pipeline::run(source, Arc::new(settings), as_of, concurrency).await?;

    if let Some(table) = &metadata {
        for report in &mut reports {
            table.apply(&mut report.sensor);
        }
    }

    if let Some(path) = stats_csv {
        for report in &reports {
            print_pretty(&report.stats);
            if let Err(e) = append_record(path, &report.stats) {
                error!(path, sensor_id = %report.sensor.id, error = %e, "Failed to write stats");
            }
        }
    }

    let payload = Payload::new(&as_of, &reports);
    write_json(output, &payload)?;

    if let Some(path) = kiosk_output {
        write_json(path, &kiosk::build(&reports))?;
        info!(path, "Kiosk summary written");
    }

    let ok = reports
        .iter()
        .filter(|r| r.snapshot.status == SensorStatus::Ok)
        .count();
    if ok == 0 && !reports.is_empty() {
        warn!("No sensor produced an AQHI value");
    }
    info!(output, sensors = reports.len(), ok, "Payload written");

    Ok(())
}

/// Logs every sensor in `data_dir` with its partition count and date range.
fn list_sensors(data_dir: &str) -> Result<()> {
    let refs = DirSource::new(data_dir).scan()?;

    let mut by_sensor: BTreeMap<String, (usize, NaiveDate, NaiveDate)> = BTreeMap::new();
    for r in &refs {
        let entry = by_sensor
            .entry(r.sensor_id.clone())
            .or_insert((0, r.start, r.end));
        entry.0 += 1;
        entry.1 = entry.1.min(r.start);
        entry.2 = entry.2.max(r.end);
    }

    for (sensor_id, (partitions, first, last)) in &by_sensor {
        info!(
            sensor_id = %sensor_id,
            partitions,
            first = %first,
            last = %last,
            "Sensor"
        );
    }

    info!(
        sensors = by_sensor.len(),
        partitions = refs.len(),
        data_dir,
        "Sensor list summary"
    );
    Ok(())
}
