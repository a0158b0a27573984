use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use clinic_dataset::lags::DEFAULT_LAG_DEPTH;
use clinic_dataset::{PipelineConfig, DEFAULT_TARGET_COLUMN};

/// Merge clinic counts, weather and holidays into one training table.
#[derive(Debug, Parser)]
#[command(name = "clinic-dataset", version)]
struct Args {
    /// Clinic series CSV with `date` and the target column.
    ///
    /// Dates may be YYYY-MM-DD, YYYY/MM/DD, YYYYMMDD or M/D/YYYY, optionally
    /// followed by a time of day; RFC 3339 timestamps are accepted too.
    #[arg(long, default_value = "data/DailyCount/DailyCount.csv")]
    clinic: PathBuf,

    /// Folder of weather JSON documents (or a single file).
    #[arg(long, default_value = "data/Weather")]
    weather: PathBuf,

    /// Folder of holiday JSON documents (or a single file).
    #[arg(long, default_value = "data/Holiday")]
    holidays: PathBuf,

    /// Output path; `.parquet` writes Parquet, anything else CSV.
    #[arg(short, long, default_value = "dataset.csv")]
    output: PathBuf,

    /// Number of lag columns of the target.
    #[arg(long, default_value_t = DEFAULT_LAG_DEPTH)]
    lags: usize,

    #[arg(long, default_value = DEFAULT_TARGET_COLUMN)]
    target: String,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "clinic_dataset=info".into()),
        )
        .init();

    let args = Args::parse();
    let config = PipelineConfig::new(args.clinic, args.weather, args.holidays, args.output)
        .with_lag_depth(args.lags)
        .with_target_column(args.target);

    let output = clinic_dataset::run(&config)
        .with_context(|| format!("failed to build dataset {}", config.output_path.display()))?;

    info!(
        weekdays = ?output.domain.weekdays,
        holidays = ?output.domain.holidays,
        "categorical domain"
    );
    for (column, failures) in output.coercion.iter() {
        warn!(column, failures, "coerced to missing");
    }
    println!("Wrote {} rows to {}", output.frame.height(), config.output_path.display());
    Ok(())
}
