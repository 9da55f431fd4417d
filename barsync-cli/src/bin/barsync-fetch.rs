//! barsync-fetch — pull the latest bars for every configured series and
//! merge them into CSV storage.
//!
//! Runs with no arguments using the built-in series list. Failures are
//! written to the run log; the exit status is 0 unless `--strict` is given
//! and something failed.

use anyhow::{Context, Result};
use barsync_cli::{init_logging, load_dotenv};
use barsync_core::data::{MergeReport, SeriesStore, TracingProgress};
use barsync_runner::{
    build_provider, run_fetch, FetchConfig, FetchSummary, LogLevel, RunLog, SeriesOutcome,
};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "barsync-fetch",
    about = "Fetch recent OHLC bars and merge them into per-series CSV files"
)]
struct Cli {
    /// Path to a TOML config file. Defaults to the built-in series list.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log level for barsync crates (overridden by RUST_LOG).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Exit with status 1 when any series failed or the run could not start.
    #[arg(long, default_value_t = false)]
    strict: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);
    load_dotenv();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(err) => {
            let log = RunLog::new(FetchConfig::default().run_log);
            return abort(&cli, &log, &format!("{err:#}"));
        }
    };

    let log = RunLog::new(&config.run_log);
    let provider = match build_provider(&config) {
        Ok(provider) => provider,
        Err(err) => return abort(&cli, &log, &format!("provider unavailable: {err}")),
    };
    tracing::info!(
        provider = provider.name(),
        series = config.series.len(),
        data_dir = %config.data_dir.display(),
        "starting fetch run"
    );

    let store = SeriesStore::new(&config.data_dir, config.partition);
    let summary = run_fetch(
        provider.as_ref(),
        &store,
        &config.series,
        config.effective_n_bars(),
        &log,
        &TracingProgress,
    );
    print_summary(&summary);

    if cli.strict && summary.has_failures() {
        std::process::exit(1);
    }
    Ok(())
}

fn load_config(cli: &Cli) -> Result<FetchConfig> {
    let mut config = match &cli.config {
        Some(path) => FetchConfig::from_file(path)
            .with_context(|| format!("loading fetch config {}", path.display()))?,
        None => FetchConfig::default(),
    };
    config.credentials.apply_env();
    Ok(config)
}

/// Record a run-level failure and stop.
fn abort(cli: &Cli, log: &RunLog, message: &str) -> Result<()> {
    tracing::error!("{message}");
    log.record(LogLevel::Error, message);
    eprintln!("Fetch run aborted: {message}");
    if cli.strict {
        std::process::exit(1);
    }
    Ok(())
}

fn print_partitions(report: &MergeReport) {
    for partition in &report.partitions {
        println!(
            "Updated {} ({} new rows, {} total)",
            partition.path.display(),
            partition.added,
            partition.total
        );
    }
}

fn print_summary(summary: &FetchSummary) {
    for result in &summary.results {
        match &result.outcome {
            SeriesOutcome::Updated { report, .. } => print_partitions(report),
            SeriesOutcome::Skipped { reason } => {
                println!("No data for {}: {reason}", result.series)
            }
            SeriesOutcome::Failed { error, report } => {
                print_partitions(report);
                for failure in &report.failures {
                    eprintln!("Not updated {}", failure.path.display());
                }
                eprintln!("Failed {}: {error}", result.series)
            }
        }
    }
    println!(
        "{} updated, {} skipped, {} failed of {} series",
        summary.updated(),
        summary.skipped(),
        summary.failed(),
        summary.total()
    );
}
