//! barsync-check — run quality checks over stored bar files and append the
//! results to the quality report.

use anyhow::{Context, Result};
use barsync_cli::{init_logging, load_dotenv};
use barsync_runner::{run_check, CheckConfig};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "barsync-check",
    about = "Check bar files for gaps, duplicates and inconsistent prices"
)]
struct Cli {
    /// Path to a TOML config file. Without one, every CSV under ./data is checked.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log level for barsync crates (overridden by RUST_LOG).
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);
    load_dotenv();

    let config = match &cli.config {
        Some(path) => CheckConfig::from_file(path)
            .with_context(|| format!("loading check config {}", path.display()))?,
        None => CheckConfig::default(),
    };

    let summary = run_check(&config)?;

    println!(
        "Quality check done: {} checked, {} not found, {} unreadable. Results saved to {}",
        summary.checked(),
        summary.not_found(),
        summary.errors(),
        config.report.display()
    );
    Ok(())
}
