//! Barsync Runner — configuration and the fetch and check jobs.
//!
//! This crate builds on `barsync-core` to provide:
//! - TOML configuration for both jobs, with the stock series as defaults
//! - The fetch job: provider -> merge -> per-series outcome -> run log
//! - The append-only run log
//! - The check job: quality checks over bar files -> quality report

pub mod check_job;
pub mod config;
pub mod fetch_job;
pub mod run_log;

pub use check_job::{run_check, run_check_at, CheckSummary};
pub use config::{
    CheckConfig, CheckTarget, ConfigError, CredentialsConfig, FetchConfig, ProviderKind,
    SeriesConfig,
};
pub use fetch_job::{build_provider, run_fetch, FetchSummary, SeriesOutcome, SeriesResult};
pub use run_log::{LogLevel, RunLog};
