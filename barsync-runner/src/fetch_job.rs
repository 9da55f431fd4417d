//! Fetch job: pull recent bars for each configured series and merge them
//! into storage.
//!
//! Series are processed one after another in configuration order. Each one
//! ends in a [`SeriesOutcome`]; a skipped or failed series never stops the
//! run. The caller decides what the outcomes mean for the exit status.

use crate::config::{FetchConfig, ProviderKind, SeriesConfig};
use crate::run_log::{LogLevel, RunLog};
use barsync_core::data::{
    DataError, DataProvider, FetchProgress, MergeReport, SeriesStore, TradingViewOptions,
    TradingViewProvider, YahooProvider,
};
use barsync_core::domain::SeriesSpec;
use std::time::Duration;

/// What happened to one series.
#[derive(Debug, Clone, PartialEq)]
pub enum SeriesOutcome {
    /// Bars were fetched and merged.
    Updated { fetched: usize, report: MergeReport },
    /// Nothing was written: the provider returned no bars or failed.
    Skipped { reason: String },
    /// Storage could not take the bars, or the request never reached the
    /// provider. `report` lists any partitions written before the failure.
    Failed { error: String, report: MergeReport },
}

#[derive(Debug, Clone)]
pub struct SeriesResult {
    pub series: SeriesSpec,
    pub folder: String,
    pub outcome: SeriesOutcome,
}

impl SeriesResult {
    /// Run log line for this series.
    pub fn log_line(&self) -> (LogLevel, String) {
        match &self.outcome {
            SeriesOutcome::Updated { fetched, report } => (
                LogLevel::Info,
                format!(
                    "{} -> {}: {fetched} fetched, {} new, {} rows ({})",
                    self.series,
                    self.folder,
                    report.rows_added(),
                    report.rows_total(),
                    self.partition_list(report)
                ),
            ),
            SeriesOutcome::Skipped { reason } => {
                (LogLevel::Warn, format!("{}: skipped, {reason}", self.series))
            }
            SeriesOutcome::Failed { error, report } if report.partitions.is_empty() => {
                (LogLevel::Error, format!("{}: {error}", self.series))
            }
            SeriesOutcome::Failed { error, report } => (
                LogLevel::Error,
                format!(
                    "{}: {error}; written: {}",
                    self.series,
                    self.partition_list(report)
                ),
            ),
        }
    }

    fn partition_list(&self, report: &MergeReport) -> String {
        report
            .partitions
            .iter()
            .map(|p| {
                let name = p
                    .month
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| self.folder.clone());
                format!("{name}: +{}/{}", p.added, p.total)
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Aggregated outcomes of one fetch run.
#[derive(Debug, Clone, Default)]
pub struct FetchSummary {
    pub results: Vec<SeriesResult>,
}

impl FetchSummary {
    pub fn total(&self) -> usize {
        self.results.len()
    }

    pub fn updated(&self) -> usize {
        self.count(|o| matches!(o, SeriesOutcome::Updated { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, SeriesOutcome::Skipped { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, SeriesOutcome::Failed { .. }))
    }

    pub fn has_failures(&self) -> bool {
        self.failed() > 0
    }

    fn count(&self, pred: impl Fn(&SeriesOutcome) -> bool) -> usize {
        self.results.iter().filter(|r| pred(&r.outcome)).count()
    }
}

/// Construct the configured provider. TradingView signs in here when
/// credentials are present.
pub fn build_provider(config: &FetchConfig) -> Result<Box<dyn DataProvider>, DataError> {
    let timeout = Duration::from_secs(config.timeout_secs);
    match config.provider {
        ProviderKind::Tradingview => {
            let credentials = config.credentials.credentials();
            tracing::info!(
                signed_in = credentials.is_some(),
                "connecting to TradingView"
            );
            let options = TradingViewOptions {
                extended_session: config.extended_session,
                timeout,
            };
            Ok(Box::new(TradingViewProvider::new(
                credentials.as_ref(),
                options,
            )?))
        }
        ProviderKind::Yahoo => Ok(Box::new(YahooProvider::new(
            timeout,
            config.extended_session,
        )?)),
    }
}

/// Fetch, merge and log every configured series.
pub fn run_fetch(
    provider: &dyn DataProvider,
    store: &SeriesStore,
    series: &[SeriesConfig],
    n_bars: usize,
    log: &RunLog,
    progress: &dyn FetchProgress,
) -> FetchSummary {
    let total = series.len();
    let mut summary = FetchSummary::default();

    for (i, entry) in series.iter().enumerate() {
        let spec = entry.spec();
        progress.on_start(&spec, i, total);

        let folder = entry.folder();
        let outcome = fetch_one(provider, store, &spec, &folder, n_bars);
        let result = SeriesResult {
            series: spec,
            folder,
            outcome,
        };

        let (level, line) = result.log_line();
        match level {
            LogLevel::Info => tracing::debug!(provider = provider.name(), "{line}"),
            LogLevel::Warn => tracing::warn!(provider = provider.name(), "{line}"),
            LogLevel::Error => tracing::error!(provider = provider.name(), "{line}"),
        }
        log.record(level, &line);
        progress.on_complete(&result.series, i, total, &line);

        summary.results.push(result);
    }

    progress.on_batch_complete(
        summary.updated(),
        summary.skipped(),
        summary.failed(),
        total,
    );
    summary
}

fn fetch_one(
    provider: &dyn DataProvider,
    store: &SeriesStore,
    spec: &SeriesSpec,
    folder: &str,
    n_bars: usize,
) -> SeriesOutcome {
    let fetched = match provider.fetch(spec, n_bars) {
        Ok(result) => result,
        Err(e) if e.is_provider_side() => {
            return SeriesOutcome::Skipped {
                reason: e.to_string(),
            }
        }
        Err(e) => {
            return SeriesOutcome::Failed {
                error: e.to_string(),
                report: MergeReport::default(),
            }
        }
    };

    if fetched.bars.is_empty() {
        return SeriesOutcome::Skipped {
            reason: "provider returned no data".to_string(),
        };
    }

    let report = store.merge(folder, &spec.qualified(), &fetched.bars);
    if report.is_complete() {
        return SeriesOutcome::Updated {
            fetched: fetched.bars.len(),
            report,
        };
    }

    let error = report
        .failures
        .iter()
        .map(|f| f.error.as_str())
        .collect::<Vec<_>>()
        .join("; ");
    SeriesOutcome::Failed { error, report }
}
