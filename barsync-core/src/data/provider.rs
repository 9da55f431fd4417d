//! Data provider trait and structured error types.
//!
//! The DataProvider trait abstracts over chart data sources (TradingView,
//! Yahoo Finance) so we can swap implementations and mock for tests.

use crate::domain::{Bar, SeriesSpec};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upper bound on bars per request accepted by the chart providers.
pub const MAX_BARS_PER_REQUEST: usize = 5000;

/// Structured error types for data operations.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("unsupported request: {0}")]
    Unsupported(String),

    #[error("storage error: {0}")]
    StorageError(String),

    #[error("malformed bar file {path}: {reason}")]
    MalformedFile { path: String, reason: String },

    #[error("data error: {0}")]
    Other(String),
}

impl DataError {
    /// True when the failure originated at the provider (nothing was written).
    pub fn is_provider_side(&self) -> bool {
        matches!(
            self,
            DataError::NetworkUnreachable(_)
                | DataError::RateLimited { .. }
                | DataError::ResponseFormatChanged(_)
                | DataError::AuthenticationFailed(_)
                | DataError::SymbolNotFound { .. }
                | DataError::Unsupported(_)
        )
    }
}

/// Result of a fetch for a single series. `bars` may be empty.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub series: SeriesSpec,
    pub bars: Vec<Bar>,
    pub source: DataSource,
}

/// Where the data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataSource {
    TradingView,
    YahooFinance,
    Synthetic,
}

/// Trait for chart data providers.
///
/// Implementations handle the specifics of talking to one vendor. The
/// storage layer sits above this trait; providers don't know about files.
pub trait DataProvider {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    /// Fetch up to `n_bars` of the most recent bars for a series, oldest first.
    ///
    /// An empty `bars` vector means the provider had nothing to return.
    fn fetch(&self, series: &SeriesSpec, n_bars: usize) -> Result<FetchResult, DataError>;
}

/// Progress callback for multi-series fetch runs.
pub trait FetchProgress {
    /// Called when starting to fetch a series.
    fn on_start(&self, series: &SeriesSpec, index: usize, total: usize);

    /// Called when a series has been fetched and stored (or skipped).
    fn on_complete(&self, series: &SeriesSpec, index: usize, total: usize, summary: &str);

    /// Called when the entire batch is done.
    fn on_batch_complete(&self, updated: usize, skipped: usize, failed: usize, total: usize);
}

/// Progress reporter that emits tracing events.
pub struct TracingProgress;

impl FetchProgress for TracingProgress {
    fn on_start(&self, series: &SeriesSpec, index: usize, total: usize) {
        tracing::info!(series = %series, "[{}/{}] fetching", index + 1, total);
    }

    fn on_complete(&self, series: &SeriesSpec, _index: usize, _total: usize, summary: &str) {
        tracing::info!(series = %series, "{summary}");
    }

    fn on_batch_complete(&self, updated: usize, skipped: usize, failed: usize, total: usize) {
        tracing::info!(
            updated,
            skipped,
            failed,
            total,
            "fetch run complete: {updated}/{total} updated"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_side_classification() {
        assert!(DataError::NetworkUnreachable("timeout".into()).is_provider_side());
        assert!(DataError::SymbolNotFound { symbol: "XX".into() }.is_provider_side());
        assert!(!DataError::StorageError("disk full".into()).is_provider_side());
        assert!(!DataError::MalformedFile {
            path: "a.csv".into(),
            reason: "bad".into()
        }
        .is_provider_side());
    }
}
