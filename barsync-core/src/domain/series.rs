//! Identity of a bar series: symbol, exchange and interval.

use super::Interval;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One configured (symbol, exchange, interval) triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SeriesSpec {
    pub symbol: String,
    pub exchange: String,
    pub interval: Interval,
    /// Futures contract number, appended as `<symbol><n>!` (e.g. `NQ` + 1).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract: Option<u32>,
}

impl SeriesSpec {
    pub fn new(symbol: impl Into<String>, exchange: impl Into<String>, interval: Interval) -> Self {
        Self {
            symbol: symbol.into(),
            exchange: exchange.into(),
            interval,
            contract: None,
        }
    }

    /// Ticker including the continuous-contract suffix, if any.
    pub fn ticker(&self) -> String {
        match self.contract {
            Some(n) => format!("{}{n}!", self.symbol),
            None => self.symbol.clone(),
        }
    }

    /// `EXCHANGE:TICKER`, the form written into the `symbol` column.
    pub fn qualified(&self) -> String {
        if self.exchange.is_empty() {
            self.ticker()
        } else {
            format!("{}:{}", self.exchange, self.ticker())
        }
    }

    /// Default storage folder: `<TICKER>_<interval folder name>`.
    pub fn default_folder(&self) -> String {
        format!(
            "{}_{}",
            sanitize_path_component(&self.ticker()),
            self.interval.folder_name()
        )
    }
}

impl fmt::Display for SeriesSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.qualified(), self.interval)
    }
}

/// Replace characters that cannot appear in a file name on common platforms.
pub fn sanitize_path_component(raw: &str) -> String {
    raw.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c => c,
        })
        .collect()
}
