//! Sampling cadence of a bar series.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
#[error("unknown interval '{0}' (expected one of: 1m 3m 5m 15m 30m 45m 1h 2h 3h 4h 1d 1w 1mo)")]
pub struct IntervalParseError(pub String);

/// Bar interval as understood by the chart providers.
///
/// Serialized as its short label (`"1m"`, `"4h"`, `"1d"`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Interval {
    Min1,
    Min3,
    Min5,
    Min15,
    Min30,
    Min45,
    Hour1,
    Hour2,
    Hour3,
    Hour4,
    Daily,
    Weekly,
    Monthly,
}

impl Interval {
    pub const ALL: [Interval; 13] = [
        Interval::Min1,
        Interval::Min3,
        Interval::Min5,
        Interval::Min15,
        Interval::Min30,
        Interval::Min45,
        Interval::Hour1,
        Interval::Hour2,
        Interval::Hour3,
        Interval::Hour4,
        Interval::Daily,
        Interval::Weekly,
        Interval::Monthly,
    ];

    /// Short label used in config files and reports.
    pub fn label(self) -> &'static str {
        match self {
            Interval::Min1 => "1m",
            Interval::Min3 => "3m",
            Interval::Min5 => "5m",
            Interval::Min15 => "15m",
            Interval::Min30 => "30m",
            Interval::Min45 => "45m",
            Interval::Hour1 => "1h",
            Interval::Hour2 => "2h",
            Interval::Hour3 => "3h",
            Interval::Hour4 => "4h",
            Interval::Daily => "1d",
            Interval::Weekly => "1w",
            Interval::Monthly => "1mo",
        }
    }

    /// Resolution code sent to the TradingView chart session.
    pub fn tv_code(self) -> &'static str {
        match self {
            Interval::Min1 => "1",
            Interval::Min3 => "3",
            Interval::Min5 => "5",
            Interval::Min15 => "15",
            Interval::Min30 => "30",
            Interval::Min45 => "45",
            Interval::Hour1 => "1H",
            Interval::Hour2 => "2H",
            Interval::Hour3 => "3H",
            Interval::Hour4 => "4H",
            Interval::Daily => "1D",
            Interval::Weekly => "1W",
            Interval::Monthly => "1M",
        }
    }

    /// Name used for the series folder on disk (`NQ1!_in_1_minute`).
    pub fn folder_name(self) -> &'static str {
        match self {
            Interval::Min1 => "in_1_minute",
            Interval::Min3 => "in_3_minute",
            Interval::Min5 => "in_5_minute",
            Interval::Min15 => "in_15_minute",
            Interval::Min30 => "in_30_minute",
            Interval::Min45 => "in_45_minute",
            Interval::Hour1 => "in_1_hour",
            Interval::Hour2 => "in_2_hour",
            Interval::Hour3 => "in_3_hour",
            Interval::Hour4 => "in_4_hour",
            Interval::Daily => "in_daily",
            Interval::Weekly => "in_weekly",
            Interval::Monthly => "in_monthly",
        }
    }

    /// Nominal bar spacing. Monthly bars have no fixed length.
    pub fn duration(self) -> Option<Duration> {
        let minutes = match self {
            Interval::Min1 => 1,
            Interval::Min3 => 3,
            Interval::Min5 => 5,
            Interval::Min15 => 15,
            Interval::Min30 => 30,
            Interval::Min45 => 45,
            Interval::Hour1 => 60,
            Interval::Hour2 => 120,
            Interval::Hour3 => 180,
            Interval::Hour4 => 240,
            Interval::Daily => 60 * 24,
            Interval::Weekly => 60 * 24 * 7,
            Interval::Monthly => return None,
        };
        Some(Duration::minutes(minutes))
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Interval {
    type Err = IntervalParseError;

    /// Accepts the short label, the folder name, or the provider code.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Interval::ALL
            .into_iter()
            .find(|i| i.label() == s)
            .or_else(|| Interval::ALL.into_iter().find(|i| i.folder_name() == s))
            .or_else(|| Interval::ALL.into_iter().find(|i| i.tv_code() == s))
            .ok_or_else(|| IntervalParseError(s.to_string()))
    }
}

impl TryFrom<String> for Interval {
    type Error = IntervalParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Interval> for String {
    fn from(value: Interval) -> Self {
        value.label().to_string()
    }
}
