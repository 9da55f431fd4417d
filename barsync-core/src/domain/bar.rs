//! Bar — the fundamental market data unit.

use chrono::{Datelike, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// OHLC(V) bar for a single symbol over one interval.
///
/// Timestamps are naive UTC and mark the bar open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: Option<f64>,
}

impl Bar {
    /// Returns true if any OHLC field is NaN (void bar).
    pub fn is_void(&self) -> bool {
        self.open.is_nan() || self.high.is_nan() || self.low.is_nan() || self.close.is_nan()
    }

    /// Price consistency: `low <= open, close <= high`.
    ///
    /// Void bars are never consistent.
    pub fn is_consistent(&self) -> bool {
        if self.is_void() {
            return false;
        }
        self.low <= self.high
            && self.low <= self.open
            && self.open <= self.high
            && self.low <= self.close
            && self.close <= self.high
    }

    /// Calendar-month partition key (`YYYY-MM`) for this bar.
    pub fn month_key(&self) -> MonthKey {
        MonthKey::of(self.timestamp)
    }
}

/// Calendar month a bar belongs to. Orders chronologically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MonthKey {
    pub year: i32,
    pub month: u32,
}

impl MonthKey {
    pub fn of(ts: NaiveDateTime) -> Self {
        Self {
            year: ts.year(),
            month: ts.month(),
        }
    }
}

impl std::fmt::Display for MonthKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}
