//! Yahoo Finance data provider.
//!
//! Fetches OHLCV bars from Yahoo's v8 chart API. The chart API takes a range
//! rather than a bar count, so we request the widest range Yahoo serves for
//! the interval and keep the newest `n_bars`.
//!
//! Yahoo symbols are plain tickers (`NQ=F`, `SPY`); the series exchange is
//! not sent.

use super::provider::{DataError, DataProvider, DataSource, FetchResult, MAX_BARS_PER_REQUEST};
use crate::domain::{Bar, Interval, SeriesSpec};
use serde::Deserialize;
use std::time::Duration;

/// Yahoo Finance v8 chart API response.
#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteData>,
}

#[derive(Debug, Deserialize)]
struct QuoteData {
    open: Vec<Option<f64>>,
    high: Vec<Option<f64>>,
    low: Vec<Option<f64>>,
    close: Vec<Option<f64>>,
    volume: Option<Vec<Option<f64>>>,
}

/// Yahoo interval code and the range query covering `n_bars`.
fn chart_params(interval: Interval, n_bars: usize) -> Option<(&'static str, String)> {
    let years = |per_year: usize| format!("{}y", n_bars.div_ceil(per_year) + 1);
    let params = match interval {
        Interval::Min1 => ("1m", "7d".to_string()),
        Interval::Min5 => ("5m", "60d".to_string()),
        Interval::Min15 => ("15m", "60d".to_string()),
        Interval::Min30 => ("30m", "60d".to_string()),
        Interval::Hour1 => ("60m", "730d".to_string()),
        Interval::Daily => ("1d", years(252)),
        Interval::Weekly => ("1wk", years(52)),
        Interval::Monthly => ("1mo", years(12)),
        _ => return None,
    };
    Some(params)
}

/// Yahoo Finance data provider.
pub struct YahooProvider {
    client: reqwest::blocking::Client,
    include_pre_post: bool,
}

impl YahooProvider {
    pub fn new(timeout: Duration, include_pre_post: bool) -> Result<Self, DataError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .build()
            .map_err(|e| DataError::Other(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            include_pre_post,
        })
    }

    /// Build the chart API URL for a ticker.
    fn chart_url(&self, ticker: &str, interval: &str, range: &str) -> String {
        format!(
            "https://query2.finance.yahoo.com/v8/finance/chart/{ticker}\
             ?interval={interval}&range={range}&includePrePost={}",
            self.include_pre_post
        )
    }

    /// Parse the chart API response into bars, oldest first.
    fn parse_response(ticker: &str, resp: ChartResponse) -> Result<Vec<Bar>, DataError> {
        let result = match (resp.chart.result, resp.chart.error) {
            (Some(result), _) => result,
            (None, Some(err)) if err.code == "Not Found" => {
                return Err(DataError::SymbolNotFound {
                    symbol: ticker.to_string(),
                })
            }
            (None, Some(err)) => {
                return Err(DataError::ResponseFormatChanged(format!(
                    "{}: {}",
                    err.code, err.description
                )))
            }
            (None, None) => return Ok(Vec::new()),
        };

        let Some(data) = result.into_iter().next() else {
            return Ok(Vec::new());
        };
        // No timestamps means no bars in range (e.g. market closed all week).
        let Some(timestamps) = data.timestamp else {
            return Ok(Vec::new());
        };

        let quote = data
            .indicators
            .quote
            .into_iter()
            .next()
            .ok_or_else(|| DataError::ResponseFormatChanged("no quote data".into()))?;

        let mut bars = Vec::with_capacity(timestamps.len());

        for (i, &ts) in timestamps.iter().enumerate() {
            let timestamp = chrono::DateTime::from_timestamp(ts, 0)
                .map(|dt| dt.naive_utc())
                .ok_or_else(|| {
                    DataError::ResponseFormatChanged(format!("invalid timestamp: {ts}"))
                })?;

            let open = quote.open.get(i).copied().flatten();
            let high = quote.high.get(i).copied().flatten();
            let low = quote.low.get(i).copied().flatten();
            let close = quote.close.get(i).copied().flatten();
            let volume = quote
                .volume
                .as_ref()
                .and_then(|v| v.get(i).copied().flatten());

            // Skip slots where every price is missing (halts, holidays)
            if open.is_none() && high.is_none() && low.is_none() && close.is_none() {
                continue;
            }

            bars.push(Bar {
                timestamp,
                open: open.unwrap_or(f64::NAN),
                high: high.unwrap_or(f64::NAN),
                low: low.unwrap_or(f64::NAN),
                close: close.unwrap_or(f64::NAN),
                volume,
            });
        }

        Ok(bars)
    }

    fn request(&self, url: &str, ticker: &str) -> Result<ChartResponse, DataError> {
        let resp = self.client.get(url).send().map_err(|e| {
            if e.is_timeout() {
                DataError::NetworkUnreachable(format!("timeout fetching {ticker}"))
            } else {
                DataError::NetworkUnreachable(e.to_string())
            }
        })?;

        let status = resp.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(60);
            return Err(DataError::RateLimited {
                retry_after_secs: retry_after,
            });
        }
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(DataError::AuthenticationFailed(format!(
                "Yahoo Finance refused the request (HTTP {status})"
            )));
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(DataError::SymbolNotFound {
                symbol: ticker.to_string(),
            });
        }
        if !status.is_success() {
            return Err(DataError::NetworkUnreachable(format!(
                "Yahoo Finance returned HTTP {status} for {ticker}"
            )));
        }

        resp.json().map_err(|e| {
            DataError::ResponseFormatChanged(format!("failed to parse response for {ticker}: {e}"))
        })
    }
}

impl DataProvider for YahooProvider {
    fn name(&self) -> &str {
        "yahoo_finance"
    }

    fn fetch(&self, series: &SeriesSpec, n_bars: usize) -> Result<FetchResult, DataError> {
        let n_bars = n_bars.clamp(1, MAX_BARS_PER_REQUEST);
        let ticker = series.ticker();
        let (interval, range) = chart_params(series.interval, n_bars).ok_or_else(|| {
            DataError::Unsupported(format!("Yahoo has no {} bars", series.interval))
        })?;

        let url = self.chart_url(&ticker, interval, &range);
        let chart = self.request(&url, &ticker)?;
        let mut bars = Self::parse_response(&ticker, chart)?;
        if bars.len() > n_bars {
            bars.drain(..bars.len() - n_bars);
        }

        Ok(FetchResult {
            series: series.clone(),
            bars,
            source: DataSource::YahooFinance,
        })
    }
}
