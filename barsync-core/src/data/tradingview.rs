//! TradingView chart data provider.
//!
//! Speaks the chart websocket protocol: every payload is framed as
//! `~m~<len>~m~<payload>`, heartbeats (`~h~<n>`) must be echoed back, and a
//! series is requested by creating a chart session, resolving the symbol and
//! creating a series with the wanted bar count. Bars arrive in
//! `timescale_update` messages; `series_completed` marks the end.
//!
//! Anonymous access uses `unauthorized_user_token`. With credentials the
//! provider signs in once at construction and reuses the token for every
//! fetch; each fetch opens its own websocket.

use super::provider::{DataError, DataProvider, DataSource, FetchResult, MAX_BARS_PER_REQUEST};
use crate::domain::{Bar, SeriesSpec};
use rand::Rng;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::io;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;
use tungstenite::client::IntoClientRequest;
use tungstenite::http::HeaderValue;
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};

const WS_HOST: &str = "data.tradingview.com";
const WS_URL: &str = "wss://data.tradingview.com/socket.io/websocket";
const WS_ORIGIN: &str = "https://data.tradingview.com";
const SIGNIN_URL: &str = "https://www.tradingview.com/accounts/signin/";
const ANONYMOUS_TOKEN: &str = "unauthorized_user_token";

const QUOTE_FIELDS: [&str; 23] = [
    "ch",
    "chp",
    "current_session",
    "description",
    "local_description",
    "language",
    "exchange",
    "fractional",
    "is_tradable",
    "lp",
    "lp_time",
    "minmov",
    "minmove2",
    "original_name",
    "pricescale",
    "pro_name",
    "short_name",
    "type",
    "update_mode",
    "volume",
    "currency_code",
    "rchp",
    "rtc",
];

/// Username/password pair for a TradingView account.
#[derive(Debug)]
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
}

/// Tunables for the TradingView provider.
#[derive(Debug, Clone)]
pub struct TradingViewOptions {
    /// Request extended-hours bars instead of the regular session.
    pub extended_session: bool,
    /// Socket connect/read timeout.
    pub timeout: Duration,
}

impl Default for TradingViewOptions {
    fn default() -> Self {
        Self {
            extended_session: false,
            timeout: Duration::from_secs(10),
        }
    }
}

/// TradingView data provider.
pub struct TradingViewProvider {
    auth_token: SecretString,
    options: TradingViewOptions,
}

impl TradingViewProvider {
    /// Create a provider, signing in when credentials are given.
    pub fn new(
        credentials: Option<&Credentials>,
        options: TradingViewOptions,
    ) -> Result<Self, DataError> {
        let auth_token = match credentials {
            Some(creds) => sign_in(creds, options.timeout)?,
            None => SecretString::new(ANONYMOUS_TOKEN.into()),
        };
        Ok(Self {
            auth_token,
            options,
        })
    }

    fn connect(&self) -> Result<WebSocket<MaybeTlsStream<TcpStream>>, DataError> {
        let addr = (WS_HOST, 443)
            .to_socket_addrs()
            .map_err(|e| DataError::NetworkUnreachable(format!("resolve {WS_HOST}: {e}")))?
            .next()
            .ok_or_else(|| DataError::NetworkUnreachable(format!("no address for {WS_HOST}")))?;

        let tcp = TcpStream::connect_timeout(&addr, self.options.timeout)
            .map_err(|e| DataError::NetworkUnreachable(e.to_string()))?;
        tcp.set_read_timeout(Some(self.options.timeout))
            .map_err(|e| DataError::NetworkUnreachable(e.to_string()))?;

        let mut request = WS_URL
            .into_client_request()
            .map_err(|e| DataError::Other(format!("websocket request: {e}")))?;
        request
            .headers_mut()
            .insert("Origin", HeaderValue::from_static(WS_ORIGIN));

        let (socket, _response) = tungstenite::client_tls(request, tcp)
            .map_err(|e| DataError::NetworkUnreachable(format!("websocket handshake: {e}")))?;
        Ok(socket)
    }

    /// Messages that set up the sessions and request the series.
    fn setup_messages(&self, symbol: &str, series: &SeriesSpec, n_bars: usize) -> Vec<String> {
        let chart_session = session_id("cs_");
        let quote_session = session_id("qs_");
        let session = if self.options.extended_session {
            "extended"
        } else {
            "regular"
        };
        let resolve = format!(
            "={}",
            json!({ "symbol": symbol, "adjustment": "splits", "session": session })
        );

        let mut quote_fields = vec![json!(quote_session)];
        quote_fields.extend(QUOTE_FIELDS.iter().map(|f| json!(f)));

        vec![
            message("set_auth_token", json!([self.auth_token.expose_secret()])),
            message("chart_create_session", json!([chart_session, ""])),
            message("quote_create_session", json!([quote_session])),
            message("quote_set_fields", Value::Array(quote_fields)),
            message(
                "quote_add_symbols",
                json!([quote_session, symbol, { "flags": ["force_permission"] }]),
            ),
            message("quote_fast_symbols", json!([quote_session, symbol])),
            message("resolve_symbol", json!([chart_session, "symbol_1", resolve])),
            message(
                "create_series",
                json!([chart_session, "s1", "s1", "symbol_1", series.interval.tv_code(), n_bars]),
            ),
            message("switch_timezone", json!([chart_session, "exchange"])),
        ]
    }
}

impl DataProvider for TradingViewProvider {
    fn name(&self) -> &str {
        "tradingview"
    }

    fn fetch(&self, series: &SeriesSpec, n_bars: usize) -> Result<FetchResult, DataError> {
        let n_bars = n_bars.clamp(1, MAX_BARS_PER_REQUEST);
        let symbol = series.qualified();
        let mut socket = self.connect()?;

        for msg in self.setup_messages(&symbol, series, n_bars) {
            socket
                .send(Message::text(frame(&msg)))
                .map_err(|e| DataError::NetworkUnreachable(format!("send: {e}")))?;
        }

        let mut collected: BTreeMap<i64, Bar> = BTreeMap::new();
        let outcome = read_series(&mut socket, &symbol, &mut collected);
        if let Err(e) = socket.close(None) {
            tracing::debug!(error = %e, "websocket close failed");
        }
        outcome?;

        let mut bars: Vec<Bar> = collected.into_values().collect();
        if bars.len() > n_bars {
            bars.drain(..bars.len() - n_bars);
        }

        tracing::debug!(symbol = %symbol, bars = bars.len(), "tradingview series received");

        Ok(FetchResult {
            series: series.clone(),
            bars,
            source: DataSource::TradingView,
        })
    }
}

/// Read frames until the series completes, echoing heartbeats.
fn read_series(
    socket: &mut WebSocket<MaybeTlsStream<TcpStream>>,
    symbol: &str,
    collected: &mut BTreeMap<i64, Bar>,
) -> Result<(), DataError> {
    loop {
        let raw = match socket.read() {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => {
                return Err(DataError::NetworkUnreachable(
                    "connection closed before series completed".into(),
                ))
            }
            Ok(_) => continue,
            Err(tungstenite::Error::Io(e))
                if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) =>
            {
                return Err(DataError::NetworkUnreachable(format!(
                    "timed out waiting for {symbol}"
                )))
            }
            Err(e) => return Err(DataError::NetworkUnreachable(e.to_string())),
        };

        for payload in unframe(raw.as_str()) {
            if is_heartbeat(payload) {
                socket
                    .send(Message::text(frame(payload)))
                    .map_err(|e| DataError::NetworkUnreachable(format!("heartbeat: {e}")))?;
                continue;
            }
            match handle_payload(payload, symbol, collected)? {
                SeriesState::Completed => return Ok(()),
                SeriesState::Pending => {}
            }
        }
    }
}

#[derive(Debug, PartialEq)]
enum SeriesState {
    Pending,
    Completed,
}

fn handle_payload(
    payload: &str,
    symbol: &str,
    collected: &mut BTreeMap<i64, Bar>,
) -> Result<SeriesState, DataError> {
    // Session banners and other non-JSON chatter are ignored.
    let Ok(value) = serde_json::from_str::<Value>(payload) else {
        return Ok(SeriesState::Pending);
    };

    match value.get("m").and_then(Value::as_str) {
        Some("timescale_update") | Some("du") => {
            collect_bars(&value, collected)?;
            Ok(SeriesState::Pending)
        }
        Some("series_completed") => Ok(SeriesState::Completed),
        Some("symbol_error") => Err(DataError::SymbolNotFound {
            symbol: symbol.to_string(),
        }),
        Some(kind @ ("critical_error" | "protocol_error" | "series_error")) => Err(
            DataError::ResponseFormatChanged(format!("{kind}: {}", value["p"])),
        ),
        _ => Ok(SeriesState::Pending),
    }
}

/// Pull `{"i": n, "v": [ts, o, h, l, c, vol?]}` entries out of an update.
fn collect_bars(update: &Value, collected: &mut BTreeMap<i64, Bar>) -> Result<(), DataError> {
    let Some(series_map) = update
        .get("p")
        .and_then(|p| p.get(1))
        .and_then(Value::as_object)
    else {
        return Ok(());
    };

    for series in series_map.values() {
        let Some(points) = series.get("s").and_then(Value::as_array) else {
            continue;
        };
        for point in points {
            let values = point
                .get("v")
                .and_then(Value::as_array)
                .ok_or_else(|| DataError::ResponseFormatChanged("bar without 'v'".into()))?;
            let num = |i: usize| values.get(i).and_then(Value::as_f64);
            let (Some(ts), Some(open), Some(high), Some(low), Some(close)) =
                (num(0), num(1), num(2), num(3), num(4))
            else {
                return Err(DataError::ResponseFormatChanged(format!(
                    "short bar: {point}"
                )));
            };

            let epoch = ts as i64;
            let timestamp = chrono::DateTime::from_timestamp(epoch, 0)
                .map(|dt| dt.naive_utc())
                .ok_or_else(|| {
                    DataError::ResponseFormatChanged(format!("invalid timestamp: {ts}"))
                })?;

            collected.insert(
                epoch,
                Bar {
                    timestamp,
                    open,
                    high,
                    low,
                    close,
                    volume: num(5),
                },
            );
        }
    }
    Ok(())
}

fn sign_in(creds: &Credentials, timeout: Duration) -> Result<SecretString, DataError> {
    let client = reqwest::blocking::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| DataError::Other(format!("http client: {e}")))?;

    let resp = client
        .post(SIGNIN_URL)
        .header(reqwest::header::REFERER, "https://www.tradingview.com")
        .form(&[
            ("username", creds.username.as_str()),
            ("password", creds.password.expose_secret()),
            ("remember", "on"),
        ])
        .send()
        .map_err(|e| DataError::NetworkUnreachable(e.to_string()))?;

    let body: Value = resp
        .json()
        .map_err(|e| DataError::ResponseFormatChanged(format!("sign-in response: {e}")))?;

    match body
        .get("user")
        .and_then(|u| u.get("auth_token"))
        .and_then(Value::as_str)
    {
        Some(token) => Ok(SecretString::new(token.into())),
        None => {
            let reason = body
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("no auth token in response");
            Err(DataError::AuthenticationFailed(reason.to_string()))
        }
    }
}

/// Random session id: prefix plus 12 lowercase letters.
fn session_id(prefix: &str) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..12).map(|_| rng.gen_range(b'a'..=b'z') as char).collect();
    format!("{prefix}{suffix}")
}

/// Compact `{"m": func, "p": params}` message.
fn message(func: &str, params: Value) -> String {
    json!({ "m": func, "p": params }).to_string()
}

/// Wrap a payload in the `~m~<len>~m~` envelope.
pub fn frame(payload: &str) -> String {
    format!("~m~{}~m~{payload}", payload.len())
}

/// Split a websocket text frame into its payloads.
///
/// Uses the declared length when it lands on a frame boundary, otherwise
/// falls back to scanning for the next header.
pub fn unframe(raw: &str) -> Vec<&str> {
    let mut payloads = Vec::new();
    let mut rest = raw;

    while let Some((len, body)) = split_header(rest) {
        let end = match body.get(..len) {
            Some(_) if body[len..].is_empty() || split_header(&body[len..]).is_some() => len,
            _ => next_header(body).unwrap_or(body.len()),
        };
        payloads.push(&body[..end]);
        rest = &body[end..];
    }

    payloads
}

/// Parse a leading `~m~<digits>~m~`, returning the length and the remainder.
fn split_header(s: &str) -> Option<(usize, &str)> {
    let after = s.strip_prefix("~m~")?;
    let sep = after.find("~m~")?;
    let digits = &after[..sep];
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((digits.parse().ok()?, &after[sep + 3..]))
}

fn next_header(body: &str) -> Option<usize> {
    body.match_indices("~m~")
        .map(|(i, _)| i)
        .find(|&i| split_header(&body[i..]).is_some())
}

fn is_heartbeat(payload: &str) -> bool {
    payload.starts_with("~h~")
}
