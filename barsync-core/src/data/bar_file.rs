//! CSV bar files.
//!
//! Header: `datetime,symbol,open,high,low,close,volume`. Only `datetime` and
//! the four prices are required on read; `symbol` and `volume` may be absent
//! or empty, and unknown columns are ignored.
//!
//! Writes are atomic: write to `.tmp`, then rename into place.

use super::provider::DataError;
use crate::domain::Bar;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Columns every bar file must carry.
pub const REQUIRED_COLUMNS: [&str; 5] = ["datetime", "open", "high", "low", "close"];

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Serialize, Deserialize)]
struct BarRecord {
    datetime: String,
    #[serde(default)]
    symbol: Option<String>,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default)]
    volume: Option<f64>,
}

/// Format a timestamp the way bar files store it.
pub fn format_timestamp(ts: NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a stored timestamp.
///
/// Accepts `YYYY-MM-DD HH:MM:SS[.fff]`, the `T`-separated form, RFC 3339
/// with an offset (converted to UTC), and a bare date (midnight).
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(ts) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(ts);
    }
    if let Ok(ts) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(ts);
    }
    if let Ok(ts) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M") {
        return Some(ts);
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.naive_utc());
    }
    if let Ok(ts) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Some(ts.naive_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Load every bar in a file, in file order.
pub fn read_bars(path: &Path) -> Result<Vec<Bar>, DataError> {
    let malformed = |reason: String| DataError::MalformedFile {
        path: path.display().to_string(),
        reason,
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| DataError::StorageError(format!("open {}: {e}", path.display())))?;

    let headers = reader.headers().map_err(|e| malformed(e.to_string()))?.clone();
    for column in REQUIRED_COLUMNS {
        if !headers.iter().any(|h| h == column) {
            return Err(malformed(format!("missing column '{column}'")));
        }
    }

    let mut bars = Vec::new();
    for (i, record) in reader.deserialize::<BarRecord>().enumerate() {
        let record = record.map_err(|e| malformed(format!("row {}: {e}", i + 1)))?;
        let timestamp = parse_timestamp(&record.datetime).ok_or_else(|| {
            malformed(format!("row {}: bad datetime '{}'", i + 1, record.datetime))
        })?;
        bars.push(Bar {
            timestamp,
            open: record.open,
            high: record.high,
            low: record.low,
            close: record.close,
            volume: record.volume,
        });
    }

    Ok(bars)
}

/// Replace the file at `path` with `bars`, tagging each row with `symbol`.
///
/// Creates parent directories as needed.
pub fn write_bars(path: &Path, bars: &[Bar], symbol: &str) -> Result<(), DataError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| DataError::StorageError(format!("failed to create dir: {e}")))?;
    }

    let tmp_path = path.with_extension("csv.tmp");
    let mut writer = csv::Writer::from_path(&tmp_path)
        .map_err(|e| DataError::StorageError(format!("create {}: {e}", tmp_path.display())))?;

    for bar in bars {
        writer
            .serialize(BarRecord {
                datetime: format_timestamp(bar.timestamp),
                symbol: Some(symbol.to_string()),
                open: bar.open,
                high: bar.high,
                low: bar.low,
                close: bar.close,
                volume: bar.volume,
            })
            .map_err(|e| DataError::StorageError(format!("write row: {e}")))?;
    }
    writer
        .flush()
        .map_err(|e| DataError::StorageError(format!("flush {}: {e}", tmp_path.display())))?;
    drop(writer);

    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        DataError::StorageError(format!("atomic rename failed: {e}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU64, Ordering};

    static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

    fn temp_dir() -> PathBuf {
        let id = TEST_COUNTER.fetch_add(1, Ordering::Relaxed);
        let dir = env::temp_dir().join(format!("barsync_bar_file_{}_{id}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn ts(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 8, 1)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn parse_timestamp_accepts_common_forms() {
        let expected = ts(14, 30);
        assert_eq!(parse_timestamp("2025-08-01 14:30:00"), Some(expected));
        assert_eq!(parse_timestamp("2025-08-01T14:30:00"), Some(expected));
        assert_eq!(parse_timestamp("2025-08-01 14:30"), Some(expected));
        assert_eq!(parse_timestamp("2025-08-01T16:30:00+02:00"), Some(expected));
        assert_eq!(parse_timestamp("2025-08-01"), Some(ts(0, 0)));
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn write_then_read_preserves_rows() {
        let dir = temp_dir();
        let path = dir.join("nested/2025-08.csv");
        let bars = vec![
            Bar {
                timestamp: ts(9, 30),
                open: 23_100.25,
                high: 23_110.0,
                low: 23_095.5,
                close: 23_105.75,
                volume: Some(1520.0),
            },
            Bar {
                timestamp: ts(9, 31),
                open: 23_105.75,
                high: 23_107.0,
                low: 23_101.0,
                close: 23_102.0,
                volume: None,
            },
        ];

        write_bars(&path, &bars, "CME_MINI:NQ1!").unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("datetime,symbol,open,high,low,close,volume\n"));
        assert!(content.contains("2025-08-01 09:30:00,CME_MINI:NQ1!,"));
        assert!(!dir.join("nested/2025-08.csv.tmp").exists());

        let loaded = read_bars(&path).unwrap();
        assert_eq!(loaded, bars);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn reads_files_without_symbol_or_volume() {
        let dir = temp_dir();
        let path = dir.join("plain.csv");
        fs::write(
            &path,
            "datetime,open,high,low,close\n2025-08-01 09:30:00,1,2,0.5,1.5\n",
        )
        .unwrap();

        let bars = read_bars(&path).unwrap();
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].volume, None);
        assert_eq!(bars[0].close, 1.5);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_column_is_malformed() {
        let dir = temp_dir();
        let path = dir.join("bad.csv");
        fs::write(&path, "datetime,open,high,close\n2025-08-01 09:30:00,1,2,1.5\n").unwrap();

        match read_bars(&path) {
            Err(DataError::MalformedFile { reason, .. }) => assert!(reason.contains("low")),
            other => panic!("expected MalformedFile, got {other:?}"),
        }

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn bad_datetime_is_malformed() {
        let dir = temp_dir();
        let path = dir.join("bad_ts.csv");
        fs::write(&path, "datetime,open,high,low,close\nnot-a-date,1,2,0.5,1.5\n").unwrap();

        assert!(matches!(
            read_bars(&path),
            Err(DataError::MalformedFile { .. })
        ));

        let _ = fs::remove_dir_all(&dir);
    }
}
