//! Bar file quality checks.
//!
//! A check loads one bar file, sorts it by timestamp (stable, so duplicate
//! rows keep file order) and counts:
//! - missing bars: consecutive pairs further apart than the expected cadence
//! - duplicates: rows repeating an earlier row's timestamp
//! - inconsistent rows: rows violating `low <= open, close <= high`
//! - optionally, rows whose close falls outside a configured price range
//!
//! The file is never modified.

pub mod report;

pub use report::{format_duration, render_file_check, render_run_header};

use crate::data::bar_file::{parse_timestamp, REQUIRED_COLUMNS};
use crate::domain::Bar;
use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Gaps listed individually in a report; the rest are summarised.
pub const MAX_LISTED_GAPS: usize = 20;

#[derive(Debug, Error)]
pub enum CheckError {
    #[error("failed to read {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("malformed bar file {path}: {reason}")]
    Malformed { path: String, reason: String },
}

/// Inclusive bounds for the out-of-range close filter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceRange {
    pub min: f64,
    pub max: f64,
}

impl PriceRange {
    pub fn contains(&self, price: f64) -> bool {
        price >= self.min && price <= self.max
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CheckOptions {
    /// Known cadence. When `None` the modal interval of the data is used.
    pub expected_interval: Option<Duration>,
    pub price_range: Option<PriceRange>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CadenceSource {
    Inferred,
    Configured,
}

/// Two consecutive timestamps further apart than the expected cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gap {
    pub before: NaiveDateTime,
    pub after: NaiveDateTime,
}

impl Gap {
    pub fn span(&self) -> Duration {
        self.after - self.before
    }
}

/// Result of the out-of-range filter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeCheck {
    pub range: PriceRange,
    pub violations: usize,
}

/// Statistics for a file with at least one row.
#[derive(Debug, Clone, PartialEq)]
pub struct QualityStats {
    pub rows: usize,
    /// `None` when there was not enough data to settle on a cadence.
    pub cadence: Option<(Duration, CadenceSource)>,
    /// `None` when there was not enough data to count gaps.
    pub gaps: Option<Vec<Gap>>,
    pub duplicates: usize,
    pub inconsistent: usize,
    pub out_of_range: Option<RangeCheck>,
    /// Lowest and highest finite price across all OHLC columns.
    pub price_bounds: Option<(f64, f64)>,
    /// First row after sorting, as `(column, value)` pairs.
    pub first_row: Vec<(String, String)>,
    pub last_row: Vec<(String, String)>,
}

impl QualityStats {
    /// Missing-bar count, if it could be computed.
    pub fn missing_bars(&self) -> Option<usize> {
        self.gaps.as_ref().map(Vec::len)
    }
}

/// Outcome of checking one path.
#[derive(Debug, Clone, PartialEq)]
pub enum FileCheck {
    NotFound,
    /// No data rows: a zero-byte file or a header only. A single row is
    /// `Checked` and reports no cadence.
    Empty,
    Checked(QualityStats),
}

/// Report section for one file.
#[derive(Debug)]
pub struct FileReport {
    pub path: PathBuf,
    pub result: Result<FileCheck, CheckError>,
}

/// One parsed row plus its raw fields for the first/last row listing.
struct Row {
    bar: Bar,
    fields: Vec<(String, String)>,
}

/// Check a single bar file.
///
/// A missing path is reported as [`FileCheck::NotFound`], not as an error.
pub fn check_file(path: &Path, options: &CheckOptions) -> Result<FileCheck, CheckError> {
    if !path.exists() {
        return Ok(FileCheck::NotFound);
    }

    let mut rows = read_rows(path)?;
    if rows.is_empty() {
        return Ok(FileCheck::Empty);
    }
    rows.sort_by_key(|r| r.bar.timestamp);

    let timestamps: Vec<NaiveDateTime> = rows.iter().map(|r| r.bar.timestamp).collect();
    let bars: Vec<&Bar> = rows.iter().map(|r| &r.bar).collect();

    let cadence = match options.expected_interval {
        Some(interval) => Some((interval, CadenceSource::Configured)),
        None => modal_interval(&timestamps).map(|d| (d, CadenceSource::Inferred)),
    };
    let gaps = match cadence {
        Some((expected, _)) if timestamps.len() >= 2 => Some(find_gaps(&timestamps, expected)),
        _ => None,
    };

    let out_of_range = options.price_range.map(|range| RangeCheck {
        range,
        violations: bars.iter().filter(|b| !range.contains(b.close)).count(),
    });

    let stats = QualityStats {
        rows: rows.len(),
        cadence,
        gaps,
        duplicates: count_duplicates(&timestamps),
        inconsistent: bars.iter().filter(|b| !b.is_consistent()).count(),
        out_of_range,
        price_bounds: price_bounds(&bars),
        first_row: rows.first().map(|r| r.fields.clone()).unwrap_or_default(),
        last_row: rows.last().map(|r| r.fields.clone()).unwrap_or_default(),
    };

    Ok(FileCheck::Checked(stats))
}

/// Most frequent strictly positive delta between consecutive timestamps.
///
/// Input must be sorted. Ties go to the smallest delta. Returns `None` when
/// there is no positive delta (fewer than two distinct timestamps).
pub fn modal_interval(sorted: &[NaiveDateTime]) -> Option<Duration> {
    let mut counts: BTreeMap<Duration, usize> = BTreeMap::new();
    for pair in sorted.windows(2) {
        let delta = pair[1] - pair[0];
        if delta > Duration::zero() {
            *counts.entry(delta).or_default() += 1;
        }
    }

    let mut best: Option<(Duration, usize)> = None;
    for (delta, count) in counts {
        match best {
            Some((_, best_count)) if count <= best_count => {}
            _ => best = Some((delta, count)),
        }
    }
    best.map(|(delta, _)| delta)
}

/// Consecutive pairs further apart than `expected`. Input must be sorted.
pub fn find_gaps(sorted: &[NaiveDateTime], expected: Duration) -> Vec<Gap> {
    sorted
        .windows(2)
        .filter(|pair| pair[1] - pair[0] > expected)
        .map(|pair| Gap {
            before: pair[0],
            after: pair[1],
        })
        .collect()
}

/// Rows whose timestamp repeats the previous row's. Input must be sorted.
pub fn count_duplicates(sorted: &[NaiveDateTime]) -> usize {
    sorted.windows(2).filter(|pair| pair[0] == pair[1]).count()
}

fn price_bounds(bars: &[&Bar]) -> Option<(f64, f64)> {
    bars.iter()
        .flat_map(|b| [b.open, b.high, b.low, b.close])
        .filter(|p| p.is_finite())
        .fold(None, |acc, p| match acc {
            None => Some((p, p)),
            Some((lo, hi)) => Some((lo.min(p), hi.max(p))),
        })
}

/// Read rows leniently: unparseable prices become NaN (and so count as
/// inconsistent); an unparseable timestamp or missing column is fatal.
fn read_rows(path: &Path) -> Result<Vec<Row>, CheckError> {
    let display = path.display().to_string();
    let malformed = |reason: String| CheckError::Malformed {
        path: display.clone(),
        reason,
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| CheckError::Io {
            path: display.clone(),
            reason: e.to_string(),
        })?;

    let headers = reader.headers().map_err(|e| malformed(e.to_string()))?.clone();
    if headers.is_empty() || (headers.len() == 1 && headers.get(0) == Some("")) {
        return Ok(Vec::new());
    }

    let mut index = [0usize; 5];
    for (slot, column) in index.iter_mut().zip(REQUIRED_COLUMNS) {
        *slot = headers
            .iter()
            .position(|h| h == column)
            .ok_or_else(|| malformed(format!("missing column '{column}'")))?;
    }
    let [dt_idx, open_idx, high_idx, low_idx, close_idx] = index;
    let volume_idx = headers.iter().position(|h| h == "volume");

    let mut rows = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record.map_err(|e| malformed(format!("row {}: {e}", i + 1)))?;
        let raw_ts = record.get(dt_idx).unwrap_or_default();
        let timestamp = parse_timestamp(raw_ts)
            .ok_or_else(|| malformed(format!("row {}: bad datetime '{raw_ts}'", i + 1)))?;

        let price = |idx: usize| {
            record
                .get(idx)
                .and_then(|v| v.parse::<f64>().ok())
                .unwrap_or(f64::NAN)
        };
        let bar = Bar {
            timestamp,
            open: price(open_idx),
            high: price(high_idx),
            low: price(low_idx),
            close: price(close_idx),
            volume: volume_idx
                .and_then(|idx| record.get(idx))
                .and_then(|v| v.parse::<f64>().ok()),
        };

        let fields = headers
            .iter()
            .zip(record.iter())
            .map(|(h, v)| (h.to_string(), v.to_string()))
            .collect();
        rows.push(Row { bar, fields });
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::env;
    use std::fs;
    use std::sync::atomic::{AtomicU64, Ordering};

    static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

    fn temp_dir() -> PathBuf {
        let id = TEST_COUNTER.fetch_add(1, Ordering::Relaxed);
        let dir = env::temp_dir().join(format!("barsync_quality_{}_{id}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn ts(minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 8, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
            + Duration::minutes(minute as i64)
    }

    fn write_csv(dir: &Path, name: &str, rows: &[String]) -> PathBuf {
        let path = dir.join(name);
        let mut content = String::from("datetime,symbol,open,high,low,close,volume\n");
        for row in rows {
            content.push_str(row);
            content.push('\n');
        }
        fs::write(&path, content).unwrap();
        path
    }

    fn row(minute: u32, o: f64, h: f64, l: f64, c: f64) -> String {
        format!(
            "{},CME_MINI:NQ1!,{o},{h},{l},{c},10",
            ts(minute).format("%Y-%m-%d %H:%M:%S")
        )
    }

    fn good_row(minute: u32) -> String {
        row(minute, 100.0, 105.0, 99.0, 102.0)
    }

    fn checked(result: Result<FileCheck, CheckError>) -> QualityStats {
        match result {
            Ok(FileCheck::Checked(stats)) => stats,
            other => panic!("expected Checked, got {other:?}"),
        }
    }

    #[test]
    fn uniform_spacing_has_no_missing_bars() {
        let dir = temp_dir();
        let rows: Vec<String> = (0..10).map(good_row).collect();
        let path = write_csv(&dir, "uniform.csv", &rows);

        let stats = checked(check_file(&path, &CheckOptions::default()));
        assert_eq!(stats.rows, 10);
        assert_eq!(stats.missing_bars(), Some(0));
        assert_eq!(
            stats.cadence,
            Some((Duration::minutes(1), CadenceSource::Inferred))
        );

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn removed_middle_row_is_a_gap() {
        let dir = temp_dir();
        let rows: Vec<String> = (0..10).filter(|m| *m != 5).map(good_row).collect();
        let path = write_csv(&dir, "gap.csv", &rows);

        let stats = checked(check_file(&path, &CheckOptions::default()));
        assert_eq!(stats.missing_bars(), Some(1));
        let gaps = stats.gaps.unwrap();
        assert_eq!(gaps[0].before, ts(4));
        assert_eq!(gaps[0].after, ts(6));
        assert_eq!(gaps[0].span(), Duration::minutes(2));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn three_injected_duplicates_are_counted() {
        let dir = temp_dir();
        let mut rows: Vec<String> = (0..10).map(good_row).collect();
        rows.push(good_row(2));
        rows.push(good_row(7));
        rows.push(good_row(7));
        let path = write_csv(&dir, "dupes.csv", &rows);

        let stats = checked(check_file(&path, &CheckOptions::default()));
        assert_eq!(stats.duplicates, 3);
        assert_eq!(stats.missing_bars(), Some(0));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn inverted_and_out_of_bar_closes_are_inconsistent() {
        let dir = temp_dir();
        let rows = vec![
            row(0, 100.0, 105.0, 99.0, 102.0),
            row(1, 100.0, 100.0, 105.0, 102.0),
            row(2, 100.0, 100.0, 95.0, 110.0),
        ];
        let path = write_csv(&dir, "prices.csv", &rows);

        let stats = checked(check_file(&path, &CheckOptions::default()));
        assert_eq!(stats.inconsistent, 2);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn unparseable_price_counts_as_inconsistent() {
        let dir = temp_dir();
        let rows = vec![good_row(0), format!("{},X:Y,abc,105,99,102,", ts(1))];
        let path = write_csv(&dir, "nan.csv", &rows);

        let stats = checked(check_file(&path, &CheckOptions::default()));
        assert_eq!(stats.inconsistent, 1);
        assert_eq!(stats.price_bounds, Some((99.0, 105.0)));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn single_row_is_not_enough_data() {
        let dir = temp_dir();
        let path = write_csv(&dir, "one.csv", &[good_row(0)]);

        let stats = checked(check_file(&path, &CheckOptions::default()));
        assert_eq!(stats.missing_bars(), None);
        assert_eq!(stats.cadence, None);
        assert_eq!(stats.first_row, stats.last_row);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_and_empty_files() {
        let dir = temp_dir();
        assert_eq!(
            check_file(&dir.join("nope.csv"), &CheckOptions::default()).unwrap(),
            FileCheck::NotFound
        );

        let path = write_csv(&dir, "empty.csv", &[]);
        assert_eq!(
            check_file(&path, &CheckOptions::default()).unwrap(),
            FileCheck::Empty
        );

        let zero = dir.join("zero.csv");
        fs::write(&zero, "").unwrap();
        assert_eq!(
            check_file(&zero, &CheckOptions::default()).unwrap(),
            FileCheck::Empty
        );

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_column_is_malformed() {
        let dir = temp_dir();
        let path = dir.join("bad.csv");
        fs::write(&path, "datetime,open,high,close\n2025-08-01 09:00:00,1,2,1\n").unwrap();

        assert!(matches!(
            check_file(&path, &CheckOptions::default()),
            Err(CheckError::Malformed { .. })
        ));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn configured_interval_overrides_inference() {
        let dir = temp_dir();
        // Every other minute missing: the modal delta is 2m, hiding the gaps.
        let rows: Vec<String> = (0..10).map(|m| good_row(m * 2)).collect();
        let path = write_csv(&dir, "sparse.csv", &rows);

        let inferred = checked(check_file(&path, &CheckOptions::default()));
        assert_eq!(inferred.missing_bars(), Some(0));

        let options = CheckOptions {
            expected_interval: Some(Duration::minutes(1)),
            price_range: None,
        };
        let configured = checked(check_file(&path, &options));
        assert_eq!(configured.missing_bars(), Some(9));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn price_range_filters_on_close() {
        let dir = temp_dir();
        let rows = vec![
            row(0, 100.0, 105.0, 99.0, 102.0),
            row(1, 100.0, 40_000.0, 99.0, 35_000.0),
        ];
        let path = write_csv(&dir, "range.csv", &rows);

        let options = CheckOptions {
            expected_interval: None,
            price_range: Some(PriceRange {
                min: 50.0,
                max: 30_000.0,
            }),
        };
        let stats = checked(check_file(&path, &options));
        assert_eq!(stats.out_of_range.map(|r| r.violations), Some(1));
        assert_eq!(stats.price_bounds, Some((99.0, 40_000.0)));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn sorting_is_applied_before_first_last_rows() {
        let dir = temp_dir();
        let path = write_csv(&dir, "unsorted.csv", &[good_row(3), good_row(1), good_row(2)]);

        let stats = checked(check_file(&path, &CheckOptions::default()));
        assert_eq!(stats.first_row[0], ("datetime".to_string(), "2025-08-01 09:01:00".to_string()));
        assert_eq!(stats.last_row[0].1, "2025-08-01 09:03:00");

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn modal_interval_prefers_smallest_on_tie() {
        let stamps = [ts(0), ts(1), ts(3), ts(4), ts(6)];
        assert_eq!(modal_interval(&stamps), Some(Duration::minutes(1)));
        assert_eq!(modal_interval(&[ts(0), ts(0)]), None);
        assert_eq!(modal_interval(&[]), None);
    }
}
