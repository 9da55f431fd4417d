//! On-disk bar series storage.
//!
//! Layouts:
//! - monthly: `{data_dir}/{folder}/{YYYY-MM}.csv`
//! - single:  `{data_dir}/{folder}.csv`
//!
//! Every merge is a full read-modify-write of the affected file(s):
//! load, concatenate with the batch, dedupe by timestamp, sort, replace.

use super::bar_file::{read_bars, write_bars};
use super::merge::{group_by_month, merge_bars};
use super::provider::DataError;
use crate::domain::{Bar, MonthKey};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// How a series is split across files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionMode {
    /// One file for the whole series.
    Single,
    /// One file per calendar month.
    #[default]
    Monthly,
}

/// What a merge did to one file.
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionUpdate {
    pub path: PathBuf,
    /// `None` in single-file mode.
    pub month: Option<MonthKey>,
    /// Rows in the fetched batch destined for this file.
    pub incoming: usize,
    /// Rows the file gained (timestamps not previously stored).
    pub added: usize,
    /// Rows in the file after the merge.
    pub total: usize,
    /// True when the file did not exist before.
    pub created: bool,
}

/// A file the merge could not update. Its previous contents are untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionFailure {
    pub path: PathBuf,
    pub month: Option<MonthKey>,
    pub error: String,
}

/// Summary of merging one batch into a series.
///
/// Partitions are merged independently, so a failure in one month leaves
/// the others written and listed in `partitions`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeReport {
    pub partitions: Vec<PartitionUpdate>,
    pub failures: Vec<PartitionFailure>,
}

impl MergeReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn rows_added(&self) -> usize {
        self.partitions.iter().map(|p| p.added).sum()
    }

    pub fn rows_total(&self) -> usize {
        self.partitions.iter().map(|p| p.total).sum()
    }
}

/// Bar series storage rooted at a data directory.
pub struct SeriesStore {
    data_dir: PathBuf,
    mode: PartitionMode,
}

impl SeriesStore {
    pub fn new(data_dir: impl Into<PathBuf>, mode: PartitionMode) -> Self {
        Self {
            data_dir: data_dir.into(),
            mode,
        }
    }

    /// Directory holding the monthly partitions of a series.
    pub fn series_dir(&self, folder: &str) -> PathBuf {
        self.data_dir.join(folder)
    }

    /// File for a series in single-file mode.
    pub fn single_path(&self, folder: &str) -> PathBuf {
        self.data_dir.join(format!("{folder}.csv"))
    }

    /// Partition file for one month of a series.
    pub fn month_path(&self, folder: &str, month: MonthKey) -> PathBuf {
        self.series_dir(folder).join(format!("{month}.csv"))
    }

    /// Merge a fetched batch into the series stored under `folder`.
    ///
    /// `symbol` fills the `symbol` column of every written row. An empty
    /// batch touches nothing. A partition that cannot be read or written is
    /// recorded in `failures` and the remaining partitions are still merged.
    pub fn merge(&self, folder: &str, symbol: &str, batch: &[Bar]) -> MergeReport {
        let mut report = MergeReport::default();
        if batch.is_empty() {
            return report;
        }

        let targets: Vec<(PathBuf, Option<MonthKey>, Vec<Bar>)> = match self.mode {
            PartitionMode::Single => vec![(self.single_path(folder), None, batch.to_vec())],
            PartitionMode::Monthly => group_by_month(batch)
                .into_iter()
                .map(|(month, chunk)| (self.month_path(folder, month), Some(month), chunk))
                .collect(),
        };

        for (path, month, chunk) in targets {
            match merge_file(&path, month, symbol, &chunk) {
                Ok(update) => report.partitions.push(update),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "partition merge failed");
                    report.failures.push(PartitionFailure {
                        path,
                        month,
                        error: e.to_string(),
                    });
                }
            }
        }

        report
    }

    /// Load every stored bar of a series, ascending by timestamp.
    pub fn load(&self, folder: &str) -> Result<Vec<Bar>, DataError> {
        match self.mode {
            PartitionMode::Single => {
                let path = self.single_path(folder);
                if path.exists() {
                    read_bars(&path)
                } else {
                    Ok(Vec::new())
                }
            }
            PartitionMode::Monthly => {
                let dir = self.series_dir(folder);
                let mut bars = Vec::new();
                for path in partition_files(&dir)? {
                    bars = merge_bars(bars, &read_bars(&path)?);
                }
                Ok(bars)
            }
        }
    }
}

fn merge_file(
    path: &Path,
    month: Option<MonthKey>,
    symbol: &str,
    chunk: &[Bar],
) -> Result<PartitionUpdate, DataError> {
    let created = !path.exists();
    let existing = if created { Vec::new() } else { read_bars(path)? };
    let before = existing.iter().map(|b| b.timestamp).collect::<BTreeSet<_>>().len();

    let merged = merge_bars(existing, chunk);
    write_bars(path, &merged, symbol)?;

    tracing::debug!(
        path = %path.display(),
        incoming = chunk.len(),
        total = merged.len(),
        "merged partition"
    );

    Ok(PartitionUpdate {
        path: path.to_path_buf(),
        month,
        incoming: chunk.len(),
        added: merged.len() - before,
        total: merged.len(),
        created,
    })
}

/// Monthly partition files in a series directory, sorted by name.
fn partition_files(dir: &Path) -> Result<Vec<PathBuf>, DataError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let entries = std::fs::read_dir(dir)
        .map_err(|e| DataError::StorageError(format!("read dir {}: {e}", dir.display())))?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| DataError::StorageError(format!("dir entry: {e}")))?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("csv") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::env;
    use std::fs;
    use std::sync::atomic::{AtomicU64, Ordering};

    static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

    fn temp_data_dir() -> PathBuf {
        let id = TEST_COUNTER.fetch_add(1, Ordering::Relaxed);
        let dir = env::temp_dir().join(format!("barsync_store_{}_{id}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn bar(month: u32, day: u32, minute: u32) -> Bar {
        Bar {
            timestamp: NaiveDate::from_ymd_opt(2025, month, day)
                .unwrap()
                .and_hms_opt(12, minute, 0)
                .unwrap(),
            open: 100.0,
            high: 101.0,
            low: 99.0,
            close: 100.5,
            volume: Some(5.0),
        }
    }

    #[test]
    fn monthly_merge_writes_one_file_per_month() {
        let dir = temp_data_dir();
        let store = SeriesStore::new(&dir, PartitionMode::Monthly);

        let report = store.merge(
            "NQ1!_in_1_minute",
            "CME_MINI:NQ1!",
            &[bar(7, 31, 0), bar(8, 1, 0), bar(8, 1, 1)],
        );

        assert_eq!(report.partitions.len(), 2);
        assert!(report.partitions.iter().all(|p| p.created));
        assert!(dir.join("NQ1!_in_1_minute/2025-07.csv").exists());
        assert!(dir.join("NQ1!_in_1_minute/2025-08.csv").exists());
        assert_eq!(report.rows_added(), 3);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn second_merge_counts_only_new_rows() {
        let dir = temp_data_dir();
        let store = SeriesStore::new(&dir, PartitionMode::Monthly);

        store.merge("s", "X:S", &[bar(8, 1, 0), bar(8, 1, 1)]);
        let report = store.merge("s", "X:S", &[bar(8, 1, 1), bar(8, 1, 2)]);

        assert_eq!(report.partitions.len(), 1);
        let update = &report.partitions[0];
        assert!(!update.created);
        assert_eq!(update.incoming, 2);
        assert_eq!(update.added, 1);
        assert_eq!(update.total, 3);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn single_mode_writes_flat_file() {
        let dir = temp_data_dir();
        let store = SeriesStore::new(&dir, PartitionMode::Single);

        let report = store.merge(
            "ES1!_in_1_minute",
            "CME_MINI:ES1!",
            &[bar(7, 31, 0), bar(8, 1, 0)],
        );

        assert_eq!(report.partitions.len(), 1);
        assert_eq!(report.partitions[0].month, None);
        assert!(dir.join("ES1!_in_1_minute.csv").exists());
        assert_eq!(store.load("ES1!_in_1_minute").unwrap().len(), 2);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn empty_batch_touches_nothing() {
        let dir = temp_data_dir();
        let store = SeriesStore::new(&dir, PartitionMode::Monthly);

        let report = store.merge("s", "X:S", &[]);
        assert!(report.partitions.is_empty());
        assert!(!dir.join("s").exists());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn bad_partition_does_not_block_other_months() {
        let dir = temp_data_dir();
        let store = SeriesStore::new(&dir, PartitionMode::Monthly);
        let august = store.month_path("s", MonthKey { year: 2025, month: 8 });
        fs::create_dir_all(august.parent().unwrap()).unwrap();
        fs::write(&august, "").unwrap();

        let report = store.merge("s", "X:S", &[bar(7, 31, 0), bar(8, 1, 0)]);

        assert!(!report.is_complete());
        assert_eq!(report.partitions.len(), 1);
        assert_eq!(report.partitions[0].month, Some(MonthKey { year: 2025, month: 7 }));
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].path, august);
        assert!(report.failures[0].error.contains("malformed"));
        assert_eq!(fs::read_to_string(&august).unwrap(), "");

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn load_reassembles_monthly_partitions() {
        let dir = temp_data_dir();
        let store = SeriesStore::new(&dir, PartitionMode::Monthly);

        store.merge("s", "X:S", &[bar(8, 1, 0), bar(7, 31, 0)]);
        let bars = store.load("s").unwrap();

        assert_eq!(bars.len(), 2);
        assert!(bars[0].timestamp < bars[1].timestamp);
        assert!(store.load("missing").unwrap().is_empty());

        let _ = fs::remove_dir_all(&dir);
    }
}
