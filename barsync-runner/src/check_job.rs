//! Check job: run quality checks over bar files and append a report.
//!
//! The report gets one run header per invocation followed by one block per
//! file. Missing and malformed files get their own block; they never abort
//! the batch.

use crate::config::CheckConfig;
use anyhow::{Context, Result};
use barsync_core::quality::{
    check_file, render_file_check, render_run_header, CheckOptions, FileCheck, FileReport,
};
use chrono::{NaiveDateTime, Utc};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Reports produced by one check run.
#[derive(Debug, Default)]
pub struct CheckSummary {
    pub files: Vec<FileReport>,
}

impl CheckSummary {
    pub fn checked(&self) -> usize {
        self.files
            .iter()
            .filter(|f| matches!(f.result, Ok(FileCheck::Checked(_))))
            .count()
    }

    pub fn not_found(&self) -> usize {
        self.files
            .iter()
            .filter(|f| matches!(f.result, Ok(FileCheck::NotFound)))
            .count()
    }

    pub fn errors(&self) -> usize {
        self.files.iter().filter(|f| f.result.is_err()).count()
    }
}

/// Check every configured target and append the report.
pub fn run_check(config: &CheckConfig) -> Result<CheckSummary> {
    run_check_at(config, Utc::now().naive_utc())
}

/// Same as [`run_check`] with an explicit run timestamp.
pub fn run_check_at(config: &CheckConfig, run_at: NaiveDateTime) -> Result<CheckSummary> {
    let targets = resolve_targets(config)?;
    tracing::info!(files = targets.len(), report = %config.report.display(), "checking bar files");

    let mut text = render_run_header(run_at);
    let mut summary = CheckSummary::default();

    for (path, options) in targets {
        let result = check_file(&path, &options);
        match &result {
            Ok(FileCheck::Checked(stats)) => tracing::info!(
                path = %path.display(),
                rows = stats.rows,
                missing = ?stats.missing_bars(),
                duplicates = stats.duplicates,
                inconsistent = stats.inconsistent,
                "checked"
            ),
            Ok(FileCheck::Empty) => tracing::warn!(path = %path.display(), "file is empty"),
            Ok(FileCheck::NotFound) => tracing::warn!(path = %path.display(), "file not found"),
            Err(e) => tracing::error!(path = %path.display(), error = %e, "check failed"),
        }

        let report = FileReport { path, result };
        text.push_str(&render_file_check(&report));
        summary.files.push(report);
    }

    append_report(&config.report, &text)?;
    Ok(summary)
}

/// Explicit targets, or every `*.csv` under the scan dir when there are none.
fn resolve_targets(config: &CheckConfig) -> Result<Vec<(PathBuf, CheckOptions)>> {
    if !config.targets.is_empty() {
        return Ok(config
            .targets
            .iter()
            .map(|t| (t.path.clone(), config.options_for(Some(t))))
            .collect());
    }

    let mut files = Vec::new();
    if config.scan_dir.is_dir() {
        collect_csv_files(&config.scan_dir, &mut files)?;
    } else {
        tracing::warn!(dir = %config.scan_dir.display(), "scan dir does not exist");
    }
    files.sort();

    let options = config.options_for(None);
    Ok(files.into_iter().map(|p| (p, options)).collect())
}

fn collect_csv_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))?;
    for entry in entries {
        let path = entry
            .with_context(|| format!("failed to read entry in {}", dir.display()))?
            .path();
        if path.is_dir() {
            collect_csv_files(&path, out)?;
        } else if path.extension().and_then(|e| e.to_str()) == Some("csv") {
            out.push(path);
        }
    }
    Ok(())
}

fn append_report(path: &Path, text: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open report {}", path.display()))?;
    file.write_all(text.as_bytes())
        .with_context(|| format!("failed to write report {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CheckTarget;
    use chrono::NaiveDate;

    fn run_at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 8, 2)
            .unwrap()
            .and_hms_opt(6, 0, 0)
            .unwrap()
    }

    #[test]
    fn header_is_written_once_per_run() {
        let dir = tempfile::tempdir().unwrap();
        let config = CheckConfig {
            report: dir.path().join("quality_report.txt"),
            targets: vec![
                CheckTarget {
                    path: dir.path().join("a.csv"),
                    expected_interval: None,
                    price_range: None,
                },
                CheckTarget {
                    path: dir.path().join("b.csv"),
                    expected_interval: None,
                    price_range: None,
                },
            ],
            ..CheckConfig::default()
        };

        let summary = run_check_at(&config, run_at()).unwrap();
        assert_eq!(summary.not_found(), 2);

        let text = fs::read_to_string(&config.report).unwrap();
        assert_eq!(text.matches("=== Run at").count(), 1);
        assert_eq!(text.matches("File not found.").count(), 2);
        assert!(text.starts_with("=== Run at 2025-08-02T06:00:00 ===\n"));
    }

    #[test]
    fn scan_dir_finds_nested_csv_files() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("data");
        fs::create_dir_all(data.join("NQ1!_in_1_minute")).unwrap();
        let header = "datetime,open,high,low,close\n";
        fs::write(data.join("NQ1!_in_1_minute/2025-08.csv"), header).unwrap();
        fs::write(data.join("ES1!_in_1_minute.csv"), header).unwrap();
        fs::write(data.join("notes.txt"), "ignored").unwrap();

        let config = CheckConfig {
            report: dir.path().join("report.txt"),
            scan_dir: data,
            ..CheckConfig::default()
        };

        let summary = run_check_at(&config, run_at()).unwrap();
        assert_eq!(summary.files.len(), 2);
        assert!(summary
            .files
            .iter()
            .all(|f| matches!(f.result, Ok(FileCheck::Empty))));
    }
}
