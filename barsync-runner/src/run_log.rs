//! Append-only run log.
//!
//! One line per entry: `<ISO-8601 UTC timestamp> | <text>`. The file is
//! created on first write and only ever grows.

use chrono::{DateTime, Utc};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Severity prefix of a run log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn prefix(self) -> &'static str {
        match self {
            LogLevel::Info => "",
            LogLevel::Warn => "WARN ",
            LogLevel::Error => "ERROR ",
        }
    }
}

pub struct RunLog {
    path: PathBuf,
}

impl RunLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one line stamped with the current time.
    pub fn append(&self, level: LogLevel, text: &str) -> io::Result<()> {
        self.append_at(Utc::now(), level, text)
    }

    pub fn append_at(&self, at: DateTime<Utc>, level: LogLevel, text: &str) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        // Entries are single lines; fold any embedded newlines from error text.
        let text = text.replace(['\r', '\n'], " ");
        writeln!(
            file,
            "{} | {}{}",
            at.format(TIMESTAMP_FORMAT),
            level.prefix(),
            text
        )?;
        file.flush()
    }

    /// Append, reporting failure through tracing instead of returning it.
    pub fn record(&self, level: LogLevel, text: &str) {
        if let Err(e) = self.append(level, text) {
            tracing::error!(path = %self.path.display(), error = %e, "failed to write run log");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn appends_stamped_lines() {
        let dir = tempfile::tempdir().unwrap();
        let log = RunLog::new(dir.path().join("logs/run_log.txt"));
        let at = Utc.with_ymd_and_hms(2025, 8, 1, 12, 0, 0).unwrap();

        log.append_at(at, LogLevel::Info, "CME_MINI:NQ1! 1m: 500 fetched")
            .unwrap();
        log.append_at(at, LogLevel::Warn, "CME_MINI:ES1! 1m: no data")
            .unwrap();

        let content = fs::read_to_string(log.path()).unwrap();
        assert_eq!(
            content,
            "2025-08-01T12:00:00Z | CME_MINI:NQ1! 1m: 500 fetched\n\
             2025-08-01T12:00:00Z | WARN CME_MINI:ES1! 1m: no data\n"
        );
    }

    #[test]
    fn multi_line_text_stays_on_one_line() {
        let dir = tempfile::tempdir().unwrap();
        let log = RunLog::new(dir.path().join("run_log.txt"));

        log.append(LogLevel::Error, "first\nsecond").unwrap();

        let content = fs::read_to_string(log.path()).unwrap();
        assert_eq!(content.lines().count(), 1);
        assert!(content.contains("| ERROR first second"));
    }
}
