//! Plain-text rendering of quality checks.
//!
//! A report run looks like:
//!
//! ```text
//! === Run at 2025-08-01T12:00:00 ===
//!
//! === Checking data/NQ1!_in_1_minute/2025-08.csv ===
//! Rows: 1380
//! Cadence: 1m (inferred)
//! Missing bars: 2
//!   2025-08-01 16:59:00 -> 2025-08-01 18:00:00 (1h 1m)
//! Duplicate rows: 0
//! Inconsistent rows: 0
//! Price range: min=23012.5, max=23190.25
//! First row: {datetime: 2025-08-01 09:30:00, symbol: CME_MINI:NQ1!, ...}
//! Last row: {datetime: 2025-08-02 08:29:00, symbol: CME_MINI:NQ1!, ...}
//! ```

use super::{CadenceSource, FileCheck, FileReport, QualityStats, MAX_LISTED_GAPS};
use chrono::{Duration, NaiveDateTime};
use std::fmt::Write;

/// Header written once per checker invocation.
pub fn render_run_header(run_at: NaiveDateTime) -> String {
    format!("=== Run at {} ===\n\n", run_at.format("%Y-%m-%dT%H:%M:%S"))
}

/// Report block for one checked path, terminated by a blank line.
pub fn render_file_check(report: &FileReport) -> String {
    let mut out = format!("=== Checking {} ===\n", report.path.display());
    match &report.result {
        Ok(FileCheck::NotFound) => out.push_str("File not found.\n"),
        Ok(FileCheck::Empty) => out.push_str("File is empty.\n"),
        Ok(FileCheck::Checked(stats)) => render_stats(&mut out, stats),
        Err(e) => {
            let _ = writeln!(out, "Error: {e}");
        }
    }
    out.push('\n');
    out
}

fn render_stats(out: &mut String, stats: &QualityStats) {
    let _ = writeln!(out, "Rows: {}", stats.rows);

    match stats.cadence {
        Some((interval, source)) => {
            let source = match source {
                CadenceSource::Inferred => "inferred",
                CadenceSource::Configured => "configured",
            };
            let _ = writeln!(out, "Cadence: {} ({source})", format_duration(interval));
        }
        None => out.push_str("Cadence: unknown\n"),
    }

    match &stats.gaps {
        Some(gaps) => {
            let _ = writeln!(out, "Missing bars: {}", gaps.len());
            for gap in gaps.iter().take(MAX_LISTED_GAPS) {
                let _ = writeln!(
                    out,
                    "  {} -> {} ({})",
                    gap.before,
                    gap.after,
                    format_duration(gap.span())
                );
            }
            if gaps.len() > MAX_LISTED_GAPS {
                let _ = writeln!(out, "  ... ({} more)", gaps.len() - MAX_LISTED_GAPS);
            }
        }
        None => out.push_str("Missing bars: not enough data\n"),
    }

    let _ = writeln!(out, "Duplicate rows: {}", stats.duplicates);
    let _ = writeln!(out, "Inconsistent rows: {}", stats.inconsistent);

    if let Some(check) = stats.out_of_range {
        let _ = writeln!(
            out,
            "Out-of-range prices: {} (close outside {}..={})",
            check.violations, check.range.min, check.range.max
        );
    }
    if let Some((min, max)) = stats.price_bounds {
        let _ = writeln!(out, "Price range: min={min}, max={max}");
    }

    let _ = writeln!(out, "First row: {}", render_row(&stats.first_row));
    let _ = writeln!(out, "Last row: {}", render_row(&stats.last_row));
}

fn render_row(fields: &[(String, String)]) -> String {
    let body = fields
        .iter()
        .map(|(k, v)| format!("{k}: {v}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!("{{{body}}}")
}

/// Compact duration: `1m`, `5m`, `1h 1m`, `1d`, `90s` style.
pub fn format_duration(d: Duration) -> String {
    let mut secs = d.num_seconds();
    if secs == 0 {
        return "0s".to_string();
    }
    let sign = if secs < 0 { "-" } else { "" };
    secs = secs.abs();

    let mut parts = Vec::new();
    for (unit, size) in [("d", 86_400), ("h", 3_600), ("m", 60), ("s", 1)] {
        if secs >= size {
            parts.push(format!("{}{unit}", secs / size));
            secs %= size;
        }
    }
    format!("{sign}{}", parts.join(" "))
}
