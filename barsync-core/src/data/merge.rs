//! Merge and partition primitives for bar series.

use crate::domain::{Bar, MonthKey};
use chrono::NaiveDateTime;
use std::collections::BTreeMap;

/// Merge a freshly fetched batch into the stored rows.
///
/// Rows are deduplicated by timestamp, keeping the last occurrence (stored
/// rows come first, so fetched values replace stored ones), and returned in
/// ascending timestamp order.
pub fn merge_bars(existing: Vec<Bar>, incoming: &[Bar]) -> Vec<Bar> {
    let mut by_ts: BTreeMap<NaiveDateTime, Bar> = BTreeMap::new();
    for bar in existing.into_iter().chain(incoming.iter().cloned()) {
        by_ts.insert(bar.timestamp, bar);
    }
    by_ts.into_values().collect()
}

/// Group bars by calendar month, preserving input order within each month.
pub fn group_by_month(bars: &[Bar]) -> BTreeMap<MonthKey, Vec<Bar>> {
    let mut by_month: BTreeMap<MonthKey, Vec<Bar>> = BTreeMap::new();
    for bar in bars {
        by_month.entry(bar.month_key()).or_default().push(bar.clone());
    }
    by_month
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn bar(day: u32, minute: u32, close: f64) -> Bar {
        Bar {
            timestamp: NaiveDate::from_ymd_opt(2025, 8, day)
                .unwrap()
                .and_hms_opt(10, minute, 0)
                .unwrap(),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: Some(10.0),
        }
    }

    #[test]
    fn merge_sorts_and_dedupes() {
        let existing = vec![bar(1, 2, 102.0), bar(1, 0, 100.0)];
        let incoming = vec![bar(1, 1, 101.0), bar(1, 2, 102.0)];

        let merged = merge_bars(existing, &incoming);

        let minutes: Vec<u32> = merged
            .iter()
            .map(|b| chrono::Timelike::minute(&b.timestamp))
            .collect();
        assert_eq!(minutes, vec![0, 1, 2]);
    }

    #[test]
    fn incoming_row_wins_on_conflict() {
        let existing = vec![bar(1, 0, 100.0)];
        let incoming = vec![bar(1, 0, 150.0)];

        let merged = merge_bars(existing, &incoming);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].close, 150.0);
    }

    #[test]
    fn last_duplicate_within_batch_wins() {
        let incoming = vec![bar(1, 0, 100.0), bar(1, 0, 101.0)];
        let merged = merge_bars(Vec::new(), &incoming);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].close, 101.0);
    }

    #[test]
    fn group_by_month_splits_at_month_boundary() {
        let july_end = Bar {
            timestamp: NaiveDate::from_ymd_opt(2025, 7, 31)
                .unwrap()
                .and_hms_opt(23, 59, 0)
                .unwrap(),
            ..bar(1, 0, 100.0)
        };
        let groups = group_by_month(&[july_end, bar(1, 0, 100.0), bar(2, 0, 101.0)]);

        let keys: Vec<String> = groups.keys().map(|k| k.to_string()).collect();
        assert_eq!(keys, vec!["2025-07", "2025-08"]);
        assert_eq!(groups[&MonthKey { year: 2025, month: 8 }].len(), 2);
    }
}
