//! Dense calendar series built from sparse per-bucket counts.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::analytics::TimeRange;
use crate::event::RawEvent;
use crate::period::{Granularity, Period};
use crate::sessionize::SessionWindow;

const LABEL_FORMAT: &str = "%Y-%m-%d %H:%M +0000 UTC";

/// Aggregated counts for one calendar bucket that has data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SparseRow {
    /// Bucket start.
    pub timestamp: DateTime<Utc>,
    pub pageviews: i64,
    pub visitors: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Bucket {
    pub timestamp_label: String,
    pub pageviews: i64,
    pub visitors: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphSeries {
    pub period: Period,
    /// Newest bucket first.
    pub buckets: Vec<Bucket>,
}

/// Count pageviews and visits per bucket of `granularity`, newest first.
///
/// A visit is counted in the bucket where its window starts; a pageview in
/// the bucket of the event itself. Only data inside `range` is counted and
/// empty buckets are omitted.
pub fn sparse_rows(
    windows: &[SessionWindow],
    events: &[RawEvent],
    range: &TimeRange,
    granularity: Granularity,
) -> Vec<SparseRow> {
    let mut counts: BTreeMap<DateTime<Utc>, (i64, i64)> = BTreeMap::new();

    for event in events
        .iter()
        .filter(|e| e.name.is_pageview() && range.contains(e.created_at))
    {
        counts
            .entry(granularity.truncate(event.created_at))
            .or_default()
            .0 += 1;
    }
    for window in windows.iter().filter(|w| range.contains(w.start_time)) {
        counts
            .entry(granularity.truncate(window.start_time))
            .or_default()
            .1 += 1;
    }

    counts
        .into_iter()
        .rev()
        .map(|(timestamp, (pageviews, visitors))| SparseRow {
            timestamp,
            pageviews,
            visitors,
        })
        .collect()
}

/// Lay `rows` onto the fixed bucket calendar of `period` ending at `to`.
///
/// Bucket `i` starts at `to - (i + 1) * step`. `rows` must be sorted newest
/// first; both sequences are walked once with two cursors, and a row is
/// consumed by the first bucket whose start is at or before it. Buckets
/// without a row are zero-filled.
pub fn build_series(period: Period, to: DateTime<Utc>, rows: &[SparseRow]) -> GraphSeries {
    let granularity = period.granularity();
    let step = granularity.step();
    let mut cursor = to;
    let mut next = 0;

    let buckets = (0..period.bucket_count())
        .map(|_| {
            cursor -= step;
            let (pageviews, visitors) = match rows.get(next) {
                Some(row) if row.timestamp >= cursor => {
                    next += 1;
                    (row.pageviews, row.visitors)
                }
                _ => (0, 0),
            };
            Bucket {
                timestamp_label: cursor.format(LABEL_FORMAT).to_string(),
                pageviews,
                visitors,
            }
        })
        .collect();

    GraphSeries { period, buckets }
}
