//! Scalar traffic statistics over a set of session windows.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::sessionize::SessionWindow;

/// Traffic totals for one time range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatSnapshot {
    pub page_views: i64,
    pub unique_visitors: i64,
    /// Number of session windows; zero means the range had no traffic at all.
    pub sessions: i64,
    pub bounces: i64,
    pub average_session_length_seconds: i64,
}

impl StatSnapshot {
    /// Aggregate the windows that started in a range.
    ///
    /// The average session length divides the summed window durations by the
    /// number of distinct identities, not by the number of windows: a visitor
    /// with three sessions contributes three durations but one denominator.
    pub fn from_windows(windows: &[SessionWindow]) -> Self {
        let identities: HashSet<&str> = windows.iter().map(|w| w.identity.as_str()).collect();
        let unique_visitors = identities.len() as i64;
        let total_seconds: i64 = windows.iter().map(|w| w.duration().num_seconds()).sum();

        Self {
            page_views: windows.iter().map(|w| i64::from(w.pageview_count)).sum(),
            unique_visitors,
            sessions: windows.len() as i64,
            bounces: windows.iter().filter(|w| w.is_bounce()).count() as i64,
            average_session_length_seconds: if unique_visitors == 0 {
                0
            } else {
                total_seconds / unique_visitors
            },
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sessions == 0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricDelta {
    pub value: i64,
    pub change: i64,
}

/// Current-range statistics with their change against the preceding range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsDelta {
    pub page_views: MetricDelta,
    pub unique_visitors: MetricDelta,
    pub sessions: MetricDelta,
    pub bounces: MetricDelta,
    pub average_session_length_seconds: MetricDelta,
}

impl StatsDelta {
    /// Pair `current` with its change since `previous`.
    ///
    /// A missing or empty previous snapshot yields `change = 0` for every
    /// metric rather than reporting the whole current value as growth.
    pub fn compare(current: &StatSnapshot, previous: Option<&StatSnapshot>) -> Self {
        let previous = previous.filter(|p| !p.is_empty());
        let delta = |pick: fn(&StatSnapshot) -> i64| MetricDelta {
            value: pick(current),
            change: previous.map_or(0, |p| pick(current) - pick(p)),
        };

        Self {
            page_views: delta(|s| s.page_views),
            unique_visitors: delta(|s| s.unique_visitors),
            sessions: delta(|s| s.sessions),
            bounces: delta(|s| s.bounces),
            average_session_length_seconds: delta(|s| s.average_session_length_seconds),
        }
    }
}
