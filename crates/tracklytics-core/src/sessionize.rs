//! Idle-gap sessionization of an identity-keyed event stream.
//!
//! Sessions are never stored. Every stats or graph query rebuilds them from
//! the raw events, so changing the idle timeout takes effect retroactively.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::analytics::TimeRange;
use crate::event::RawEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// A gap strictly greater than this closes the current window.
    pub idle_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::minutes(30),
        }
    }
}

/// One reconstructed browsing session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionWindow {
    pub identity: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub event_count: u32,
    pub pageview_count: u32,
}

impl SessionWindow {
    fn open(event: &RawEvent) -> Self {
        Self {
            identity: event.identity.clone(),
            start_time: event.created_at,
            end_time: event.created_at,
            event_count: 1,
            pageview_count: u32::from(event.name.is_pageview()),
        }
    }

    fn extend(&mut self, event: &RawEvent) {
        self.end_time = event.created_at;
        self.event_count += 1;
        self.pageview_count += u32::from(event.name.is_pageview());
    }

    pub fn duration(&self) -> Duration {
        self.end_time - self.start_time
    }

    pub fn is_bounce(&self) -> bool {
        self.event_count == 1
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Sessionizer {
    config: SessionConfig,
}

impl Sessionizer {
    pub fn new(config: SessionConfig) -> Self {
        Self { config }
    }

    /// Split `events` into session windows in a single forward pass.
    ///
    /// Events must be in time order per identity; identities may be grouped
    /// or interleaved. Events with equal timestamps keep their input order.
    /// Windows are returned ordered by when they were closed.
    pub fn windows(&self, events: &[RawEvent]) -> Vec<SessionWindow> {
        let mut open: HashMap<&str, SessionWindow> = HashMap::new();
        let mut closed = Vec::new();

        for event in events {
            match open.get_mut(event.identity.as_str()) {
                Some(window) if event.created_at - window.end_time <= self.config.idle_timeout => {
                    window.extend(event);
                }
                Some(window) => {
                    let finished = std::mem::replace(window, SessionWindow::open(event));
                    closed.push(finished);
                }
                None => {
                    open.insert(event.identity.as_str(), SessionWindow::open(event));
                }
            }
        }

        let mut remaining: Vec<SessionWindow> = open.into_values().collect();
        remaining.sort_by(|a, b| {
            a.start_time
                .cmp(&b.start_time)
                .then_with(|| a.identity.cmp(&b.identity))
        });
        closed.extend(remaining);
        closed
    }

    /// Windows whose start falls in `range`. A window that begins inside the
    /// range is kept whole even when it runs past `range.to`.
    pub fn windows_in_range(&self, events: &[RawEvent], range: &TimeRange) -> Vec<SessionWindow> {
        self.windows(events)
            .into_iter()
            .filter(|w| range.contains(w.start_time))
            .collect()
    }
}
