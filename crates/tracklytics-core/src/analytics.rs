//! Ingestion and query orchestration over an [`EventStore`].

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::aggregate::{StatSnapshot, StatsDelta};
use crate::attribution;
use crate::buckets::{self, GraphSeries};
use crate::error::CoreError;
use crate::event::{CollectPayload, EventName, IdentityRecord, RawEvent};
use crate::period::Period;
use crate::sessionize::Sessionizer;
use crate::store::EventStore;

/// Serialized `props` larger than this are rejected.
pub const MAX_PROPS_BYTES: usize = 4096;

/// Half-open time range `[from, to)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self { from, to }
    }

    /// The range of length `length` that ends at `to`, or `None` when its
    /// start falls outside the representable calendar.
    pub fn ending_at(to: DateTime<Utc>, length: Duration) -> Option<Self> {
        to.checked_sub_signed(length).map(|from| Self::new(from, to))
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.from <= at && at < self.to
    }

    pub fn duration(&self) -> Duration {
        self.to - self.from
    }

    /// The equal-length range immediately before this one.
    pub fn previous(&self) -> Option<Self> {
        Self::ending_at(self.from, self.duration())
    }
}

/// Turn a validated client payload into the event to store.
pub fn build_event(
    payload: CollectPayload,
    identity: &str,
    now: DateTime<Utc>,
) -> Result<RawEvent, CoreError> {
    let name = EventName::parse(&payload.name)
        .ok_or_else(|| CoreError::InvalidEvent("event name must not be empty".to_string()))?;
    let destination = attribution::extract(&payload.url, payload.referrer.as_deref())?;

    let props = payload.props.unwrap_or_default();
    if serde_json::to_vec(&props)?.len() > MAX_PROPS_BYTES {
        return Err(CoreError::InvalidEvent(format!(
            "props exceed {MAX_PROPS_BYTES} bytes"
        )));
    }
    if let Some(revenue) = &payload.revenue {
        if !revenue.amount.is_finite() || revenue.currency.trim().is_empty() {
            return Err(CoreError::InvalidEvent(
                "revenue needs a finite amount and a currency".to_string(),
            ));
        }
    }

    Ok(RawEvent {
        identity: identity.to_string(),
        name,
        url: destination.url,
        attribution: destination.attribution,
        props,
        revenue: payload.revenue,
        created_at: now,
    })
}

/// Stats period for a requested keyword. Unknown periods mean 24h.
pub fn stats_period(period: Option<Period>) -> Period {
    period.unwrap_or(Period::Day)
}

/// Stats range for `period` ending at `date`.
///
/// Both the range and the one before it must be representable, since stats
/// are always diffed against the previous period.
pub fn stats_range(period: Period, date: DateTime<Utc>) -> Result<TimeRange, CoreError> {
    TimeRange::ending_at(date, period.duration())
        .filter(|range| range.previous().is_some())
        .ok_or(CoreError::DateOutOfRange(date))
}

/// Graph period for a requested keyword. Unknown periods mean 30 days.
pub fn graph_period(period: Option<Period>) -> Period {
    period.unwrap_or(Period::Month)
}

/// The range covered by the graph of `period` drawn at `now`: it ends at the
/// next bucket boundary so the current, partial bucket is the newest one.
pub fn graph_range(period: Period, now: DateTime<Utc>) -> Option<TimeRange> {
    let granularity = period.granularity();
    let to = granularity.next_boundary(now)?;
    TimeRange::ending_at(to, granularity.step() * period.bucket_count() as i32)
}

/// Sessionized analytics over a shared event store.
#[derive(Clone)]
pub struct Analytics {
    store: Arc<dyn EventStore>,
    sessionizer: Sessionizer,
}

impl Analytics {
    pub fn new(store: Arc<dyn EventStore>, sessionizer: Sessionizer) -> Self {
        Self { store, sessionizer }
    }

    pub fn store(&self) -> &Arc<dyn EventStore> {
        &self.store
    }

    /// Store one event, creating its identity on first sight.
    pub async fn ingest(&self, identity: &IdentityRecord, event: &RawEvent) -> anyhow::Result<()> {
        self.store.insert_identity(identity).await?;
        self.store.insert_event(event).await?;
        tracing::debug!(
            identity = %identity.identity,
            event = %event.name,
            attribution = event.attribution.kind(),
            "event stored"
        );
        Ok(())
    }

    pub async fn snapshot(&self, range: &TimeRange) -> anyhow::Result<StatSnapshot> {
        let events = self.store.events_for_active_identities(range).await?;
        let windows = self.sessionizer.windows_in_range(&events, range);
        Ok(StatSnapshot::from_windows(&windows))
    }

    /// Statistics for `range` diffed against the preceding range.
    ///
    /// A failure reading the current range is returned; a failure reading the
    /// previous range only zeroes the changes.
    pub async fn stats(&self, range: &TimeRange) -> anyhow::Result<StatsDelta> {
        let current = self.snapshot(range).await?;
        let Some(previous_range) = range.previous() else {
            tracing::warn!(from = %range.from, "no previous range before the calendar start");
            return Ok(StatsDelta::compare(&current, None));
        };
        let previous = match self.snapshot(&previous_range).await {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    from = %previous_range.from,
                    to = %previous_range.to,
                    "previous range unavailable; reporting zero change"
                );
                None
            }
        };
        Ok(StatsDelta::compare(&current, previous.as_ref()))
    }

    pub async fn graph(&self, period: Period, now: DateTime<Utc>) -> anyhow::Result<GraphSeries> {
        let range = graph_range(period, now)
            .ok_or_else(|| anyhow::anyhow!("graph range before {now} is not representable"))?;
        let events = self.store.events_for_active_identities(&range).await?;
        let windows = self.sessionizer.windows_in_range(&events, &range);
        let rows = buckets::sparse_rows(&windows, &events, &range, period.granularity());
        Ok(buckets::build_series(period, range.to, &rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::MetricDelta;
    use crate::attribution::Attribution;
    use crate::event::Revenue;
    use crate::sessionize::tests::{at, pageview};
    use crate::sessionize::SessionConfig;
    use crate::store::MemoryStore;
    use crate::visitor::DeviceClass;
    use chrono::TimeZone;

    fn payload(name: &str, url: &str) -> CollectPayload {
        CollectPayload {
            name: name.to_string(),
            url: url.to_string(),
            referrer: None,
            viewport: None,
            props: None,
            revenue: None,
        }
    }

    fn identity(id: &str, created_at: DateTime<Utc>) -> IdentityRecord {
        IdentityRecord {
            identity: id.to_string(),
            language: None,
            country: None,
            browser: None,
            os: None,
            device_class: DeviceClass::Desktop,
            created_at,
        }
    }

    async fn analytics_with(events: &[RawEvent]) -> Analytics {
        let store = MemoryStore::new();
        for event in events {
            store.insert_event(event).await.unwrap();
        }
        Analytics::new(Arc::new(store), Sessionizer::new(SessionConfig::default()))
    }

    struct FailingStore;

    #[async_trait::async_trait]
    impl EventStore for FailingStore {
        async fn insert_identity(&self, _: &IdentityRecord) -> anyhow::Result<()> {
            anyhow::bail!("read-only")
        }
        async fn insert_event(&self, _: &RawEvent) -> anyhow::Result<()> {
            anyhow::bail!("read-only")
        }
        async fn events_for_active_identities(
            &self,
            range: &TimeRange,
        ) -> anyhow::Result<Vec<RawEvent>> {
            // Only the current range can be read.
            if range.to > at(1000) {
                Ok(vec![pageview("a", 1000), pageview("a", 1060)])
            } else {
                anyhow::bail!("disk gone")
            }
        }
        async fn ping(&self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn previous_range_has_equal_length() {
        let range = TimeRange::new(at(100), at(400));
        assert_eq!(range.previous(), Some(TimeRange::new(at(-200), at(100))));
        assert!(range.contains(at(100)));
        assert!(!range.contains(at(400)));
    }

    #[test]
    fn ranges_at_the_calendar_edge_are_rejected() {
        let first = DateTime::<Utc>::MIN_UTC;
        assert_eq!(TimeRange::ending_at(first, Duration::seconds(1)), None);
        assert_eq!(TimeRange::new(first, at(0)).previous(), None);
        for period in [Period::Hour, Period::Day, Period::Week, Period::Month] {
            assert!(matches!(
                stats_range(period, first),
                Err(CoreError::DateOutOfRange(date)) if date == first
            ));
        }
        // The range itself fits but the one before it does not.
        let near_start = first + Duration::days(10);
        assert!(stats_range(Period::Week, near_start).is_err());
        assert!(stats_range(Period::Day, near_start).is_ok());
        assert!(graph_range(Period::Month, DateTime::<Utc>::MAX_UTC).is_none());
    }

    #[test]
    fn unknown_periods_fall_back() {
        assert_eq!(stats_period(None), Period::Day);
        assert_eq!(
            stats_range(stats_period(Some(Period::Week)), at(0)).unwrap(),
            TimeRange::new(at(-7 * 86_400), at(0))
        );
        assert_eq!(graph_period(None), Period::Month);
        assert_eq!(graph_period(Some(Period::Hour)), Period::Hour);
    }

    #[test]
    fn graph_range_ends_at_next_boundary() {
        let now = Utc.with_ymd_and_hms(2024, 5, 10, 13, 42, 0).unwrap();
        let daily = graph_range(Period::Week, now).unwrap();
        assert_eq!(daily.to, Utc.with_ymd_and_hms(2024, 5, 11, 0, 0, 0).unwrap());
        assert_eq!(daily.from, Utc.with_ymd_and_hms(2024, 5, 4, 0, 0, 0).unwrap());

        let hourly = graph_range(Period::Day, now).unwrap();
        assert_eq!(hourly.to, Utc.with_ymd_and_hms(2024, 5, 10, 14, 0, 0).unwrap());
        assert_eq!(hourly.duration(), Duration::hours(24));
    }

    #[test]
    fn build_event_extracts_attribution() {
        let mut p = payload("pageview", "https://x.test/pricing?utm_source=news&utm_medium=mail");
        p.referrer = Some("https://news.test/issue/4?id=9#top".to_string());
        let event = build_event(p, "abc", at(0)).unwrap();
        assert_eq!(event.url, "https://x.test/pricing");
        assert!(event.name.is_pageview());
        match event.attribution {
            Attribution::Campaign { referrer, utm } => {
                assert_eq!(referrer.as_deref(), Some("https://news.test/issue/4"));
                assert_eq!(utm.source, "news");
                assert_eq!(utm.medium, "mail");
                assert_eq!(utm.campaign, "");
            }
            other => panic!("expected campaign, got {other:?}"),
        }
    }

    #[test]
    fn build_event_rejects_bad_input() {
        assert!(matches!(
            build_event(payload("  ", "https://x.test/"), "abc", at(0)),
            Err(CoreError::InvalidEvent(_))
        ));
        assert!(matches!(
            build_event(payload("pageview", "not a url"), "abc", at(0)),
            Err(CoreError::InvalidUrl { .. })
        ));

        let mut big = payload("signup", "https://x.test/");
        let mut props = serde_json::Map::new();
        props.insert("blob".to_string(), "x".repeat(MAX_PROPS_BYTES).into());
        big.props = Some(props);
        assert!(matches!(
            build_event(big, "abc", at(0)),
            Err(CoreError::InvalidEvent(_))
        ));

        let mut paid = payload("purchase", "https://x.test/");
        paid.revenue = Some(Revenue {
            amount: 9.5,
            currency: String::new(),
        });
        assert!(build_event(paid, "abc", at(0)).is_err());
    }

    #[tokio::test]
    async fn ingest_absorbs_repeat_identity() {
        let store = Arc::new(MemoryStore::new());
        let analytics = Analytics::new(store.clone(), Sessionizer::default());
        let record = identity("a", at(0));
        analytics.ingest(&record, &pageview("a", 0)).await.unwrap();
        analytics.ingest(&record, &pageview("a", 30)).await.unwrap();
        assert_eq!(store.event_count().await, 2);
        assert_eq!(store.identity("a").await, Some(record));
    }

    #[tokio::test]
    async fn stats_compare_with_previous_range() {
        let analytics = analytics_with(&[
            pageview("old", 100),
            pageview("old", 160),
            pageview("new", 4000),
            pageview("new", 4030),
            pageview("other", 5000),
        ])
        .await;

        let range = TimeRange::new(at(3600), at(7200));
        let delta = analytics.stats(&range).await.unwrap();
        assert_eq!(delta.page_views, MetricDelta { value: 3, change: 1 });
        assert_eq!(delta.unique_visitors, MetricDelta { value: 2, change: 1 });
        assert_eq!(delta.bounces, MetricDelta { value: 1, change: 1 });
        // 30s over two identities now, 60s over one before.
        assert_eq!(
            delta.average_session_length_seconds,
            MetricDelta { value: 15, change: -45 }
        );
    }

    #[tokio::test]
    async fn stats_without_previous_data_have_zero_change() {
        let analytics = analytics_with(&[pageview("a", 4000), pageview("b", 4100)]).await;
        let delta = analytics
            .stats(&TimeRange::new(at(3600), at(7200)))
            .await
            .unwrap();
        assert_eq!(delta.unique_visitors, MetricDelta { value: 2, change: 0 });
        assert_eq!(delta.page_views.change, 0);
    }

    #[tokio::test]
    async fn failed_previous_read_zeroes_change() {
        let analytics = Analytics::new(Arc::new(FailingStore), Sessionizer::default());
        let delta = analytics
            .stats(&TimeRange::new(at(1000), at(2000)))
            .await
            .unwrap();
        assert_eq!(delta.page_views, MetricDelta { value: 2, change: 0 });
        assert_eq!(delta.average_session_length_seconds.value, 60);
    }

    #[tokio::test]
    async fn graph_counts_land_in_their_buckets() {
        let now = Utc.with_ymd_and_hms(2024, 5, 10, 13, 42, 0).unwrap();
        let base = (now - at(0)).num_seconds();
        let analytics = analytics_with(&[
            pageview("a", base - 3600),
            pageview("a", base - 3500),
            pageview("b", base),
        ])
        .await;

        let series = analytics.graph(Period::Day, now).await.unwrap();
        assert_eq!(series.buckets.len(), 24);
        assert_eq!(series.buckets[0].timestamp_label, "2024-05-10 13:00 +0000 UTC");
        assert_eq!((series.buckets[0].pageviews, series.buckets[0].visitors), (1, 1));
        assert_eq!((series.buckets[1].pageviews, series.buckets[1].visitors), (2, 1));
        assert!(series.buckets[2..].iter().all(|b| b.pageviews == 0));
    }
}
