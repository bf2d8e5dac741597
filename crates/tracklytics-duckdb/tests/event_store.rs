use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use tracklytics_core::analytics::{Analytics, TimeRange};
use tracklytics_core::attribution::{Attribution, Utm};
use tracklytics_core::event::{EventName, IdentityRecord, RawEvent, Revenue};
use tracklytics_core::period::Period;
use tracklytics_core::sessionize::{SessionConfig, Sessionizer};
use tracklytics_core::store::EventStore;
use tracklytics_core::visitor::DeviceClass;
use tracklytics_duckdb::DuckDbBackend;

fn at(secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 10, 0, 0, 0).unwrap() + Duration::seconds(secs)
}

fn identity(id: &str, browser: &str) -> IdentityRecord {
    IdentityRecord {
        identity: id.to_string(),
        language: Some("en".to_string()),
        country: Some("GB".to_string()),
        browser: Some(browser.to_string()),
        os: None,
        device_class: DeviceClass::Laptop,
        created_at: at(0),
    }
}

fn event(id: &str, secs: i64, name: EventName) -> RawEvent {
    RawEvent {
        identity: id.to_string(),
        name,
        url: "https://x.test/".to_string(),
        attribution: Attribution::Direct { referrer: None },
        props: serde_json::Map::new(),
        revenue: None,
        created_at: at(secs),
    }
}

fn pageview(id: &str, secs: i64) -> RawEvent {
    event(id, secs, EventName::Pageview)
}

#[tokio::test]
async fn duplicate_identity_insert_is_silent() {
    let db = DuckDbBackend::open_in_memory().unwrap();
    db.insert_identity(&identity("v1", "Firefox")).await.unwrap();
    db.insert_identity(&identity("v1", "Chrome")).await.unwrap();

    let conn = db.conn_for_test().await;
    let (count, browser): (i64, String) = conn
        .query_row(
            "SELECT COUNT(*), MIN(browser) FROM identities WHERE identity = 'v1'",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    assert_eq!(count, 1);
    assert_eq!(browser, "Firefox");
}

#[tokio::test]
async fn events_round_trip_with_attribution_and_revenue() {
    let db = DuckDbBackend::open_in_memory().unwrap();

    let mut purchase = event("v1", 30, EventName::Custom("purchase".to_string()));
    purchase.attribution = Attribution::Campaign {
        referrer: Some("https://news.test/".to_string()),
        utm: Utm {
            source: "news".to_string(),
            medium: "mail".to_string(),
            ..Utm::default()
        },
    };
    purchase.props.insert("plan".to_string(), serde_json::Value::from("pro"));
    purchase.revenue = Some(Revenue {
        amount: 49.5,
        currency: "EUR".to_string(),
    });

    let mut referral = pageview("v1", 60);
    referral.attribution = Attribution::Referral {
        referrer: "partner".to_string(),
        utm: Utm::default(),
    };

    for e in [pageview("v1", 0), purchase.clone(), referral.clone()] {
        db.insert_event(&e).await.unwrap();
    }

    let events = db
        .events_for_active_identities(&TimeRange::new(at(0), at(3600)))
        .await
        .unwrap();
    assert_eq!(events.len(), 3);
    assert_eq!(events[0], pageview("v1", 0));
    assert_eq!(events[1], purchase);
    assert_eq!(events[2], referral);
}

#[tokio::test]
async fn active_identity_query_returns_full_history_in_order() {
    let db = DuckDbBackend::open_in_memory().unwrap();
    let mut second = pageview("a", 7200);
    second.url = "https://x.test/second".to_string();
    for e in [
        pageview("a", 7200),
        pageview("b", 100),
        second.clone(),
        pageview("a", 0),
        pageview("c", 9000),
    ] {
        db.insert_event(&e).await.unwrap();
    }

    let events = db
        .events_for_active_identities(&TimeRange::new(at(3600), at(8000)))
        .await
        .unwrap();
    let seen: Vec<_> = events
        .iter()
        .map(|e| (e.identity.as_str(), e.created_at, e.url.as_str()))
        .collect();
    assert_eq!(
        seen,
        vec![
            ("a", at(0), "https://x.test/"),
            ("a", at(7200), "https://x.test/"),
            ("a", at(7200), "https://x.test/second"),
        ]
    );
}

#[tokio::test]
async fn range_end_is_exclusive() {
    let db = DuckDbBackend::open_in_memory().unwrap();
    db.insert_event(&pageview("a", 3600)).await.unwrap();
    let events = db
        .events_for_active_identities(&TimeRange::new(at(0), at(3600)))
        .await
        .unwrap();
    assert!(events.is_empty());
}

#[tokio::test]
async fn ping_succeeds_on_open_database() {
    let db = DuckDbBackend::open_in_memory().unwrap();
    db.ping().await.unwrap();
}

#[tokio::test]
async fn analytics_over_duckdb() {
    let db = Arc::new(DuckDbBackend::open_in_memory().unwrap());
    let analytics = Analytics::new(db, Sessionizer::new(SessionConfig::default()));

    analytics
        .ingest(&identity("a", "Firefox"), &pageview("a", 0))
        .await
        .unwrap();
    analytics
        .ingest(&identity("a", "Firefox"), &pageview("a", 60))
        .await
        .unwrap();
    analytics
        .ingest(&identity("a", "Firefox"), &pageview("a", 1960))
        .await
        .unwrap();
    analytics
        .ingest(&identity("b", "Chrome"), &pageview("b", 120))
        .await
        .unwrap();

    let delta = analytics
        .stats(&TimeRange::new(at(0), at(86_400)))
        .await
        .unwrap();
    assert_eq!(delta.page_views.value, 4);
    assert_eq!(delta.unique_visitors.value, 2);
    assert_eq!(delta.sessions.value, 3);
    assert_eq!(delta.bounces.value, 2);
    assert_eq!(delta.average_session_length_seconds.value, 30);
    assert_eq!(delta.page_views.change, 0);

    let series = analytics.graph(Period::Week, at(3600)).await.unwrap();
    assert_eq!(series.buckets.len(), 7);
    assert_eq!(series.buckets[0].timestamp_label, "2024-05-10 00:00 +0000 UTC");
    assert_eq!(series.buckets[0].pageviews, 4);
    assert_eq!(series.buckets[0].visitors, 3);
}
