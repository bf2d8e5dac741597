use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};

use tracklytics_core::analytics::TimeRange;
use tracklytics_core::attribution::{Attribution, Utm};
use tracklytics_core::event::{EventName, IdentityRecord, RawEvent, Revenue};
use tracklytics_core::store::EventStore;

use crate::DuckDbBackend;

/// DuckDB `TIMESTAMP` literal with microsecond precision.
fn to_db_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S%.6f").to_string()
}

fn parse_datetime(raw: &str) -> Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S"))
        .map(|naive| naive.and_utc())
        .map_err(|_| anyhow!("invalid_datetime: {raw}"))
}

/// One `events` row as read back from DuckDB.
struct EventRow {
    identity: String,
    event_name: String,
    url: String,
    attribution: String,
    referrer: Option<String>,
    utm: [Option<String>; 5],
    props: String,
    revenue_amount: Option<f64>,
    revenue_currency: Option<String>,
    created_at: String,
}

impl EventRow {
    fn into_event(self) -> Result<RawEvent> {
        let name = EventName::parse(&self.event_name)
            .ok_or_else(|| anyhow!("stored event has an empty name"))?;
        let [source, medium, campaign, term, content] = self.utm;
        let utm = Utm {
            source: source.unwrap_or_default(),
            medium: medium.unwrap_or_default(),
            campaign: campaign.unwrap_or_default(),
            term: term.unwrap_or_default(),
            content: content.unwrap_or_default(),
        };
        let revenue = match (self.revenue_amount, self.revenue_currency) {
            (Some(amount), Some(currency)) => Some(Revenue { amount, currency }),
            _ => None,
        };

        Ok(RawEvent {
            identity: self.identity,
            name,
            url: self.url,
            attribution: Attribution::from_parts(&self.attribution, self.referrer, utm),
            props: serde_json::from_str(&self.props)?,
            revenue,
            created_at: parse_datetime(&self.created_at)?,
        })
    }
}

#[async_trait]
impl EventStore for DuckDbBackend {
    async fn insert_identity(&self, record: &IdentityRecord) -> Result<()> {
        let conn = self.conn.lock().await;
        // A visitor sends many events per day; only the first creates the row.
        conn.execute(
            r#"INSERT OR IGNORE INTO identities (
                identity, language, country, browser, os, device_class, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, CAST(?7 AS TIMESTAMP))"#,
            duckdb::params![
                record.identity,
                record.language,
                record.country,
                record.browser,
                record.os,
                record.device_class.as_str(),
                to_db_timestamp(record.created_at),
            ],
        )?;
        Ok(())
    }

    async fn insert_event(&self, event: &RawEvent) -> Result<()> {
        let utm = event.attribution.utm();
        let props = serde_json::to_string(&event.props)?;

        let conn = self.conn.lock().await;
        conn.execute(
            r#"INSERT INTO events (
                id, identity, event_name, url,
                attribution, referrer,
                utm_source, utm_medium, utm_campaign, utm_term, utm_content,
                props, revenue_amount, revenue_currency,
                created_at
            ) VALUES (
                ?1,  ?2,  ?3,  ?4,
                ?5,  ?6,
                ?7,  ?8,  ?9,  ?10, ?11,
                ?12, ?13, ?14,
                CAST(?15 AS TIMESTAMP)
            )"#,
            duckdb::params![
                uuid::Uuid::new_v4().to_string(),
                event.identity,
                event.name.as_str(),
                event.url,
                event.attribution.kind(),
                event.attribution.referrer(),
                utm.map(|u| u.source.as_str()),
                utm.map(|u| u.medium.as_str()),
                utm.map(|u| u.campaign.as_str()),
                utm.map(|u| u.term.as_str()),
                utm.map(|u| u.content.as_str()),
                props,
                event.revenue.as_ref().map(|r| r.amount),
                event.revenue.as_ref().map(|r| r.currency.as_str()),
                to_db_timestamp(event.created_at),
            ],
        )?;
        Ok(())
    }

    async fn events_for_active_identities(&self, range: &TimeRange) -> Result<Vec<RawEvent>> {
        let conn = self.read_conn().await?;
        let mut stmt = conn.prepare(
            r#"SELECT
                identity, event_name, url, attribution, referrer,
                utm_source, utm_medium, utm_campaign, utm_term, utm_content,
                props, revenue_amount, revenue_currency,
                CAST(created_at AS VARCHAR)
            FROM events
            WHERE identity IN (
                SELECT DISTINCT identity FROM events
                WHERE created_at >= CAST(?1 AS TIMESTAMP)
                  AND created_at < CAST(?2 AS TIMESTAMP)
            )
            ORDER BY identity, created_at, seq"#,
        )?;

        let rows = stmt.query_map(
            duckdb::params![to_db_timestamp(range.from), to_db_timestamp(range.to)],
            |row| {
                Ok(EventRow {
                    identity: row.get(0)?,
                    event_name: row.get(1)?,
                    url: row.get(2)?,
                    attribution: row.get(3)?,
                    referrer: row.get(4)?,
                    utm: [row.get(5)?, row.get(6)?, row.get(7)?, row.get(8)?, row.get(9)?],
                    props: row.get(10)?,
                    revenue_amount: row.get(11)?,
                    revenue_currency: row.get(12)?,
                    created_at: row.get(13)?,
                })
            },
        )?;

        let mut events = Vec::new();
        for row in rows {
            events.push(row?.into_event()?);
        }
        tracing::debug!(
            from = %range.from,
            to = %range.to,
            events = events.len(),
            "loaded events for active identities"
        );
        Ok(events)
    }

    /// `SELECT 1` as a lightweight liveness check.
    async fn ping(&self) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute_batch("SELECT 1")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timestamps_survive_the_text_format() {
        let at = Utc.with_ymd_and_hms(2024, 5, 10, 13, 42, 7).unwrap()
            + chrono::Duration::microseconds(1500);
        assert_eq!(parse_datetime(&to_db_timestamp(at)).unwrap(), at);
        assert_eq!(
            parse_datetime("2024-05-10 13:42:07").unwrap(),
            Utc.with_ymd_and_hms(2024, 5, 10, 13, 42, 7).unwrap()
        );
        assert!(parse_datetime("yesterday").is_err());
    }
}
