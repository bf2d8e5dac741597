use std::fmt::Write as _;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    response::{Html, IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use tracklytics_core::{
    aggregate::{MetricDelta, StatsDelta},
    analytics::{stats_period, stats_range},
    period::Period,
};

use crate::{error::AppError, state::AppState};

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    /// End of the range as unix seconds; defaults to now.
    pub date: Option<String>,
    pub period: Option<String>,
}

/// `GET /api/v1/stats`: traffic totals for the period ending at `date`,
/// with the change against the preceding period of equal length.
///
/// Clients that send `HX-Request: true` receive an HTML fragment instead of
/// JSON.
#[tracing::instrument(skip(state, headers))]
pub async fn stats(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<StatsQuery>,
) -> Result<Response, AppError> {
    let date = parse_date(query.date.as_deref())?.unwrap_or_else(Utc::now);
    let period = stats_period(Period::parse(query.period.as_deref()));

    let range = stats_range(period, date)?;
    let delta = state.analytics.stats(&range).await?;

    let wants_html = headers
        .get("hx-request")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == "true");
    if wants_html {
        return Ok(Html(render_fragment(period, &delta)).into_response());
    }
    Ok(Json(delta).into_response())
}

fn parse_date(raw: Option<&str>) -> Result<Option<DateTime<Utc>>, AppError> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    let secs: i64 = raw
        .parse()
        .map_err(|_| AppError::BadRequest(format!("date must be unix seconds, got `{raw}`")))?;
    DateTime::from_timestamp(secs, 0)
        .map(Some)
        .ok_or_else(|| AppError::BadRequest(format!("date out of range: {secs}")))
}

/// Swappable fragment that re-polls itself for the same period.
fn render_fragment(period: Period, delta: &StatsDelta) -> String {
    let mut html = format!(
        r#"<div hx-get="/api/v1/stats?period={}" hx-swap="outerHTML">"#,
        period.as_str()
    );
    for metric in [
        &delta.page_views,
        &delta.unique_visitors,
        &delta.bounces,
        &delta.average_session_length_seconds,
    ] {
        push_metric(&mut html, metric);
    }
    html.push_str("</div>");
    html
}

fn push_metric(html: &mut String, metric: &MetricDelta) {
    let _ = write!(
        html,
        "<h2>{}<span style='font-size: 1rem; margin-left: 2rem;'>{}</span></h2>",
        metric.value, metric.change
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_parsing() {
        assert_eq!(parse_date(None).unwrap(), None);
        assert_eq!(parse_date(Some("")).unwrap(), None);
        assert_eq!(
            parse_date(Some("1700000000")).unwrap(),
            DateTime::from_timestamp(1_700_000_000, 0)
        );
        assert!(parse_date(Some("yesterday")).is_err());
    }

    #[test]
    fn fragment_lists_four_metrics() {
        let delta = StatsDelta {
            page_views: MetricDelta { value: 12, change: 3 },
            ..StatsDelta::default()
        };
        let html = render_fragment(Period::Week, &delta);
        assert!(html.starts_with(r#"<div hx-get="/api/v1/stats?period=7d""#));
        assert_eq!(html.matches("<h2>").count(), 4);
        assert!(html.contains("<h2>12<span"));
        assert!(html.contains(">3</span>"));
    }
}
