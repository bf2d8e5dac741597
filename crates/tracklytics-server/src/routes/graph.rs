use std::sync::Arc;

use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::Deserialize;

use tracklytics_core::{analytics::graph_period, period::Period};

use crate::{error::AppError, state::AppState};

#[derive(Debug, Deserialize)]
pub struct GraphQuery {
    pub period: Option<String>,
}

/// `GET /api/v1/graph`: pageviews and visits per calendar bucket.
///
/// `hour` and `24h` give 24 hourly buckets ending at the next full hour;
/// `7d` gives 7 and anything else 30 daily buckets ending at the next UTC
/// midnight. Buckets are newest first and zero-filled.
#[tracing::instrument(skip(state))]
pub async fn graph(
    State(state): State<Arc<AppState>>,
    Query(query): Query<GraphQuery>,
) -> Result<impl IntoResponse, AppError> {
    let period = graph_period(Period::parse(query.period.as_deref()));
    let series = state.analytics.graph(period, Utc::now()).await?;
    Ok(Json(series))
}
