use std::sync::Arc;
use std::time::Instant;

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub version: &'static str,
    pub store: StoreHealth,
}

#[derive(Debug, Serialize)]
pub struct StoreHealth {
    pub reachable: bool,
    pub ping_ms: u64,
}

/// `GET /health`: pings the event store.
///
/// `200` with `status: "ok"` when the ping succeeds, `503` with
/// `status: "degraded"` otherwise.
#[tracing::instrument(skip(state))]
pub async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthReport>) {
    let started = Instant::now();
    let ping = state.analytics.store().ping().await;
    let ping_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    let (code, status) = match &ping {
        Ok(()) => (StatusCode::OK, "ok"),
        Err(e) => {
            tracing::error!(error = %e, ping_ms, "event store ping failed");
            (StatusCode::SERVICE_UNAVAILABLE, "degraded")
        }
    };
    let report = HealthReport {
        status,
        version: env!("CARGO_PKG_VERSION"),
        store: StoreHealth {
            reachable: ping.is_ok(),
            ping_ms,
        },
    };
    (code, Json(report))
}
