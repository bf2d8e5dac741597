use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, State},
    http::{header, Extensions, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde_json::json;

use tracklytics_core::{
    analytics::build_event,
    event::CollectPayload,
    visitor::{resolve_identity, ClientAddr, ClientRequest, UaHints},
};

use crate::{error::AppError, state::AppState};

/// `POST /api/event`: ingest one pageview or custom event.
///
/// ## Enrichment
/// - `identity`: `sha256(day, ip, user_agent)`; the IP comes from
///   `X-Real-IP`, then `X-Forwarded-For`, then the connection address.
/// - `browser`, `os`: woothee, overridden by `Sec-CH-UA` client hints.
/// - `device_class`: from the `v` viewport against the configured breakpoints.
/// - `language`, `country`: first `lang-REGION` in `Accept-Language`.
/// - `attribution`: `ref` / `utm_*` query parameters and the `r` referrer.
///
/// ## Response
/// `202 Accepted` with `{ "ok": true }`. Malformed bodies and URLs are `400`;
/// a failed store write is `500`.
#[tracing::instrument(skip_all)]
pub async fn collect(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    extensions: Extensions,
    payload: Result<Json<CollectPayload>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(payload) = payload?;

    let header_str = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    let remote_addr = extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string());

    let request = ClientRequest {
        addr: ClientAddr {
            real_ip: header_str("x-real-ip"),
            forwarded_for: header_str("x-forwarded-for"),
            remote_addr: remote_addr.as_deref(),
        },
        user_agent: header_str(header::USER_AGENT.as_str()).unwrap_or(""),
        hints: UaHints {
            brands: header_str("sec-ch-ua"),
            platform: header_str("sec-ch-ua-platform"),
        },
        accept_language: header_str(header::ACCEPT_LANGUAGE.as_str()),
        viewport: payload.viewport.as_deref(),
    };

    let now = Utc::now();
    let identity = resolve_identity(
        &state.config.identity_config(),
        state.classifier.as_ref(),
        &request,
        now,
    );
    let event = build_event(payload, &identity.identity, now)?;

    state.analytics.ingest(&identity, &event).await?;

    Ok((StatusCode::ACCEPTED, Json(json!({ "ok": true }))))
}
