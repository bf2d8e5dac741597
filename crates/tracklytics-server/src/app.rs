use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::{header, Method},
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{routes, state::AppState};

/// Construct the Axum [`Router`] with all routes and middleware attached.
///
/// Middleware is applied in outer-to-inner order (outermost runs first on
/// request, last on response):
///
/// 1. `CorsLayer`: any origin may `POST` events and read stats, since the
///    tracking script runs on third-party sites. Preflights are cached 24h.
/// 2. `TraceLayer`: structured request/response logging via `tracing`.
pub fn build_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(routes::health::health))
        .route(
            "/api/event",
            post(routes::collect::collect).fallback(routes::method_not_allowed),
        )
        .route(
            "/api/v1/stats",
            get(routes::stats::stats).fallback(routes::method_not_allowed),
        )
        .route(
            "/api/v1/graph",
            get(routes::graph::graph).fallback(routes::method_not_allowed),
        )
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::POST, Method::OPTIONS])
                .allow_headers([header::CONTENT_TYPE])
                .max_age(Duration::from_secs(24 * 60 * 60)),
        )
        .with_state(state)
}
