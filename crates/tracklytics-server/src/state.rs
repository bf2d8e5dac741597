use std::sync::Arc;

use tracklytics_core::{
    analytics::Analytics, config::Config, sessionize::Sessionizer, store::EventStore,
    visitor::ClientClassifier,
};
use tracklytics_duckdb::DuckDbBackend;

use crate::classify::WootheeClassifier;

/// Shared application state injected into every Axum handler via
/// [`axum::extract::State`].
///
/// Nothing here holds per-visitor or per-session data: every query rebuilds
/// sessions from the store.
pub struct AppState {
    /// Ingestion and sessionized queries over the event store.
    pub analytics: Analytics,

    /// Parsed configuration, loaded once at startup from environment variables.
    pub config: Arc<Config>,

    /// User-Agent classifier used by the identity resolver.
    pub classifier: Arc<dyn ClientClassifier>,
}

impl AppState {
    /// Construct a new `AppState` over the DuckDB backend.
    pub fn new(db: DuckDbBackend, config: Config) -> Self {
        Self::with_store(Arc::new(db), config)
    }

    /// Construct a new `AppState` over any event store.
    pub fn with_store(store: Arc<dyn EventStore>, config: Config) -> Self {
        let sessionizer = Sessionizer::new(config.session_config());
        Self {
            analytics: Analytics::new(store, sessionizer),
            config: Arc::new(config),
            classifier: Arc::new(WootheeClassifier),
        }
    }
}
