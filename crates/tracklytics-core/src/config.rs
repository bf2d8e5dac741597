use chrono::Duration;

use crate::sessionize::SessionConfig;
use crate::visitor::{Breakpoints, IdentityConfig};

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub data_dir: String,
    /// DuckDB `memory_limit` size string, e.g. `"1GB"` or `"512MB"`.
    pub duckdb_memory_limit: String,
    /// Idle gap after which the next event of an identity opens a new session.
    pub session_timeout: Duration,
    /// Viewport width breakpoints for device classification.
    pub device_breakpoints: Breakpoints,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Ok(Self {
            port: std::env::var("TRACKLYTICS_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|e| format!("invalid port: {e}"))?,
            data_dir: std::env::var("TRACKLYTICS_DATA_DIR")
                .unwrap_or_else(|_| "./data".to_string()),
            duckdb_memory_limit: std::env::var("TRACKLYTICS_DUCKDB_MEMORY")
                .unwrap_or_else(|_| "1GB".to_string()),
            session_timeout: parse_session_timeout(
                &std::env::var("TRACKLYTICS_SESSION_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "1800".to_string()),
            )?,
            device_breakpoints: match std::env::var("TRACKLYTICS_DEVICE_BREAKPOINTS") {
                Ok(raw) => Breakpoints::parse(&raw)?,
                Err(_) => Breakpoints::default(),
            },
        })
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            idle_timeout: self.session_timeout,
        }
    }

    pub fn identity_config(&self) -> IdentityConfig {
        IdentityConfig {
            breakpoints: self.device_breakpoints,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            data_dir: "./data".to_string(),
            duckdb_memory_limit: "1GB".to_string(),
            session_timeout: Duration::minutes(30),
            device_breakpoints: Breakpoints::default(),
        }
    }
}

/// Whole seconds, bounded by what `chrono` can represent.
fn parse_session_timeout(raw: &str) -> Result<Duration, String> {
    let secs: u64 = raw
        .trim()
        .parse()
        .map_err(|e| format!("invalid session timeout: {e}"))?;
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .ok_or_else(|| format!("session timeout out of range: {secs}"))
}
