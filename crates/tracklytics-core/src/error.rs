use chrono::{DateTime, Utc};
use thiserror::Error;

/// Validation failures raised while turning a client payload into a stored
/// event. The HTTP layer maps every variant to `400 Bad Request`.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid url `{url}`: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("invalid event: {0}")]
    InvalidEvent(String),

    #[error("date out of range: {0}")]
    DateOutOfRange(DateTime<Utc>),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
