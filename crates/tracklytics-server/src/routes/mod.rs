pub mod collect;
pub mod graph;
pub mod health;
pub mod stats;

use crate::error::AppError;

/// Fallback for a known path hit with an unsupported method.
pub async fn method_not_allowed() -> AppError {
    AppError::MethodNotAllowed
}
