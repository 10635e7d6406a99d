//! Error types for NeuroPlay analytics

use thiserror::Error;

/// Errors that can occur while scoring sessions or aggregating progress
#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Malformed input in `{field}`: {reason}")]
    MalformedInput { field: String, reason: String },

    #[error("Concurrent update conflict for player {player_id} after {attempts} attempts")]
    ConcurrentUpdateConflict { player_id: String, attempts: u32 },

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl AnalyticsError {
    pub(crate) fn malformed(field: impl Into<String>, reason: impl Into<String>) -> Self {
        AnalyticsError::MalformedInput {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        AnalyticsError::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Whether retrying the whole submission may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, AnalyticsError::ConcurrentUpdateConflict { .. })
    }
}
