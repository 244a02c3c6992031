//! Error types shared across the matching engine.

use uuid::Uuid;

/// Errors raised while building mappings, talking to upstreams or persisting state.
#[derive(Debug, thiserror::Error)]
pub enum DecoyError {
    #[error("Malformed mapping: {0}")]
    MalformedMapping(String),
    #[error("Invalid pattern '{pattern}' for {matcher}: {reason}")]
    InvalidPattern {
        matcher: String,
        pattern: String,
        reason: String,
    },
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Mapping {0} not found")]
    MappingNotFound(Uuid),
    #[error("Upstream request failed: {0}")]
    Upstream(String),
    #[error("Upstream did not respond within {0} ms")]
    UpstreamTimeout(u64),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl DecoyError {
    pub(crate) fn invalid_pattern(
        matcher: &str,
        pattern: impl Into<String>,
        reason: impl ToString,
    ) -> Self {
        DecoyError::InvalidPattern {
            matcher: matcher.to_string(),
            pattern: pattern.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DecoyError>;
