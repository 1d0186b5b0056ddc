//! Error types for the session coordination engine.
//!
//! Every public operation returns [`Result`]. Construction and lookup failures
//! (configuration, missing session, unknown constraint) are always surfaced;
//! dependency failures are wrapped as [`VigilError::EmbeddingProvider`] or
//! [`VigilError::VectorIndex`].

use std::fmt::Display;

use thiserror::Error;

/// Errors returned by vigil operations.
#[derive(Debug, Error)]
pub enum VigilError {
    /// Missing or invalid configuration (credentials, endpoints, thresholds).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A session is already active in this coordinator.
    #[error("a session is already active: {0}")]
    DuplicateSession(String),

    /// An operation required an active session but none exists.
    #[error("no active session, call session_start first")]
    SessionNotFound,

    /// `lift_constraint` targeted an id that was never tracked.
    #[error("constraint not found: {0}")]
    ConstraintNotFound(String),

    /// The embedding provider failed.
    #[error("embedding provider error: {0}")]
    EmbeddingProvider(String),

    /// The vector index failed.
    #[error("vector index error: {0}")]
    VectorIndex(String),

    /// A request was missing a required field or carried an invalid value.
    #[error("validation error: {0}")]
    Validation(String),
}

/// Result alias for vigil operations.
pub type Result<T, E = VigilError> = std::result::Result<T, E>;

impl VigilError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Wrap an embedding failure, keeping the full cause chain in the message.
    pub fn embedding(err: impl Display) -> Self {
        Self::EmbeddingProvider(format!("{err:#}"))
    }

    /// Wrap a vector index failure, keeping the full cause chain in the message.
    pub fn index(err: impl Display) -> Self {
        Self::VectorIndex(format!("{err:#}"))
    }

    /// Stable machine-readable name for structured error responses.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration_error",
            Self::DuplicateSession(_) => "duplicate_session",
            Self::SessionNotFound => "session_not_found",
            Self::ConstraintNotFound(_) => "constraint_not_found",
            Self::EmbeddingProvider(_) => "embedding_provider_error",
            Self::VectorIndex(_) => "vector_index_error",
            Self::Validation(_) => "validation_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable() {
        assert_eq!(VigilError::SessionNotFound.kind(), "session_not_found");
        assert_eq!(
            VigilError::ConstraintNotFound("c1".into()).kind(),
            "constraint_not_found"
        );
        assert_eq!(VigilError::validation("x").kind(), "validation_error");
    }

    #[test]
    fn wrapped_errors_keep_context() {
        let inner = anyhow::anyhow!("connection refused").context("upsert failed");
        let err = VigilError::index(inner);
        let msg = err.to_string();
        assert!(msg.contains("upsert failed"));
        assert!(msg.contains("connection refused"));
    }
}
