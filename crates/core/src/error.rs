//! Domain error model.

use thiserror::Error;

/// Result type used across the model layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic failures raised while building or
/// replaying aggregates. Storage and transport failures belong to infra.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Malformed construction (caller's fault, never retried).
    #[error("validation failed: {0}")]
    Validation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// No handler is registered for an event type on this aggregate type.
    ///
    /// Always fatal: replay must never skip an event silently.
    #[error("no handler registered for event '{event_type}' on aggregate '{aggregate_type}'")]
    UnhandledEvent {
        aggregate_type: String,
        event_type: String,
    },

    /// A payload could not be encoded or decoded.
    #[error("serialization failed: {0}")]
    Serialization(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn unhandled(aggregate_type: impl Into<String>, event_type: impl Into<String>) -> Self {
        Self::UnhandledEvent {
            aggregate_type: aggregate_type.into(),
            event_type: event_type.into(),
        }
    }

    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization(value.to_string())
    }
}
