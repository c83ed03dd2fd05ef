//! Error types and result handling for the event core.
//!
//! Covers persistence failures, hook response schema violations, and
//! serialization problems. Delivery-side errors live in `gatehouse-hook`;
//! this crate only knows about the vocabulary and the store.

use thiserror::Error;

/// Result type alias using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core error type for event model and store operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Database operation failed.
    ///
    /// A store failure inside a commit hook is fatal to the enclosing
    /// transaction: the caller must roll back rather than commit with
    /// missing event records.
    #[error("database error: {0}")]
    Database(String),

    /// Entity not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Hook response violated the per-event-type schema.
    ///
    /// Sending a field the event type does not advertise is a hard error,
    /// never silently ignored.
    #[error("hook response schema violation: {0}")]
    SchemaViolation(String),

    /// JSON serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl CoreError {
    /// Creates a database error from a message.
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database(message.into())
    }

    /// Creates a schema violation error from a message.
    pub fn schema_violation(message: impl Into<String>) -> Self {
        Self::SchemaViolation(message.into())
    }
}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound("requested entity not found".to_string()),
            _ => Self::Database(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
