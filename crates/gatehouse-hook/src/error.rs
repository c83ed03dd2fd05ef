//! Error types for hook delivery operations.
//!
//! The taxonomy matters to callers: an explicit handler veto (`Disallowed`)
//! must map to a user-facing rejection, while timeouts, bad statuses, and
//! malformed responses are infrastructure failures of the triggering
//! operation and surface as an opaque "could not be completed".

use std::fmt;

use gatehouse_core::CoreError;
use thiserror::Error;

/// Result type alias for hook operations.
pub type Result<T> = std::result::Result<T, HookError>;

/// Failure modes of blocking and non-blocking hook delivery.
#[derive(Debug, Error)]
pub enum HookError {
    /// A handler explicitly vetoed the operation.
    #[error("operation disallowed by hook: {title}")]
    Disallowed {
        /// Short rejection title supplied by the handler.
        title: String,
        /// Human-readable reason intended for end-user display.
        reason: String,
    },

    /// Total chain budget exceeded, or a single transport call timed out.
    #[error("hook delivery timed out after {elapsed_ms}ms")]
    DeliveryTimeout {
        /// Elapsed wall-clock milliseconds when the timeout was detected.
        elapsed_ms: u64,
    },

    /// The endpoint answered with a non-2xx status.
    #[error("hook endpoint returned status {status}")]
    InvalidStatus {
        /// HTTP status code returned by the endpoint.
        status: u16,
    },

    /// The response body could not be parsed.
    #[error("invalid hook response: {message}")]
    InvalidResponse {
        /// What failed to parse.
        message: String,
    },

    /// The response violated the event type's schema.
    #[error("hook response schema violation: {message}")]
    SchemaViolation {
        /// Validation detail.
        message: String,
    },

    /// The sandboxed script executed but raised or returned an error.
    #[error("hook script failed: {error}")]
    ScriptRuntime {
        /// Error message from the script runtime.
        error: String,
        /// Captured standard output, for diagnosis.
        stdout: String,
        /// Captured standard error, for diagnosis.
        stderr: String,
    },

    /// Network-level delivery failure.
    #[error("hook delivery failed: {message}")]
    Network {
        /// Error message describing the failure.
        message: String,
    },

    /// Event store operation failed.
    ///
    /// Inside a commit hook this is fatal to the enclosing transaction.
    #[error("event store error: {0}")]
    Store(#[from] CoreError),

    /// Invalid hook configuration.
    #[error("invalid hook configuration: {message}")]
    Configuration {
        /// Configuration error detail.
        message: String,
    },
}

impl HookError {
    /// Creates a network error from a message.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network { message: message.into() }
    }

    /// Creates an invalid response error from a message.
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse { message: message.into() }
    }

    /// Creates a configuration error from a message.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// Creates a timeout error from an elapsed duration.
    pub fn timeout(elapsed: std::time::Duration) -> Self {
        Self::DeliveryTimeout {
            elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Whether this error carries text meant for end-user display.
    ///
    /// Only an explicit handler veto does; everything else is operator
    /// diagnostics and must not leak to the user.
    pub const fn is_user_facing(&self) -> bool {
        matches!(self, Self::Disallowed { .. })
    }

    /// Whether this failure is expected operational noise rather than an
    /// application bug (candidates for skipping external error reporting).
    pub const fn is_operational(&self) -> bool {
        matches!(
            self,
            Self::DeliveryTimeout { .. }
                | Self::InvalidStatus { .. }
                | Self::InvalidResponse { .. }
                | Self::Network { .. }
        )
    }
}

/// Category of hook failure for logging and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Explicit handler veto.
    Disallowed,
    /// Budget or request timeout.
    Timeout,
    /// Bad status, bad body, or schema violation.
    Response,
    /// Script runtime failure.
    Script,
    /// Network-level failure.
    Network,
    /// Persistence failure.
    Store,
    /// Configuration problem.
    Configuration,
}

impl From<&HookError> for ErrorCategory {
    fn from(error: &HookError) -> Self {
        match error {
            HookError::Disallowed { .. } => Self::Disallowed,
            HookError::DeliveryTimeout { .. } => Self::Timeout,
            HookError::InvalidStatus { .. }
            | HookError::InvalidResponse { .. }
            | HookError::SchemaViolation { .. } => Self::Response,
            HookError::ScriptRuntime { .. } => Self::Script,
            HookError::Network { .. } => Self::Network,
            HookError::Store(_) => Self::Store,
            HookError::Configuration { .. } => Self::Configuration,
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disallowed => write!(f, "disallowed"),
            Self::Timeout => write!(f, "timeout"),
            Self::Response => write!(f, "response"),
            Self::Script => write!(f, "script"),
            Self::Network => write!(f, "network"),
            Self::Store => write!(f, "store"),
            Self::Configuration => write!(f, "configuration"),
        }
    }
}
