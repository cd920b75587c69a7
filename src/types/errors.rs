//! Application error types.
//!
//! All errors use `thiserror` for automatic Error trait derivation and provide
//! clear error messages with context.

use thiserror::Error;

/// Application result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error enum for the tool engine.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed definition or input. Carries every violation found.
    #[error("validation error: {}", .0.join("; "))]
    Validation(Vec<String>),

    /// Unknown tool or tenant.
    #[error("not found: {0}")]
    NotFound(String),

    /// A tool with the same id already exists for the tenant.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Unsupported or malformed authentication block.
    #[error("auth config error: {0}")]
    AuthConfig(String),

    /// Outbound call exceeded the tool's timeout.
    #[error("timeout: {0}")]
    Timeout(String),

    /// Connection-level failure or retryable remote status.
    #[error("transient network error: {0}")]
    TransientNetwork(String),

    /// Terminal non-2xx response.
    #[error("remote error (status {status}): {message}")]
    Remote { status: u16, message: String },

    /// Client-side rate limit exhausted.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Store unreachable while building a tenant registry.
    #[error("initialization error: {0}")]
    Initialization(String),

    /// Store read/write failure outside of initialization.
    #[error("store error: {0}")]
    Store(String),

    /// Caller cancelled the operation.
    #[error("operation cancelled: {0}")]
    Cancelled(String),

    /// Internal errors.
    #[error("internal error: {0}")]
    Internal(String),

    /// Serialization/deserialization errors.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O errors.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the executor may retry after this failure.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Timeout(_) | Error::TransientNetwork(_) => true,
            Error::Remote { status, .. } => crate::tools::retry::is_retryable_status(*status),
            _ => false,
        }
    }

    /// Stable error code for the IPC wire protocol.
    pub fn to_ipc_error_code(&self) -> &'static str {
        match self {
            Error::Validation(_) | Error::AuthConfig(_) => "INVALID_ARGUMENT",
            Error::NotFound(_) => "NOT_FOUND",
            Error::Conflict(_) => "ALREADY_EXISTS",
            Error::Remote { .. } => "FAILED_PRECONDITION",
            Error::Timeout(_) => "DEADLINE_EXCEEDED",
            Error::TransientNetwork(_) | Error::Initialization(_) | Error::Store(_) => {
                "UNAVAILABLE"
            }
            Error::RateLimited(_) => "RESOURCE_EXHAUSTED",
            Error::Cancelled(_) => "CANCELLED",
            Error::Internal(_) | Error::Serialization(_) | Error::Io(_) => "INTERNAL",
        }
    }

    /// Violations carried by a validation error (empty for other kinds).
    pub fn violations(&self) -> &[String] {
        match self {
            Error::Validation(v) => v,
            _ => &[],
        }
    }
}

// Convenience constructors
impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(vec![msg.into()])
    }

    pub fn violations_of(violations: Vec<String>) -> Self {
        Self::Validation(violations)
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn auth_config(msg: impl Into<String>) -> Self {
        Self::AuthConfig(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        Self::TransientNetwork(msg.into())
    }

    pub fn remote(status: u16, msg: impl Into<String>) -> Self {
        Self::Remote {
            status,
            message: msg.into(),
        }
    }

    pub fn rate_limited(msg: impl Into<String>) -> Self {
        Self::RateLimited(msg.into())
    }

    pub fn initialization(msg: impl Into<String>) -> Self {
        Self::Initialization(msg.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    pub fn cancelled(msg: impl Into<String>) -> Self {
        Self::Cancelled(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_message_joins_violations() {
        let err = Error::violations_of(vec![
            "id is required".to_string(),
            "name is required".to_string(),
        ]);
        assert_eq!(
            err.to_string(),
            "validation error: id is required; name is required"
        );
        assert_eq!(err.violations().len(), 2);
    }

    #[test]
    fn test_retryable_classification() {
        assert!(Error::timeout("slow").is_retryable());
        assert!(Error::transient("reset").is_retryable());
        assert!(Error::remote(503, "down").is_retryable());
        assert!(Error::remote(429, "slow down").is_retryable());
        assert!(!Error::remote(404, "missing").is_retryable());
        assert!(!Error::remote(400, "bad").is_retryable());
        assert!(!Error::auth_config("bad tag").is_retryable());
    }

    #[test]
    fn test_ipc_error_codes() {
        assert_eq!(Error::not_found("x").to_ipc_error_code(), "NOT_FOUND");
        assert_eq!(Error::conflict("x").to_ipc_error_code(), "ALREADY_EXISTS");
        assert_eq!(Error::auth_config("x").to_ipc_error_code(), "INVALID_ARGUMENT");
        assert_eq!(
            Error::initialization("x").to_ipc_error_code(),
            "UNAVAILABLE"
        );
    }
}
