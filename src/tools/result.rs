//! Execution results returned to the agent/API layer.
//!
//! Remote failures never escape `execute` as `Err`; they are folded into
//! [`ExecutionResult::error`] so orchestration code can make partial-failure
//! decisions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::Error;

/// Failure class carried inside a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Timeout,
    TransientNetwork,
    Remote,
    RateLimited,
    Cancelled,
    /// Engine-side failure unrelated to the remote endpoint.
    Internal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Timeout => "timeout",
            ErrorKind::TransientNetwork => "transient_network",
            ErrorKind::Remote => "remote",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Internal => "internal",
        }
    }
}

/// Serializable failure attached to an [`ExecutionResult`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionError {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<String>,
}

impl ExecutionError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status_code: None,
            violations: Vec::new(),
        }
    }

    /// Output schema mismatch.
    pub fn output_mismatch(violations: Vec<String>) -> Self {
        Self {
            kind: ErrorKind::Validation,
            message: format!("response does not match outputSchema: {}", violations.join("; ")),
            status_code: None,
            violations,
        }
    }
}

impl From<&Error> for ExecutionError {
    fn from(err: &Error) -> Self {
        let kind = match err {
            Error::Validation(_) | Error::AuthConfig(_) => ErrorKind::Validation,
            Error::Timeout(_) => ErrorKind::Timeout,
            Error::TransientNetwork(_) => ErrorKind::TransientNetwork,
            Error::Remote { .. } => ErrorKind::Remote,
            Error::RateLimited(_) => ErrorKind::RateLimited,
            Error::Cancelled(_) => ErrorKind::Cancelled,
            Error::NotFound(_)
            | Error::Conflict(_)
            | Error::Initialization(_)
            | Error::Store(_)
            | Error::Internal(_)
            | Error::Serialization(_)
            | Error::Io(_) => ErrorKind::Internal,
        };
        let status_code = match err {
            Error::Remote { status, .. } => Some(*status),
            _ => None,
        };
        Self {
            kind,
            message: err.to_string(),
            status_code,
            violations: err.violations().to_vec(),
        }
    }
}

/// Outcome of one `execute` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub tool_id: String,
    pub input: Value,
    pub output: Option<Value>,
    pub error: Option<ExecutionError>,
    pub timestamp: DateTime<Utc>,
    pub duration_ms: u64,
    /// Outbound attempts made (0 when served from cache or rate limited).
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(default)]
    pub cached: bool,
}

impl ExecutionResult {
    /// A result that never reached the network.
    pub fn rejected(tool_id: &str, input: Value, error: ExecutionError) -> Self {
        Self {
            tool_id: tool_id.to_string(),
            input,
            output: None,
            error: Some(error),
            timestamp: Utc::now(),
            duration_ms: 0,
            attempts: 0,
            status_code: None,
            cached: false,
        }
    }

    /// A result served from the response cache.
    pub fn from_cache(tool_id: &str, input: Value, output: Value, status_code: Option<u16>) -> Self {
        Self {
            tool_id: tool_id.to_string(),
            input,
            output: Some(output),
            error: None,
            timestamp: Utc::now(),
            duration_ms: 0,
            attempts: 0,
            status_code,
            cached: true,
        }
    }

    /// Output present and no error attached.
    pub fn is_success(&self) -> bool {
        self.output.is_some() && self.error.is_none()
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_remote_error_keeps_status() {
        let err = ExecutionError::from(&Error::remote(404, "missing"));
        assert_eq!(err.kind, ErrorKind::Remote);
        assert_eq!(err.status_code, Some(404));
    }

    #[test]
    fn test_error_kind_mapping() {
        let cases = [
            (Error::validation("bad input"), ErrorKind::Validation),
            (Error::AuthConfig("no key".into()), ErrorKind::Validation),
            (Error::Timeout("slow".into()), ErrorKind::Timeout),
            (Error::TransientNetwork("reset".into()), ErrorKind::TransientNetwork),
            (Error::RateLimited("busy".into()), ErrorKind::RateLimited),
            (Error::Cancelled("stop".into()), ErrorKind::Cancelled),
            (Error::NotFound("gone".into()), ErrorKind::Internal),
            (Error::Store("down".into()), ErrorKind::Internal),
            (Error::Initialization("no client".into()), ErrorKind::Internal),
            (Error::Internal("bug".into()), ErrorKind::Internal),
        ];
        for (error, kind) in cases {
            assert_eq!(ExecutionError::from(&error).kind, kind, "{}", error);
        }
        assert_eq!(ErrorKind::Internal.as_str(), "internal");
    }

    #[test]
    fn test_result_wire_shape() {
        let result = ExecutionResult::rejected(
            "weather-tool",
            json!({"location": "Paris"}),
            ExecutionError::new(ErrorKind::RateLimited, "slow down"),
        );
        let wire = serde_json::to_value(&result).unwrap();
        assert_eq!(wire["toolId"], "weather-tool");
        assert_eq!(wire["output"], Value::Null);
        assert_eq!(wire["error"]["kind"], "rate_limited");
        assert_eq!(wire["durationMs"], 0);
        assert!(!result.is_success());
    }
}
