//! Authentication variants for outbound tool calls.
//!
//! Each variant carries only the fields its scheme needs. Wire records are
//! checked against the per-tag field list before decoding, so a bearer block
//! carrying `username` is rejected instead of silently ignored.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::types::{Error, Result};

/// Where an API key is injected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiKeyLocation {
    #[default]
    Header,
    Query,
}

fn default_api_key_name() -> String {
    "X-API-Key".to_string()
}

/// Closed set of supported authentication schemes.
#[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Authentication {
    #[default]
    None,
    ApiKey {
        key: String,
        #[serde(rename = "in", default)]
        location: ApiKeyLocation,
        #[serde(default = "default_api_key_name")]
        name: String,
    },
    Bearer {
        token: String,
    },
    Basic {
        username: String,
        password: String,
    },
}

/// Resolved injection for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthInjection {
    None,
    Header { name: String, value: String },
    Query { name: String, value: String },
}

impl Authentication {
    /// Decode a wire `authentication` block, rejecting unknown tags and
    /// fields that belong to another tag.
    pub fn from_value(value: &Value) -> Result<Self> {
        let obj = match value {
            Value::Null => return Ok(Authentication::None),
            Value::Object(obj) => obj,
            other => {
                return Err(Error::auth_config(format!(
                    "authentication must be an object, got {}",
                    json_type_name(other)
                )))
            }
        };

        let tag = match obj.get("type") {
            None => return Err(Error::auth_config("authentication.type is required")),
            Some(Value::String(tag)) => tag.as_str(),
            Some(_) => return Err(Error::auth_config("authentication.type must be a string")),
        };

        let allowed: &[&str] = match tag {
            "none" => &[],
            "api_key" => &["key", "in", "name"],
            "bearer" => &["token"],
            "basic" => &["username", "password"],
            other => {
                return Err(Error::auth_config(format!(
                    "unsupported authentication type '{}', expected one of: none, api_key, bearer, basic",
                    other
                )))
            }
        };

        let mut foreign: Vec<&str> = obj
            .keys()
            .map(String::as_str)
            .filter(|k| *k != "type" && !allowed.contains(k))
            .collect();
        if !foreign.is_empty() {
            foreign.sort_unstable();
            return Err(Error::auth_config(format!(
                "fields not valid for '{}' authentication: {}",
                tag,
                foreign.join(", ")
            )));
        }

        let auth: Authentication = serde_json::from_value(value.clone())
            .map_err(|e| Error::auth_config(format!("malformed '{}' authentication: {}", tag, e)))?;
        auth.validate()?;
        Ok(auth)
    }

    /// Check that required credentials are non-empty.
    pub fn validate(&self) -> Result<()> {
        match self {
            Authentication::None => Ok(()),
            Authentication::ApiKey { key, name, .. } => {
                if key.is_empty() {
                    return Err(Error::auth_config("api_key authentication requires a key"));
                }
                if name.trim().is_empty() {
                    return Err(Error::auth_config("api_key authentication requires a name"));
                }
                Ok(())
            }
            Authentication::Bearer { token } => {
                if token.is_empty() {
                    return Err(Error::auth_config("bearer authentication requires a token"));
                }
                Ok(())
            }
            Authentication::Basic { username, .. } => {
                if username.is_empty() {
                    return Err(Error::auth_config("basic authentication requires a username"));
                }
                Ok(())
            }
        }
    }

    /// Wire tag name.
    pub fn kind(&self) -> &'static str {
        match self {
            Authentication::None => "none",
            Authentication::ApiKey { .. } => "api_key",
            Authentication::Bearer { .. } => "bearer",
            Authentication::Basic { .. } => "basic",
        }
    }

    /// Compute the header or query parameter this scheme adds.
    pub fn injection(&self) -> AuthInjection {
        match self {
            Authentication::None => AuthInjection::None,
            Authentication::ApiKey {
                key,
                location: ApiKeyLocation::Header,
                name,
            } => AuthInjection::Header {
                name: name.clone(),
                value: key.clone(),
            },
            Authentication::ApiKey {
                key,
                location: ApiKeyLocation::Query,
                name,
            } => AuthInjection::Query {
                name: name.clone(),
                value: key.clone(),
            },
            Authentication::Bearer { token } => AuthInjection::Header {
                name: "Authorization".to_string(),
                value: format!("Bearer {}", token),
            },
            Authentication::Basic { username, password } => AuthInjection::Header {
                name: "Authorization".to_string(),
                value: format!(
                    "Basic {}",
                    BASE64.encode(format!("{}:{}", username, password))
                ),
            },
        }
    }
}

// Credentials never reach logs.
impl fmt::Debug for Authentication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Authentication::None => f.write_str("None"),
            Authentication::ApiKey { location, name, .. } => f
                .debug_struct("ApiKey")
                .field("location", location)
                .field("name", name)
                .field("key", &"<redacted>")
                .finish(),
            Authentication::Bearer { .. } => f
                .debug_struct("Bearer")
                .field("token", &"<redacted>")
                .finish(),
            Authentication::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
        }
    }
}

pub(crate) fn json_type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bearer_injection() {
        let auth = Authentication::from_value(&json!({"type": "bearer", "token": "abc"})).unwrap();
        assert_eq!(
            auth.injection(),
            AuthInjection::Header {
                name: "Authorization".to_string(),
                value: "Bearer abc".to_string(),
            }
        );
    }

    #[test]
    fn test_basic_injection_is_base64() {
        let auth = Authentication::from_value(
            &json!({"type": "basic", "username": "user", "password": "pass"}),
        )
        .unwrap();
        assert_eq!(
            auth.injection(),
            AuthInjection::Header {
                name: "Authorization".to_string(),
                value: "Basic dXNlcjpwYXNz".to_string(),
            }
        );
    }

    #[test]
    fn test_api_key_defaults_to_header() {
        let auth = Authentication::from_value(&json!({"type": "api_key", "key": "k1"})).unwrap();
        assert_eq!(
            auth.injection(),
            AuthInjection::Header {
                name: "X-API-Key".to_string(),
                value: "k1".to_string(),
            }
        );
    }

    #[test]
    fn test_api_key_in_query() {
        let auth = Authentication::from_value(
            &json!({"type": "api_key", "key": "k1", "in": "query", "name": "appid"}),
        )
        .unwrap();
        assert_eq!(
            auth.injection(),
            AuthInjection::Query {
                name: "appid".to_string(),
                value: "k1".to_string(),
            }
        );
    }

    #[test]
    fn test_unsupported_tag_is_auth_config_error() {
        let err = Authentication::from_value(&json!({"type": "oauth2", "clientId": "x"})).unwrap_err();
        assert!(matches!(err, Error::AuthConfig(_)));
        assert!(err.to_string().contains("oauth2"));
    }

    #[test]
    fn test_foreign_fields_rejected() {
        let err = Authentication::from_value(
            &json!({"type": "bearer", "token": "t", "username": "u"}),
        )
        .unwrap_err();
        assert!(matches!(err, Error::AuthConfig(_)));
        assert!(err.to_string().contains("username"));
    }

    #[test]
    fn test_empty_token_rejected() {
        let err = Authentication::from_value(&json!({"type": "bearer", "token": ""})).unwrap_err();
        assert!(matches!(err, Error::AuthConfig(_)));
    }

    #[test]
    fn test_null_means_none() {
        assert_eq!(
            Authentication::from_value(&Value::Null).unwrap(),
            Authentication::None
        );
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let auth = Authentication::Bearer {
            token: "super-secret".to_string(),
        };
        assert!(!format!("{:?}", auth).contains("super-secret"));
    }
}
