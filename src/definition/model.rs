//! Tool definition record - the declarative description of one external API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

use super::auth::Authentication;
use super::validation::{
    check_endpoint, check_schema, require_non_empty, require_non_negative_integer, require_one_of,
    require_positive, require_string_field,
};
use crate::types::{Error, Result};

// =============================================================================
// Enumerations
// =============================================================================

/// Outbound HTTP verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Delete,
    Patch,
}

impl HttpMethod {
    pub const ALLOWED: [&'static str; 5] = ["GET", "POST", "PUT", "DELETE", "PATCH"];

    /// Whether requests with this verb carry their input as a body.
    pub fn carries_body(self) -> bool {
        matches!(self, HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch)
    }

    pub fn to_reqwest(self) -> reqwest::Method {
        match self {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
            HttpMethod::Patch => reqwest::Method::PATCH,
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_reqwest().as_str())
    }
}

/// Request body encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyFormat {
    #[default]
    Json,
    Form,
    Text,
    Xml,
}

impl BodyFormat {
    pub const ALLOWED: [&'static str; 4] = ["json", "form", "text", "xml"];

    pub fn default_content_type(self) -> &'static str {
        match self {
            BodyFormat::Json => "application/json",
            BodyFormat::Form => "application/x-www-form-urlencoded",
            BodyFormat::Text => "text/plain",
            BodyFormat::Xml => "application/xml",
        }
    }
}

/// Whether a tool is loaded into its tenant's registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    #[default]
    Active,
    Inactive,
}

impl ToolStatus {
    pub const ALLOWED: [&'static str; 2] = ["active", "inactive"];
}

/// Verbs a health probe may use. Only safe methods are representable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProbeMethod {
    Head,
    Get,
    Options,
}

impl ProbeMethod {
    pub fn to_reqwest(self) -> reqwest::Method {
        match self {
            ProbeMethod::Head => reqwest::Method::HEAD,
            ProbeMethod::Get => reqwest::Method::GET,
            ProbeMethod::Options => reqwest::Method::OPTIONS,
        }
    }
}

// =============================================================================
// Policies
// =============================================================================

/// Client-side request budget for a tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitPolicy {
    pub requests_per_minute: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests_per_hour: Option<u32>,
    /// Requests allowed within any 10-second window.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub burst_size: Option<u32>,
}

/// Response cache settings. `ttl` is in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_cache_ttl")]
    pub ttl: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            ttl: default_cache_ttl(),
        }
    }
}

/// Output schema enforcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ValidationSettings {
    #[serde(default)]
    pub enabled: bool,
}

/// Explicit health probe policy.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProbePolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<ProbeMethod>,
    /// Probe URL; defaults to the tool's `apiEndpoint`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

/// Longest response cache lifetime a definition may declare (30 days).
pub const MAX_CACHE_TTL_SECS: u64 = 30 * 24 * 60 * 60;

fn default_cache_ttl() -> u64 {
    300
}

fn default_timeout_ms() -> u64 {
    30_000
}

// =============================================================================
// Tool definition
// =============================================================================

/// Declarative configuration for one external API tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub id: String,
    pub name: String,
    pub description: String,
    pub api_endpoint: String,
    #[serde(default)]
    pub method: HttpMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default)]
    pub body_format: BodyFormat,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub authentication: Authentication,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimitPolicy>,
    /// Per-attempt timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout: u64,
    #[serde(default)]
    pub retries: u32,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub validation: ValidationSettings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
    #[serde(default)]
    pub status: ToolStatus,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check: Option<ProbePolicy>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

/// Fields a patch may never change.
const IMMUTABLE_FIELDS: [&str; 2] = ["createdAt", "updatedAt"];

impl ToolDefinition {
    /// Minimal definition with every optional field at its default.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        api_endpoint: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            api_endpoint: api_endpoint.into(),
            method: HttpMethod::default(),
            content_type: None,
            body_format: BodyFormat::default(),
            headers: BTreeMap::new(),
            authentication: Authentication::None,
            rate_limit: None,
            timeout: default_timeout_ms(),
            retries: 0,
            cache: CacheSettings::default(),
            validation: ValidationSettings::default(),
            input_schema: None,
            output_schema: None,
            status: ToolStatus::Active,
            metadata: Map::new(),
            health_check: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Decode a wire record, enumerating every violation before decoding.
    ///
    /// Absent optional fields take their defaults. Method names are accepted
    /// in any case. Authentication problems surface as `AuthConfig`.
    pub fn parse(value: Value) -> Result<Self> {
        let Value::Object(mut record) = value else {
            return Err(Error::validation("tool definition must be a JSON object"));
        };

        if let Some(Value::String(method)) = record.get_mut("method") {
            *method = method.to_ascii_uppercase();
        }

        let mut violations = Vec::new();
        for field in ["id", "name", "description", "apiEndpoint"] {
            require_string_field(&record, field, &mut violations);
        }
        require_one_of(&record, "method", &HttpMethod::ALLOWED, &mut violations);
        require_one_of(&record, "bodyFormat", &BodyFormat::ALLOWED, &mut violations);
        require_one_of(&record, "status", &ToolStatus::ALLOWED, &mut violations);
        require_non_negative_integer(&record, "timeout", &mut violations);
        require_non_negative_integer(&record, "retries", &mut violations);
        for field in ["inputSchema", "outputSchema"] {
            if let Some(schema) = record.get(field).filter(|v| !v.is_null()) {
                check_schema(schema, field, &mut violations);
            }
        }
        if !violations.is_empty() {
            return Err(Error::violations_of(violations));
        }

        let authentication = record
            .remove("authentication")
            .map(|v| Authentication::from_value(&v))
            .transpose()?
            .unwrap_or_default();

        let mut definition: ToolDefinition = serde_json::from_value(Value::Object(record))
            .map_err(|e| Error::validation(format!("invalid tool definition: {}", e)))?;
        definition.authentication = authentication;
        definition.validate()?;
        Ok(definition)
    }

    /// Validate a typed definition.
    ///
    /// Field violations are reported together as `Validation`; credential
    /// problems as `AuthConfig`.
    pub fn validate(&self) -> Result<()> {
        let mut violations = Vec::new();
        require_non_empty(&self.id, "id", &mut violations);
        require_non_empty(&self.name, "name", &mut violations);
        require_non_empty(&self.description, "description", &mut violations);
        require_non_empty(&self.api_endpoint, "apiEndpoint", &mut violations);
        check_endpoint(&self.api_endpoint, "apiEndpoint", &mut violations);
        require_positive(self.timeout, "timeout", &mut violations);

        if let Some(schema) = &self.input_schema {
            check_schema(schema, "inputSchema", &mut violations);
        }
        if let Some(schema) = &self.output_schema {
            check_schema(schema, "outputSchema", &mut violations);
        }
        if self.validation.enabled && self.output_schema.is_none() {
            violations.push("validation.enabled requires an outputSchema".to_string());
        }
        if self.cache.enabled {
            require_positive(self.cache.ttl, "cache.ttl", &mut violations);
            if self.cache.ttl > MAX_CACHE_TTL_SECS {
                violations.push(format!(
                    "cache.ttl must be at most {} seconds, got {}",
                    MAX_CACHE_TTL_SECS, self.cache.ttl
                ));
            }
        }
        if let Some(content_type) = &self.content_type {
            if reqwest::header::HeaderValue::from_str(content_type).is_err() {
                violations.push(format!("contentType '{}' is not a valid header value", content_type));
            }
        }
        for (name, value) in &self.headers {
            if reqwest::header::HeaderName::from_bytes(name.as_bytes()).is_err() {
                violations.push(format!("header name '{}' is invalid", name));
            }
            if reqwest::header::HeaderValue::from_str(value).is_err() {
                violations.push(format!("header '{}' has an invalid value", name));
            }
        }
        if let Some(limit) = &self.rate_limit {
            require_positive(limit.requests_per_minute.into(), "rateLimit.requestsPerMinute", &mut violations);
            if let Some(hour) = limit.requests_per_hour {
                require_positive(hour.into(), "rateLimit.requestsPerHour", &mut violations);
            }
            if let Some(burst) = limit.burst_size {
                require_positive(burst.into(), "rateLimit.burstSize", &mut violations);
            }
        }
        if let Some(endpoint) = self.health_check.as_ref().and_then(|p| p.endpoint.as_deref()) {
            check_endpoint(endpoint, "healthCheck.endpoint", &mut violations);
        }

        if !violations.is_empty() {
            return Err(Error::violations_of(violations));
        }
        self.authentication.validate()
    }

    /// Content type sent with request bodies.
    pub fn effective_content_type(&self) -> &str {
        self.content_type
            .as_deref()
            .unwrap_or_else(|| self.body_format.default_content_type())
    }

    pub fn is_active(&self) -> bool {
        self.status == ToolStatus::Active
    }

    /// Full replacement of `existing`: identity and creation time carry over.
    pub fn replacing(mut self, existing: &ToolDefinition) -> Result<Self> {
        if self.id.is_empty() {
            self.id = existing.id.clone();
        }
        if self.id != existing.id {
            return Err(Error::validation(format!(
                "id '{}' does not match tool '{}'",
                self.id, existing.id
            )));
        }
        self.created_at = existing.created_at;
        self.updated_at = Utc::now();
        self.validate()?;
        Ok(self)
    }

    /// Merge the supplied top-level fields onto this definition and revalidate.
    pub fn merge_patch(&self, patch: &Value) -> Result<Self> {
        let Value::Object(fields) = patch else {
            return Err(Error::validation("patch must be a JSON object"));
        };
        if let Some(id) = fields.get("id") {
            if id.as_str() != Some(self.id.as_str()) {
                return Err(Error::validation(format!(
                    "id cannot be changed by a patch (tool '{}')",
                    self.id
                )));
            }
        }

        let Value::Object(mut merged) = serde_json::to_value(self)? else {
            return Err(Error::internal("tool definition did not serialize to an object"));
        };
        for (key, value) in fields {
            if IMMUTABLE_FIELDS.contains(&key.as_str()) {
                continue;
            }
            merged.insert(key.clone(), value.clone());
        }

        let mut patched = ToolDefinition::parse(Value::Object(merged))?;
        patched.created_at = self.created_at;
        patched.updated_at = Utc::now();
        Ok(patched)
    }
}
