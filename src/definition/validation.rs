//! Definition validation helpers.
//!
//! Helpers push human-readable violations into a shared list so a single
//! pass reports every problem with a definition at once.

use serde_json::Value;

use super::auth::json_type_name;

/// Require a non-empty string.
pub fn require_non_empty(value: &str, field: &str, violations: &mut Vec<String>) {
    if value.trim().is_empty() {
        violations.push(format!("{} cannot be empty", field));
    }
}

/// Require that a raw record carries a non-empty string field.
pub fn require_string_field(record: &serde_json::Map<String, Value>, field: &str, violations: &mut Vec<String>) {
    match record.get(field) {
        None | Some(Value::Null) => violations.push(format!("{} is required", field)),
        Some(Value::String(s)) => require_non_empty(s, field, violations),
        Some(other) => violations.push(format!(
            "{} must be a string, got {}",
            field,
            json_type_name(other)
        )),
    }
}

/// Require that an optional raw field is one of a fixed set of strings.
pub fn require_one_of(
    record: &serde_json::Map<String, Value>,
    field: &str,
    allowed: &[&str],
    violations: &mut Vec<String>,
) {
    match record.get(field) {
        None | Some(Value::Null) => {}
        Some(Value::String(s)) if allowed.contains(&s.as_str()) => {}
        Some(Value::String(s)) => violations.push(format!(
            "{} '{}' is not allowed, expected one of: {}",
            field,
            s,
            allowed.join(", ")
        )),
        Some(other) => violations.push(format!(
            "{} must be a string, got {}",
            field,
            json_type_name(other)
        )),
    }
}

/// Require that an optional raw field is a non-negative integer.
pub fn require_non_negative_integer(
    record: &serde_json::Map<String, Value>,
    field: &str,
    violations: &mut Vec<String>,
) {
    match record.get(field) {
        None | Some(Value::Null) => {}
        Some(v) if v.is_u64() => {}
        Some(v) => violations.push(format!("{} must be a non-negative integer, got {}", field, v)),
    }
}

/// Require that a value is positive.
pub fn require_positive(n: u64, field: &str, violations: &mut Vec<String>) {
    if n == 0 {
        violations.push(format!("{} must be positive", field));
    }
}

/// Check that a schema compiles as JSON Schema.
pub fn check_schema(schema: &Value, field: &str, violations: &mut Vec<String>) {
    if !(schema.is_object() || schema.is_boolean()) {
        violations.push(format!(
            "{} must be a JSON Schema object, got {}",
            field,
            json_type_name(schema)
        ));
        return;
    }
    if let Err(e) = jsonschema::validator_for(schema) {
        violations.push(format!("{} is not a valid JSON Schema: {}", field, e));
    }
}

/// Check that an endpoint is an absolute http(s) URL. `{name}` placeholders
/// are allowed anywhere after the host.
pub fn check_endpoint(endpoint: &str, field: &str, violations: &mut Vec<String>) {
    if endpoint.trim().is_empty() {
        return;
    }
    match reqwest::Url::parse(endpoint) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.has_host() => {}
        Ok(url) => violations.push(format!(
            "{} must be an absolute http(s) URL, got scheme '{}'",
            field,
            url.scheme()
        )),
        Err(e) => violations.push(format!("{} is not a valid URL: {}", field, e)),
    }
}
