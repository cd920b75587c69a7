//! Request shaping - endpoint templates, query strings and body encoding.
//!
//! Pure and non-suspending: everything that can be rejected about an input is
//! rejected here, before the executor touches the network.

use serde_json::{Map, Value};

use crate::definition::{BodyFormat, ToolDefinition};
use crate::types::{Error, Result};

/// Encoded request body.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Json(Value),
    Form(Vec<(String, String)>),
    Raw(String),
}

/// Everything the executor needs besides auth and headers.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRequest {
    pub url: String,
    pub query: Vec<(String, String)>,
    pub body: Option<RequestBody>,
}

/// Shape `input` into a request for `definition`.
pub fn prepare(definition: &ToolDefinition, input: &Value) -> Result<PreparedRequest> {
    let (url, consumed) = fill_template(&definition.api_endpoint, input)?;

    let remaining: Option<Map<String, Value>> = input.as_object().map(|obj| {
        obj.iter()
            .filter(|(k, _)| !consumed.contains(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    });

    if !definition.method.carries_body() {
        let query = match (input, remaining) {
            (Value::Null, _) => Vec::new(),
            (_, Some(fields)) => to_pairs(&fields),
            (other, None) => {
                return Err(Error::validation(format!(
                    "{} input must be an object of query parameters, got {}",
                    definition.method,
                    crate::definition::auth::json_type_name(other)
                )))
            }
        };
        return Ok(PreparedRequest {
            url,
            query,
            body: None,
        });
    }

    let body = match definition.body_format {
        BodyFormat::Json => match remaining {
            Some(fields) => RequestBody::Json(Value::Object(fields)),
            None => RequestBody::Json(input.clone()),
        },
        BodyFormat::Form => match remaining {
            Some(fields) => RequestBody::Form(to_pairs(&fields)),
            None => {
                return Err(Error::validation(
                    "form bodies require an object input of key/value pairs",
                ))
            }
        },
        BodyFormat::Text | BodyFormat::Xml => RequestBody::Raw(raw_body(input)?),
    };

    Ok(PreparedRequest {
        url,
        query: Vec::new(),
        body: Some(body),
    })
}

/// Text and XML bodies: a bare string, or `{"body": "<string>"}`.
fn raw_body(input: &Value) -> Result<String> {
    match input {
        Value::String(s) => Ok(s.clone()),
        Value::Object(obj) => match obj.get("body") {
            Some(Value::String(s)) => Ok(s.clone()),
            _ => Err(Error::validation(
                "text/xml input must be a string or an object with a string 'body' field",
            )),
        },
        _ => Err(Error::validation(
            "text/xml input must be a string or an object with a string 'body' field",
        )),
    }
}

/// Replace `{name}` placeholders with percent-encoded input values.
fn fill_template(endpoint: &str, input: &Value) -> Result<(String, Vec<String>)> {
    if !endpoint.contains('{') {
        return Ok((endpoint.to_string(), Vec::new()));
    }

    let mut url = String::with_capacity(endpoint.len());
    let mut consumed = Vec::new();
    let mut missing = Vec::new();
    let mut rest = endpoint;

    while let Some(open) = rest.find('{') {
        let Some(close) = rest[open..].find('}') else {
            break;
        };
        let name = &rest[open + 1..open + close];
        url.push_str(&rest[..open]);

        match input.get(name).and_then(scalar_to_string) {
            Some(value) => {
                url.push_str(&urlencoding::encode(&value));
                consumed.push(name.to_string());
            }
            None => missing.push(format!("input field '{}' is required by apiEndpoint", name)),
        }
        rest = &rest[open + close + 1..];
    }
    url.push_str(rest);

    if !missing.is_empty() {
        return Err(Error::violations_of(missing));
    }
    Ok((url, consumed))
}

/// Key-sorted pairs; nulls dropped, nested values JSON-encoded.
fn to_pairs(fields: &Map<String, Value>) -> Vec<(String, String)> {
    let mut pairs: Vec<(String, String)> = fields
        .iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| {
            let rendered = scalar_to_string(v).unwrap_or_else(|| v.to_string());
            (k.clone(), rendered)
        })
        .collect();
    pairs.sort();
    pairs
}

/// Strings verbatim, numbers and booleans via their JSON rendering.
fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::HttpMethod;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn def(method: HttpMethod, format: BodyFormat, endpoint: &str) -> ToolDefinition {
        let mut d = ToolDefinition::new("t", "T", "d", endpoint);
        d.method = method;
        d.body_format = format;
        d
    }

    #[test]
    fn test_get_uses_query_string() {
        let d = def(HttpMethod::Get, BodyFormat::Json, "https://api.example/weather");
        let req = prepare(&d, &json!({"location": "Paris", "days": 3, "metric": true})).unwrap();
        assert_eq!(req.url, "https://api.example/weather");
        assert_eq!(
            req.query,
            vec![
                ("days".to_string(), "3".to_string()),
                ("location".to_string(), "Paris".to_string()),
                ("metric".to_string(), "true".to_string()),
            ]
        );
        assert_eq!(req.body, None);
    }

    #[test]
    fn test_get_rejects_non_object_input() {
        let d = def(HttpMethod::Get, BodyFormat::Json, "https://api.example/weather");
        assert!(prepare(&d, &json!(["a"])).is_err());
        assert!(prepare(&d, &Value::Null).unwrap().query.is_empty());
    }

    #[test]
    fn test_template_fills_and_consumes() {
        let d = def(HttpMethod::Delete, BodyFormat::Json, "https://api.example/users/{userId}/keys");
        let req = prepare(&d, &json!({"userId": "a b/c", "force": true})).unwrap();
        assert_eq!(req.url, "https://api.example/users/a%20b%2Fc/keys");
        assert_eq!(req.query, vec![("force".to_string(), "true".to_string())]);
    }

    #[test]
    fn test_template_encodes_utf8_and_reserved() {
        let d = def(HttpMethod::Get, BodyFormat::Json, "https://api.example/cities/{name}");
        let req = prepare(&d, &json!({"name": "Zürich?q=1&x"})).unwrap();
        assert_eq!(req.url, "https://api.example/cities/Z%C3%BCrich%3Fq%3D1%26x");
    }

    #[test]
    fn test_template_missing_field() {
        let d = def(HttpMethod::Get, BodyFormat::Json, "https://api.example/users/{userId}");
        let err = prepare(&d, &json!({})).unwrap_err();
        assert!(err.violations()[0].contains("userId"));
    }

    #[test]
    fn test_json_body() {
        let d = def(HttpMethod::Post, BodyFormat::Json, "https://api.example/items");
        let req = prepare(&d, &json!({"name": "x", "tags": ["a"]})).unwrap();
        assert_eq!(req.body, Some(RequestBody::Json(json!({"name": "x", "tags": ["a"]}))));
        assert!(req.query.is_empty());
    }

    #[test]
    fn test_form_body() {
        let d = def(HttpMethod::Put, BodyFormat::Form, "https://api.example/items");
        let req = prepare(&d, &json!({"a": "1", "b": 2})).unwrap();
        assert_eq!(
            req.body,
            Some(RequestBody::Form(vec![
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "2".to_string()),
            ]))
        );
        assert!(prepare(&d, &json!("a=1")).is_err());
    }

    #[test]
    fn test_text_and_xml_pass_through() {
        let text = def(HttpMethod::Post, BodyFormat::Text, "https://api.example/echo");
        let req = prepare(&text, &json!("hello  world\n")).unwrap();
        assert_eq!(req.body, Some(RequestBody::Raw("hello  world\n".to_string())));

        let xml = def(HttpMethod::Post, BodyFormat::Xml, "https://api.example/soap");
        let req = prepare(&xml, &json!({"body": "<a>1</a>"})).unwrap();
        assert_eq!(req.body, Some(RequestBody::Raw("<a>1</a>".to_string())));

        assert!(prepare(&xml, &json!({"a": 1})).is_err());
    }
}
