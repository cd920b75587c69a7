//! Tool instances - definitions compiled into executable form.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use std::sync::Arc;

use crate::definition::{AuthInjection, ToolDefinition};
use crate::tools::validator::SchemaValidator;
use crate::types::{Error, Result};

/// Compiled, invokable form of one [`ToolDefinition`].
///
/// Immutable after compilation; a changed definition produces a new instance.
#[derive(Debug)]
pub struct ToolInstance {
    definition: Arc<ToolDefinition>,
    headers: HeaderMap,
    auth: AuthInjection,
    input_validator: Option<SchemaValidator>,
    output_validator: Option<SchemaValidator>,
}

impl ToolInstance {
    /// Validate and compile a definition.
    pub fn compile(definition: ToolDefinition) -> Result<Self> {
        definition.validate()?;

        let mut headers = HeaderMap::with_capacity(definition.headers.len());
        for (name, value) in &definition.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| Error::validation(format!("header name '{}' is invalid", name)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|_| Error::validation(format!("header '{}' has an invalid value", name)))?;
            headers.insert(name, value);
        }

        let auth = definition.authentication.injection();
        if let AuthInjection::Header { name, value } = &auth {
            HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| Error::auth_config(format!("auth header name '{}' is invalid", name)))?;
            HeaderValue::from_str(value)
                .map_err(|_| Error::auth_config("auth credential is not a valid header value"))?;
        }

        let input_validator = definition
            .input_schema
            .as_ref()
            .map(|s| SchemaValidator::compile(s, "inputSchema"))
            .transpose()?;
        let output_validator = definition
            .output_schema
            .as_ref()
            .map(|s| SchemaValidator::compile(s, "outputSchema"))
            .transpose()?;

        Ok(Self {
            definition: Arc::new(definition),
            headers,
            auth,
            input_validator,
            output_validator,
        })
    }

    pub fn id(&self) -> &str {
        &self.definition.id
    }

    pub fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    /// Shared handle to the definition this instance was compiled from.
    pub fn definition_arc(&self) -> Arc<ToolDefinition> {
        Arc::clone(&self.definition)
    }

    /// Static headers declared on the definition.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn auth(&self) -> &AuthInjection {
        &self.auth
    }

    /// Check caller input against `inputSchema`, if declared.
    pub fn validate_input(&self, input: &Value) -> Result<()> {
        match &self.input_validator {
            Some(validator) => validator.check(input),
            None => Ok(()),
        }
    }

    /// Output schema violations when validation is enabled for this tool.
    pub fn output_violations(&self, output: &Value) -> Vec<String> {
        if !self.definition.validation.enabled {
            return Vec::new();
        }
        self.output_validator
            .as_ref()
            .map(|v| v.violations(output))
            .unwrap_or_default()
    }
}
