//! Response validation against compiled JSON Schemas.

use serde_json::Value;
use std::fmt;

use crate::types::{Error, Result};

/// Cap on reported violations per document.
const MAX_VIOLATIONS: usize = 10;

/// A JSON Schema compiled once per tool instance.
pub struct SchemaValidator {
    field: &'static str,
    validator: jsonschema::Validator,
}

impl SchemaValidator {
    /// Compile `schema`; `field` names it in error messages.
    pub fn compile(schema: &Value, field: &'static str) -> Result<Self> {
        let validator = jsonschema::validator_for(schema).map_err(|e| {
            Error::validation(format!("{} is not a valid JSON Schema: {}", field, e))
        })?;
        Ok(Self { field, validator })
    }

    /// Violations of `instance`, empty when valid.
    pub fn violations(&self, instance: &Value) -> Vec<String> {
        self.validator
            .iter_errors(instance)
            .take(MAX_VIOLATIONS)
            .map(|e| e.to_string())
            .collect()
    }

    pub fn is_valid(&self, instance: &Value) -> bool {
        self.validator.is_valid(instance)
    }

    /// `Ok` when valid, otherwise a `Validation` error listing violations.
    pub fn check(&self, instance: &Value) -> Result<()> {
        let violations = self.violations(instance);
        if violations.is_empty() {
            return Ok(());
        }
        Err(Error::violations_of(
            violations
                .into_iter()
                .map(|v| format!("{}: {}", self.field, v))
                .collect(),
        ))
    }
}

impl fmt::Debug for SchemaValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaValidator")
            .field("field", &self.field)
            .finish_non_exhaustive()
    }
}
