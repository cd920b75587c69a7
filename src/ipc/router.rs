//! Top-level IPC router - routes by service, delegates to handlers.

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::ipc::handlers;
use crate::service::ToolService;
use crate::types::{Error, Result, TenantId};

/// Route an IPC request to the appropriate service handler.
///
/// `cancel` fires when the connection or server shuts down.
pub async fn route_request(
    tools: &ToolService,
    service: &str,
    method: &str,
    body: Value,
    cancel: &CancellationToken,
) -> Result<Value> {
    match service {
        "tools" => handlers::tools::handle(tools, method, body, cancel).await,
        _ => Err(Error::not_found(format!("Unknown service: {}", service))),
    }
}

// =============================================================================
// Shared helpers
// =============================================================================

pub fn str_field(body: &Value, key: &str) -> Result<String> {
    body.get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| Error::validation(format!("Missing required field: {}", key)))
}

pub fn tenant_field(body: &Value) -> Result<TenantId> {
    TenantId::from_string(str_field(body, "tenant_id")?).map_err(Error::validation)
}

/// Object-valued field, or an error naming it.
pub fn object_field(body: &Value, key: &str) -> Result<Value> {
    match body.get(key) {
        Some(v @ Value::Object(_)) => Ok(v.clone()),
        Some(_) => Err(Error::validation(format!("Field {} must be an object", key))),
        None => Err(Error::validation(format!("Missing required field: {}", key))),
    }
}
