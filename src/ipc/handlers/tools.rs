//! Tools service handler - definitions CRUD, execution, health, stats.
//!
//! Every request body carries `tenant_id`.

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::definition::ToolDefinition;
use crate::ipc::router::{object_field, str_field, tenant_field};
use crate::service::{ExecutionContext, ToolService};
use crate::types::{Error, RequestId, Result};

pub async fn handle(
    service: &ToolService,
    method: &str,
    body: Value,
    cancel: &CancellationToken,
) -> Result<Value> {
    let tenant = tenant_field(&body)?;

    match method {
        "ListTools" => {
            let registry = service.registry(&tenant).await?;
            let tools: Vec<_> = registry.list().iter().map(|i| i.definition_arc()).collect();
            let skipped: Vec<Value> = registry
                .skipped()
                .iter()
                .map(|(id, error)| json!({"id": id, "error": error}))
                .collect();
            Ok(json!({
                "count": tools.len(),
                "tools": tools,
                "skipped": skipped,
                "builtAt": registry.built_at().to_rfc3339(),
            }))
        }

        "GetTool" => {
            let tool_id = str_field(&body, "tool_id")?;
            let tool = service
                .get_tool(&tenant, &tool_id)
                .await?
                .map(|instance| instance.definition_arc());
            Ok(json!({
                "found": tool.is_some(),
                "tool": tool,
            }))
        }

        "CreateTool" => {
            let definition = ToolDefinition::parse(object_field(&body, "tool")?)?;
            let created = service.create_tool(&tenant, definition).await?;
            Ok(json!({ "tool": created }))
        }

        "UpdateTool" => {
            let tool_id = str_field(&body, "tool_id")?;
            let mut record = object_field(&body, "tool")?;
            if let Value::Object(fields) = &mut record {
                fields
                    .entry("id")
                    .or_insert_with(|| Value::String(tool_id.clone()));
            }
            let definition = ToolDefinition::parse(record)?;
            let updated = service.update_tool(&tenant, &tool_id, definition).await?;
            Ok(json!({ "tool": updated }))
        }

        "PatchTool" => {
            let tool_id = str_field(&body, "tool_id")?;
            let patch = object_field(&body, "patch")?;
            let patched = service.patch_tool(&tenant, &tool_id, &patch).await?;
            Ok(json!({ "tool": patched }))
        }

        "DeleteTool" => {
            let tool_id = str_field(&body, "tool_id")?;
            service.delete_tool(&tenant, &tool_id).await?;
            Ok(json!({
                "deleted": true,
                "tool_id": tool_id,
            }))
        }

        "ExecuteTool" => {
            let tool_id = str_field(&body, "tool_id")?;
            let input = body.get("input").cloned().unwrap_or(Value::Null);
            let mut ctx = ExecutionContext::new(tenant).with_cancellation(cancel.child_token());
            if let Ok(request_id) = str_field(&body, "request_id") {
                ctx = ctx.with_request_id(RequestId::from_string(request_id).map_err(Error::validation)?);
            }
            let result = service.execute(&ctx, &tool_id, input).await?;
            Ok(serde_json::to_value(result)?)
        }

        "HealthCheck" => {
            let tool_id = str_field(&body, "tool_id")?;
            let record = service.health_check(&tenant, &tool_id).await?;
            Ok(serde_json::to_value(record)?)
        }

        "HealthCheckAll" => {
            let summary = service.health_check_all(&tenant).await?;
            Ok(serde_json::to_value(summary)?)
        }

        "GetToolStats" => {
            let tool_id = str_field(&body, "tool_id")?;
            let stats = service.tool_stats(&tenant, &tool_id).await?;
            Ok(serde_json::to_value(stats)?)
        }

        "InvalidateResponseCache" => {
            let tool_id = body.get("tool_id").and_then(|v| v.as_str());
            let removed = service.invalidate_response_cache(&tenant, tool_id).await;
            Ok(json!({ "removed": removed }))
        }

        _ => Err(Error::not_found(format!("Unknown tools method: {}", method))),
    }
}
