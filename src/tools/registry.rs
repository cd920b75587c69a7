//! Tenant tool registry - the compiled instances for one tenant.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

use crate::store::ToolStore;
use crate::tools::instance::ToolInstance;
use crate::types::{Error, Result, TenantId};

/// Immutable map of tool id to compiled instance for one tenant.
///
/// Built in one pass from the store and replaced wholesale on invalidation.
#[derive(Debug)]
pub struct TenantToolRegistry {
    tenant: TenantId,
    tools: HashMap<String, Arc<ToolInstance>>,
    /// Active definitions that failed to compile, with the reason.
    skipped: Vec<(String, String)>,
    built_at: DateTime<Utc>,
}

impl TenantToolRegistry {
    /// Empty registry.
    pub fn empty(tenant: TenantId) -> Self {
        Self {
            tenant,
            tools: HashMap::new(),
            skipped: Vec::new(),
            built_at: Utc::now(),
        }
    }

    /// Load every active definition for the tenant and compile it.
    ///
    /// A definition that fails to compile is logged and skipped. Only an
    /// unreachable store fails the build.
    pub async fn initialize(store: &dyn ToolStore, tenant: &TenantId) -> Result<Self> {
        let definitions = store.list(tenant).await.map_err(|e| {
            Error::initialization(format!("failed to load tools for tenant {}: {}", tenant, e))
        })?;

        let mut registry = Self::empty(tenant.clone());
        for definition in definitions.into_iter().filter(|d| d.is_active()) {
            let tool_id = definition.id.clone();
            match ToolInstance::compile(definition) {
                Ok(instance) => {
                    registry.tools.insert(tool_id, Arc::new(instance));
                }
                Err(e) => {
                    tracing::warn!(
                        "tool_compile_skipped: tenant={} tool={} error={}",
                        tenant,
                        tool_id,
                        e
                    );
                    registry.skipped.push((tool_id, e.to_string()));
                }
            }
        }

        tracing::debug!(
            "tenant_registry_built: tenant={} tools={} skipped={}",
            tenant,
            registry.tools.len(),
            registry.skipped.len()
        );
        Ok(registry)
    }

    pub fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    pub fn get(&self, tool_id: &str) -> Option<Arc<ToolInstance>> {
        self.tools.get(tool_id).cloned()
    }

    pub fn contains(&self, tool_id: &str) -> bool {
        self.tools.contains_key(tool_id)
    }

    /// All instances sorted by tool id.
    pub fn list(&self) -> Vec<Arc<ToolInstance>> {
        let mut instances: Vec<Arc<ToolInstance>> = self.tools.values().cloned().collect();
        instances.sort_by(|a, b| a.id().cmp(b.id()));
        instances
    }

    pub fn skipped(&self) -> &[(String, String)] {
        &self.skipped
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
