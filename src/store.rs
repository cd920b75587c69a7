//! Tool definition store - the durable per-tenant collaborator.
//!
//! The engine only talks to storage through [`ToolStore`]. Production
//! deployments plug in their own durable backend; [`InMemoryToolStore`]
//! backs tests and the standalone server.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::definition::ToolDefinition;
use crate::types::{Error, Result, TenantId};

/// Durable, per-tenant strongly consistent store of tool definitions.
#[async_trait]
pub trait ToolStore: Send + Sync {
    /// All definitions for the tenant, active or not.
    async fn list(&self, tenant: &TenantId) -> Result<Vec<ToolDefinition>>;

    /// One definition, `None` if absent.
    async fn get(&self, tenant: &TenantId, tool_id: &str) -> Result<Option<ToolDefinition>>;

    /// Insert a new definition. Fails with `Conflict` on a duplicate id.
    async fn create(&self, tenant: &TenantId, definition: ToolDefinition) -> Result<()>;

    /// Replace an existing definition. Fails with `NotFound` if absent.
    async fn update(&self, tenant: &TenantId, tool_id: &str, definition: ToolDefinition) -> Result<()>;

    /// Remove a definition. Fails with `NotFound` if absent.
    async fn delete(&self, tenant: &TenantId, tool_id: &str) -> Result<()>;
}

/// In-memory store keyed by tenant, then tool id.
#[derive(Debug, Default, Clone)]
pub struct InMemoryToolStore {
    tenants: Arc<RwLock<HashMap<TenantId, HashMap<String, ToolDefinition>>>>,
}

impl InMemoryToolStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ToolStore for InMemoryToolStore {
    async fn list(&self, tenant: &TenantId) -> Result<Vec<ToolDefinition>> {
        let tenants = self.tenants.read().await;
        let mut definitions: Vec<ToolDefinition> = tenants
            .get(tenant)
            .map(|tools| tools.values().cloned().collect())
            .unwrap_or_default();
        definitions.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(definitions)
    }

    async fn get(&self, tenant: &TenantId, tool_id: &str) -> Result<Option<ToolDefinition>> {
        let tenants = self.tenants.read().await;
        Ok(tenants.get(tenant).and_then(|tools| tools.get(tool_id)).cloned())
    }

    async fn create(&self, tenant: &TenantId, definition: ToolDefinition) -> Result<()> {
        let mut tenants = self.tenants.write().await;
        let tools = tenants.entry(tenant.clone()).or_default();
        if tools.contains_key(&definition.id) {
            return Err(Error::conflict(format!(
                "tool '{}' already exists for tenant {}",
                definition.id, tenant
            )));
        }
        tools.insert(definition.id.clone(), definition);
        Ok(())
    }

    async fn update(&self, tenant: &TenantId, tool_id: &str, definition: ToolDefinition) -> Result<()> {
        let mut tenants = self.tenants.write().await;
        let slot = tenants
            .get_mut(tenant)
            .and_then(|tools| tools.get_mut(tool_id))
            .ok_or_else(|| Error::not_found(format!("Unknown tool: {}", tool_id)))?;
        *slot = definition;
        Ok(())
    }

    async fn delete(&self, tenant: &TenantId, tool_id: &str) -> Result<()> {
        let mut tenants = self.tenants.write().await;
        tenants
            .get_mut(tenant)
            .and_then(|tools| tools.remove(tool_id))
            .map(|_| ())
            .ok_or_else(|| Error::not_found(format!("Unknown tool: {}", tool_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tenant(s: &str) -> TenantId {
        TenantId::from_string(s).unwrap()
    }

    fn def(id: &str) -> ToolDefinition {
        ToolDefinition::new(id, id, "test tool", "https://api.example/x")
    }

    #[tokio::test]
    async fn test_create_and_list_sorted() {
        let store = InMemoryToolStore::new();
        let t = tenant("org-1");
        store.create(&t, def("b")).await.unwrap();
        store.create(&t, def("a")).await.unwrap();

        let ids: Vec<String> = store.list(&t).await.unwrap().into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_duplicate_create_conflicts() {
        let store = InMemoryToolStore::new();
        let t = tenant("org-1");
        store.create(&t, def("a")).await.unwrap();
        assert!(matches!(store.create(&t, def("a")).await, Err(Error::Conflict(_))));
    }

    #[tokio::test]
    async fn test_tenants_are_isolated() {
        let store = InMemoryToolStore::new();
        store.create(&tenant("org-1"), def("a")).await.unwrap();

        assert!(store.list(&tenant("org-2")).await.unwrap().is_empty());
        assert!(store.get(&tenant("org-2"), "a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_and_delete_missing() {
        let store = InMemoryToolStore::new();
        let t = tenant("org-1");
        assert!(matches!(store.update(&t, "a", def("a")).await, Err(Error::NotFound(_))));
        assert!(matches!(store.delete(&t, "a").await, Err(Error::NotFound(_))));

        store.create(&t, def("a")).await.unwrap();
        store.delete(&t, "a").await.unwrap();
        assert!(store.get(&t, "a").await.unwrap().is_none());
    }
}
