//! Tool service - the entry point the API/agent layer calls.
//!
//! Owns the instance cache, response cache, rate limiter, usage tracker and
//! the mutation bus wiring them together. Every mutation follows the same
//! order: validate and compile, write to the store, publish `ToolMutated` and
//! await every listener, then acknowledge. An execution that starts after the
//! acknowledgement therefore rebuilds from the new definition.

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::definition::ToolDefinition;
use crate::store::ToolStore;
use crate::tools::{
    CacheKey, CachedResponse, ExecutionError, ExecutionResult, HealthMonitor, HealthRecord,
    HealthSummary, MutationBus, MutationKind, RequestExecutor, ResponseCache, TenantToolRegistry,
    ToolInstance, ToolInstanceCache, ToolMutated, ToolRateLimiter, ToolStats, ToolUsageTracker,
};
use crate::types::{Config, Error, RequestId, Result, TenantId};

// =============================================================================
// Execution context
// =============================================================================

/// Per-request context passed to `execute`.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub tenant: TenantId,
    pub request_id: RequestId,
    /// Fires when the caller goes away; aborts the in-flight outbound call.
    pub cancel: CancellationToken,
}

impl ExecutionContext {
    pub fn new(tenant: TenantId) -> Self {
        Self {
            tenant,
            request_id: RequestId::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_request_id(mut self, request_id: RequestId) -> Self {
        self.request_id = request_id;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

// =============================================================================
// Service
// =============================================================================

/// Dynamic tool engine façade.
pub struct ToolService {
    store: Arc<dyn ToolStore>,
    instances: Arc<ToolInstanceCache>,
    responses: Arc<ResponseCache>,
    limiter: Arc<ToolRateLimiter>,
    usage: Arc<ToolUsageTracker>,
    bus: MutationBus,
    executor: RequestExecutor,
    health: HealthMonitor,
    purge_interval: Duration,
}

impl ToolService {
    pub fn new(store: Arc<dyn ToolStore>, config: &Config) -> Result<Self> {
        let executor = RequestExecutor::new(config.executor.clone())?;
        let health = HealthMonitor::new(executor.client().clone(), &config.health);

        let instances = Arc::new(ToolInstanceCache::new(Arc::clone(&store)));
        let responses = Arc::new(ResponseCache::new(&config.response_cache));
        let limiter = Arc::new(ToolRateLimiter::new());
        let usage = Arc::new(ToolUsageTracker::new(&config.usage));

        let mut bus = MutationBus::new();
        bus.subscribe(instances.clone());
        bus.subscribe(responses.clone());
        bus.subscribe(limiter.clone());
        bus.subscribe(usage.clone());

        Ok(Self {
            store,
            instances,
            responses,
            limiter,
            usage,
            bus,
            executor,
            health,
            purge_interval: config.response_cache.purge_interval,
        })
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Definitions of the tenant's active tools, sorted by id.
    pub async fn list_tools(&self, tenant: &TenantId) -> Result<Vec<Arc<ToolDefinition>>> {
        let registry = self.instances.get_or_build(tenant).await?;
        Ok(registry.list().iter().map(|i| i.definition_arc()).collect())
    }

    /// The compiled instance, or `None` for an unknown or inactive id.
    pub async fn get_tool(&self, tenant: &TenantId, tool_id: &str) -> Result<Option<Arc<ToolInstance>>> {
        Ok(self.instances.get_or_build(tenant).await?.get(tool_id))
    }

    /// The stored definition regardless of status.
    pub async fn get_definition(&self, tenant: &TenantId, tool_id: &str) -> Result<Option<ToolDefinition>> {
        self.store.get(tenant, tool_id).await
    }

    pub async fn registry(&self, tenant: &TenantId) -> Result<Arc<TenantToolRegistry>> {
        self.instances.get_or_build(tenant).await
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Validate, compile and persist a new tool.
    pub async fn create_tool(&self, tenant: &TenantId, definition: ToolDefinition) -> Result<ToolDefinition> {
        ToolInstance::compile(definition.clone())?;
        self.store.create(tenant, definition.clone()).await?;
        self.publish(tenant, &definition.id, MutationKind::Created).await;
        Ok(definition)
    }

    /// Replace a tool with a full definition.
    pub async fn update_tool(
        &self,
        tenant: &TenantId,
        tool_id: &str,
        definition: ToolDefinition,
    ) -> Result<ToolDefinition> {
        let existing = self.require_definition(tenant, tool_id).await?;
        let updated = definition.replacing(&existing)?;
        ToolInstance::compile(updated.clone())?;
        self.store.update(tenant, tool_id, updated.clone()).await?;
        self.publish(tenant, tool_id, MutationKind::Updated).await;
        Ok(updated)
    }

    /// Merge the supplied fields onto a tool.
    pub async fn patch_tool(&self, tenant: &TenantId, tool_id: &str, patch: &Value) -> Result<ToolDefinition> {
        let existing = self.require_definition(tenant, tool_id).await?;
        let patched = existing.merge_patch(patch)?;
        ToolInstance::compile(patched.clone())?;
        self.store.update(tenant, tool_id, patched.clone()).await?;
        self.publish(tenant, tool_id, MutationKind::Patched).await;
        Ok(patched)
    }

    /// Remove a tool. Unknown ids are `NotFound`.
    pub async fn delete_tool(&self, tenant: &TenantId, tool_id: &str) -> Result<()> {
        self.store.delete(tenant, tool_id).await?;
        self.publish(tenant, tool_id, MutationKind::Deleted).await;
        Ok(())
    }

    async fn require_definition(&self, tenant: &TenantId, tool_id: &str) -> Result<ToolDefinition> {
        self.store
            .get(tenant, tool_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("tool '{}' not found", tool_id)))
    }

    async fn publish(&self, tenant: &TenantId, tool_id: &str, kind: MutationKind) {
        self.bus
            .publish(ToolMutated::new(tenant.clone(), tool_id, kind))
            .await;
        tracing::info!("tool_mutation_committed: tenant={} tool={} kind={:?}", tenant, tool_id, kind);
    }

    // =========================================================================
    // Execution
    // =========================================================================

    /// Execute a tool.
    ///
    /// `Err` only for pre-call problems: unknown tool, input rejected by the
    /// input schema or unencodable, unreachable store. Everything that
    /// happens on the wire is reported inside the result.
    pub async fn execute(&self, ctx: &ExecutionContext, tool_id: &str, input: Value) -> Result<ExecutionResult> {
        // Read before the registry so a racing mutation invalidates our insert.
        let generation = self.responses.generation(&ctx.tenant).await;

        let registry = self.instances.get_or_build(&ctx.tenant).await?;
        let instance = registry
            .get(tool_id)
            .ok_or_else(|| Error::not_found(format!("tool '{}' not found for tenant {}", tool_id, ctx.tenant)))?;
        let prepared = self.executor.prepare(&instance, &input)?;
        let definition = instance.definition();

        let cache_key = definition
            .cache
            .enabled
            .then(|| CacheKey::new(&ctx.tenant, tool_id, &input));
        if let Some(key) = &cache_key {
            if let Some(hit) = self.responses.get(key).await {
                tracing::debug!("response_cache_hit: tenant={} tool={}", ctx.tenant, tool_id);
                return Ok(ExecutionResult::from_cache(tool_id, input, hit.output, hit.status_code));
            }
        }

        if let Some(policy) = &definition.rate_limit {
            if let Err(err) = self.limiter.check(&ctx.tenant, tool_id, policy).await {
                tracing::warn!("tool_rate_limited: tenant={} tool={} error={}", ctx.tenant, tool_id, err);
                let result = ExecutionResult::rejected(tool_id, input, ExecutionError::from(&err));
                self.usage
                    .record(&ctx.tenant, tool_id, false, 0, result.error_kind())
                    .await;
                return Ok(result);
            }
        }

        let span = tracing::info_span!(
            "tool_execute",
            tenant = %ctx.tenant,
            tool = %tool_id,
            request_id = %ctx.request_id
        );
        let result = self
            .executor
            .send(&instance, &prepared, input, &ctx.cancel)
            .instrument(span)
            .await;

        self.usage
            .record(
                &ctx.tenant,
                tool_id,
                result.is_success(),
                result.duration_ms,
                result.error_kind(),
            )
            .await;

        if let (Some(key), Some(output)) = (cache_key, result.output.as_ref()) {
            if result.error.is_none() {
                let response = CachedResponse {
                    output: output.clone(),
                    status_code: result.status_code,
                };
                self.responses
                    .insert_if_current(key, response, Duration::from_secs(definition.cache.ttl), generation)
                    .await;
            }
        }

        Ok(result)
    }

    // =========================================================================
    // Health and stats
    // =========================================================================

    pub async fn health_check(&self, tenant: &TenantId, tool_id: &str) -> Result<HealthRecord> {
        let registry = self.instances.get_or_build(tenant).await?;
        let instance = registry
            .get(tool_id)
            .ok_or_else(|| Error::not_found(format!("tool '{}' not found", tool_id)))?;
        Ok(self.health.check(&instance).await)
    }

    pub async fn health_check_all(&self, tenant: &TenantId) -> Result<HealthSummary> {
        let registry = self.instances.get_or_build(tenant).await?;
        Ok(self.health.check_all(&registry).await)
    }

    /// Usage statistics for a stored tool.
    pub async fn tool_stats(&self, tenant: &TenantId, tool_id: &str) -> Result<ToolStats> {
        self.require_definition(tenant, tool_id).await?;
        Ok(self.usage.stats(tenant, tool_id).await)
    }

    // =========================================================================
    // Cache control
    // =========================================================================

    /// Drop the tenant's compiled registry.
    pub async fn invalidate(&self, tenant: &TenantId) -> bool {
        self.instances.invalidate(tenant).await
    }

    /// Drop cached responses for the tenant, or for one tool.
    pub async fn invalidate_response_cache(&self, tenant: &TenantId, tool_id: Option<&str>) -> usize {
        self.responses.invalidate(tenant, tool_id).await
    }

    /// Start background sweeping of expired cached responses.
    pub fn start_maintenance(&self, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        Arc::clone(&self.responses).spawn_purger(self.purge_interval, cancel)
    }

    pub fn instance_cache(&self) -> &ToolInstanceCache {
        &self.instances
    }

    pub fn response_cache(&self) -> &ResponseCache {
        &self.responses
    }

    pub fn mutation_bus(&self) -> &MutationBus {
        &self.bus
    }
}

impl std::fmt::Debug for ToolService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolService")
            .field("instances", &self.instances)
            .field("bus", &self.bus)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryToolStore;
    use async_trait::async_trait;
    use mockall::mock;
    use serde_json::json;

    mock! {
        pub Store {}

        #[async_trait]
        impl ToolStore for Store {
            async fn list(&self, tenant: &TenantId) -> Result<Vec<ToolDefinition>>;
            async fn get(&self, tenant: &TenantId, tool_id: &str) -> Result<Option<ToolDefinition>>;
            async fn create(&self, tenant: &TenantId, definition: ToolDefinition) -> Result<()>;
            async fn update(&self, tenant: &TenantId, tool_id: &str, definition: ToolDefinition) -> Result<()>;
            async fn delete(&self, tenant: &TenantId, tool_id: &str) -> Result<()>;
        }
    }

    fn tenant() -> TenantId {
        TenantId::from_string("org-1").unwrap()
    }

    fn def(id: &str) -> ToolDefinition {
        ToolDefinition::new(id, id, "test tool", "https://api.example/x")
    }

    fn service(store: impl ToolStore + 'static) -> ToolService {
        ToolService::new(Arc::new(store), &Config::default()).unwrap()
    }

    #[test]
    fn test_bus_wires_every_cache_layer() {
        let svc = service(InMemoryToolStore::new());
        assert_eq!(
            svc.mutation_bus().listener_names(),
            vec!["instance_cache", "response_cache", "rate_limiter", "usage_tracker"]
        );
    }

    #[tokio::test]
    async fn test_invalid_definition_is_never_persisted() {
        let mut store = MockStore::new();
        store.expect_create().times(0);
        let svc = service(store);

        let err = svc
            .create_tool(&tenant(), ToolDefinition::new("t", "", "", "ftp://nope"))
            .await
            .unwrap_err();
        assert!(err.violations().len() >= 3);
        assert_eq!(svc.mutation_bus().published(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_create_is_conflict() {
        let svc = service(InMemoryToolStore::new());
        svc.create_tool(&tenant(), def("a")).await.unwrap();
        let err = svc.create_tool(&tenant(), def("a")).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
        assert_eq!(svc.mutation_bus().published(), 1);
    }

    #[tokio::test]
    async fn test_create_invalidates_built_registry() {
        let svc = service(InMemoryToolStore::new());
        assert!(svc.list_tools(&tenant()).await.unwrap().is_empty());
        assert!(svc.instance_cache().is_cached(&tenant()).await);

        svc.create_tool(&tenant(), def("a")).await.unwrap();
        assert!(!svc.instance_cache().is_cached(&tenant()).await);
        assert!(svc.get_tool(&tenant(), "a").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_update_and_patch_unknown_are_not_found() {
        let svc = service(InMemoryToolStore::new());
        let update = svc.update_tool(&tenant(), "missing", def("missing")).await;
        assert!(matches!(update, Err(Error::NotFound(_))));
        let patch = svc.patch_tool(&tenant(), "missing", &json!({"name": "x"})).await;
        assert!(matches!(patch, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_update_keeps_created_at() {
        let svc = service(InMemoryToolStore::new());
        let created = svc.create_tool(&tenant(), def("a")).await.unwrap();

        let mut replacement = def("a");
        replacement.description = "v2".to_string();
        let updated = svc.update_tool(&tenant(), "a", replacement).await.unwrap();
        assert_eq!(updated.created_at, created.created_at);

        let live = svc.get_tool(&tenant(), "a").await.unwrap().unwrap();
        assert_eq!(live.definition().description, "v2");
    }

    #[tokio::test]
    async fn test_patch_deactivates_tool() {
        let svc = service(InMemoryToolStore::new());
        svc.create_tool(&tenant(), def("a")).await.unwrap();
        svc.patch_tool(&tenant(), "a", &json!({"status": "inactive"}))
            .await
            .unwrap();

        assert!(svc.get_tool(&tenant(), "a").await.unwrap().is_none());
        assert!(svc.get_definition(&tenant(), "a").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let svc = service(InMemoryToolStore::new());
        let err = svc.delete_tool(&tenant(), "ghost").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert_eq!(err.to_ipc_error_code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_execute_unknown_tool_is_not_found() {
        let svc = service(InMemoryToolStore::new());
        let ctx = ExecutionContext::new(tenant());
        let err = svc.execute(&ctx, "ghost", json!({})).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_execute_surfaces_store_outage() {
        let mut store = MockStore::new();
        store
            .expect_list()
            .returning(|_| Err(Error::store("connection refused")));
        let svc = service(store);

        let err = svc
            .execute(&ExecutionContext::new(tenant()), "t", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Initialization(_)));
    }

    #[tokio::test]
    async fn test_input_schema_rejected_before_call() {
        let svc = service(InMemoryToolStore::new());
        let mut d = def("a");
        d.input_schema = Some(json!({"type": "object", "required": ["location"]}));
        svc.create_tool(&tenant(), d).await.unwrap();

        let err = svc
            .execute(&ExecutionContext::new(tenant()), "a", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(svc.tool_stats(&tenant(), "a").await.unwrap().total_calls, 0);
    }

    #[tokio::test]
    async fn test_rate_limited_execution_makes_no_attempt() {
        let svc = service(InMemoryToolStore::new());
        let mut d = def("a");
        d.api_endpoint = "http://127.0.0.1:9/x".to_string();
        d.rate_limit = Some(crate::definition::RateLimitPolicy {
            requests_per_minute: 1,
            requests_per_hour: None,
            burst_size: None,
        });
        svc.create_tool(&tenant(), d).await.unwrap();
        let ctx = ExecutionContext::new(tenant());

        let first = svc.execute(&ctx, "a", Value::Null).await.unwrap();
        assert_eq!(first.attempts, 1);
        let second = svc.execute(&ctx, "a", Value::Null).await.unwrap();
        assert_eq!(second.attempts, 0);
        assert_eq!(
            second.error_kind(),
            Some(crate::tools::ErrorKind::RateLimited)
        );
    }
}
