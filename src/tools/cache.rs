//! Tool instance cache - per-tenant registries with single-flight builds.
//!
//! Each tenant maps to a slot holding a `OnceCell`. Concurrent first accesses
//! clone the same slot and await one initialization. Invalidation removes
//! the slot; readers that arrive afterwards get a fresh slot and rebuild from
//! the store, so nothing started after an acknowledged mutation can observe
//! the registry that preceded it.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};

use crate::store::ToolStore;
use crate::tools::events::{MutationListener, ToolMutated};
use crate::tools::registry::TenantToolRegistry;
use crate::types::{Result, TenantId};

type Slot = Arc<OnceCell<Arc<TenantToolRegistry>>>;

/// Cache of built tenant registries.
pub struct ToolInstanceCache {
    store: Arc<dyn ToolStore>,
    slots: Mutex<HashMap<TenantId, Slot>>,
    builds: AtomicU64,
}

impl ToolInstanceCache {
    pub fn new(store: Arc<dyn ToolStore>) -> Self {
        Self {
            store,
            slots: Mutex::new(HashMap::new()),
            builds: AtomicU64::new(0),
        }
    }

    /// Cached registry for the tenant, building it on first access.
    ///
    /// A failed build is not cached; the next call retries.
    pub async fn get_or_build(&self, tenant: &TenantId) -> Result<Arc<TenantToolRegistry>> {
        let slot = {
            let mut slots = self.slots.lock().await;
            Arc::clone(slots.entry(tenant.clone()).or_default())
        };

        let registry = slot
            .get_or_try_init(|| async {
                self.builds.fetch_add(1, Ordering::Relaxed);
                TenantToolRegistry::initialize(self.store.as_ref(), tenant)
                    .await
                    .map(Arc::new)
            })
            .await?;
        Ok(Arc::clone(registry))
    }

    /// Drop the tenant's registry. Returns whether one was cached.
    pub async fn invalidate(&self, tenant: &TenantId) -> bool {
        let removed = self.slots.lock().await.remove(tenant);
        let was_built = removed.map_or(false, |slot| slot.initialized());
        tracing::debug!("tenant_registry_invalidated: tenant={} was_built={}", tenant, was_built);
        was_built
    }

    /// Whether a built registry is currently cached for the tenant.
    pub async fn is_cached(&self, tenant: &TenantId) -> bool {
        self.slots
            .lock()
            .await
            .get(tenant)
            .map_or(false, |slot| slot.initialized())
    }

    /// Registry builds started since construction.
    pub fn build_count(&self) -> u64 {
        self.builds.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for ToolInstanceCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolInstanceCache")
            .field("builds", &self.build_count())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl MutationListener for ToolInstanceCache {
    fn name(&self) -> &'static str {
        "instance_cache"
    }

    async fn on_tool_mutated(&self, event: &ToolMutated) {
        self.invalidate(&event.tenant).await;
    }
}
