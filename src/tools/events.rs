//! Mutation bus - one `ToolMutated` event, many cache subscribers.
//!
//! Every mutation path publishes exactly once and awaits delivery to all
//! listeners before acknowledging its caller. Listeners are registered at
//! service construction, so no mutation site can forget a cache layer.

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::types::TenantId;

/// What happened to the tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    Created,
    Updated,
    Patched,
    Deleted,
}

/// A committed change to one tool definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolMutated {
    pub tenant: TenantId,
    pub tool_id: String,
    pub kind: MutationKind,
}

impl ToolMutated {
    pub fn new(tenant: TenantId, tool_id: impl Into<String>, kind: MutationKind) -> Self {
        Self {
            tenant,
            tool_id: tool_id.into(),
            kind,
        }
    }
}

/// A cache layer that must forget state when a tool changes.
#[async_trait]
pub trait MutationListener: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Evict whatever this layer holds for the mutated tool. Must not return
    /// until the eviction is visible to subsequent readers.
    async fn on_tool_mutated(&self, event: &ToolMutated);
}

/// Fan-out of [`ToolMutated`] to every registered listener.
#[derive(Default)]
pub struct MutationBus {
    listeners: Vec<Arc<dyn MutationListener>>,
    published: AtomicU64,
}

impl MutationBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, listener: Arc<dyn MutationListener>) {
        self.listeners.push(listener);
    }

    /// Deliver to all listeners in registration order. Returns the number
    /// of listeners notified.
    pub async fn publish(&self, event: ToolMutated) -> usize {
        for listener in &self.listeners {
            listener.on_tool_mutated(&event).await;
        }
        self.published.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            "tool_mutated: tenant={} tool={} kind={:?} listeners={}",
            event.tenant,
            event.tool_id,
            event.kind,
            self.listeners.len()
        );
        self.listeners.len()
    }

    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    pub fn listener_names(&self) -> Vec<&'static str> {
        self.listeners.iter().map(|l| l.name()).collect()
    }
}

impl fmt::Debug for MutationBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationBus")
            .field("listeners", &self.listener_names())
            .field("published", &self.published())
            .finish()
    }
}
