//! Tool usage tracking.
//!
//! In-memory sliding-window execution statistics per (tenant, tool). Fed by
//! every non-cached `execute` outcome; reset when the tool definition changes
//! so stats never mix two versions of a tool.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use tokio::sync::Mutex;

use crate::tools::events::{MutationListener, ToolMutated};
use crate::tools::result::ErrorKind;
use crate::types::{TenantId, UsageConfig};

// =============================================================================
// Usage record
// =============================================================================

#[derive(Debug, Clone)]
struct UsageRecord {
    success: bool,
    latency_ms: u64,
    error_kind: Option<ErrorKind>,
}

// =============================================================================
// Per-tool window
// =============================================================================

#[derive(Debug)]
struct ToolWindow {
    records: VecDeque<UsageRecord>,
    window_size: usize,
}

impl ToolWindow {
    fn new(window_size: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(window_size),
            window_size,
        }
    }

    fn record(&mut self, record: UsageRecord) {
        if self.records.len() >= self.window_size {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    fn success_rate(&self) -> f64 {
        if self.records.is_empty() {
            return 0.0;
        }
        let ok = self.records.iter().filter(|r| r.success).count();
        ok as f64 / self.records.len() as f64
    }

    fn avg_latency_ms(&self) -> f64 {
        if self.records.is_empty() {
            return 0.0;
        }
        let sum: u64 = self.records.iter().map(|r| r.latency_ms).sum();
        sum as f64 / self.records.len() as f64
    }

    /// Failure counts by kind, most frequent first.
    fn error_patterns(&self) -> Vec<(ErrorKind, usize)> {
        let mut counts: HashMap<ErrorKind, usize> = HashMap::new();
        for record in self.records.iter().filter(|r| !r.success) {
            if let Some(kind) = record.error_kind {
                *counts.entry(kind).or_default() += 1;
            }
        }
        let mut patterns: Vec<(ErrorKind, usize)> = counts.into_iter().collect();
        patterns.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.as_str().cmp(b.0.as_str())));
        patterns
    }
}

// =============================================================================
// Stats
// =============================================================================

/// Usage statistics for one tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolStats {
    pub tool_id: String,
    pub total_calls: usize,
    pub success_rate: f64,
    pub avg_latency_ms: f64,
    pub error_patterns: Vec<(ErrorKind, usize)>,
}

impl ToolStats {
    fn empty(tool_id: &str) -> Self {
        Self {
            tool_id: tool_id.to_string(),
            total_calls: 0,
            success_rate: 0.0,
            avg_latency_ms: 0.0,
            error_patterns: Vec::new(),
        }
    }
}

// =============================================================================
// Tracker
// =============================================================================

/// Sliding-window usage tracker keyed by (tenant, tool).
#[derive(Debug)]
pub struct ToolUsageTracker {
    window_size: usize,
    windows: Mutex<HashMap<(TenantId, String), ToolWindow>>,
}

impl ToolUsageTracker {
    pub fn new(config: &UsageConfig) -> Self {
        Self {
            window_size: config.window_size.max(1),
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Record one execution outcome.
    pub async fn record(
        &self,
        tenant: &TenantId,
        tool_id: &str,
        success: bool,
        latency_ms: u64,
        error_kind: Option<ErrorKind>,
    ) {
        let mut windows = self.windows.lock().await;
        windows
            .entry((tenant.clone(), tool_id.to_string()))
            .or_insert_with(|| ToolWindow::new(self.window_size))
            .record(UsageRecord {
                success,
                latency_ms,
                error_kind,
            });
    }

    pub async fn stats(&self, tenant: &TenantId, tool_id: &str) -> ToolStats {
        let windows = self.windows.lock().await;
        match windows.get(&(tenant.clone(), tool_id.to_string())) {
            None => ToolStats::empty(tool_id),
            Some(w) => ToolStats {
                tool_id: tool_id.to_string(),
                total_calls: w.records.len(),
                success_rate: w.success_rate(),
                avg_latency_ms: w.avg_latency_ms(),
                error_patterns: w.error_patterns(),
            },
        }
    }

    pub async fn reset(&self, tenant: &TenantId, tool_id: &str) {
        self.windows
            .lock()
            .await
            .remove(&(tenant.clone(), tool_id.to_string()));
    }

    /// Number of tracked (tenant, tool) windows.
    pub async fn tracked(&self) -> usize {
        self.windows.lock().await.len()
    }
}

#[async_trait]
impl MutationListener for ToolUsageTracker {
    fn name(&self) -> &'static str {
        "usage_tracker"
    }

    async fn on_tool_mutated(&self, event: &ToolMutated) {
        self.reset(&event.tenant, &event.tool_id).await;
    }
}

// =============================================================================
// Tests
// =============================================================================
