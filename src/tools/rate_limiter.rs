//! Client-side rate limiting for tools that declare a `rateLimit` policy.
//!
//! Sliding window over the last hour, checked per (tenant, tool) before any
//! network attempt.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, VecDeque};
use tokio::sync::Mutex;

use crate::definition::RateLimitPolicy;
use crate::tools::events::{MutationKind, MutationListener, ToolMutated};
use crate::types::{Error, Result, TenantId};

/// Sliding window for tracking requests.
#[derive(Debug, Default)]
struct SlidingWindow {
    timestamps: VecDeque<DateTime<Utc>>,
}

impl SlidingWindow {
    /// Check if request is allowed under `policy` and record it if so.
    fn check_and_record(&mut self, policy: &RateLimitPolicy, now: DateTime<Utc>) -> Result<()> {
        // Remove timestamps outside the hour window
        let hour_ago = now - Duration::hours(1);
        while let Some(&ts) = self.timestamps.front() {
            if ts < hour_ago {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }

        if let Some(per_hour) = policy.requests_per_hour {
            if self.timestamps.len() >= per_hour as usize {
                return Err(Error::rate_limited(format!(
                    "Rate limit exceeded: {} requests per hour",
                    per_hour
                )));
            }
        }

        let minute_ago = now - Duration::minutes(1);
        let recent_count = self.count_since(minute_ago);
        if recent_count >= policy.requests_per_minute as usize {
            return Err(Error::rate_limited(format!(
                "Rate limit exceeded: {} requests per minute",
                policy.requests_per_minute
            )));
        }

        if let Some(burst) = policy.burst_size {
            let burst_count = self.count_since(now - Duration::seconds(10));
            if burst_count >= burst as usize {
                return Err(Error::rate_limited(format!(
                    "Burst limit exceeded: {} requests per 10 seconds",
                    burst
                )));
            }
        }

        self.timestamps.push_back(now);
        Ok(())
    }

    fn count_since(&self, cutoff: DateTime<Utc>) -> usize {
        self.timestamps.iter().filter(|&&ts| ts >= cutoff).count()
    }
}

/// Per-tenant, per-tool request budgets.
#[derive(Debug, Default)]
pub struct ToolRateLimiter {
    windows: Mutex<HashMap<(TenantId, String), SlidingWindow>>,
}

impl ToolRateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit one request for the tool, or fail with `RateLimited`.
    pub async fn check(&self, tenant: &TenantId, tool_id: &str, policy: &RateLimitPolicy) -> Result<()> {
        self.check_at(tenant, tool_id, policy, Utc::now()).await
    }

    async fn check_at(
        &self,
        tenant: &TenantId,
        tool_id: &str,
        policy: &RateLimitPolicy,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut windows = self.windows.lock().await;
        windows
            .entry((tenant.clone(), tool_id.to_string()))
            .or_default()
            .check_and_record(policy, now)
    }

    pub async fn clear_tool(&self, tenant: &TenantId, tool_id: &str) {
        self.windows
            .lock()
            .await
            .remove(&(tenant.clone(), tool_id.to_string()));
    }
}

#[async_trait]
impl MutationListener for ToolRateLimiter {
    fn name(&self) -> &'static str {
        "rate_limiter"
    }

    async fn on_tool_mutated(&self, event: &ToolMutated) {
        if event.kind == MutationKind::Deleted {
            self.clear_tool(&event.tenant, &event.tool_id).await;
        }
    }
}
