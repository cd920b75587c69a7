//! Health monitoring - live probes against tool endpoints.
//!
//! Probes are ephemeral: each call issues one lightweight request, records the
//! outcome and returns it. Nothing here mutates tool state.
//!
//! Probe safety: a definition may declare `healthCheck {method, endpoint}`.
//! Without one, GET tools are probed with GET and every other verb with HEAD,
//! so a probe never replays a side-effecting request.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::definition::{AuthInjection, HttpMethod, ProbeMethod, ToolDefinition};
use crate::tools::instance::ToolInstance;
use crate::tools::registry::TenantToolRegistry;
use crate::types::HealthConfig;

// =============================================================================
// Records
// =============================================================================

/// Probe outcome class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeStatus {
    Healthy,
    /// Completed with a 5xx status.
    Unhealthy,
    Timeout,
    /// Connection-level failure.
    Unreachable,
}

/// Result of probing one tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthRecord {
    pub tool_id: String,
    pub healthy: bool,
    pub status: ProbeStatus,
    pub status_code: Option<u16>,
    /// Milliseconds; absent when the probe did not complete.
    pub response_time: Option<u64>,
    pub error: Option<String>,
    pub last_checked: DateTime<Utc>,
}

/// Aggregate over a tenant sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSummary {
    pub total: usize,
    pub healthy: usize,
    pub unhealthy: usize,
    /// Mean over probes that returned a response time; 0 when none did.
    pub average_response_time: f64,
    pub checked_at: DateTime<Utc>,
    pub tools: Vec<HealthRecord>,
}

impl HealthSummary {
    pub fn from_records(mut records: Vec<HealthRecord>) -> Self {
        records.sort_by(|a, b| a.tool_id.cmp(&b.tool_id));
        let healthy = records.iter().filter(|r| r.healthy).count();
        let timings: Vec<u64> = records.iter().filter_map(|r| r.response_time).collect();
        let average_response_time = if timings.is_empty() {
            0.0
        } else {
            timings.iter().sum::<u64>() as f64 / timings.len() as f64
        };
        Self {
            total: records.len(),
            healthy,
            unhealthy: records.len() - healthy,
            average_response_time,
            checked_at: Utc::now(),
            tools: records,
        }
    }
}

// =============================================================================
// Probe target
// =============================================================================

/// Method and URL a probe of `definition` will use.
pub fn probe_target(definition: &ToolDefinition) -> (reqwest::Method, String) {
    let policy = definition.health_check.as_ref();

    let method = policy
        .and_then(|p| p.method)
        .unwrap_or(match definition.method {
            HttpMethod::Get => ProbeMethod::Get,
            _ => ProbeMethod::Head,
        });

    let url = policy
        .and_then(|p| p.endpoint.clone())
        .unwrap_or_else(|| static_prefix(&definition.api_endpoint).to_string());

    (method.to_reqwest(), url)
}

/// Endpoint up to its first `{placeholder}`.
fn static_prefix(endpoint: &str) -> &str {
    match endpoint.find('{') {
        Some(idx) => &endpoint[..idx],
        None => endpoint,
    }
}

// =============================================================================
// Monitor
// =============================================================================

/// Issues probes with the shared outbound client.
#[derive(Debug, Clone)]
pub struct HealthMonitor {
    client: reqwest::Client,
    concurrency: usize,
}

impl HealthMonitor {
    pub fn new(client: reqwest::Client, config: &HealthConfig) -> Self {
        Self {
            client,
            concurrency: config.concurrency.max(1),
        }
    }

    /// Probe one tool, bounded by its own timeout.
    pub async fn check(&self, instance: &ToolInstance) -> HealthRecord {
        let definition = instance.definition();
        let (method, url) = probe_target(definition);
        let timeout = Duration::from_millis(definition.timeout);

        let mut request = self
            .client
            .request(method.clone(), &url)
            .headers(instance.headers().clone());
        match instance.auth() {
            AuthInjection::Header { name, value } => {
                request = request.header(name.as_str(), value.as_str());
            }
            AuthInjection::Query { name, value } => {
                request = request.query(&[(name.as_str(), value.as_str())]);
            }
            AuthInjection::None => {}
        }

        let started = Instant::now();
        let outcome = tokio::time::timeout(timeout, request.send()).await;
        let elapsed = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let mut record = HealthRecord {
            tool_id: instance.id().to_string(),
            healthy: false,
            status: ProbeStatus::Unreachable,
            status_code: None,
            response_time: None,
            error: None,
            last_checked: Utc::now(),
        };

        match outcome {
            Ok(Ok(response)) => {
                let code = response.status().as_u16();
                record.status_code = Some(code);
                record.response_time = Some(elapsed);
                if code >= 500 {
                    record.status = ProbeStatus::Unhealthy;
                    record.error = Some(format!("probe returned HTTP {}", code));
                } else {
                    record.status = ProbeStatus::Healthy;
                    record.healthy = true;
                }
            }
            Ok(Err(e)) if e.is_timeout() => {
                record.status = ProbeStatus::Timeout;
                record.error = Some(e.to_string());
            }
            Ok(Err(e)) => {
                record.error = Some(e.to_string());
            }
            Err(_) => {
                record.status = ProbeStatus::Timeout;
                record.error = Some(format!("probe exceeded {}ms", definition.timeout));
            }
        }

        tracing::debug!(
            "tool_probed: tool={} method={} status={:?} elapsed_ms={}",
            record.tool_id,
            method,
            record.status,
            elapsed
        );
        record
    }

    /// Probe every tool in the registry with bounded concurrency.
    pub async fn check_all(&self, registry: &TenantToolRegistry) -> HealthSummary {
        let records: Vec<HealthRecord> = stream::iter(registry.list())
            .map(|instance| async move { self.check(&instance).await })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let summary = HealthSummary::from_records(records);
        tracing::info!(
            "health_sweep_completed: tenant={} total={} healthy={} unhealthy={}",
            registry.tenant(),
            summary.total,
            summary.healthy,
            summary.unhealthy
        );
        summary
    }
}

// =============================================================================
// Tests
// =============================================================================
