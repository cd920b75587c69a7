//! Configuration structures.
//!
//! Configuration is loaded from a JSON config file and `TOOLGATE_*` environment
//! variables. Every section has a usable default.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use super::errors::{Error, Result};

/// Global engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Observability configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Outbound request policy.
    #[serde(default)]
    pub executor: ExecutorConfig,

    /// Health probe sweep policy.
    #[serde(default)]
    pub health: HealthConfig,

    /// Response cache limits.
    #[serde(default)]
    pub response_cache: ResponseCacheConfig,

    /// Execution statistics window.
    #[serde(default)]
    pub usage: UsageConfig,

    /// IPC transport configuration.
    #[serde(default)]
    pub ipc: IpcConfig,
}

impl Config {
    /// Load configuration from a JSON file. Missing sections take defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: Config = serde_json::from_str(&raw)?;
        Ok(config)
    }

    /// Apply `TOOLGATE_*` environment overrides on top of the current values.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(addr) = lookup("TOOLGATE_LISTEN_ADDR") {
            self.server.listen_addr = addr;
        }
        if let Some(level) = lookup("TOOLGATE_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Some(format) = lookup("TOOLGATE_LOG_FORMAT") {
            self.observability.json_logs = format.eq_ignore_ascii_case("json");
        }
        if let Some(mode) = lookup("TOOLGATE_VALIDATION_MODE") {
            self.executor.validation_mode = match mode.to_ascii_lowercase().as_str() {
                "lenient" => ValidationMode::Lenient,
                "strict" => ValidationMode::Strict,
                other => {
                    return Err(Error::validation(format!(
                        "TOOLGATE_VALIDATION_MODE must be lenient or strict, got {other}"
                    )))
                }
            };
        }
        if let Some(n) = lookup("TOOLGATE_HEALTH_CONCURRENCY") {
            let parsed: usize = n.parse().map_err(|_| {
                Error::validation(format!("TOOLGATE_HEALTH_CONCURRENCY is not a number: {n}"))
            })?;
            if parsed == 0 {
                return Err(Error::validation(
                    "TOOLGATE_HEALTH_CONCURRENCY must be positive",
                ));
            }
            self.health.concurrency = parsed;
        }
        Ok(())
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// IPC server bind address (TCP).
    pub listen_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:50061".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Tracing log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable JSON log formatting.
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

/// How output schema mismatches are surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationMode {
    /// Attach the validation error, keep the output.
    #[default]
    Lenient,
    /// Attach the validation error, drop the output.
    Strict,
}

/// Outbound request policy shared by every tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// First retry delay; doubled per attempt.
    #[serde(with = "humantime_serde")]
    pub backoff_base: Duration,

    /// Ceiling on the computed backoff.
    #[serde(with = "humantime_serde")]
    pub backoff_max: Duration,

    /// Ceiling on a server-supplied `Retry-After`.
    #[serde(with = "humantime_serde")]
    pub max_retry_after: Duration,

    /// User-Agent sent on every outbound call.
    pub user_agent: String,

    /// Output schema mismatch handling.
    pub validation_mode: ValidationMode,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            backoff_base: Duration::from_millis(200),
            backoff_max: Duration::from_secs(10),
            max_retry_after: Duration::from_secs(30),
            user_agent: concat!("jeeves-toolgate/", env!("CARGO_PKG_VERSION")).to_string(),
            validation_mode: ValidationMode::Lenient,
        }
    }
}

/// Health probe sweep policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Maximum probes in flight during `health_check_all`.
    pub concurrency: usize,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self { concurrency: 5 }
    }
}

/// Response cache limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseCacheConfig {
    /// Maximum cached responses across all tenants.
    pub max_entries: usize,

    /// How often expired entries are swept.
    #[serde(with = "humantime_serde")]
    pub purge_interval: Duration,
}

impl Default for ResponseCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            purge_interval: Duration::from_secs(60),
        }
    }
}

/// Execution statistics window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageConfig {
    /// Executions retained per tool.
    pub window_size: usize,
}

impl Default for UsageConfig {
    fn default() -> Self {
        Self { window_size: 100 }
    }
}

/// IPC transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpcConfig {
    /// Maximum frame payload size in bytes.
    pub max_frame_bytes: u32,

    /// Maximum concurrent TCP connections. Connections beyond this limit
    /// are refused.
    pub max_connections: usize,

    /// Read timeout in seconds per frame. Idle connections are dropped.
    pub read_timeout_secs: u64,

    /// Write timeout in seconds per frame.
    pub write_timeout_secs: u64,
}

impl Default for IpcConfig {
    fn default() -> Self {
        Self {
            max_frame_bytes: 5 * 1024 * 1024,
            max_connections: 1000,
            read_timeout_secs: 300,
            write_timeout_secs: 10,
        }
    }
}
