//! Core types for the tool engine.
//!
//! This module provides foundational types used throughout the system:
//! - **IDs**: Strongly-typed identifiers (TenantId, RequestId)
//! - **Errors**: Application error types with thiserror derives
//! - **Config**: Configuration structures for executor, caches, health and IPC

mod config;
mod errors;
mod ids;

pub use config::{
    Config, ExecutorConfig, HealthConfig, IpcConfig, ObservabilityConfig, ResponseCacheConfig,
    ServerConfig, UsageConfig, ValidationMode,
};
pub use errors::{Error, Result};
pub use ids::{RequestId, TenantId};
