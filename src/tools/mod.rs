//! Tool execution engine - compiled instances, caches, outbound calls, probes.
//!
//! Definitions compile into [`ToolInstance`]s held by an immutable per-tenant
//! [`TenantToolRegistry`]. The [`ToolInstanceCache`] builds registries
//! single-flight; the [`ResponseCache`] keeps successful outputs by input
//! fingerprint. Both forget state through the [`MutationBus`].

pub mod cache;
pub mod encoding;
pub mod events;
pub mod executor;
pub mod health;
pub mod instance;
pub mod rate_limiter;
pub mod registry;
pub mod response_cache;
pub mod result;
pub mod retry;
pub mod usage;
pub mod validator;

pub use cache::ToolInstanceCache;
pub use encoding::{PreparedRequest, RequestBody};
pub use events::{MutationBus, MutationKind, MutationListener, ToolMutated};
pub use executor::RequestExecutor;
pub use health::{HealthMonitor, HealthRecord, HealthSummary, ProbeStatus};
pub use instance::ToolInstance;
pub use rate_limiter::ToolRateLimiter;
pub use registry::TenantToolRegistry;
pub use response_cache::{CacheKey, CachedResponse, ResponseCache};
pub use result::{ErrorKind, ExecutionError, ExecutionResult};
pub use usage::{ToolStats, ToolUsageTracker};
pub use validator::SchemaValidator;
