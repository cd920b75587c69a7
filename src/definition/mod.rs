//! Tool definitions - wire record, closed auth/probe variants, validation.

pub mod auth;
pub mod model;
pub mod validation;

pub use auth::{ApiKeyLocation, AuthInjection, Authentication};
pub use model::{
    BodyFormat, CacheSettings, HttpMethod, ProbeMethod, ProbePolicy, RateLimitPolicy,
    ToolDefinition, ToolStatus, ValidationSettings, MAX_CACHE_TTL_SECS,
};
