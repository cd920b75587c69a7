//! # Jeeves Toolgate - Dynamic HTTP Tool Execution Engine
//!
//! Turns declarative tool definitions (endpoint, method, auth, schemas,
//! caching, retries) into callable tools for an agent platform:
//! - Definition validation with every violation enumerated at once
//! - Per-tenant registries of compiled instances, built single-flight
//! - Outbound execution with auth injection, timeouts and retry/backoff
//! - Output schema validation (lenient or strict)
//! - Response caching keyed by a canonical input fingerprint
//! - Health probes with bounded-concurrency sweeps
//! - Length-prefixed msgpack IPC surface
//!
//! ## Architecture
//!
//! ```text
//!   IPC / API layer
//!         │
//!   ┌─────▼──────────────────────────────────────────┐
//!   │                 ToolService                     │
//!   │  ┌──────────────┐ ┌──────────────┐ ┌─────────┐  │
//!   │  │ToolInstance  │ │  Response    │ │  Rate   │  │
//!   │  │   Cache      │ │   Cache      │ │ Limiter │  │
//!   │  └──────▲───────┘ └──────▲───────┘ └────▲────┘  │
//!   │         └──── MutationBus (ToolMutated) ┘       │
//!   │  ┌──────────────┐ ┌──────────────┐              │
//!   │  │  Request     │ │   Health     │              │
//!   │  │  Executor    │ │   Monitor    │              │
//!   │  └──────────────┘ └──────────────┘              │
//!   └─────────────────────┬──────────────────────────┘
//!                         │ ToolStore
//! ```

// Enforce strict safety at compile time
#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]
#![warn(rust_2018_idioms)]

pub mod definition;
pub mod ipc;
pub mod service;
pub mod store;
pub mod tools;
pub mod types;

// Internal utilities
pub mod observability;

pub use definition::ToolDefinition;
pub use service::{ExecutionContext, ToolService};
pub use store::{InMemoryToolStore, ToolStore};
pub use types::{Config, Error, IpcConfig, Result, TenantId};
