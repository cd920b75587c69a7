//! TCP+msgpack IPC transport layer.
//!
//! Exposes the `tools` service over length-prefixed msgpack frames.

pub mod codec;
pub mod handlers;
pub mod router;
pub mod server;

pub use server::IpcServer;
