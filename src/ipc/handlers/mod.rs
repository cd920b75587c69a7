//! Per-service IPC handlers.

pub mod tools;
