//! # Reminder Core
//!
//! Runtime-agnostic logic for Reminder: document models, the vector
//! collection trait with its in-memory implementation, the embedding
//! trait, context assembly for LLM prompts, the daily verse rules and
//! per-client search sessions.
//!
//! This crate contains no tokio, HTTP, or filesystem I/O. The `reminder`
//! app crate supplies embedding backends, snapshot files and the server.

pub mod context;
pub mod embedding;
pub mod models;
pub mod rotation;
pub mod session;
pub mod store;
