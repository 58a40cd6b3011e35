//! Vector collection abstraction.
//!
//! The [`VectorStore`] trait is the storage seam behind the app's
//! `VectorIndex`: it holds embedded documents and answers brute-force
//! similarity queries. Embedding happens before any store call, so
//! implementations never wait on the network while holding a lock.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::{EmbeddedDocument, QueryResult};

/// Portable image of a whole collection.
///
/// Carries everything needed to answer the same queries after a restore:
/// model name, dimensionality and every document with its vector, in
/// insertion order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionSnapshot {
    pub model: String,
    pub dims: usize,
    pub documents: Vec<EmbeddedDocument>,
}

/// Abstract vector collection.
///
/// | Method | Lock |
/// |--------|------|
/// | [`add`](VectorStore::add) | write |
/// | [`search`](VectorStore::search) | read |
/// | [`len`](VectorStore::len) | read |
/// | [`snapshot`](VectorStore::snapshot) | read |
/// | [`restore`](VectorStore::restore) | write |
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Append documents. Every vector must have the collection's dimensionality.
    async fn add(&self, docs: Vec<EmbeddedDocument>) -> Result<()>;

    /// Return up to `limit` documents by descending cosine similarity to
    /// `query_vec`. Ties keep insertion order.
    async fn search(&self, query_vec: &[f32], limit: usize) -> Result<Vec<QueryResult>>;

    /// Number of stored documents.
    async fn len(&self) -> Result<usize>;

    /// Copy out the full collection.
    async fn snapshot(&self) -> Result<CollectionSnapshot>;

    /// Replace the full collection in one step.
    async fn restore(&self, snapshot: CollectionSnapshot) -> Result<()>;
}
