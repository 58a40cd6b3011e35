//! In-memory [`VectorStore`] implementation.
//!
//! Uses a `Vec` behind `std::sync::RwLock` for thread safety. Search is
//! brute-force cosine similarity over all stored vectors.

use std::sync::{PoisonError, RwLock};

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::models::{EmbeddedDocument, QueryResult};

use super::{CollectionSnapshot, VectorStore};

struct Inner {
    model: String,
    dims: usize,
    docs: Vec<EmbeddedDocument>,
}

/// In-memory collection bound to one embedding model.
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    pub fn new(model: impl Into<String>, dims: usize) -> Self {
        Self {
            inner: RwLock::new(Inner {
                model: model.into(),
                dims,
                docs: Vec::new(),
            }),
        }
    }
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn add(&self, docs: Vec<EmbeddedDocument>) -> Result<()> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(bad) = docs.iter().find(|d| d.vector.len() != inner.dims) {
            bail!(
                "vector for document {} has {} dims, collection expects {}",
                bad.document.id,
                bad.vector.len(),
                inner.dims
            );
        }
        inner.docs.extend(docs);
        Ok(())
    }

    async fn search(&self, query_vec: &[f32], limit: usize) -> Result<Vec<QueryResult>> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let mut scored: Vec<(usize, f32)> = inner
            .docs
            .iter()
            .enumerate()
            .map(|(i, d)| (i, cosine_similarity(query_vec, &d.vector)))
            .collect();
        // stable sort keeps insertion order on equal scores
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        Ok(scored
            .into_iter()
            .map(|(i, score)| {
                let d = &inner.docs[i].document;
                QueryResult {
                    text: d.content.clone(),
                    score,
                    metadata: d.metadata.clone(),
                }
            })
            .collect())
    }

    async fn len(&self) -> Result<usize> {
        Ok(self
            .inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .docs
            .len())
    }

    async fn snapshot(&self) -> Result<CollectionSnapshot> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        Ok(CollectionSnapshot {
            model: inner.model.clone(),
            dims: inner.dims,
            documents: inner.docs.clone(),
        })
    }

    async fn restore(&self, snapshot: CollectionSnapshot) -> Result<()> {
        if let Some(bad) = snapshot
            .documents
            .iter()
            .find(|d| d.vector.len() != snapshot.dims)
        {
            bail!(
                "snapshot document {} has {} dims, snapshot declares {}",
                bad.document.id,
                bad.vector.len(),
                snapshot.dims
            );
        }
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.model = snapshot.model;
        inner.dims = snapshot.dims;
        inner.docs = snapshot.documents;
        Ok(())
    }
}
