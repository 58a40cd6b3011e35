//! The vector index: Store, Query, Export, Import and Load.
//!
//! [`VectorIndex`] pairs an [`EmbeddingProvider`] with a [`VectorStore`].
//! Texts are embedded before the store is touched, so the store's lock is
//! only ever held for in-memory work.
//!
//! # Snapshot format
//!
//! ```text
//! b"RMDX" | version: u8 | zstd(bincode(CollectionSnapshot))
//! ```
//!
//! Import checks the magic, the version and the dimensionality against the
//! active embedding provider before replacing the collection.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use reminder_core::embedding::EmbeddingProvider;
use reminder_core::models::{Document, EmbeddedDocument, Metadata, QueryResult};
use reminder_core::store::memory::InMemoryStore;
use reminder_core::store::{CollectionSnapshot, VectorStore};
use tokio::task::JoinSet;

use crate::error::{ExportError, ImportError, IndexError, QueryError};

const MAGIC: &[u8; 4] = b"RMDX";
const FORMAT_VERSION: u8 = 1;
const ZSTD_LEVEL: i32 = 3;

/// Embedding collection with its embedding function.
pub struct VectorIndex {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
}

impl VectorIndex {
    /// Index over a fresh [`InMemoryStore`] for `embedder`'s model.
    pub fn in_memory(embedder: Arc<dyn EmbeddingProvider>, batch_size: usize) -> Self {
        let store = Arc::new(InMemoryStore::new(embedder.model_name(), embedder.dims()));
        Self::with_store(store, embedder, batch_size)
    }

    pub fn with_store(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        batch_size: usize,
    ) -> Self {
        Self {
            store,
            embedder,
            batch_size: batch_size.max(1),
        }
    }

    pub fn model_name(&self) -> &str {
        self.embedder.model_name()
    }

    pub fn dims(&self) -> usize {
        self.embedder.dims()
    }

    pub async fn len(&self) -> usize {
        self.store.len().await.unwrap_or(0)
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Store each non-empty fragment as its own document sharing `metadata`.
    ///
    /// Blank fragments are skipped. Batches are embedded concurrently and
    /// added in input order. Returns the number of documents stored.
    pub async fn store<S: AsRef<str>>(
        &self,
        metadata: &Metadata,
        contents: &[S],
    ) -> Result<usize, IndexError> {
        let texts: Vec<String> = contents
            .iter()
            .map(|c| c.as_ref().trim())
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect();
        if texts.is_empty() {
            return Ok(0);
        }

        let vectors = self.embed_batches(&texts).await?;
        let docs: Vec<EmbeddedDocument> = texts
            .into_iter()
            .zip(vectors)
            .map(|(text, vector)| EmbeddedDocument {
                document: Document::new(text, metadata.clone()),
                vector,
            })
            .collect();
        let count = docs.len();
        self.store.add(docs).await.map_err(IndexError::Store)?;
        Ok(count)
    }

    async fn embed_batches(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, IndexError> {
        let mut set = JoinSet::new();
        for (i, batch) in texts.chunks(self.batch_size).enumerate() {
            let embedder = self.embedder.clone();
            let batch = batch.to_vec();
            set.spawn(async move {
                let expected = batch.len();
                let vectors = embedder.embed(&batch).await;
                (i, expected, vectors)
            });
        }

        let mut batches: Vec<(usize, Vec<Vec<f32>>)> = Vec::new();
        while let Some(joined) = set.join_next().await {
            let (i, expected, vectors) =
                joined.map_err(|e| IndexError::Embedding(anyhow::anyhow!(e)))?;
            let vectors = vectors.map_err(IndexError::Embedding)?;
            if vectors.len() != expected {
                return Err(IndexError::VectorCount {
                    expected,
                    got: vectors.len(),
                });
            }
            batches.push((i, vectors));
        }
        batches.sort_by_key(|(i, _)| *i);
        Ok(batches.into_iter().flat_map(|(_, v)| v).collect())
    }

    /// Return up to `limit` results for `text` by descending similarity.
    ///
    /// `limit` is clamped to the collection size.
    pub async fn query(&self, text: &str, limit: usize) -> Result<Vec<QueryResult>, QueryError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(QueryError::EmptyQuery);
        }
        let len = self.store.len().await.map_err(QueryError::Store)?;
        if len == 0 {
            return Err(QueryError::EmptyCollection);
        }

        let vector = self
            .embedder
            .embed(&[text.to_string()])
            .await
            .map_err(QueryError::Embedding)?
            .into_iter()
            .next()
            .ok_or_else(|| QueryError::Embedding(anyhow::anyhow!("Empty embedding response")))?;

        self.store
            .search(&vector, limit.min(len))
            .await
            .map_err(QueryError::Store)
    }

    /// Write the whole collection to `path`, creating parent directories.
    pub async fn export(&self, path: &Path) -> Result<(), ExportError> {
        let snapshot = self.store.snapshot().await.map_err(ExportError::Store)?;
        let encoded =
            bincode::serialize(&snapshot).map_err(|e| ExportError::Encode(e.to_string()))?;
        let compressed = zstd::stream::encode_all(encoded.as_slice(), ZSTD_LEVEL).map_err(
            |source| ExportError::Io {
                path: path.to_path_buf(),
                source,
            },
        )?;

        let mut bytes = Vec::with_capacity(compressed.len() + MAGIC.len() + 1);
        bytes.extend_from_slice(MAGIC);
        bytes.push(FORMAT_VERSION);
        bytes.extend_from_slice(&compressed);

        let io_err = |source| ExportError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        tokio::fs::write(path, bytes).await.map_err(io_err)?;

        tracing::info!(
            documents = snapshot.documents.len(),
            "exported index to {}",
            path.display()
        );
        Ok(())
    }

    /// Replace the collection with the snapshot at `path`.
    pub async fn import(&self, path: &Path) -> Result<usize, ImportError> {
        let bytes = match tokio::fs::read(path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ImportError::Missing(path.to_path_buf()))
            }
            Err(source) => {
                return Err(ImportError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let snapshot = decode_snapshot(&bytes)?;
        if snapshot.dims != self.dims() {
            return Err(ImportError::DimensionMismatch {
                expected: self.dims(),
                found: snapshot.dims,
            });
        }
        if snapshot.model != self.model_name() {
            tracing::warn!(
                snapshot = %snapshot.model,
                active = %self.model_name(),
                "snapshot was built with a different embedding model"
            );
        }

        let count = snapshot.documents.len();
        self.store
            .restore(snapshot)
            .await
            .map_err(ImportError::Store)?;
        tracing::info!(documents = count, "imported index from {}", path.display());
        Ok(count)
    }

    /// Import the bundled snapshot through a writable copy.
    ///
    /// If `writable` does not exist yet it is first copied from `bundled`.
    pub async fn load(&self, bundled: Option<&Path>, writable: &Path) -> Result<usize, ImportError> {
        if !tokio::fs::try_exists(writable).await.unwrap_or(false) {
            let bundled = bundled.ok_or_else(|| ImportError::Missing(writable.to_path_buf()))?;
            if !tokio::fs::try_exists(bundled).await.unwrap_or(false) {
                return Err(ImportError::Missing(bundled.to_path_buf()));
            }
            let io_err = |source| ImportError::Io {
                path: PathBuf::from(writable),
                source,
            };
            if let Some(parent) = writable.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
            }
            tokio::fs::copy(bundled, writable).await.map_err(io_err)?;
            tracing::info!(
                "copied bundled snapshot {} to {}",
                bundled.display(),
                writable.display()
            );
        }
        self.import(writable).await
    }
}

fn decode_snapshot(bytes: &[u8]) -> Result<CollectionSnapshot, ImportError> {
    if bytes.len() < MAGIC.len() + 1 || &bytes[..MAGIC.len()] != MAGIC {
        return Err(ImportError::Corrupt("missing snapshot header".to_string()));
    }
    let version = bytes[MAGIC.len()];
    if version != FORMAT_VERSION {
        return Err(ImportError::UnsupportedVersion(version));
    }
    let decompressed = zstd::stream::decode_all(&bytes[MAGIC.len() + 1..])
        .map_err(|e| ImportError::Corrupt(e.to_string()))?;
    bincode::deserialize(&decompressed).map_err(|e| ImportError::Corrupt(e.to_string()))
}
