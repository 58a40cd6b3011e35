//! Error taxonomy for the retrieval pipeline.
//!
//! | Error | Raised by | Handling |
//! |-------|-----------|----------|
//! | [`IndexError`] | `VectorIndex::store` | logged, batch continues |
//! | [`QueryError`] | `VectorIndex::query` | request fails (500) |
//! | [`ImportError`] | `import` / `load` | index needs a rebuild |
//! | [`ExportError`] | `export` | command fails |
//! | [`NotReady`] | search before indexing finished | 503 "indexing" |
//! | [`LlmError`] | LLM adapters | request fails (500) |
//! | [`CorpusError`] | corpus loaders | startup fails |
//! | [`ConfigError`] | `config::validate` | startup fails |

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("embedding failed: {0:#}")]
    Embedding(anyhow::Error),
    #[error("embedding returned {got} vectors for {expected} texts")]
    VectorCount { expected: usize, got: usize },
    #[error("collection rejected documents: {0:#}")]
    Store(anyhow::Error),
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("query text is empty")]
    EmptyQuery,
    #[error("collection is empty")]
    EmptyCollection,
    #[error("embedding failed: {0:#}")]
    Embedding(anyhow::Error),
    #[error("collection query failed: {0:#}")]
    Store(anyhow::Error),
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("snapshot not found: {}", .0.display())]
    Missing(PathBuf),
    #[error("failed to read snapshot {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("snapshot is corrupt: {0}")]
    Corrupt(String),
    #[error("unsupported snapshot format version {0}")]
    UnsupportedVersion(u8),
    #[error("snapshot has {found} dims, active embedding model has {expected}")]
    DimensionMismatch { expected: usize, found: usize },
    #[error("failed to restore collection: {0:#}")]
    Store(anyhow::Error),
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to write snapshot {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode snapshot: {0}")]
    Encode(String),
    #[error("failed to read collection: {0:#}")]
    Store(anyhow::Error),
}

/// Returned to search requests that arrive before indexing has finished.
#[derive(Debug, Clone, Copy, Error)]
#[error("indexing in progress")]
pub struct NotReady;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("OPENAI_API_KEY environment variable not set")]
    MissingApiKey,
    #[error("LLM request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("LLM API error {status}: {body}")]
    Upstream { status: u16, body: String },
    #[error("LLM returned no choices")]
    EmptyResponse,
}

#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid corpus {}: {reason}", path.display())]
    Invalid { path: PathBuf, reason: String },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{field} must be {rule}")]
    Invalid {
        field: &'static str,
        rule: &'static str,
    },
    #[error("{field} must be set when provider is '{provider}'")]
    RequiredFor {
        field: &'static str,
        provider: String,
    },
    #[error("Unknown {kind}: '{value}'. Must be {expected}.")]
    Unknown {
        kind: &'static str,
        value: String,
        expected: &'static str,
    },
}

/// Everything that can stop a search request.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error(transparent)]
    NotReady(#[from] NotReady),
    #[error("question must not be empty")]
    EmptyQuestion,
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error(transparent)]
    Llm(#[from] LlmError),
}
