//! Core data models shared by the index, the indexer and the HTTP layer.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Metadata attached to every stored fragment (`source`, `chapter`, ...).
pub type Metadata = BTreeMap<String, String>;

/// A text fragment stored in the collection.
///
/// The `id` is a UUID v4 assigned at insertion and never changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub content: String,
    pub metadata: Metadata,
}

impl Document {
    /// Create a document with a fresh random identifier.
    pub fn new(content: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            content: content.into(),
            metadata,
        }
    }
}

/// A [`Document`] together with its embedding vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedDocument {
    pub document: Document,
    pub vector: Vec<f32>,
}

/// One hit returned by a similarity query.
///
/// `score` is the raw cosine similarity between the query vector and the
/// stored vector. Higher is more relevant; the range depends on the
/// embedding backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub text: String,
    pub score: f32,
    pub metadata: Metadata,
}

impl QueryResult {
    /// Returns a copy with every metadata key lower-cased.
    pub fn normalized(&self) -> Self {
        let mut out = self.clone();
        normalize_metadata_keys(&mut out.metadata);
        out
    }
}

/// Lower-case every key of `metadata` in place.
///
/// When two keys collide after lower-casing, the value of the key that
/// sorts last wins. Applying this twice gives the same map as applying it
/// once.
pub fn normalize_metadata_keys(metadata: &mut Metadata) {
    if metadata.keys().all(|k| !k.chars().any(char::is_uppercase)) {
        return;
    }
    let taken = std::mem::take(metadata);
    for (key, value) in taken {
        metadata.insert(key.to_lowercase(), value);
    }
}
