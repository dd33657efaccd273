//! Vector store abstraction for mmrag.
//!
//! The [`VectorStore`] trait is the engine contract: named collections of
//! fixed-dimension vectors, each stored with a [`Chunk`] payload, supporting
//! create-if-absent, insert, similarity search and exact count. Any engine
//! can be plugged in behind it (SQLite in the app crate, [`memory`] here).
//!
//! Pipelines do not talk to the trait directly; they hold a [`Collection`]
//! handle per modality, which binds a shared store to one collection name
//! and its declared dimension.
//!
//! All operations return `Result<_, StoreError>`. Whether an error degrades
//! to an empty answer is decided by the caller, and
//! [`StoreError::is_unavailable`] tells an engine failure apart from a
//! legitimately empty result.

pub mod memory;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::embedding::{cosine_similarity, dot_product};
use crate::models::{Chunk, ChunkMetadata, ScoredPayload};

/// Similarity metric of a collection. Fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Distance {
    #[default]
    Cosine,
    Dot,
}

impl Distance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Distance::Cosine => "cosine",
            Distance::Dot => "dot",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "cosine" => Some(Distance::Cosine),
            "dot" => Some(Distance::Dot),
            _ => None,
        }
    }

    /// Similarity between two vectors; higher is more similar.
    pub fn score(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Distance::Cosine => cosine_similarity(a, b),
            Distance::Dot => dot_product(a, b),
        }
    }
}

impl fmt::Display for Distance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Schema of a collection as recorded by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionInfo {
    pub name: String,
    pub embedding_dim: usize,
    pub distance: Distance,
}

/// Errors raised at the store boundary.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("collection '{0}' does not exist")]
    CollectionNotFound(String),
    #[error("count mismatch: {vectors} vectors but {payloads} payloads")]
    CountMismatch { vectors: usize, payloads: usize },
    #[error("dimension mismatch in '{collection}': expected {expected}, got {actual}")]
    DimensionMismatch {
        collection: String,
        expected: usize,
        actual: usize,
    },
    #[error("collection '{0}' cannot have zero embedding dimension")]
    ZeroDimension(String),
    #[error("vector store unavailable: {0}")]
    Unavailable(String),
    #[error("corrupt record '{id}': {reason}")]
    Corrupt { id: String, reason: String },
}

impl StoreError {
    /// True when the engine itself failed (I/O, connection, poisoned state)
    /// as opposed to the request being invalid.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// Conjunction of exact-match conditions on chunk metadata fields.
///
/// ```rust
/// use mmrag_core::models::{ChunkMetadata, Modality};
/// use mmrag_core::store::PayloadFilter;
///
/// let filter = PayloadFilter::new().must_match("source_id", "a.txt");
/// let meta = ChunkMetadata::new("a.txt", Modality::Text, "a_chunk_text_0");
/// assert!(filter.matches(&meta));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PayloadFilter {
    conditions: Vec<(String, serde_json::Value)>,
}

impl PayloadFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `metadata[key] == value`.
    pub fn must_match(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.conditions.push((key.into(), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn matches(&self, metadata: &ChunkMetadata) -> bool {
        if self.conditions.is_empty() {
            return true;
        }
        let value = match serde_json::to_value(metadata) {
            Ok(v) => v,
            Err(_) => return false,
        };
        self.conditions
            .iter()
            .all(|(key, expected)| value.get(key) == Some(expected))
    }
}

/// Engine contract for a vector store with named collections.
///
/// Implementations must be `Send + Sync` and safe to share between the
/// ingestion and retrieval pipelines. Writes to one collection must be
/// atomic per `add_vectors` call.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create the collection if absent. An existing collection is returned
    /// as-is, even if `embedding_dim` differs (no migration). Concurrent
    /// first calls must all succeed.
    async fn ensure_collection(
        &self,
        name: &str,
        embedding_dim: usize,
        distance: Distance,
    ) -> Result<CollectionInfo, StoreError>;

    async fn collection_info(&self, name: &str) -> Result<Option<CollectionInfo>, StoreError>;

    /// Insert one record per `(vector, payload)` pair under fresh ids.
    ///
    /// Nothing is inserted unless the whole batch is valid (see
    /// [`validate_batch`]). Records are queryable once this returns.
    /// Empty input is a no-op. Returns the number of records inserted.
    async fn add_vectors(
        &self,
        name: &str,
        vectors: &[Vec<f32>],
        payloads: &[Chunk],
    ) -> Result<usize, StoreError>;

    /// Up to `k` hits ordered by non-increasing score.
    async fn search(
        &self,
        name: &str,
        query: &[f32],
        k: usize,
        filter: Option<&PayloadFilter>,
    ) -> Result<Vec<ScoredPayload>, StoreError>;

    /// Exact number of records in the collection.
    async fn count(&self, name: &str) -> Result<u64, StoreError>;

    /// Delete a collection and its records. Returns whether it existed.
    async fn drop_collection(&self, name: &str) -> Result<bool, StoreError>;

    async fn list_collections(&self) -> Result<Vec<CollectionInfo>, StoreError>;
}

/// Check a batch against a collection schema before anything is written.
///
/// Count mismatch is reported first, then the first vector whose length
/// differs from `embedding_dim`.
pub fn validate_batch(
    info: &CollectionInfo,
    vectors: &[Vec<f32>],
    payloads: &[Chunk],
) -> Result<(), StoreError> {
    if vectors.len() != payloads.len() {
        return Err(StoreError::CountMismatch {
            vectors: vectors.len(),
            payloads: payloads.len(),
        });
    }
    if let Some(bad) = vectors.iter().find(|v| v.len() != info.embedding_dim) {
        return Err(StoreError::DimensionMismatch {
            collection: info.name.clone(),
            expected: info.embedding_dim,
            actual: bad.len(),
        });
    }
    Ok(())
}

/// Check a query vector against a collection schema.
pub fn validate_query(info: &CollectionInfo, query: &[f32]) -> Result<(), StoreError> {
    if query.len() != info.embedding_dim {
        return Err(StoreError::DimensionMismatch {
            collection: info.name.clone(),
            expected: info.embedding_dim,
            actual: query.len(),
        });
    }
    Ok(())
}

/// Keep the `k` best-scoring candidates, highest first.
///
/// Candidates are expected in store insertion order; the sort is stable, so
/// equal scores keep that order.
pub fn top_k(mut hits: Vec<ScoredPayload>, k: usize) -> Vec<ScoredPayload> {
    hits.sort_by(|a, b| b.score.total_cmp(&a.score));
    hits.truncate(k);
    hits
}

/// A handle binding a shared store to one collection.
///
/// Obtained with [`Collection::open`], which ensures the collection exists.
/// Cloning is cheap; clones share the store.
#[derive(Clone)]
pub struct Collection {
    store: Arc<dyn VectorStore>,
    info: CollectionInfo,
}

impl Collection {
    /// Ensure `name` exists and bind to it.
    ///
    /// If the collection already exists with a different dimension, the
    /// stored dimension wins and a warning is logged; inserts of the
    /// requested dimension will then be rejected.
    pub async fn open(
        store: Arc<dyn VectorStore>,
        name: &str,
        embedding_dim: usize,
        distance: Distance,
    ) -> Result<Self, StoreError> {
        let info = store.ensure_collection(name, embedding_dim, distance).await?;
        if info.embedding_dim != embedding_dim {
            tracing::warn!(
                collection = name,
                stored = info.embedding_dim,
                requested = embedding_dim,
                "collection exists with a different embedding dimension; keeping stored schema"
            );
        }
        Ok(Self { store, info })
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn embedding_dim(&self) -> usize {
        self.info.embedding_dim
    }

    pub fn info(&self) -> &CollectionInfo {
        &self.info
    }

    pub async fn add_vectors(
        &self,
        vectors: &[Vec<f32>],
        payloads: &[Chunk],
    ) -> Result<usize, StoreError> {
        self.store.add_vectors(&self.info.name, vectors, payloads).await
    }

    pub async fn search(
        &self,
        query: &[f32],
        k: usize,
        filter: Option<&PayloadFilter>,
    ) -> Result<Vec<ScoredPayload>, StoreError> {
        self.store.search(&self.info.name, query, k, filter).await
    }

    pub async fn count(&self) -> Result<u64, StoreError> {
        self.store.count(&self.info.name).await
    }
}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection").field("info", &self.info).finish()
    }
}
