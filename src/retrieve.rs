//! Retrieval pipeline: one query, one modality, ranked hits.
//!
//! A query is embedded with its modality's embedder and searched against
//! that modality's collection only. Before any of that, the three
//! collection counts are summed; an entirely empty database answers
//! [`Retrieval::EmptyDatabase`] without touching the embedder, so callers
//! can tell "never populated" apart from "nothing matched".
//!
//! [`Retriever::try_retrieve`] surfaces every failure as a
//! [`RetrievalError`]. [`Retriever::retrieve`] is the lenient form: it logs
//! the error and answers with an empty result list.

use std::path::Path;
use std::sync::Arc;

use mmrag_core::embedding::Embedder;
use mmrag_core::models::{Modality, PerModality, RetrievalResult};
use mmrag_core::store::{Collection, StoreError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("exactly one of text, image or audio must be given (got {0})")]
    AmbiguousQuery(usize),
    #[error("{0} query content is empty")]
    EmptyContent(Modality),
    #[error("{modality} query must be an existing file: {path}")]
    FileNotFound { modality: Modality, path: String },
    #[error("failed to embed {modality} query: {message}")]
    Embedding { modality: Modality, message: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A single-modality query. `content` is raw text for text queries and a
/// file path for image and audio queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub modality: Modality,
    pub content: String,
}

impl Query {
    pub fn new(modality: Modality, content: impl Into<String>) -> Self {
        Self {
            modality,
            content: content.into(),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::new(Modality::Text, text)
    }

    pub fn image(path: impl AsRef<Path>) -> Self {
        Self::new(Modality::Image, path.as_ref().to_string_lossy())
    }

    pub fn audio(path: impl AsRef<Path>) -> Self {
        Self::new(Modality::Audio, path.as_ref().to_string_lossy())
    }

    /// Build a query from optional inputs, exactly one of which must be
    /// present and non-empty.
    pub fn from_inputs(
        text: Option<&str>,
        image: Option<&str>,
        audio: Option<&str>,
    ) -> Result<Self, RetrievalError> {
        let given: Vec<Query> = [
            text.map(Query::text),
            image.map(Query::image),
            audio.map(Query::audio),
        ]
        .into_iter()
        .flatten()
        .filter(|q| !q.content.trim().is_empty())
        .collect();

        match <[Query; 1]>::try_from(given) {
            Ok([query]) => Ok(query),
            Err(given) => Err(RetrievalError::AmbiguousQuery(given.len())),
        }
    }

    /// Check the content fits the modality: non-empty text, or an
    /// existing file for image and audio.
    pub fn validate(&self) -> Result<(), RetrievalError> {
        if self.content.trim().is_empty() {
            return Err(RetrievalError::EmptyContent(self.modality));
        }
        if self.modality != Modality::Text && !Path::new(&self.content).is_file() {
            return Err(RetrievalError::FileNotFound {
                modality: self.modality,
                path: self.content.clone(),
            });
        }
        Ok(())
    }
}

/// Answer to a query.
#[derive(Debug, Clone, PartialEq)]
pub enum Retrieval {
    /// All collections are empty; nothing was embedded or searched.
    EmptyDatabase,
    /// Hits ranked by descending score. May be empty.
    Results(Vec<RetrievalResult>),
}

impl Retrieval {
    pub fn is_empty_database(&self) -> bool {
        matches!(self, Retrieval::EmptyDatabase)
    }

    pub fn results(&self) -> &[RetrievalResult] {
        match self {
            Retrieval::EmptyDatabase => &[],
            Retrieval::Results(results) => results,
        }
    }

    pub fn into_results(self) -> Vec<RetrievalResult> {
        match self {
            Retrieval::EmptyDatabase => Vec::new(),
            Retrieval::Results(results) => results,
        }
    }
}

pub struct Retriever {
    embedders: PerModality<Arc<dyn Embedder>>,
    collections: PerModality<Collection>,
}

impl Retriever {
    pub fn new(
        embedders: PerModality<Arc<dyn Embedder>>,
        collections: PerModality<Collection>,
    ) -> Self {
        Self {
            embedders,
            collections,
        }
    }

    pub async fn try_retrieve(
        &self,
        query: &Query,
        top_k: usize,
    ) -> Result<Retrieval, RetrievalError> {
        query.validate()?;

        if self.try_is_database_empty().await? {
            tracing::info!("database is empty; skipping query");
            return Ok(Retrieval::EmptyDatabase);
        }

        let modality = query.modality;
        let mut vectors = self
            .embedders
            .get(modality)
            .embed(std::slice::from_ref(&query.content))
            .await
            .map_err(|e| RetrievalError::Embedding {
                modality,
                message: format!("{e:#}"),
            })?;

        if vectors.is_empty() {
            tracing::warn!(modality = %modality, "query produced no embedding");
            return Ok(Retrieval::Results(Vec::new()));
        }
        let vector = vectors.swap_remove(0);

        let hits = self
            .collections
            .get(modality)
            .search(&vector, top_k, None)
            .await?;
        tracing::debug!(modality = %modality, top_k, hits = hits.len(), "query answered");

        Ok(Retrieval::Results(
            hits.into_iter().map(RetrievalResult::from).collect(),
        ))
    }

    /// Like [`try_retrieve`](Self::try_retrieve), but errors are logged and
    /// answered with an empty result list.
    pub async fn retrieve(&self, query: &Query, top_k: usize) -> Retrieval {
        match self.try_retrieve(query, top_k).await {
            Ok(retrieval) => retrieval,
            Err(e) => {
                tracing::error!(modality = %query.modality, error = %e, "retrieval failed");
                Retrieval::Results(Vec::new())
            }
        }
    }

    pub async fn try_collection_counts(&self) -> Result<PerModality<u64>, StoreError> {
        let mut counts = PerModality::default();
        for modality in Modality::ALL {
            *counts.get_mut(modality) = self.collections.get(modality).count().await?;
        }
        Ok(counts)
    }

    /// Per-modality record counts. A collection whose count fails is
    /// logged and reported as 0.
    pub async fn collection_counts(&self) -> PerModality<u64> {
        let mut counts = PerModality::default();
        for modality in Modality::ALL {
            let collection = self.collections.get(modality);
            *counts.get_mut(modality) = match collection.count().await {
                Ok(n) => n,
                Err(e) => {
                    tracing::error!(collection = collection.name(), error = %e, "count failed");
                    0
                }
            };
        }
        counts
    }

    pub async fn try_is_database_empty(&self) -> Result<bool, StoreError> {
        let counts = self.try_collection_counts().await?;
        Ok(all_zero(&counts))
    }

    /// True when every collection holds zero records. Count failures
    /// count as zero.
    pub async fn is_database_empty(&self) -> bool {
        all_zero(&self.collection_counts().await)
    }
}

fn all_zero(counts: &PerModality<u64>) -> bool {
    Modality::ALL.into_iter().all(|m| *counts.get(m) == 0)
}
