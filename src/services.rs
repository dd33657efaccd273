//! Process-level wiring.
//!
//! [`Services`] owns the one store handle of the process and the
//! per-modality embedders and collections built on top of it. Both
//! pipelines are constructed from it and share the same
//! `Arc<dyn VectorStore>`; there is no global store.
//!
//! Building is all-or-nothing: a store that cannot open or a model that
//! cannot load is an error, and the CLI exits.

use std::sync::Arc;

use anyhow::{Context, Result};
use mmrag_core::embedding::Embedder;
use mmrag_core::models::{Modality, PerModality};
use mmrag_core::store::{Collection, Distance, VectorStore};

use crate::chunker::{self, Chunker};
use crate::config::Config;
use crate::embedding;
use crate::ingest::IngestionPipeline;
use crate::retrieve::Retriever;
use crate::sqlite_store::SqliteStore;

pub struct Services {
    pub config: Config,
    pub store: Arc<dyn VectorStore>,
    pub chunkers: PerModality<Arc<dyn Chunker>>,
    pub embedders: PerModality<Arc<dyn Embedder>>,
    pub collections: PerModality<Collection>,
}

impl Services {
    /// Open the SQLite store, load every embedder, and ensure the three
    /// collections exist with the embedders' dimensions.
    pub async fn build(config: &Config) -> Result<Self> {
        let store: Arc<dyn VectorStore> = Arc::new(open_store(config).await?);
        let embedders = embedding::create_embedders(&config.embedding).await?;
        Self::from_parts(config, store, embedders).await
    }

    /// Assemble services from an already-open store and embedders.
    pub async fn from_parts(
        config: &Config,
        store: Arc<dyn VectorStore>,
        embedders: PerModality<Arc<dyn Embedder>>,
    ) -> Result<Self> {
        let mut collections = Vec::with_capacity(Modality::ALL.len());
        for modality in Modality::ALL {
            let dims = embedders.get(modality).dims();
            let collection = Collection::open(
                Arc::clone(&store),
                modality.collection_name(),
                dims,
                Distance::Cosine,
            )
            .await
            .with_context(|| format!("Failed to open {} collection", modality))?;
            collections.push(collection);
        }
        let [text, image, audio]: [Collection; 3] = collections
            .try_into()
            .map_err(|_| anyhow::anyhow!("expected one collection per modality"))?;

        let services = Self {
            config: config.clone(),
            store,
            chunkers: chunker::from_config(&config.chunking),
            embedders,
            collections: PerModality::new(text, image, audio),
        };

        for (modality, collection) in services.collections.iter() {
            match collection.count().await {
                Ok(n) => tracing::info!(
                    modality = %modality,
                    collection = collection.name(),
                    dims = collection.embedding_dim(),
                    count = n,
                    "collection ready"
                ),
                Err(e) => tracing::warn!(collection = collection.name(), error = %e, "count failed"),
            }
        }
        Ok(services)
    }

    pub fn ingestion_pipeline(&self) -> IngestionPipeline {
        IngestionPipeline::new(
            self.chunkers.clone(),
            self.embedders.clone(),
            self.collections.clone(),
            self.config.ingest.batch_size,
        )
    }

    pub fn retriever(&self) -> Retriever {
        Retriever::new(self.embedders.clone(), self.collections.clone())
    }
}

/// Open the configured SQLite store without loading any model.
pub async fn open_store(config: &Config) -> Result<SqliteStore> {
    SqliteStore::open(config)
        .await
        .with_context(|| format!("Failed to open store at {}", config.store.path.display()))
}
