//! Embedder implementations and selection.
//!
//! Concrete backends for the [`Embedder`] trait defined in `mmrag-core`:
//! - **[`DisabledEmbedder`]**: fails every non-empty call; lets the store
//!   and CLI run without any model configured.
//! - **[`local`]**: fastembed text and image models, run in-process.
//! - **[`remote::OllamaEmbedder`]**: a local Ollama instance's `/api/embed`.
//! - **[`remote::HttpEmbedder`]**: a generic JSON embedding service, the
//!   only backend for audio.
//!
//! Every backend L2-normalizes its output.
//!
//! # Retry Strategy
//!
//! The HTTP backends use exponential backoff for transient errors:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

#[cfg(feature = "local-embeddings-fastembed")]
pub mod local;
pub mod remote;

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use mmrag_core::embedding::Embedder;
use mmrag_core::models::{Modality, PerModality};

use crate::config::{EmbeddingConfig, ModalityEmbeddingConfig};

/// Dimension assumed by a disabled embedder when none is configured, so
/// the collection can still be created.
pub const DISABLED_DEFAULT_DIMS: usize = 512;

/// An embedder that refuses to embed.
///
/// Used when `provider = "disabled"`. Empty input still returns an empty
/// result, any other call fails.
pub struct DisabledEmbedder {
    modality: Modality,
    dims: usize,
}

impl DisabledEmbedder {
    pub fn new(modality: Modality, dims: Option<usize>) -> Self {
        Self {
            modality,
            dims: dims.unwrap_or(DISABLED_DEFAULT_DIMS),
        }
    }
}

#[async_trait]
impl Embedder for DisabledEmbedder {
    fn modality(&self) -> Modality {
        self.modality
    }
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        bail!(
            "Embedding provider is disabled for {}. Set [embedding.{}] provider in config.",
            self.modality,
            self.modality
        )
    }
}

/// Create the embedder configured for `modality`.
///
/// | `provider` | Backend |
/// |------------|---------|
/// | `"disabled"` | [`DisabledEmbedder`] |
/// | `"local"` | fastembed text or image model (loads the model now) |
/// | `"ollama"` | [`remote::OllamaEmbedder`] (text only) |
/// | `"http"` | [`remote::HttpEmbedder`] |
///
/// # Errors
///
/// Unknown providers, unsupported modality/provider pairs, unknown local
/// models, and model load failures.
pub async fn create_embedder(
    modality: Modality,
    config: &ModalityEmbeddingConfig,
) -> Result<Arc<dyn Embedder>> {
    let embedder: Arc<dyn Embedder> = match config.provider.as_str() {
        "disabled" => Arc::new(DisabledEmbedder::new(modality, config.dims)),
        "ollama" => {
            if modality != Modality::Text {
                bail!("Ollama embeddings only support text, not {}", modality);
            }
            Arc::new(remote::OllamaEmbedder::new(config)?)
        }
        "http" => Arc::new(remote::HttpEmbedder::new(modality, config)?),
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => local::load(modality, config).await?,
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => bail!(
            "Local embedding provider requires --features local-embeddings-fastembed"
        ),
        other => bail!("Unknown embedding provider: {}", other),
    };

    tracing::info!(
        modality = %modality,
        provider = %config.provider,
        model = embedder.model_name(),
        dims = embedder.dims(),
        "embedder ready"
    );
    Ok(embedder)
}

/// Create the embedder for every modality.
pub async fn create_embedders(config: &EmbeddingConfig) -> Result<PerModality<Arc<dyn Embedder>>> {
    Ok(PerModality::new(
        create_embedder(Modality::Text, &config.text).await?,
        create_embedder(Modality::Image, &config.image).await?,
        create_embedder(Modality::Audio, &config.audio).await?,
    ))
}
