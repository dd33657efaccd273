//! In-process embeddings via fastembed.
//!
//! Models are downloaded from Hugging Face on first load and cached; after
//! that no network access is needed. Each model is loaded once and kept
//! behind a mutex because fastembed's `embed` takes `&mut self`. Inference
//! runs on `spawn_blocking`.

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use mmrag_core::embedding::{normalized, Embedder};
use mmrag_core::models::Modality;

use crate::config::ModalityEmbeddingConfig;

/// Load the configured local model for `modality`.
pub async fn load(modality: Modality, config: &ModalityEmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match modality {
        Modality::Text => Ok(Arc::new(LocalTextEmbedder::load(config).await?)),
        Modality::Image => Ok(Arc::new(LocalImageEmbedder::load(config).await?)),
        Modality::Audio => bail!("No local audio embedding model is available; use provider = \"http\""),
    }
}

fn check_dims(configured: Option<usize>, model: &str, native: usize) -> Result<usize> {
    match configured {
        Some(d) if d != native => bail!(
            "embedding dims {} does not match model '{}' ({} dims)",
            d,
            model,
            native
        ),
        _ => Ok(native),
    }
}

// ============ Text ============

pub struct LocalTextEmbedder {
    model_name: String,
    dims: usize,
    model: Arc<Mutex<fastembed::TextEmbedding>>,
}

impl LocalTextEmbedder {
    pub async fn load(config: &ModalityEmbeddingConfig) -> Result<Self> {
        let model_name = config
            .model
            .clone()
            .unwrap_or_else(|| "all-minilm-l6-v2".to_string());
        let (fastembed_model, native_dims) = text_model(&model_name)?;
        let dims = check_dims(config.dims, &model_name, native_dims)?;

        let model = tokio::task::spawn_blocking(move || {
            fastembed::TextEmbedding::try_new(
                fastembed::InitOptions::new(fastembed_model).with_show_download_progress(true),
            )
            .map_err(|e| anyhow!("Failed to initialize local text embedding model: {}", e))
        })
        .await??;

        Ok(Self {
            model_name,
            dims,
            model: Arc::new(Mutex::new(model)),
        })
    }
}

fn text_model(name: &str) -> Result<(fastembed::EmbeddingModel, usize)> {
    use fastembed::EmbeddingModel as M;
    match name {
        "all-minilm-l6-v2" => Ok((M::AllMiniLML6V2, 384)),
        "bge-small-en-v1.5" => Ok((M::BGESmallENV15, 384)),
        "bge-base-en-v1.5" => Ok((M::BGEBaseENV15, 768)),
        "bge-large-en-v1.5" => Ok((M::BGELargeENV15, 1024)),
        "nomic-embed-text-v1" => Ok((M::NomicEmbedTextV1, 768)),
        "nomic-embed-text-v1.5" => Ok((M::NomicEmbedTextV15, 768)),
        "multilingual-e5-small" => Ok((M::MultilingualE5Small, 384)),
        "multilingual-e5-base" => Ok((M::MultilingualE5Base, 768)),
        "multilingual-e5-large" => Ok((M::MultilingualE5Large, 1024)),
        other => bail!(
            "Unknown local text embedding model: '{}'. Supported models: \
             all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5, \
             nomic-embed-text-v1, nomic-embed-text-v1.5, \
             multilingual-e5-small, multilingual-e5-base, multilingual-e5-large",
            other
        ),
    }
}

#[async_trait]
impl Embedder for LocalTextEmbedder {
    fn modality(&self) -> Modality {
        Modality::Text
    }
    fn model_name(&self) -> &str {
        &self.model_name
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        let model = Arc::clone(&self.model);
        let texts = inputs.to_vec();
        let vectors = tokio::task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|_| anyhow!("local text model lock poisoned"))?;
            model
                .embed(texts, None)
                .map_err(|e| anyhow!("Local text embedding failed: {}", e))
        })
        .await??;
        Ok(vectors.into_iter().map(normalized).collect())
    }
}

// ============ Image ============

pub struct LocalImageEmbedder {
    model_name: String,
    dims: usize,
    model: Arc<Mutex<fastembed::ImageEmbedding>>,
}

impl LocalImageEmbedder {
    pub async fn load(config: &ModalityEmbeddingConfig) -> Result<Self> {
        let model_name = config
            .model
            .clone()
            .unwrap_or_else(|| "clip-vit-b-32".to_string());
        let (fastembed_model, native_dims) = image_model(&model_name)?;
        let dims = check_dims(config.dims, &model_name, native_dims)?;

        let model = tokio::task::spawn_blocking(move || {
            fastembed::ImageEmbedding::try_new(
                fastembed::ImageInitOptions::new(fastembed_model).with_show_download_progress(true),
            )
            .map_err(|e| anyhow!("Failed to initialize local image embedding model: {}", e))
        })
        .await??;

        Ok(Self {
            model_name,
            dims,
            model: Arc::new(Mutex::new(model)),
        })
    }
}

fn image_model(name: &str) -> Result<(fastembed::ImageEmbeddingModel, usize)> {
    use fastembed::ImageEmbeddingModel as M;
    match name {
        "clip-vit-b-32" => Ok((M::ClipVitB32, 512)),
        "resnet50" => Ok((M::Resnet50, 2048)),
        "unicom-vit-b-16" => Ok((M::UnicomVitB16, 768)),
        "unicom-vit-b-32" => Ok((M::UnicomVitB32, 512)),
        "nomic-embed-vision-v1.5" => Ok((M::NomicEmbedVisionV15, 768)),
        other => bail!(
            "Unknown local image embedding model: '{}'. Supported models: \
             clip-vit-b-32, resnet50, unicom-vit-b-16, unicom-vit-b-32, nomic-embed-vision-v1.5",
            other
        ),
    }
}

#[async_trait]
impl Embedder for LocalImageEmbedder {
    fn modality(&self) -> Modality {
        Modality::Image
    }
    fn model_name(&self) -> &str {
        &self.model_name
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        let readable: Vec<String> = inputs
            .iter()
            .filter(|p| {
                let ok = Path::new(p.as_str()).is_file();
                if !ok {
                    tracing::warn!(path = %p, "skipping unreadable image");
                }
                ok
            })
            .cloned()
            .collect();
        if readable.is_empty() {
            return Ok(Vec::new());
        }

        let model = Arc::clone(&self.model);
        let vectors = tokio::task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|_| anyhow!("local image model lock poisoned"))?;
            model
                .embed(readable, None)
                .map_err(|e| anyhow!("Local image embedding failed: {}", e))
        })
        .await??;
        Ok(vectors.into_iter().map(normalized).collect())
    }
}
