//! File chunkers, one per modality.
//!
//! A [`Chunker`] turns one source file into an ordered list of [`Chunk`]s.
//! `process` reports failures as errors, which the ingestion pipeline
//! records per file as a failed outcome.
//!
//! Chunkers do blocking file I/O and decoding; async callers run them on
//! `tokio::task::spawn_blocking`.

pub mod audio;
pub mod image;
pub mod text;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use mmrag_core::models::{Chunk, Modality, PerModality};

use crate::config::ChunkingConfig;

pub use audio::AudioChunker;
pub use image::ImageChunker;
pub use text::TextChunker;

pub trait Chunker: Send + Sync {
    fn modality(&self) -> Modality;

    /// Split `path` into chunks. Deterministic for a fixed file and fixed
    /// parameters. Zero-length input yields `Ok(vec![])`.
    fn process(&self, path: &Path) -> Result<Vec<Chunk>>;
}

/// Build the default chunker for every modality from config.
pub fn from_config(config: &ChunkingConfig) -> PerModality<Arc<dyn Chunker>> {
    PerModality::new(
        Arc::new(TextChunker::from_config(&config.text)) as Arc<dyn Chunker>,
        Arc::new(ImageChunker::new()) as Arc<dyn Chunker>,
        Arc::new(AudioChunker::from_config(&config.audio)) as Arc<dyn Chunker>,
    )
}

/// Basename of the file, stored as `source_id`.
pub(crate) fn source_id(path: &Path) -> Result<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .with_context(|| format!("path has no file name: {}", path.display()))
}

/// File name up to its first dot, used to build chunk ids
/// (`notes.v2.txt` gives `notes`).
pub(crate) fn file_stem(path: &Path) -> Result<String> {
    let name = source_id(path)?;
    Ok(name.split('.').next().unwrap_or_default().to_string())
}
