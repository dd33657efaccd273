//! Plain-text chunker: recursive character windows with overlap.

use std::path::Path;

use anyhow::{Context, Result};
use mmrag_core::models::{Chunk, ChunkMetadata, Modality};
use mmrag_core::splitter::RecursiveSplitter;

use super::{file_stem, source_id, Chunker};
use crate::config::TextChunkingConfig;

pub struct TextChunker {
    splitter: RecursiveSplitter,
}

impl TextChunker {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            splitter: RecursiveSplitter::new(chunk_size, chunk_overlap),
        }
    }

    pub fn from_config(config: &TextChunkingConfig) -> Self {
        Self::new(config.chunk_size, config.chunk_overlap)
    }
}

impl Chunker for TextChunker {
    fn modality(&self) -> Modality {
        Modality::Text
    }

    fn process(&self, path: &Path) -> Result<Vec<Chunk>> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read text file: {}", path.display()))?;
        let source = source_id(path)?;
        let stem = file_stem(path)?;

        let mut chunks = Vec::new();
        for (i, window) in self.splitter.split(&text).into_iter().enumerate() {
            let len = window.chars().count();
            let meta = ChunkMetadata::new(&source, Modality::Text, format!("{stem}_chunk_text_{i}"))
                .with_content_length(len);
            chunks.push(Chunk::new(window, meta)?);
        }

        tracing::info!(file = %source, chunks = chunks.len(), "split text file");
        Ok(chunks)
    }
}
