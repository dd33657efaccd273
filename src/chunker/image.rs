//! Image chunker: one image file is one chunk whose content is its path.

use std::path::Path;

use anyhow::{bail, Result};
use mmrag_core::models::{Chunk, ChunkMetadata, Modality};

use super::{file_stem, source_id, Chunker};

#[derive(Debug, Default)]
pub struct ImageChunker;

impl ImageChunker {
    pub fn new() -> Self {
        Self
    }
}

impl Chunker for ImageChunker {
    fn modality(&self) -> Modality {
        Modality::Image
    }

    fn process(&self, path: &Path) -> Result<Vec<Chunk>> {
        if !path.is_file() {
            bail!("Image file not found: {}", path.display());
        }
        let content = path.to_string_lossy().into_owned();
        let meta = ChunkMetadata::new(
            source_id(path)?,
            Modality::Image,
            format!("{}_image_chunk", file_stem(path)?),
        )
        .with_chunk_data_path(content.clone());

        Ok(vec![Chunk::new(content, meta)?])
    }
}
