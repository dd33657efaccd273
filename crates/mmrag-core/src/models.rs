//! Core data models shared by the ingestion and retrieval pipelines.
//!
//! A [`Chunk`] is the unit of ingestion: one addressable piece of source
//! content (a text window, an image, an audio segment) plus its
//! [`ChunkMetadata`]. The same structure is stored verbatim as the payload
//! of an embedding record and handed back on search hits.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The content types the pipeline understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Text,
    Image,
    Audio,
}

/// File extension → modality lookup table. Extensions are lowercase, without the dot.
pub const EXTENSIONS: &[(&str, Modality)] = &[
    ("txt", Modality::Text),
    ("png", Modality::Image),
    ("jpg", Modality::Image),
    ("jpeg", Modality::Image),
    ("bmp", Modality::Image),
    ("gif", Modality::Image),
    ("wav", Modality::Audio),
    ("mp3", Modality::Audio),
];

impl Modality {
    /// All modalities, in canonical order.
    pub const ALL: [Modality; 3] = [Modality::Text, Modality::Image, Modality::Audio];

    /// Look up the modality for a file extension (case-insensitive, no leading dot).
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.to_ascii_lowercase();
        EXTENSIONS
            .iter()
            .find(|(known, _)| *known == ext)
            .map(|(_, modality)| *modality)
    }

    /// Detect the modality of a file from its extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Modality::Text => "text",
            Modality::Image => "image",
            Modality::Audio => "audio",
        }
    }

    /// Name of the vector collection holding this modality's records.
    pub fn collection_name(&self) -> &'static str {
        match self {
            Modality::Text => "text_collection",
            Modality::Image => "image_collection",
            Modality::Audio => "audio_collection",
        }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Modality {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(Modality::Text),
            "image" => Ok(Modality::Image),
            "audio" => Ok(Modality::Audio),
            other => anyhow::bail!(
                "Unknown modality: '{}'. Must be text, image, or audio.",
                other
            ),
        }
    }
}

/// One value per modality.
///
/// Used wherever the pipelines keep a per-modality handler (chunkers,
/// embedders, collections, pending batches) so that dispatch is a single
/// `match` on [`Modality`] rather than string comparisons.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PerModality<T> {
    pub text: T,
    pub image: T,
    pub audio: T,
}

impl<T> PerModality<T> {
    pub fn new(text: T, image: T, audio: T) -> Self {
        Self { text, image, audio }
    }

    /// Build a value for every modality from a constructor.
    pub fn from_fn(mut f: impl FnMut(Modality) -> T) -> Self {
        Self {
            text: f(Modality::Text),
            image: f(Modality::Image),
            audio: f(Modality::Audio),
        }
    }

    pub fn get(&self, modality: Modality) -> &T {
        match modality {
            Modality::Text => &self.text,
            Modality::Image => &self.image,
            Modality::Audio => &self.audio,
        }
    }

    pub fn get_mut(&mut self, modality: Modality) -> &mut T {
        match modality {
            Modality::Text => &mut self.text,
            Modality::Image => &mut self.image,
            Modality::Audio => &mut self.audio,
        }
    }

    /// Iterate `(modality, value)` pairs in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (Modality, &T)> {
        Modality::ALL.into_iter().map(move |m| (m, self.get(m)))
    }

    pub fn map<U>(self, mut f: impl FnMut(Modality, T) -> U) -> PerModality<U> {
        PerModality {
            text: f(Modality::Text, self.text),
            image: f(Modality::Image, self.image),
            audio: f(Modality::Audio, self.audio),
        }
    }
}

/// Metadata attached to every chunk and stored alongside its vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Origin file name (basename).
    pub source_id: String,
    #[serde(rename = "type")]
    pub modality: Modality,
    /// Stable identifier, unique within its source.
    pub chunk_id: String,
    /// Text chunks: length in characters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_length: Option<usize>,
    /// Audio chunks: segment duration in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    /// Image/audio chunks: path of the media the chunk refers to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_data_path: Option<String>,
}

impl ChunkMetadata {
    pub fn new(source_id: impl Into<String>, modality: Modality, chunk_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            modality,
            chunk_id: chunk_id.into(),
            content_length: None,
            duration_ms: None,
            chunk_data_path: None,
        }
    }

    pub fn with_content_length(mut self, len: usize) -> Self {
        self.content_length = Some(len);
        self
    }

    pub fn with_duration_ms(mut self, ms: u64) -> Self {
        self.duration_ms = Some(ms);
        self
    }

    pub fn with_chunk_data_path(mut self, path: impl Into<String>) -> Self {
        self.chunk_data_path = Some(path.into());
        self
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChunkError {
    #[error("chunk '{0}' has empty content")]
    EmptyContent(String),
    #[error("chunk has empty chunk_id")]
    EmptyChunkId,
}

/// A unit of ingestion: content plus metadata. Immutable once built.
///
/// `content` is raw text for text chunks and a filesystem path for image
/// and audio chunks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    content: String,
    metadata: ChunkMetadata,
}

impl Chunk {
    pub fn new(content: impl Into<String>, metadata: ChunkMetadata) -> Result<Self, ChunkError> {
        let content = content.into();
        if metadata.chunk_id.is_empty() {
            return Err(ChunkError::EmptyChunkId);
        }
        if content.trim().is_empty() {
            return Err(ChunkError::EmptyContent(metadata.chunk_id));
        }
        Ok(Self { content, metadata })
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn metadata(&self) -> &ChunkMetadata {
        &self.metadata
    }

    pub fn modality(&self) -> Modality {
        self.metadata.modality
    }

    pub fn chunk_id(&self) -> &str {
        &self.metadata.chunk_id
    }

    pub fn into_parts(self) -> (String, ChunkMetadata) {
        (self.content, self.metadata)
    }
}

/// A search hit: similarity score plus the stored payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPayload {
    pub score: f32,
    pub payload: Chunk,
}

/// A retrieval result as returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalResult {
    pub score: f32,
    pub metadata: ChunkMetadata,
    pub content: String,
}

impl From<ScoredPayload> for RetrievalResult {
    fn from(hit: ScoredPayload) -> Self {
        let (content, metadata) = hit.payload.into_parts();
        Self {
            score: hit.score,
            metadata,
            content,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_lookup() {
        assert_eq!(Modality::from_extension("txt"), Some(Modality::Text));
        assert_eq!(Modality::from_extension("JPEG"), Some(Modality::Image));
        assert_eq!(Modality::from_extension("gif"), Some(Modality::Image));
        assert_eq!(Modality::from_extension("mp3"), Some(Modality::Audio));
        assert_eq!(Modality::from_extension("pdf"), None);
        assert_eq!(Modality::from_extension(""), None);
    }

    #[test]
    fn test_from_path() {
        assert_eq!(
            Modality::from_path(Path::new("/data/raw/Song.WAV")),
            Some(Modality::Audio)
        );
        assert_eq!(Modality::from_path(Path::new("README")), None);
        assert_eq!(Modality::from_path(Path::new("report.pdf")), None);
    }

    #[test]
    fn test_modality_parse_and_display() {
        for m in Modality::ALL {
            assert_eq!(m.as_str().parse::<Modality>().unwrap(), m);
            assert_eq!(m.to_string(), m.as_str());
        }
        assert!("video".parse::<Modality>().is_err());
    }

    #[test]
    fn test_collection_names_distinct() {
        assert_eq!(Modality::Text.collection_name(), "text_collection");
        assert_eq!(Modality::Image.collection_name(), "image_collection");
        assert_eq!(Modality::Audio.collection_name(), "audio_collection");
    }

    #[test]
    fn test_per_modality_dispatch() {
        let mut counts = PerModality::from_fn(|_| 0usize);
        *counts.get_mut(Modality::Audio) += 2;
        *counts.get_mut(Modality::Text) += 1;
        let order: Vec<_> = counts.iter().map(|(m, c)| (m, *c)).collect();
        assert_eq!(
            order,
            vec![
                (Modality::Text, 1),
                (Modality::Image, 0),
                (Modality::Audio, 2)
            ]
        );
        let names = counts.map(|m, _| m.collection_name());
        assert_eq!(names.image, "image_collection");
    }

    #[test]
    fn test_chunk_rejects_empty_content() {
        let meta = ChunkMetadata::new("a.txt", Modality::Text, "a_chunk_text_0");
        assert_eq!(
            Chunk::new("   ", meta.clone()),
            Err(ChunkError::EmptyContent("a_chunk_text_0".to_string()))
        );
        assert!(Chunk::new("hello", meta).is_ok());
    }

    #[test]
    fn test_metadata_serializes_type_field() {
        let meta = ChunkMetadata::new("clip.wav", Modality::Audio, "clip_chunk_audio_0")
            .with_duration_ms(2500);
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["type"], "audio");
        assert_eq!(json["duration_ms"], 2500);
        assert!(json.get("content_length").is_none());

        let back: ChunkMetadata = serde_json::from_value(json).unwrap();
        assert_eq!(back, meta);
    }

    #[test]
    fn test_retrieval_result_from_hit() {
        let meta = ChunkMetadata::new("a.txt", Modality::Text, "a_chunk_text_0");
        let chunk = Chunk::new("body", meta.clone()).unwrap();
        let result = RetrievalResult::from(ScoredPayload {
            score: 0.5,
            payload: chunk,
        });
        assert_eq!(result.content, "body");
        assert_eq!(result.metadata, meta);
    }
}
