//! Embedder trait and vector utilities.
//!
//! Defines the [`Embedder`] trait that every embedding backend implements,
//! plus pure helpers for normalization, similarity, and BLOB encoding.
//!
//! Concrete embedders (fastembed, Ollama, generic HTTP) live in the `mmrag`
//! app crate.

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::models::Modality;

/// An embedding backend for one modality.
///
/// `embed` maps a batch of contents (raw text for text embedders, file
/// paths for image and audio embedders) to unit-normalized vectors of
/// length [`dims`](Embedder::dims).
///
/// Contract the pipelines rely on:
/// - empty input → empty output, not an error;
/// - unreadable items may be skipped, so the output can be shorter than
///   the input and positions are not guaranteed to line up. Use
///   [`embed_single`] when a strict 1:1 pairing is needed.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// The modality this embedder accepts.
    fn modality(&self) -> Modality;
    /// Model identifier (e.g. `"all-minilm-l6-v2"`).
    fn model_name(&self) -> &str;
    /// Output vector length.
    fn dims(&self) -> usize;
    /// Embed a batch of contents.
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Embed exactly one item, failing unless exactly one vector comes back.
///
/// This is how the ingestion and retrieval pipelines call embedders: a
/// skipped item surfaces as an error instead of silently shifting the
/// vector/payload pairing.
pub async fn embed_single(embedder: &dyn Embedder, input: &str) -> Result<Vec<f32>> {
    let mut vectors = embedder.embed(&[input.to_string()]).await?;
    match vectors.len() {
        1 => Ok(vectors.remove(0)),
        0 => bail!(
            "{} embedder '{}' returned no vector for the input",
            embedder.modality(),
            embedder.model_name()
        ),
        n => bail!(
            "{} embedder '{}' returned {} vectors for one input",
            embedder.modality(),
            embedder.model_name(),
            n
        ),
    }
}

/// L2-normalize a vector in place. Zero vectors are left unchanged.
pub fn normalize(vec: &mut [f32]) {
    let norm: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in vec.iter_mut() {
            *x /= norm;
        }
    }
}

/// Owned variant of [`normalize`].
pub fn normalized(mut vec: Vec<f32>) -> Vec<f32> {
    normalize(&mut vec);
    vec
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// # Example
///
/// ```rust
/// use mmrag_core::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12);
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector. Trailing bytes that do not form
/// a whole `f32` are ignored.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`.
///
/// Returns `0.0` for empty vectors, vectors of different lengths, or when
/// either vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    (dot / denom).clamp(-1.0, 1.0)
}

/// Plain dot product; `0.0` on length mismatch.
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}
