//! Shared fixtures for the integration tests: deterministic embedders,
//! store wrappers that fail or count calls, and config/file builders.

#![allow(dead_code)]

use std::collections::hash_map::DefaultHasher;
use std::f32::consts::PI;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use mmrag::config::Config;
use mmrag::services::Services;
use mmrag_core::embedding::{normalized, Embedder};
use mmrag_core::models::{Chunk, Modality, PerModality, ScoredPayload};
use mmrag_core::store::memory::InMemoryStore;
use mmrag_core::store::{CollectionInfo, Distance, PayloadFilter, StoreError, VectorStore};
use tempfile::TempDir;

pub const DIMS: usize = 1024;

// ─── Embedders ──────────────────────────────────────────────────────

/// Bag-of-words hashing embedder. Identical inputs map to identical
/// vectors and inputs sharing words score higher than unrelated ones.
/// Any input containing `POISON` fails.
pub struct HashEmbedder {
    modality: Modality,
    dims: usize,
    pub calls: AtomicUsize,
}

impl HashEmbedder {
    pub fn new(modality: Modality, dims: usize) -> Self {
        Self {
            modality,
            dims,
            calls: AtomicUsize::new(0),
        }
    }
}

pub fn hash_vector(text: &str, dims: usize) -> Vec<f32> {
    let mut v = vec![0.0f32; dims];
    for word in text.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
        let mut h = DefaultHasher::new();
        word.to_lowercase().hash(&mut h);
        v[(h.finish() % dims as u64) as usize] += 1.0;
    }
    normalized(v)
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn modality(&self) -> Modality {
        self.modality
    }
    fn model_name(&self) -> &str {
        "hash"
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut out = Vec::with_capacity(inputs.len());
        for input in inputs {
            if input.contains("POISON") {
                bail!("cannot embed poisoned input");
            }
            out.push(hash_vector(input, self.dims));
        }
        Ok(out)
    }
}

pub struct HashEmbedders {
    pub text: Arc<HashEmbedder>,
    pub image: Arc<HashEmbedder>,
    pub audio: Arc<HashEmbedder>,
}

impl HashEmbedders {
    pub fn new(dims: usize) -> Self {
        Self {
            text: Arc::new(HashEmbedder::new(Modality::Text, dims)),
            image: Arc::new(HashEmbedder::new(Modality::Image, dims)),
            audio: Arc::new(HashEmbedder::new(Modality::Audio, dims)),
        }
    }

    pub fn as_dyn(&self) -> PerModality<Arc<dyn Embedder>> {
        PerModality::new(
            self.text.clone() as Arc<dyn Embedder>,
            self.image.clone() as Arc<dyn Embedder>,
            self.audio.clone() as Arc<dyn Embedder>,
        )
    }

    pub fn total_calls(&self) -> usize {
        self.text.calls.load(Ordering::SeqCst)
            + self.image.calls.load(Ordering::SeqCst)
            + self.audio.calls.load(Ordering::SeqCst)
    }
}

// ─── Stores ─────────────────────────────────────────────────────────

/// Wraps an [`InMemoryStore`], counting searches and optionally failing
/// every insert as if the engine were down.
pub struct TestStore {
    inner: InMemoryStore,
    fail_inserts: bool,
    pub searches: AtomicUsize,
    pub inserts: AtomicUsize,
}

impl TestStore {
    pub fn new() -> Self {
        Self {
            inner: InMemoryStore::new(),
            fail_inserts: false,
            searches: AtomicUsize::new(0),
            inserts: AtomicUsize::new(0),
        }
    }

    pub fn failing_inserts() -> Self {
        Self {
            fail_inserts: true,
            ..Self::new()
        }
    }
}

#[async_trait]
impl VectorStore for TestStore {
    async fn ensure_collection(
        &self,
        name: &str,
        embedding_dim: usize,
        distance: Distance,
    ) -> Result<CollectionInfo, StoreError> {
        self.inner.ensure_collection(name, embedding_dim, distance).await
    }

    async fn collection_info(&self, name: &str) -> Result<Option<CollectionInfo>, StoreError> {
        self.inner.collection_info(name).await
    }

    async fn add_vectors(
        &self,
        name: &str,
        vectors: &[Vec<f32>],
        payloads: &[Chunk],
    ) -> Result<usize, StoreError> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        if self.fail_inserts {
            return Err(StoreError::Unavailable("disk I/O error".into()));
        }
        self.inner.add_vectors(name, vectors, payloads).await
    }

    async fn search(
        &self,
        name: &str,
        query: &[f32],
        k: usize,
        filter: Option<&PayloadFilter>,
    ) -> Result<Vec<ScoredPayload>, StoreError> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        self.inner.search(name, query, k, filter).await
    }

    async fn count(&self, name: &str) -> Result<u64, StoreError> {
        self.inner.count(name).await
    }

    async fn drop_collection(&self, name: &str) -> Result<bool, StoreError> {
        self.inner.drop_collection(name).await
    }

    async fn list_collections(&self) -> Result<Vec<CollectionInfo>, StoreError> {
        self.inner.list_collections().await
    }
}

// ─── Config and services ────────────────────────────────────────────

/// Defaults, with the store and audio artifacts inside `tmp` and every
/// embedder disabled so nothing is downloaded.
pub fn test_config(tmp: &TempDir) -> Config {
    let root = tmp.path();
    let toml = format!(
        r#"
[store]
path = "{root}/data/mmrag.sqlite"

[chunking.audio]
output_dir = "{root}/data/processed/chunks/audio"

[embedding.text]
provider = "disabled"
dims = {DIMS}

[embedding.image]
provider = "disabled"
dims = {DIMS}

[embedding.audio]
provider = "disabled"
dims = {DIMS}
"#,
        root = root.display()
    );
    let config: Config = toml::from_str(&toml).unwrap();
    config.validate().unwrap();
    config
}

pub async fn services_with(
    tmp: &TempDir,
    store: Arc<dyn VectorStore>,
    embedders: &HashEmbedders,
) -> Services {
    Services::from_parts(&test_config(tmp), store, embedders.as_dyn())
        .await
        .unwrap()
}

// ─── Files ──────────────────────────────────────────────────────────

/// 1200 characters of distinct 10-character words.
pub fn text_1200() -> String {
    let text: String = (0..120).map(|i| format!("word{:05} ", i)).collect();
    assert_eq!(text.chars().count(), 1200);
    text
}

pub fn write_file(dir: &Path, name: &str, contents: impl AsRef<[u8]>) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

/// Write a 16 kHz mono WAV made of `(duration_ms, is_tone)` pieces.
pub fn write_wav(path: &Path, pieces: &[(u64, bool)]) {
    write_wav_with(path, 16_000, 1, pieces);
}

/// Like [`write_wav`] at any rate and channel count; every channel carries
/// the same signal.
pub fn write_wav_with(path: &Path, rate: u32, channels: u16, pieces: &[(u64, bool)]) {
    let spec = hound::WavSpec {
        channels,
        sample_rate: rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for &(ms, tone) in pieces {
        let frames = ms * rate as u64 / 1000;
        for n in 0..frames {
            let v = if tone {
                0.8 * (2.0 * PI * 440.0 * n as f32 / rate as f32).sin()
            } else {
                0.0
            };
            for _ in 0..channels {
                writer.write_sample((v * i16::MAX as f32) as i16).unwrap();
            }
        }
    }
    writer.finalize().unwrap();
}

/// Every record in `collection`, read back through a search.
pub async fn all_records(store: &TestStore, collection: &str) -> Vec<ScoredPayload> {
    let query = hash_vector("any", DIMS);
    store.search(collection, &query, 1000, None).await.unwrap()
}

/// Length of a WAV file in milliseconds, and its format.
pub fn wav_info(path: &Path) -> (u64, hound::WavSpec) {
    let reader = hound::WavReader::open(path).unwrap();
    let spec = reader.spec();
    (reader.duration() as u64 * 1000 / spec.sample_rate as u64, spec)
}
