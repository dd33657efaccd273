//! TOML configuration.
//!
//! Every section is optional and falls back to defaults, so an empty file
//! (or no file at all, via [`Config::load_or_default`]) is a valid
//! configuration. Validation failures are fatal: the process refuses to
//! start rather than run with a half-working pipeline.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use mmrag_core::models::Modality;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

fn default_store_path() -> PathBuf {
    PathBuf::from("./data/mmrag.sqlite")
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ChunkingConfig {
    #[serde(default)]
    pub text: TextChunkingConfig,
    #[serde(default)]
    pub audio: AudioChunkingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TextChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for TextChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    500
}
fn default_chunk_overlap() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct AudioChunkingConfig {
    #[serde(default = "default_min_silence_ms")]
    pub min_silence_ms: u64,
    #[serde(default = "default_silence_thresh_db")]
    pub silence_thresh_db: f32,
    #[serde(default = "default_keep_silence_ms")]
    pub keep_silence_ms: u64,
    #[serde(default = "default_target_sample_rate")]
    pub target_sample_rate: u32,
    #[serde(default = "default_audio_output_dir")]
    pub output_dir: PathBuf,
}

impl Default for AudioChunkingConfig {
    fn default() -> Self {
        Self {
            min_silence_ms: default_min_silence_ms(),
            silence_thresh_db: default_silence_thresh_db(),
            keep_silence_ms: default_keep_silence_ms(),
            target_sample_rate: default_target_sample_rate(),
            output_dir: default_audio_output_dir(),
        }
    }
}

fn default_min_silence_ms() -> u64 {
    1000
}
fn default_silence_thresh_db() -> f32 {
    -40.0
}
fn default_keep_silence_ms() -> u64 {
    500
}
fn default_target_sample_rate() -> u32 {
    16_000
}
fn default_audio_output_dir() -> PathBuf {
    PathBuf::from("./data/processed/chunks/audio")
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
        }
    }
}

fn default_batch_size() -> usize {
    32
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    5
}

/// One embedder configuration per modality.
#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_text_embedding")]
    pub text: ModalityEmbeddingConfig,
    #[serde(default = "default_image_embedding")]
    pub image: ModalityEmbeddingConfig,
    #[serde(default = "default_audio_embedding")]
    pub audio: ModalityEmbeddingConfig,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            text: default_text_embedding(),
            image: default_image_embedding(),
            audio: default_audio_embedding(),
        }
    }
}

impl EmbeddingConfig {
    pub fn get(&self, modality: Modality) -> &ModalityEmbeddingConfig {
        match modality {
            Modality::Text => &self.text,
            Modality::Image => &self.image,
            Modality::Audio => &self.audio,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModalityEmbeddingConfig {
    /// `local`, `ollama`, `http`, or `disabled`.
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl ModalityEmbeddingConfig {
    fn with_provider(provider: &str, model: Option<&str>) -> Self {
        Self {
            provider: provider.to_string(),
            model: model.map(str::to_string),
            dims: None,
            url: None,
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }

    /// Endpoint URL, applying the provider's default when unset.
    pub fn resolved_url(&self) -> Option<String> {
        match (&self.url, self.provider.as_str()) {
            (Some(url), _) => Some(url.clone()),
            (None, "ollama") => Some(DEFAULT_OLLAMA_URL.to_string()),
            _ => None,
        }
    }
}

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

fn default_text_embedding() -> ModalityEmbeddingConfig {
    ModalityEmbeddingConfig::with_provider("local", Some("all-minilm-l6-v2"))
}
fn default_image_embedding() -> ModalityEmbeddingConfig {
    ModalityEmbeddingConfig::with_provider("local", Some("clip-vit-b-32"))
}
fn default_audio_embedding() -> ModalityEmbeddingConfig {
    let mut cfg = ModalityEmbeddingConfig::with_provider("http", Some("laion/clap-htsat-unfused"));
    cfg.url = Some("http://127.0.0.1:8900/embed".to_string());
    cfg.dims = Some(512);
    cfg
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Directory for daily-rolling JSON log files. Console only when unset.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            dir: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load `path` if it exists, otherwise use defaults. A file that exists
    /// but fails to parse or validate is still an error.
    pub fn load_or_default(path: &Path) -> Result<Config> {
        if path.exists() {
            load_config(path)
        } else {
            let config = Config::default();
            config.validate()?;
            Ok(config)
        }
    }

    pub fn validate(&self) -> Result<()> {
        let text = &self.chunking.text;
        if text.chunk_size == 0 {
            bail!("chunking.text.chunk_size must be > 0");
        }
        if text.chunk_overlap >= text.chunk_size {
            bail!(
                "chunking.text.chunk_overlap ({}) must be < chunk_size ({})",
                text.chunk_overlap,
                text.chunk_size
            );
        }

        let audio = &self.chunking.audio;
        if audio.target_sample_rate == 0 {
            bail!("chunking.audio.target_sample_rate must be > 0");
        }
        if audio.min_silence_ms == 0 {
            bail!("chunking.audio.min_silence_ms must be > 0");
        }
        if audio.silence_thresh_db > 0.0 {
            bail!("chunking.audio.silence_thresh_db must be <= 0 (dBFS)");
        }

        if self.ingest.batch_size == 0 {
            bail!("ingest.batch_size must be > 0");
        }
        if self.retrieval.top_k < 1 {
            bail!("retrieval.top_k must be >= 1");
        }

        for modality in Modality::ALL {
            validate_embedding(modality, self.embedding.get(modality))?;
        }

        Ok(())
    }
}

fn validate_embedding(modality: Modality, cfg: &ModalityEmbeddingConfig) -> Result<()> {
    match cfg.provider.as_str() {
        "disabled" => {}
        "local" => {
            if modality == Modality::Audio {
                bail!("embedding.audio.provider 'local' is not supported; use http or disabled");
            }
        }
        "ollama" => {
            if modality != Modality::Text {
                bail!("embedding.{modality}.provider 'ollama' only supports text");
            }
            if cfg.model.is_none() {
                bail!("embedding.text.model must be specified when provider is 'ollama'");
            }
        }
        "http" => {
            if cfg.url.is_none() {
                bail!("embedding.{modality}.url must be specified when provider is 'http'");
            }
        }
        other => bail!(
            "Unknown embedding provider for {}: '{}'. Must be local, ollama, http, or disabled.",
            modality,
            other
        ),
    }

    if matches!(cfg.provider.as_str(), "ollama" | "http") && matches!(cfg.dims, None | Some(0)) {
        bail!(
            "embedding.{}.dims must be > 0 when provider is '{}'",
            modality,
            cfg.provider
        );
    }
    if cfg.dims == Some(0) {
        bail!("embedding.{modality}.dims must be > 0");
    }
    Ok(())
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;

    Ok(config)
}
