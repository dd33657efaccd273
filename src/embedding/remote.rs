//! HTTP embedding backends: Ollama and a generic JSON service.

use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use base64::Engine;
use mmrag_core::embedding::{normalized, Embedder};
use mmrag_core::models::Modality;

use crate::config::ModalityEmbeddingConfig;

// ============ Ollama ============

/// Text embeddings from a local Ollama instance.
///
/// Calls `POST {url}/api/embed` (default `http://localhost:11434`).
/// Requires an embedding model pulled into Ollama, e.g.
/// `ollama pull nomic-embed-text`.
pub struct OllamaEmbedder {
    model: String,
    dims: usize,
    url: String,
    client: reqwest::Client,
    max_retries: u32,
}

impl OllamaEmbedder {
    pub fn new(config: &ModalityEmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("embedding.text.model required for Ollama provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow!("embedding.text.dims required for Ollama provider"))?;
        let url = config
            .resolved_url()
            .ok_or_else(|| anyhow!("embedding.text.url required for Ollama provider"))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model,
            dims,
            url: url.trim_end_matches('/').to_string(),
            client,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn modality(&self) -> Modality {
        Modality::Text
    }
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        let body = serde_json::json!({
            "model": self.model,
            "input": inputs,
        });
        let endpoint = format!("{}/api/embed", self.url);
        let json = post_json_with_retry(&self.client, &endpoint, &body, self.max_retries, "Ollama")
            .await?;
        Ok(parse_embeddings(&json, "Ollama")?
            .into_iter()
            .map(normalized)
            .collect())
    }
}

// ============ Generic HTTP ============

/// Embeddings from a JSON-over-HTTP service.
///
/// Request: `POST {url}` with `{"model": …, "modality": "text"|"image"|"audio",
/// "inputs": [...]}`. Text inputs are sent verbatim; image and audio inputs
/// are file paths whose bytes are sent base64-encoded. Response:
/// `{"embeddings": [[f32, …], …]}`, one vector per input sent.
///
/// Media files that cannot be read are skipped (and logged), so the result
/// may be shorter than the input.
pub struct HttpEmbedder {
    modality: Modality,
    model: String,
    dims: usize,
    url: String,
    client: reqwest::Client,
    max_retries: u32,
}

impl HttpEmbedder {
    pub fn new(modality: Modality, config: &ModalityEmbeddingConfig) -> Result<Self> {
        let url = config
            .url
            .clone()
            .ok_or_else(|| anyhow!("embedding.{modality}.url required for http provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow!("embedding.{modality}.dims required for http provider"))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            modality,
            model: config.model.clone().unwrap_or_default(),
            dims,
            url,
            client,
            max_retries: config.max_retries,
        })
    }

    fn encode_inputs(&self, inputs: &[String]) -> Vec<String> {
        if self.modality == Modality::Text {
            return inputs.to_vec();
        }
        inputs
            .iter()
            .filter_map(|p| match read_media(Path::new(p)) {
                Ok(b64) => Some(b64),
                Err(e) => {
                    tracing::warn!(modality = %self.modality, path = %p, error = %e, "skipping unreadable input");
                    None
                }
            })
            .collect()
    }
}

fn read_media(path: &Path) -> Result<String> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Could not read {}", path.display()))?;
    Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn modality(&self) -> Modality {
        self.modality
    }
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        let encoded = self.encode_inputs(inputs);
        if encoded.is_empty() {
            return Ok(Vec::new());
        }
        let sent = encoded.len();
        let body = serde_json::json!({
            "model": self.model,
            "modality": self.modality,
            "inputs": encoded,
        });
        let json =
            post_json_with_retry(&self.client, &self.url, &body, self.max_retries, "Embedding service")
                .await?;
        let vectors = parse_embeddings(&json, "Embedding service")?;
        if vectors.len() != sent {
            bail!(
                "Embedding service returned {} vectors for {} inputs",
                vectors.len(),
                sent
            );
        }
        Ok(vectors.into_iter().map(normalized).collect())
    }
}

// ============ Shared ============

/// POST a JSON body with retry/backoff and return the parsed JSON reply.
///
/// - HTTP 429 or 5xx → retry with exponential backoff
/// - HTTP 4xx (not 429) → fail immediately
/// - Network error → retry
async fn post_json_with_retry(
    client: &reqwest::Client,
    url: &str,
    body: &serde_json::Value,
    max_retries: u32,
    label: &str,
) -> Result<serde_json::Value> {
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tracing::debug!(attempt, delay_secs = delay.as_secs(), "retrying {}", label);
            tokio::time::sleep(delay).await;
        }

        let resp = client
            .post(url)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await;

        match resp {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    let json: serde_json::Value = response.json().await?;
                    return Ok(json);
                }

                if status.as_u16() == 429 || status.is_server_error() {
                    let body_text = response.text().await.unwrap_or_default();
                    last_err = Some(anyhow!("{} API error {}: {}", label, status, body_text));
                    continue;
                }

                let body_text = response.text().await.unwrap_or_default();
                bail!("{} API error {}: {}", label, status, body_text);
            }
            Err(e) => {
                last_err = Some(anyhow!("{} connection error ({}): {}", label, url, e));
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow!("{} embedding failed after retries", label)))
}

/// Extract the `embeddings` array of arrays.
fn parse_embeddings(json: &serde_json::Value, label: &str) -> Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow!("Invalid {} response: missing embeddings array", label))?;

    let mut result = Vec::with_capacity(embeddings.len());

    for embedding in embeddings {
        let vec = embedding
            .as_array()
            .ok_or_else(|| anyhow!("Invalid {} response: embedding is not an array", label))?
            .iter()
            .map(|v| {
                v.as_f64()
                    .map(|x| x as f32)
                    .ok_or_else(|| anyhow!("Invalid {} response: non-numeric value {}", label, v))
            })
            .collect::<Result<Vec<f32>>>()?;
        result.push(vec);
    }

    Ok(result)
}
