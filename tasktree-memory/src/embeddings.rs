//! Embedding backends.
//!
//! An [`EmbeddingProvider`] turns summary text into a fixed-dimension,
//! unit-length vector. Ollama's `/api/embed` is the only remote backend;
//! [`NoopEmbedding`] stands in when embeddings are disabled.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tasktree_common::EmbeddingConfig;

/// Text-to-vector backend.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &str;

    /// Length of every vector this backend returns.
    fn dimensions(&self) -> usize;

    /// Embed a batch of texts, one vector per input, in input order.
    async fn embed(&self, texts: &[&str]) -> anyhow::Result<Vec<Vec<f32>>>;

    /// Embed a single text.
    async fn embed_one(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        let mut vectors = self.embed(&[text]).await?;
        vectors
            .pop()
            .ok_or_else(|| anyhow::anyhow!("{} returned no embedding", self.name()))
    }
}

/// Backend used when embeddings are disabled. Always errors.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEmbedding;

#[async_trait]
impl EmbeddingProvider for NoopEmbedding {
    fn name(&self) -> &str {
        "none"
    }

    fn dimensions(&self) -> usize {
        0
    }

    async fn embed(&self, _texts: &[&str]) -> anyhow::Result<Vec<Vec<f32>>> {
        anyhow::bail!("embeddings are disabled")
    }
}

/// Scale a vector to unit length in place. Zero vectors are left alone.
pub fn normalize(vector: &mut [f32]) {
    let norm = vector
        .iter()
        .map(|x| f64::from(*x) * f64::from(*x))
        .sum::<f64>()
        .sqrt();
    if norm > f64::EPSILON {
        for x in vector.iter_mut() {
            #[allow(clippy::cast_possible_truncation)]
            let scaled = (f64::from(*x) / norm) as f32;
            *x = scaled;
        }
    }
}

#[derive(Debug, Serialize)]
struct OllamaEmbedRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Debug, Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Ollama `/api/embed` backend.
pub struct OllamaEmbedding {
    base_url: String,
    model: String,
    dims: usize,
    client: Client,
}

impl OllamaEmbedding {
    pub fn new(base_url: &str, model: &str, dims: usize) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            dims,
            client: Client::builder()
                .timeout(Duration::from_secs(60))
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedding {
    fn name(&self) -> &str {
        "ollama"
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[&str]) -> anyhow::Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/api/embed", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&OllamaEmbedRequest {
                model: &self.model,
                input: texts,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("ollama embed failed ({status}): {body}");
        }

        let body: OllamaEmbedResponse = response.json().await?;
        if body.embeddings.len() != texts.len() {
            anyhow::bail!(
                "ollama returned {} embeddings for {} inputs",
                body.embeddings.len(),
                texts.len()
            );
        }

        let mut vectors = body.embeddings;
        for vector in &mut vectors {
            if vector.len() != self.dims {
                anyhow::bail!(
                    "model {} returned {} dimensions, expected {}",
                    self.model,
                    vector.len(),
                    self.dims
                );
            }
            normalize(vector);
        }
        Ok(vectors)
    }
}

/// Build the embedding backend described by `config`.
pub fn create_embedding_provider(config: &EmbeddingConfig) -> Arc<dyn EmbeddingProvider> {
    if !config.enabled {
        return Arc::new(NoopEmbedding);
    }
    Arc::new(OllamaEmbedding::new(
        &config.base_url,
        &config.model,
        config.dimensions,
    ))
}
