//! Ollama backend.
//!
//! Connects to a local Ollama instance for chat (`/api/chat`) and model
//! listing (`/api/tags`, `/api/show`).

use crate::provider::Provider;
use crate::resolver::{ModelCatalog, ModelInfo};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Ollama client for local models.
pub struct OllamaClient {
    base_url: String,
    client: Client,
}

#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f64,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: OllamaResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OllamaResponseMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct OllamaTagsResponse {
    #[serde(default)]
    models: Vec<OllamaModel>,
}

#[derive(Debug, Deserialize)]
struct OllamaModel {
    name: String,
    #[serde(default)]
    details: Option<OllamaModelDetails>,
}

#[derive(Debug, Default, Deserialize)]
struct OllamaModelDetails {
    #[serde(default)]
    parameter_size: Option<String>,
    #[serde(default)]
    family: Option<String>,
}

impl OllamaModelDetails {
    fn describe(&self) -> Option<String> {
        match (&self.family, &self.parameter_size) {
            (Some(family), Some(size)) => Some(format!("{family}, {size}")),
            (Some(one), None) | (None, Some(one)) => Some(one.clone()),
            (None, None) => None,
        }
    }
}

impl From<OllamaModel> for ModelInfo {
    fn from(model: OllamaModel) -> Self {
        Self {
            details: model.details.as_ref().and_then(OllamaModelDetails::describe),
            id: model.name,
        }
    }
}

#[derive(Debug, Serialize)]
struct OllamaShowRequest<'a> {
    model: &'a str,
}

#[derive(Debug, Deserialize)]
struct OllamaShowResponse {
    #[serde(default)]
    details: Option<OllamaModelDetails>,
}

impl OllamaClient {
    /// Create a new Ollama client.
    ///
    /// # Arguments
    /// * `base_url` - Base URL for Ollama API (defaults to http://localhost:11434)
    /// * `timeout` - Per-request timeout
    pub fn new(base_url: Option<&str>, timeout: Duration) -> Self {
        Self {
            base_url: base_url
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            client: Client::builder()
                .timeout(timeout)
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn error_body(response: reqwest::Response) -> String {
        response.text().await.unwrap_or_default()
    }
}

#[async_trait]
impl Provider for OllamaClient {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn chat_with_system(
        &self,
        system: Option<&str>,
        message: &str,
        model: &str,
        temperature: f64,
    ) -> anyhow::Result<String> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system {
            messages.push(OllamaMessage {
                role: "system".to_string(),
                content: system.to_string(),
            });
        }
        messages.push(OllamaMessage {
            role: "user".to_string(),
            content: message.to_string(),
        });

        let request = OllamaChatRequest {
            model: model.to_string(),
            messages,
            stream: false,
            options: OllamaOptions { temperature },
        };

        let url = format!("{}/api/chat", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Request failed: {e}. Is Ollama running?"))?;

        let status = response.status();
        if !status.is_success() {
            let body = Self::error_body(response).await;
            anyhow::bail!("Ollama API error ({}): {body}", status.as_u16());
        }

        let result: OllamaChatResponse = response
            .json()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to parse response: {e}"))?;
        Ok(result.message.content)
    }
}

#[async_trait]
impl ModelCatalog for OllamaClient {
    async fn find(&self, id: &str) -> anyhow::Result<Option<ModelInfo>> {
        let url = format!("{}/api/show", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&OllamaShowRequest { model: id })
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let body: OllamaShowResponse = response.json().await?;
                Ok(Some(ModelInfo {
                    id: id.to_string(),
                    details: body.details.as_ref().and_then(OllamaModelDetails::describe),
                }))
            }
            status => {
                let body = Self::error_body(response).await;
                anyhow::bail!("Ollama API error ({}): {body}", status.as_u16())
            }
        }
    }

    async fn fetch_all(&self) -> anyhow::Result<Vec<ModelInfo>> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Request failed: {e}. Is Ollama running?"))?;

        let status = response.status();
        if !status.is_success() {
            let body = Self::error_body(response).await;
            anyhow::bail!("Ollama API error ({}): {body}", status.as_u16());
        }

        let tags: OllamaTagsResponse = response.json().await?;
        Ok(tags.models.into_iter().map(ModelInfo::from).collect())
    }
}
