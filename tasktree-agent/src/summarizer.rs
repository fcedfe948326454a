//! Summarization backend collaborator.

use crate::prompt::{build_prompt, parse_response, SYSTEM_PROMPT};
use crate::provider::Provider;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// What the summarizer is told about one command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryRequest {
    pub label: String,
    /// Ecosystem type, e.g. `npm` or `make`
    pub kind: String,
    /// The command line that would be executed
    pub command: String,
    /// Source text the command is defined in
    pub content: String,
}

/// Summarizer output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub summary: String,
    pub security_warning: Option<String>,
}

/// Produces summaries for commands. Treated as slow and unreliable.
#[async_trait]
pub trait Summarizer: Send + Sync {
    fn name(&self) -> &str;

    async fn summarize(&self, request: &SummaryRequest) -> anyhow::Result<Summary>;
}

/// Summarizer that prompts a chat model through a [`Provider`].
pub struct LlmSummarizer {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f64,
    max_content_chars: usize,
    timeout: Duration,
}

impl LlmSummarizer {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.2,
            max_content_chars: 4000,
            timeout: Duration::from_secs(120),
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_content_chars(mut self, max: usize) -> Self {
        self.max_content_chars = max;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl Summarizer for LlmSummarizer {
    fn name(&self) -> &str {
        self.provider.name()
    }

    async fn summarize(&self, request: &SummaryRequest) -> anyhow::Result<Summary> {
        let start = Instant::now();
        let prompt = build_prompt(request, self.max_content_chars);

        let reply = tokio::time::timeout(
            self.timeout,
            self.provider
                .chat_with_system(Some(SYSTEM_PROMPT), &prompt, &self.model, self.temperature),
        )
        .await
        .map_err(|_| anyhow::anyhow!("summarization timed out after {:?}", self.timeout))??;

        let summary = parse_response(&reply)?;
        tracing::debug!(
            label = %request.label,
            model = %self.model,
            duration_ms = start.elapsed().as_millis() as u64,
            flagged = summary.security_warning.is_some(),
            "Summarized command"
        );
        Ok(summary)
    }
}
