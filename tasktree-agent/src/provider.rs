//! Provider trait for LLM backends.
//!
//! The summarizer talks to a model through this interface; the Ollama client
//! is the only production implementation.

use async_trait::async_trait;

/// LLM provider trait.
///
/// Implementations handle request formatting and response parsing for a
/// specific chat API.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Provider name (e.g., "ollama").
    fn name(&self) -> &str;

    /// Chat with the LLM using a system prompt.
    ///
    /// # Arguments
    /// - `system`: Optional system prompt
    /// - `message`: User message
    /// - `model`: Model identifier
    /// - `temperature`: Sampling temperature
    ///
    /// # Returns
    /// The assistant's response text
    async fn chat_with_system(
        &self,
        system: Option<&str>,
        message: &str,
        model: &str,
        temperature: f64,
    ) -> anyhow::Result<String>;

    /// Simple chat without system prompt.
    async fn chat(&self, message: &str, model: &str, temperature: f64) -> anyhow::Result<String> {
        self.chat_with_system(None, message, model, temperature).await
    }
}
