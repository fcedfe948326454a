//! tasktree agent - summarization backends and model resolution.
//!
//! Provides:
//! - The [`Summarizer`] collaborator and an LLM-backed implementation
//! - Prompt construction and tolerant response parsing
//! - The model resolver fallback chain (saved → enumerate → prompt)
//! - An Ollama client for chat and model listing
//!
//! ## Example
//!
//! ```ignore
//! use tasktree_agent::{ConfigPreferenceStore, LlmSummarizer, ModelResolver, OllamaClient};
//!
//! let ollama = Arc::new(OllamaClient::new(Some(&config.summarizer.base_url), timeout));
//! let resolver = ModelResolver::new(ollama.clone(), prompt, Arc::new(ConfigPreferenceStore::new(root)));
//! let model = resolver.resolve().await?;
//! let summarizer = LlmSummarizer::new(ollama, model.id);
//! ```

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod ollama;
pub mod preference;
pub mod prompt;
pub mod provider;
pub mod resolver;
pub mod summarizer;

pub use ollama::OllamaClient;
pub use preference::ConfigPreferenceStore;
pub use provider::Provider;
pub use resolver::{
    pick_auto, ModelCatalog, ModelInfo, ModelPrompt, ModelResolver, PreferenceStore, ResolveState,
};
pub use summarizer::{LlmSummarizer, Summarizer, Summary, SummaryRequest};
