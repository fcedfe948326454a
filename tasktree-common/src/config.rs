//! Configuration types for tasktree.
//!
//! Configuration lives next to the command database in the workspace-local
//! data directory (`<workspace>/.tasktree/config.json`). Every field has a
//! serde default, so a missing or partial file is always usable.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the hidden per-workspace data directory.
pub const DATA_DIR_NAME: &str = ".tasktree";

/// File name of the embedded command database.
pub const DB_FILE_NAME: &str = "tasktree.sqlite3";

/// File name of the workspace configuration.
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Sentinel model id meaning "pick the first available model".
pub const AUTO_MODEL_ID: &str = "auto";

/// Get the data directory for a workspace.
pub fn data_dir(workspace: &Path) -> PathBuf {
    workspace.join(DATA_DIR_NAME)
}

/// Get the database path for a workspace.
pub fn db_path(workspace: &Path) -> PathBuf {
    data_dir(workspace).join(DB_FILE_NAME)
}

/// Get the configuration file path for a workspace.
pub fn config_path(workspace: &Path) -> PathBuf {
    data_dir(workspace).join(CONFIG_FILE_NAME)
}

// ============================================================================
// Sections
// ============================================================================

/// Summarization backend configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummarizerConfig {
    /// Generate summaries for discovered commands
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Base URL of the Ollama-compatible API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Saved model preference (may be the `auto` sentinel)
    #[serde(default)]
    pub model: Option<String>,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f64,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum characters of source content sent with a request
    #[serde(default = "default_max_content_chars")]
    pub max_content_chars: usize,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: default_base_url(),
            model: None,
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
            max_content_chars: default_max_content_chars(),
        }
    }
}

/// Embedding backend configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddingConfig {
    /// Generate embeddings from summaries
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Base URL of the Ollama-compatible API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Embedding model name
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Expected vector dimensions
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: default_base_url(),
            model: default_embedding_model(),
            dimensions: default_dimensions(),
        }
    }
}

/// Semantic search tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchConfig {
    /// Minimum cosine similarity for a hit
    #[serde(default = "default_threshold")]
    pub threshold: f32,

    /// Maximum number of hits
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            top_k: default_top_k(),
        }
    }
}

/// Registration/summarization pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineConfig {
    /// Settle window for coalescing file-change triggers
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Maximum commands summarized at once
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            concurrency: default_concurrency(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingConfig {
    /// Base log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format: "pretty" or "json"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_base_url() -> String {
    "http://localhost:11434".into()
}

fn default_temperature() -> f64 {
    0.2
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_max_content_chars() -> usize {
    4000
}

fn default_embedding_model() -> String {
    "all-minilm".into()
}

fn default_dimensions() -> usize {
    384
}

fn default_threshold() -> f32 {
    0.3
}

fn default_top_k() -> usize {
    10
}

fn default_debounce_ms() -> u64 {
    1000
}

fn default_concurrency() -> usize {
    4
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

// ============================================================================
// Root
// ============================================================================

/// Root configuration for a workspace.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub summarizer: SummarizerConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load the configuration for a workspace, falling back to defaults.
    pub fn load(workspace: &Path) -> Result<Self> {
        let path = config_path(workspace);
        if !path.exists() {
            tracing::debug!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config from {}: {e}", path.display()))
        })?;

        serde_json::from_str(&content).map_err(|e| {
            Error::Config(format!("Failed to parse config from {}: {e}", path.display()))
        })
    }

    /// Load configuration with environment variable overrides applied.
    pub fn load_with_env(workspace: &Path) -> Result<Self> {
        let mut config = Self::load(workspace)?;
        config.apply_env();
        Ok(config)
    }

    /// Apply environment variable overrides.
    pub fn apply_env(&mut self) {
        if let Ok(level) = std::env::var("TASKTREE_LOG_LEVEL") {
            if !level.is_empty() {
                self.logging.level = level;
            }
        }
        if let Ok(format) = std::env::var("TASKTREE_LOG_FORMAT") {
            if !format.is_empty() {
                self.logging.format = format;
            }
        }
        if let Ok(url) = std::env::var("OLLAMA_BASE_URL") {
            if !url.is_empty() {
                self.summarizer.base_url.clone_from(&url);
                self.embedding.base_url = url;
            }
        }
    }

    /// Save the configuration for a workspace.
    ///
    /// Writes to a temporary file first and renames it into place.
    pub fn save(&self, workspace: &Path) -> Result<()> {
        self.save_to(&config_path(workspace))
    }

    /// Save configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension(format!("{}.tmp", uuid::Uuid::new_v4().simple()));
        fs::write(&tmp, content)?;
        if let Err(e) = fs::rename(&tmp, path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }
}
