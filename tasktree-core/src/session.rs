//! Per-workspace wiring of config, store and backends.

use crate::pipeline::SummaryPipeline;
use crate::search::SemanticSearch;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tasktree_agent::{
    ConfigPreferenceStore, LlmSummarizer, ModelCatalog, ModelPrompt, ModelResolver, OllamaClient,
    Provider, Summarizer,
};
use tasktree_common::{Config, FileSystem, LocalFileSystem, Result};
use tasktree_memory::{create_embedding_provider, CommandStore, EmbeddingProvider};

/// Everything needed to work on one workspace.
///
/// The store is opened once here and shared by the pipeline and search for
/// the life of the session.
pub struct WorkspaceSession {
    root: PathBuf,
    config: Config,
    store: Arc<CommandStore>,
    fs: Arc<dyn FileSystem>,
    embedder: Arc<dyn EmbeddingProvider>,
    ollama: Arc<OllamaClient>,
}

impl WorkspaceSession {
    /// Load and validate config, then open the store.
    ///
    /// A store that cannot be opened fails the whole session.
    pub fn open(root: &Path) -> Result<Self> {
        let config = Config::load_with_env(root)?;
        Self::with_config(root, config)
    }

    /// Open with an already-loaded config.
    pub fn with_config(root: &Path, config: Config) -> Result<Self> {
        config.validate()?;

        let store = Arc::new(CommandStore::open_in_workspace(root)?);
        let embedder = create_embedding_provider(&config.embedding);
        let ollama = Arc::new(OllamaClient::new(
            Some(&config.summarizer.base_url),
            Duration::from_secs(config.summarizer.timeout_secs),
        ));

        tracing::info!(
            workspace = %root.display(),
            summarizer = config.summarizer.enabled,
            embeddings = config.embedding.enabled,
            "Workspace session opened"
        );

        Ok(Self {
            root: root.to_path_buf(),
            config,
            store,
            fs: Arc::new(LocalFileSystem::new()),
            embedder,
            ollama,
        })
    }

    /// Replace the file system the pipeline reads sources through.
    pub fn with_file_system(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = fs;
        self
    }

    /// Replace the embedding backend.
    pub fn with_embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = embedder;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<CommandStore> {
        &self.store
    }

    /// Model resolver backed by the Ollama catalog and the workspace config.
    pub fn resolver(&self, prompt: Arc<dyn ModelPrompt>) -> ModelResolver {
        let catalog: Arc<dyn ModelCatalog> = self.ollama.clone();
        ModelResolver::new(catalog, prompt, Arc::new(ConfigPreferenceStore::new(&self.root)))
    }

    /// Summarizer for this session, resolving the model first.
    ///
    /// `None` when summarization is disabled; the resolver is not consulted.
    pub async fn summarizer(
        &self,
        prompt: Arc<dyn ModelPrompt>,
    ) -> Result<Option<Arc<dyn Summarizer>>> {
        let settings = &self.config.summarizer;
        if !settings.enabled {
            return Ok(None);
        }

        let model = self.resolver(prompt).resolve().await?;
        let provider: Arc<dyn Provider> = self.ollama.clone();
        let summarizer = LlmSummarizer::new(provider, model.id)
            .with_temperature(settings.temperature)
            .with_max_content_chars(settings.max_content_chars)
            .with_timeout(Duration::from_secs(settings.timeout_secs));
        Ok(Some(Arc::new(summarizer)))
    }

    /// Pipeline over this session's store, with embeddings when enabled.
    pub fn pipeline(&self, summarizer: Option<Arc<dyn Summarizer>>) -> SummaryPipeline {
        let mut pipeline = SummaryPipeline::new(
            Arc::clone(&self.store),
            Arc::clone(&self.fs),
            self.root.clone(),
        )
        .with_concurrency(self.config.pipeline.concurrency);
        if let Some(summarizer) = summarizer {
            pipeline = pipeline.with_summarizer(summarizer);
        }
        if self.config.embedding.enabled {
            pipeline = pipeline.with_embedder(Arc::clone(&self.embedder));
        }
        pipeline
    }

    pub fn search(&self) -> SemanticSearch {
        SemanticSearch::new(
            Arc::clone(&self.store),
            Arc::clone(&self.embedder),
            &self.config.search,
        )
    }

    /// Settle window for the debounced scheduler.
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.config.pipeline.debounce_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tasktree_agent::ModelInfo;
    use tasktree_common::Error;
    use tempfile::TempDir;

    struct NeverPrompt;

    #[async_trait]
    impl ModelPrompt for NeverPrompt {
        async fn choose(&self, _models: &[ModelInfo]) -> Option<ModelInfo> {
            panic!("prompt must not be shown");
        }
    }

    fn disabled_config() -> Config {
        let mut config = Config::default();
        config.summarizer.enabled = false;
        config.embedding.enabled = false;
        config
    }

    #[test]
    fn open_creates_store_under_data_dir() {
        let tmp = TempDir::new().unwrap();
        let session = WorkspaceSession::with_config(tmp.path(), disabled_config()).unwrap();
        assert!(tasktree_common::config::db_path(tmp.path()).exists());
        assert!(session.store().health_check());
        assert_eq!(session.debounce(), Duration::from_millis(1000));
    }

    #[test]
    fn invalid_config_fails() {
        let tmp = TempDir::new().unwrap();
        let mut config = disabled_config();
        config.search.top_k = 0;
        let err = WorkspaceSession::with_config(tmp.path(), config).err().unwrap();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn unreadable_store_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let db = tasktree_common::config::db_path(tmp.path());
        std::fs::create_dir_all(db.parent().unwrap()).unwrap();
        std::fs::write(&db, vec![0x42u8; 4096]).unwrap();

        let err = WorkspaceSession::with_config(tmp.path(), disabled_config()).err().unwrap();
        assert!(err.is_open_failure());
    }

    #[tokio::test]
    async fn disabled_summarizer_skips_resolution() {
        let tmp = TempDir::new().unwrap();
        let session = WorkspaceSession::with_config(tmp.path(), disabled_config()).unwrap();
        let summarizer = session.summarizer(Arc::new(NeverPrompt)).await.unwrap();
        assert!(summarizer.is_none());
    }

    #[test]
    fn open_reads_config_file() {
        let tmp = TempDir::new().unwrap();
        let mut config = disabled_config();
        config.search.top_k = 3;
        config.save(tmp.path()).unwrap();

        let session = WorkspaceSession::open(tmp.path()).unwrap();
        assert_eq!(session.config().search.top_k, 3);
        assert!(!session.config().summarizer.enabled);
    }
}
