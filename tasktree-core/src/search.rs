//! Natural-language search over summarized commands.

use std::sync::Arc;
use tasktree_common::{Error, Result, SearchConfig};
use tasktree_memory::{CommandStore, EmbeddingProvider, ScoredCommand};

/// Embeds a query and ranks stored commands against it.
pub struct SemanticSearch {
    store: Arc<CommandStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    threshold: f32,
    top_k: usize,
}

impl SemanticSearch {
    pub fn new(
        store: Arc<CommandStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: &SearchConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            threshold: config.threshold,
            top_k: config.top_k,
        }
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Best matches for `query`, highest score first.
    pub async fn search(&self, query: &str) -> Result<Vec<ScoredCommand>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::InvalidInput("search query is empty".into()));
        }

        let vector = self.embedder.embed_one(query).await.map_err(Error::backend)?;
        let hits = self.store.semantic_search(&vector, self.top_k, self.threshold)?;
        tracing::debug!(
            query = %query,
            hits = hits.len(),
            backend = self.embedder.name(),
            "Semantic search"
        );
        Ok(hits)
    }
}
