//! Model resolution.
//!
//! Picks the summarization model with a fixed fallback chain:
//!
//! ```text
//! UsingSaved ──found──────────────────────────────→ Resolved
//!     │ missing / lookup failed
//!     ▼
//! FetchingAll ──empty──→ Failed(NoBackendAvailable)
//!     │
//!     ▼
//! Prompting ──declined──→ Failed(SelectionCancelled)
//!     │ chosen (saved as new preference)
//!     ▼
//! Resolved
//! ```
//!
//! A valid saved preference never triggers enumeration or a prompt. The
//! `auto` sentinel skips the prompt and takes the first listed model.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tasktree_common::{Error, Result, AUTO_MODEL_ID};

#[cfg(test)]
use mockall::automock;

/// A model offered by a backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    /// Human-readable extra detail, e.g. parameter size
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ModelInfo {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            details: None,
        }
    }
}

impl fmt::Display for ModelInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.details {
            Some(details) => write!(f, "{} ({details})", self.id),
            None => write!(f, "{}", self.id),
        }
    }
}

/// Live listing of the models a backend can serve.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ModelCatalog: Send + Sync {
    /// Exact-id lookup.
    async fn find(&self, id: &str) -> anyhow::Result<Option<ModelInfo>>;

    /// Every available model, in backend order.
    async fn fetch_all(&self) -> anyhow::Result<Vec<ModelInfo>>;
}

/// Asks the user to pick one model. `None` means they declined.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ModelPrompt: Send + Sync {
    async fn choose(&self, models: &[ModelInfo]) -> Option<ModelInfo>;
}

/// Where the saved model preference lives.
#[cfg_attr(test, automock)]
pub trait PreferenceStore: Send + Sync {
    fn saved_model(&self) -> Result<Option<String>>;

    fn save_model(&self, id: &str) -> Result<()>;
}

/// Resolver states, logged as the chain advances.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolveState {
    UsingSaved(String),
    FetchingAll,
    Prompting(Vec<ModelInfo>),
    Resolved(ModelInfo),
}

impl fmt::Display for ResolveState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UsingSaved(id) => write!(f, "using saved model '{id}'"),
            Self::FetchingAll => write!(f, "fetching available models"),
            Self::Prompting(models) => write!(f, "prompting with {} models", models.len()),
            Self::Resolved(model) => write!(f, "resolved '{}'", model.id),
        }
    }
}

/// First entry that is a real model rather than the `auto` sentinel.
pub fn pick_auto(models: &[ModelInfo]) -> Option<&ModelInfo> {
    models.iter().find(|m| m.id != AUTO_MODEL_ID)
}

/// Runs the fallback chain against injected collaborators.
pub struct ModelResolver {
    catalog: Arc<dyn ModelCatalog>,
    prompt: Arc<dyn ModelPrompt>,
    preferences: Arc<dyn PreferenceStore>,
}

impl ModelResolver {
    pub fn new(
        catalog: Arc<dyn ModelCatalog>,
        prompt: Arc<dyn ModelPrompt>,
        preferences: Arc<dyn PreferenceStore>,
    ) -> Self {
        Self {
            catalog,
            prompt,
            preferences,
        }
    }

    /// Resolve the model to summarize with.
    pub async fn resolve(&self) -> Result<ModelInfo> {
        let mut state = match self.preferences.saved_model()? {
            Some(id) if id == AUTO_MODEL_ID => return self.resolve_auto().await,
            Some(id) => ResolveState::UsingSaved(id),
            None => ResolveState::FetchingAll,
        };

        loop {
            tracing::debug!(state = %state, "Model resolution");
            state = match state {
                ResolveState::UsingSaved(id) => match self.catalog.find(&id).await {
                    Ok(Some(model)) => ResolveState::Resolved(model),
                    Ok(None) => {
                        tracing::warn!(model = %id, "Saved model is no longer available");
                        ResolveState::FetchingAll
                    }
                    Err(e) => {
                        tracing::warn!(model = %id, error = %e, "Saved model lookup failed");
                        ResolveState::FetchingAll
                    }
                },
                ResolveState::FetchingAll => {
                    let models = self.available_models().await?;
                    ResolveState::Prompting(models)
                }
                ResolveState::Prompting(models) => {
                    let chosen = self
                        .prompt
                        .choose(&models)
                        .await
                        .ok_or(Error::SelectionCancelled)?;
                    if let Err(e) = self.preferences.save_model(&chosen.id) {
                        tracing::warn!(model = %chosen.id, error = %e, "Failed to save model preference");
                    }
                    ResolveState::Resolved(chosen)
                }
                ResolveState::Resolved(model) => {
                    tracing::info!(model = %model.id, "Using summarization model");
                    return Ok(model);
                }
            };
        }
    }

    /// Resolve the `auto` sentinel: first available model, no prompt, and
    /// the saved preference stays `auto`.
    pub async fn resolve_auto(&self) -> Result<ModelInfo> {
        let models = self.available_models().await?;
        let model = pick_auto(&models)
            .cloned()
            .ok_or_else(|| Error::NoBackendAvailable("no models available".into()))?;
        tracing::info!(model = %model.id, "Auto-selected summarization model");
        Ok(model)
    }

    /// Interactive re-selection that ignores the saved preference.
    pub async fn select(&self) -> Result<ModelInfo> {
        let models = self.available_models().await?;
        let chosen = self
            .prompt
            .choose(&models)
            .await
            .ok_or(Error::SelectionCancelled)?;
        self.preferences.save_model(&chosen.id)?;
        Ok(chosen)
    }

    async fn available_models(&self) -> Result<Vec<ModelInfo>> {
        let models: Vec<ModelInfo> = self
            .catalog
            .fetch_all()
            .await
            .map_err(Error::backend)?
            .into_iter()
            .filter(|m| m.id != AUTO_MODEL_ID)
            .collect();
        if models.is_empty() {
            return Err(Error::NoBackendAvailable(
                "the backend reports no installed models".into(),
            ));
        }
        Ok(models)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn models(ids: &[&str]) -> Vec<ModelInfo> {
        ids.iter().map(|id| ModelInfo::new(*id)).collect()
    }

    fn resolver(
        catalog: MockModelCatalog,
        prompt: MockModelPrompt,
        prefs: MockPreferenceStore,
    ) -> ModelResolver {
        ModelResolver::new(Arc::new(catalog), Arc::new(prompt), Arc::new(prefs))
    }

    #[tokio::test]
    async fn saved_model_short_circuits() {
        let mut prefs = MockPreferenceStore::new();
        prefs
            .expect_saved_model()
            .times(1)
            .returning(|| Ok(Some("llama3.2".into())));
        prefs.expect_save_model().never();

        let mut catalog = MockModelCatalog::new();
        catalog
            .expect_find()
            .withf(|id| id == "llama3.2")
            .times(1)
            .returning(|id| Ok(Some(ModelInfo::new(id))));
        catalog.expect_fetch_all().never();

        let mut prompt = MockModelPrompt::new();
        prompt.expect_choose().never();

        let model = resolver(catalog, prompt, prefs).resolve().await.unwrap();
        assert_eq!(model.id, "llama3.2");
    }

    #[tokio::test]
    async fn no_saved_model_prompts_and_saves() {
        let mut prefs = MockPreferenceStore::new();
        prefs.expect_saved_model().returning(|| Ok(None));
        prefs
            .expect_save_model()
            .withf(|id| id == "qwen2.5")
            .times(1)
            .returning(|_| Ok(()));

        let mut catalog = MockModelCatalog::new();
        catalog.expect_find().never();
        catalog
            .expect_fetch_all()
            .times(1)
            .returning(|| Ok(models(&["llama3.2", "qwen2.5"])));

        let mut prompt = MockModelPrompt::new();
        prompt
            .expect_choose()
            .times(1)
            .returning(|list| list.get(1).cloned());

        let model = resolver(catalog, prompt, prefs).resolve().await.unwrap();
        assert_eq!(model.id, "qwen2.5");
    }

    #[tokio::test]
    async fn stale_saved_model_falls_back_to_prompt() {
        let mut prefs = MockPreferenceStore::new();
        prefs
            .expect_saved_model()
            .returning(|| Ok(Some("removed-model".into())));
        prefs.expect_save_model().times(1).returning(|_| Ok(()));

        let mut catalog = MockModelCatalog::new();
        catalog.expect_find().times(1).returning(|_| Ok(None));
        catalog
            .expect_fetch_all()
            .times(1)
            .returning(|| Ok(models(&["llama3.2"])));

        let mut prompt = MockModelPrompt::new();
        prompt
            .expect_choose()
            .times(1)
            .returning(|list| list.first().cloned());

        let model = resolver(catalog, prompt, prefs).resolve().await.unwrap();
        assert_eq!(model.id, "llama3.2");
    }

    #[tokio::test]
    async fn declined_prompt_is_cancellation() {
        let mut prefs = MockPreferenceStore::new();
        prefs.expect_saved_model().returning(|| Ok(None));
        prefs.expect_save_model().never();

        let mut catalog = MockModelCatalog::new();
        catalog
            .expect_fetch_all()
            .returning(|| Ok(models(&["llama3.2"])));

        let mut prompt = MockModelPrompt::new();
        prompt.expect_choose().times(1).returning(|_| None);

        let err = resolver(catalog, prompt, prefs).resolve().await.unwrap_err();
        assert!(matches!(err, Error::SelectionCancelled));
    }

    #[tokio::test]
    async fn empty_listing_is_no_backend() {
        let mut prefs = MockPreferenceStore::new();
        prefs.expect_saved_model().returning(|| Ok(None));

        let mut catalog = MockModelCatalog::new();
        catalog.expect_fetch_all().returning(|| Ok(models(&["auto"])));

        let mut prompt = MockModelPrompt::new();
        prompt.expect_choose().never();

        let err = resolver(catalog, prompt, prefs).resolve().await.unwrap_err();
        assert!(matches!(err, Error::NoBackendAvailable(_)));
    }

    #[tokio::test]
    async fn unreachable_backend_is_backend_failure() {
        let mut prefs = MockPreferenceStore::new();
        prefs.expect_saved_model().returning(|| Ok(None));

        let mut catalog = MockModelCatalog::new();
        catalog
            .expect_fetch_all()
            .returning(|| Err(anyhow::anyhow!("connection refused")));

        let mut prompt = MockModelPrompt::new();
        prompt.expect_choose().never();

        let err = resolver(catalog, prompt, prefs).resolve().await.unwrap_err();
        assert!(matches!(err, Error::BackendFailure(_)));
    }

    #[tokio::test]
    async fn auto_sentinel_picks_first_without_prompt() {
        let mut prefs = MockPreferenceStore::new();
        prefs
            .expect_saved_model()
            .returning(|| Ok(Some(AUTO_MODEL_ID.into())));
        prefs.expect_save_model().never();

        let mut catalog = MockModelCatalog::new();
        catalog.expect_find().never();
        catalog
            .expect_fetch_all()
            .times(1)
            .returning(|| Ok(models(&["auto", "mistral", "llama3.2"])));

        let mut prompt = MockModelPrompt::new();
        prompt.expect_choose().never();

        let model = resolver(catalog, prompt, prefs).resolve().await.unwrap();
        assert_eq!(model.id, "mistral");
    }

    #[tokio::test]
    async fn save_failure_does_not_lose_choice() {
        let mut prefs = MockPreferenceStore::new();
        prefs.expect_saved_model().returning(|| Ok(None));
        prefs
            .expect_save_model()
            .returning(|_| Err(Error::Config("read-only".into())));

        let mut catalog = MockModelCatalog::new();
        catalog
            .expect_fetch_all()
            .returning(|| Ok(models(&["llama3.2"])));

        let mut prompt = MockModelPrompt::new();
        prompt
            .expect_choose()
            .returning(|list| list.first().cloned());

        let model = resolver(catalog, prompt, prefs).resolve().await.unwrap();
        assert_eq!(model.id, "llama3.2");
    }

    #[tokio::test]
    async fn select_ignores_saved_preference() {
        let mut prefs = MockPreferenceStore::new();
        prefs.expect_saved_model().never();
        prefs
            .expect_save_model()
            .withf(|id| id == "mistral")
            .times(1)
            .returning(|_| Ok(()));

        let mut catalog = MockModelCatalog::new();
        catalog.expect_find().never();
        catalog
            .expect_fetch_all()
            .returning(|| Ok(models(&["llama3.2", "mistral"])));

        let mut prompt = MockModelPrompt::new();
        prompt
            .expect_choose()
            .returning(|list| list.last().cloned());

        let model = resolver(catalog, prompt, prefs).select().await.unwrap();
        assert_eq!(model.id, "mistral");
    }

    #[test]
    fn pick_auto_skips_sentinel() {
        let list = models(&["auto", "auto", "phi3"]);
        assert_eq!(pick_auto(&list).unwrap().id, "phi3");
        assert!(pick_auto(&models(&["auto"])).is_none());
        assert!(pick_auto(&[]).is_none());
    }

    #[test]
    fn model_display() {
        let mut m = ModelInfo::new("llama3.2");
        assert_eq!(m.to_string(), "llama3.2");
        m.details = Some("3.2B".into());
        assert_eq!(m.to_string(), "llama3.2 (3.2B)");
    }
}
