//! Terminal model picker.

use async_trait::async_trait;
use dialoguer::{theme::ColorfulTheme, FuzzySelect};
use tasktree_agent::{ModelInfo, ModelPrompt};

/// Fuzzy-search list on the terminal. Declines when stdin/stdout are not a
/// terminal, or when the user presses Esc.
pub struct DialoguerPrompt;

#[async_trait]
impl ModelPrompt for DialoguerPrompt {
    async fn choose(&self, models: &[ModelInfo]) -> Option<ModelInfo> {
        if models.is_empty() || !console::user_attended() {
            return None;
        }

        let models = models.to_vec();
        let picked = tokio::task::spawn_blocking(move || {
            let items: Vec<String> = models.iter().map(ToString::to_string).collect();
            let index = FuzzySelect::with_theme(&ColorfulTheme::default())
                .with_prompt("Summarization model")
                .items(&items)
                .default(0)
                .interact_opt()
                .ok()
                .flatten()?;
            models.into_iter().nth(index)
        })
        .await;

        match picked {
            Ok(choice) => choice,
            Err(e) => {
                tracing::warn!(error = %e, "Model prompt failed");
                None
            }
        }
    }
}
