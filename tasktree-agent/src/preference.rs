//! Model preference persisted in the workspace config file.

use crate::resolver::PreferenceStore;
use std::path::{Path, PathBuf};
use tasktree_common::{Config, Result};

/// Stores the preference as `summarizer.model` in `.tasktree/config.json`.
///
/// Each save re-reads the file so unrelated edits made since startup are
/// kept; concurrent writers are last-write-wins.
#[derive(Debug, Clone)]
pub struct ConfigPreferenceStore {
    workspace: PathBuf,
}

impl ConfigPreferenceStore {
    pub fn new(workspace: &Path) -> Self {
        Self {
            workspace: workspace.to_path_buf(),
        }
    }
}

impl PreferenceStore for ConfigPreferenceStore {
    fn saved_model(&self) -> Result<Option<String>> {
        let config = Config::load(&self.workspace)?;
        Ok(config.summarizer.model.filter(|m| !m.trim().is_empty()))
    }

    fn save_model(&self, id: &str) -> Result<()> {
        let mut config = Config::load(&self.workspace)?;
        config.summarizer.model = Some(id.to_string());
        config.save(&self.workspace)?;
        tracing::debug!(model = %id, "Saved model preference");
        Ok(())
    }
}
