//! Commands as reported by discovery.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tasktree_agent::SummaryRequest;
use tasktree_common::{Error, Result};

/// One runnable command found by a discovery parser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredCommand {
    /// Display label in the tree
    pub label: String,
    /// Ecosystem type, e.g. `npm`, `make`, `shell`
    pub kind: String,
    /// Command name within its source file
    pub name: String,
    /// Source file, relative to the workspace root or absolute
    pub file_path: PathBuf,
    /// The command line that runs it
    pub command: String,
}

impl DiscoveredCommand {
    /// Stable store key for this command.
    pub fn id(&self) -> String {
        tasktree_memory::command_id(&self.kind, &self.file_path.to_string_lossy(), &self.name)
    }

    /// Absolute source path for a workspace rooted at `root`.
    pub fn source_path(&self, root: &Path) -> PathBuf {
        if self.file_path.is_absolute() {
            self.file_path.clone()
        } else {
            root.join(&self.file_path)
        }
    }

    pub fn summary_request(&self, content: &str) -> SummaryRequest {
        SummaryRequest {
            label: self.label.clone(),
            kind: self.kind.clone(),
            command: self.command.clone(),
            content: content.to_string(),
        }
    }
}

/// Parse a discovery manifest: a JSON array of commands.
pub fn parse_manifest(json: &str) -> Result<Vec<DiscoveredCommand>> {
    serde_json::from_str(json).map_err(|e| Error::InvalidInput(format!("command manifest: {e}")))
}
