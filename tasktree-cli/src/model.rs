//! `tasktree model ...`

use crate::prompt::DialoguerPrompt;
use anyhow::Result;
use console::style;
use std::sync::Arc;
use tasktree_agent::{ConfigPreferenceStore, PreferenceStore};
use tasktree_common::Error;
use tasktree_core::WorkspaceSession;

pub async fn select(session: &WorkspaceSession) -> Result<()> {
    match session.resolver(Arc::new(DialoguerPrompt)).select().await {
        Ok(model) => {
            println!("{} summarization model set to {model}", style("✓").green().bold());
            Ok(())
        }
        Err(Error::SelectionCancelled) => {
            println!("No model selected; preference unchanged.");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn show(session: &WorkspaceSession) -> Result<()> {
    let saved = ConfigPreferenceStore::new(session.root()).saved_model()?;
    println!(
        "Saved:     {}",
        saved.as_deref().unwrap_or("(none)")
    );
    println!("Backend:   {}", session.config().summarizer.base_url);

    if !session.config().summarizer.enabled {
        println!("Summarization is disabled in config.");
        return Ok(());
    }

    match session.resolver(Arc::new(DialoguerPrompt)).resolve().await {
        Ok(model) => println!("Resolved:  {}", style(model).bold()),
        Err(e) => println!("Resolved:  {} {e}", style("✗").red()),
    }
    Ok(())
}
