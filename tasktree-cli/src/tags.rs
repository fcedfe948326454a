//! `tasktree tag ...`

use crate::TagCommands;
use anyhow::{bail, Result};
use console::style;
use tasktree_core::WorkspaceSession;

pub fn handle_command(command: TagCommands, session: &WorkspaceSession) -> Result<()> {
    let store = session.store();
    match command {
        TagCommands::Add { command_id, tag } => {
            store.add_tag_to_command(&command_id, &tag)?;
            println!("{} tagged {command_id} with '{tag}'", style("✓").green().bold());
        }
        TagCommands::Remove { command_id, tag } => {
            if store.remove_tag_from_command(&command_id, &tag)? {
                println!("{} removed '{tag}' from {command_id}", style("✓").green().bold());
            } else {
                println!("{command_id} was not tagged '{tag}'");
            }
        }
        TagCommands::List { command_id } => {
            let tags = match &command_id {
                Some(id) => store.get_tags_for_command(id)?,
                None => store.get_all_tag_names()?,
            };
            if tags.is_empty() {
                println!("No tags.");
            }
            for tag in tags {
                println!("{tag}");
            }
        }
        TagCommands::Commands { tag } => {
            for id in store.get_command_ids_by_tag(&tag)? {
                println!("{id}");
            }
        }
        TagCommands::Reorder { tag, command_ids } => {
            store.reorder_tag_commands(&tag, &command_ids)?;
            println!("{} reordered '{tag}'", style("✓").green().bold());
        }
        TagCommands::Delete { tag } => {
            if !store.delete_tag(&tag)? {
                bail!("no tag named '{tag}'");
            }
            println!("{} deleted tag '{tag}'", style("✓").green().bold());
        }
    }
    Ok(())
}
