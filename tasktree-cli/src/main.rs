#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions
)]

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tasktree_common::{logging::init_logging, Config};
use tasktree_core::WorkspaceSession;

mod inspect;
mod model;
mod prompt;
mod sync;
mod tags;
mod watch;

/// `tasktree` - AI summaries, tags and semantic search for workspace commands.
#[derive(Parser, Debug)]
#[command(name = "tasktree")]
#[command(version)]
#[command(about = "Command knowledge store for your workspace.", long_about = None)]
struct Cli {
    /// Workspace root (defaults to the current directory)
    #[arg(short, long, global = true)]
    workspace: Option<PathBuf>,

    /// Log level override (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Register, summarize and embed the commands in a discovery manifest
    Sync {
        /// JSON array of discovered commands
        #[arg(short, long)]
        manifest: PathBuf,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Re-sync whenever a command source changes
    Watch {
        /// JSON array of discovered commands
        #[arg(short, long)]
        manifest: PathBuf,
    },

    /// Find commands by what they do
    Search {
        /// Natural-language query
        query: String,

        /// Maximum number of results
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Minimum similarity score (-1.0 to 1.0)
        #[arg(short, long)]
        threshold: Option<f32>,
    },

    /// Show everything stored for one command
    Show {
        /// Command id, e.g. `npm:package.json:build`
        command_id: String,
    },

    /// List stored commands
    List {
        /// Only commands carrying this tag, in tag order
        #[arg(short, long)]
        tag: Option<String>,
    },

    /// Manage tags
    Tag {
        #[command(subcommand)]
        tag_command: TagCommands,
    },

    /// Import data from the older JSON stores
    Import {
        #[command(subcommand)]
        import_command: ImportCommands,
    },

    /// Remove tag associations whose command or tag no longer exists
    Cleanup,

    /// Manage the summarization model
    Model {
        #[command(subcommand)]
        model_command: ModelCommands,
    },
}

#[derive(Subcommand, Debug)]
enum TagCommands {
    /// Attach a tag to a command (creates either if missing)
    Add {
        command_id: String,
        tag: String,
    },
    /// Detach a tag from a command
    Remove {
        command_id: String,
        tag: String,
    },
    /// List all tags, or the tags of one command
    List {
        command_id: Option<String>,
    },
    /// List the commands carrying a tag, in display order
    Commands {
        tag: String,
    },
    /// Set the display order of a tag's commands
    Reorder {
        tag: String,
        /// Command ids in the desired order
        #[arg(required = true)]
        command_ids: Vec<String>,
    },
    /// Delete a tag and all its associations
    Delete {
        tag: String,
    },
}

#[derive(Subcommand, Debug)]
enum ImportCommands {
    /// Import tag → command-id lists, replacing every existing tag
    Tags {
        /// JSON object of tag name to command ids
        file: PathBuf,
    },
    /// Import cached summaries keyed by command id
    Summaries {
        /// JSON object of command id to summary record
        file: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
enum ModelCommands {
    /// Pick a summarization model interactively and save it
    Select,
    /// Show the saved model and resolve it against the backend
    Show,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let workspace = match cli.workspace {
        Some(path) => path,
        None => std::env::current_dir()?,
    };

    let mut config = Config::load_with_env(&workspace)?;
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    init_logging(&config.logging.level, &config.logging.format);

    let session = WorkspaceSession::with_config(&workspace, config)?;

    match cli.command {
        Commands::Sync { manifest, json } => sync::run(&session, &manifest, json).await,

        Commands::Watch { manifest } => watch::run(&session, &manifest).await,

        Commands::Search {
            query,
            top_k,
            threshold,
        } => inspect::search(&session, &query, top_k, threshold).await,

        Commands::Show { command_id } => inspect::show(&session, &command_id),

        Commands::List { tag } => inspect::list(&session, tag.as_deref()),

        Commands::Tag { tag_command } => tags::handle_command(tag_command, &session),

        Commands::Import { import_command } => match import_command {
            ImportCommands::Tags { file } => inspect::import_tags(&session, &file),
            ImportCommands::Summaries { file } => inspect::import_summaries(&session, &file),
        },

        Commands::Cleanup => inspect::cleanup(&session),

        Commands::Model { model_command } => match model_command {
            ModelCommands::Select => model::select(&session).await,
            ModelCommands::Show => model::show(&session).await,
        },
    }
}
