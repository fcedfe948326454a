//! Registration, summarization and embedding pipeline.
//!
//! For each discovered command, in its own task:
//!
//! ```text
//! read source → hash → register ─┬─ stale/empty → summarize → store → embed
//!                                └─ up to date ──────────────────→ (backfill embed)
//! ```
//!
//! Commands are independent: a failure in one stage of one command is
//! recorded in the report and never aborts its siblings. A command that is
//! registered but not summarized keeps an empty or stale summary, so the next
//! run picks it up again.

use crate::command::DiscoveredCommand;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tasktree_agent::Summarizer;
use tasktree_common::{Error, FileSystem, Result};
use tasktree_memory::{content_hash, CommandStore, EmbeddingProvider};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Where in a command's lifecycle a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Read,
    Register,
    Summarize,
    Store,
    Embed,
    /// The per-command task itself panicked or was aborted
    Task,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Read => "read",
            Self::Register => "register",
            Self::Summarize => "summarize",
            Self::Store => "store",
            Self::Embed => "embed",
            Self::Task => "task",
        };
        f.write_str(s)
    }
}

/// One failed stage of one command.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageFailure {
    pub command_id: String,
    pub stage: Stage,
    pub message: String,
}

/// Totals for one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineReport {
    pub registered: usize,
    pub summarized: usize,
    pub embedded: usize,
    pub up_to_date: usize,
    /// Commands never started because the run was cancelled
    pub skipped: usize,
    pub failures: Vec<StageFailure>,
    pub cancelled: bool,
    pub duration_ms: u64,
}

impl PipelineReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && !self.cancelled
    }

    fn absorb(&mut self, outcome: CommandOutcome) {
        if outcome.skipped {
            self.skipped += 1;
            return;
        }
        self.registered += usize::from(outcome.registered);
        self.summarized += usize::from(outcome.summarized);
        self.embedded += usize::from(outcome.embedded);
        self.up_to_date += usize::from(outcome.up_to_date);
        self.failures.extend(outcome.failures);
    }
}

#[derive(Debug, Default)]
struct CommandOutcome {
    skipped: bool,
    registered: bool,
    summarized: bool,
    embedded: bool,
    up_to_date: bool,
    failures: Vec<StageFailure>,
}

impl CommandOutcome {
    fn fail(&mut self, command_id: &str, stage: Stage, err: impl fmt::Display) {
        tracing::warn!(command_id = %command_id, stage = %stage, error = %err, "Pipeline stage failed");
        self.failures.push(StageFailure {
            command_id: command_id.to_string(),
            stage,
            message: err.to_string(),
        });
    }
}

/// Shared state handed to every per-command task.
struct Context {
    store: Arc<CommandStore>,
    fs: Arc<dyn FileSystem>,
    summarizer: Option<Arc<dyn Summarizer>>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    root: PathBuf,
}

/// Keeps stored summaries and embeddings in step with discovered commands.
pub struct SummaryPipeline {
    store: Arc<CommandStore>,
    fs: Arc<dyn FileSystem>,
    summarizer: Option<Arc<dyn Summarizer>>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    root: PathBuf,
    concurrency: usize,
}

impl SummaryPipeline {
    pub fn new(store: Arc<CommandStore>, fs: Arc<dyn FileSystem>, root: impl Into<PathBuf>) -> Self {
        Self {
            store,
            fs,
            summarizer: None,
            embedder: None,
            root: root.into(),
            concurrency: 4,
        }
    }

    /// Enable summarization through `summarizer`.
    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    /// Enable embedding generation through `embedder`.
    pub fn with_embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Maximum number of commands processed at once.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    fn context(&self) -> Arc<Context> {
        Arc::new(Context {
            store: Arc::clone(&self.store),
            fs: Arc::clone(&self.fs),
            summarizer: self.summarizer.clone(),
            embedder: self.embedder.clone(),
            root: self.root.clone(),
        })
    }

    pub fn store(&self) -> &Arc<CommandStore> {
        &self.store
    }

    /// Process a batch of discovered commands.
    ///
    /// Fails only if the store is unusable; everything else is reported per
    /// command. Cancellation is observed between commands.
    pub async fn run(
        &self,
        commands: Vec<DiscoveredCommand>,
        cancel: &CancellationToken,
    ) -> Result<PipelineReport> {
        let start = Instant::now();
        if !self.store.health_check() {
            return Err(Error::Database("command store is unavailable".into()));
        }

        let commands = dedupe_by_id(commands);
        let total = commands.len();
        tracing::info!(
            commands = total,
            summarize = self.summarizer.is_some(),
            embed = self.embedder.is_some(),
            "Pipeline run started"
        );

        let shared = self.context();
        let permits = Arc::new(Semaphore::new(self.concurrency));
        let mut join_set: JoinSet<CommandOutcome> = JoinSet::new();

        for command in commands {
            let ctx = Arc::clone(&shared);
            let permits = Arc::clone(&permits);
            let cancel = cancel.clone();

            join_set.spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return CommandOutcome {
                        skipped: true,
                        ..Default::default()
                    };
                };
                if cancel.is_cancelled() {
                    return CommandOutcome {
                        skipped: true,
                        ..Default::default()
                    };
                }
                process_command(&ctx, &command).await
            });
        }

        let mut report = PipelineReport::default();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(outcome) => report.absorb(outcome),
                Err(e) => {
                    tracing::error!(error = %e, "Pipeline task failed");
                    report.failures.push(StageFailure {
                        command_id: String::new(),
                        stage: Stage::Task,
                        message: e.to_string(),
                    });
                }
            }
        }

        report.cancelled = cancel.is_cancelled() || report.skipped > 0;
        report.duration_ms = start.elapsed().as_millis() as u64;
        tracing::info!(
            registered = report.registered,
            summarized = report.summarized,
            embedded = report.embedded,
            up_to_date = report.up_to_date,
            failed = report.failures.len(),
            skipped = report.skipped,
            duration_ms = report.duration_ms,
            "Pipeline run finished"
        );
        Ok(report)
    }
}

async fn process_command(ctx: &Context, command: &DiscoveredCommand) -> CommandOutcome {
    let id = command.id();
    let mut outcome = CommandOutcome::default();

    // read + hash
    let path = command.source_path(&ctx.root);
    let content = if ctx.fs.exists(&path).await {
        match ctx.fs.read_file(&path).await {
            Ok(text) => text,
            Err(e) => {
                outcome.fail(&id, Stage::Read, e);
                command.command.clone()
            }
        }
    } else {
        tracing::debug!(command_id = %id, path = %path.display(), "Source missing, hashing command text");
        command.command.clone()
    };
    let hash = content_hash(&content);

    // register, remembering the row as it was before
    let previous = match ctx.store.get_row(&id) {
        Ok(row) => row,
        Err(e) => {
            outcome.fail(&id, Stage::Register, e);
            return outcome;
        }
    };
    if let Err(e) = ctx.store.register_command(&id, &hash) {
        outcome.fail(&id, Stage::Register, e);
        return outcome;
    }
    outcome.registered = true;

    let needs_summary = previous.as_ref().map_or(true, |row| row.needs_summary(&hash));
    let mut embed_text = previous
        .as_ref()
        .filter(|row| row.needs_embedding())
        .map(|row| row.summary.clone());

    if !needs_summary {
        outcome.up_to_date = true;
    } else if let Some(summarizer) = &ctx.summarizer {
        match summarizer.summarize(&command.summary_request(&content)).await {
            Ok(summary) => {
                match ctx.store.upsert_summary(
                    &id,
                    &hash,
                    &summary.summary,
                    summary.security_warning.as_deref(),
                ) {
                    Ok(()) => {
                        outcome.summarized = true;
                        embed_text = Some(summary.summary);
                    }
                    Err(e) => outcome.fail(&id, Stage::Store, e),
                }
            }
            Err(e) => outcome.fail(&id, Stage::Summarize, Error::backend(e)),
        }
    }

    if let (Some(embedder), Some(text)) = (&ctx.embedder, embed_text) {
        if !text.trim().is_empty() {
            match embedder.embed_one(&text).await {
                Ok(vector) => match ctx.store.update_embedding(&id, &vector) {
                    Ok(()) => outcome.embedded = true,
                    Err(e) => outcome.fail(&id, Stage::Embed, e),
                },
                Err(e) => outcome.fail(&id, Stage::Embed, Error::backend(e)),
            }
        }
    }

    // a vector left over from the previous summary would rank by stale text
    if outcome.summarized && !outcome.embedded {
        if let Err(e) = ctx.store.clear_embedding(&id) {
            outcome.fail(&id, Stage::Store, e);
        }
    }

    outcome
}

/// Keep the last occurrence of each command id so no row gets two writers.
fn dedupe_by_id(commands: Vec<DiscoveredCommand>) -> Vec<DiscoveredCommand> {
    let mut last: HashMap<String, usize> = HashMap::with_capacity(commands.len());
    for (index, command) in commands.iter().enumerate() {
        last.insert(command.id(), index);
    }
    commands
        .into_iter()
        .enumerate()
        .filter(|(index, command)| last.get(&command.id()) == Some(index))
        .map(|(_, command)| command)
        .collect()
}
