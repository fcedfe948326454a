//! Watch mode: file-system events feed the debounced pipeline.

use crate::sync::{load_manifest, print_report, summarizer_or_none};
use anyhow::{Context, Result};
use console::style;
use notify::{Config as NotifyConfig, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tasktree_core::{DebouncedRunner, DiscoveredCommand, SummaryPipeline, WorkspaceSession};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Files whose changes trigger a run, and the directories watched for them.
///
/// Directories rather than files are watched because editors often save by
/// replacing the file, which drops a per-file watch.
#[derive(Debug, Default, PartialEq)]
struct WatchTargets {
    files: HashSet<PathBuf>,
    dirs: HashSet<PathBuf>,
}

impl WatchTargets {
    fn new(root: &Path, manifest: &Path, commands: &[DiscoveredCommand]) -> Self {
        let mut targets = Self::default();
        targets.add(manifest.to_path_buf());
        for command in commands {
            targets.add(command.source_path(root));
        }
        targets
    }

    fn add(&mut self, file: PathBuf) {
        if let Some(dir) = file.parent() {
            self.dirs.insert(dir.to_path_buf());
        }
        self.files.insert(file);
    }

    fn relevant(&self, event: &Event) -> Vec<PathBuf> {
        event
            .paths
            .iter()
            .filter(|p| self.files.contains(*p))
            .cloned()
            .collect()
    }
}

fn watch_dirs(watcher: &mut RecommendedWatcher, dirs: &HashSet<PathBuf>, already: &mut HashSet<PathBuf>) {
    for dir in dirs {
        if already.contains(dir) {
            continue;
        }
        match watcher.watch(dir, RecursiveMode::NonRecursive) {
            Ok(()) => {
                already.insert(dir.clone());
            }
            Err(e) => tracing::warn!(dir = %dir.display(), error = %e, "Failed to watch directory"),
        }
    }
}

pub async fn run(session: &WorkspaceSession, manifest: &Path) -> Result<()> {
    let root = std::fs::canonicalize(session.root())
        .with_context(|| format!("resolving workspace {}", session.root().display()))?;
    let manifest = std::fs::canonicalize(manifest)
        .with_context(|| format!("resolving manifest {}", manifest.display()))?;

    let summarizer = summarizer_or_none(session).await;
    let pipeline = Arc::new(session.pipeline(summarizer));

    let commands = load_manifest(&manifest)?;
    let mut targets = WatchTargets::new(&root, &manifest, &commands);

    // initial pass so the store is current before waiting for edits
    print_report(&pipeline.run(commands, &CancellationToken::new()).await?);

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
    let mut watcher = RecommendedWatcher::new(
        move |res| {
            let _ = event_tx.send(res);
        },
        NotifyConfig::default(),
    )
    .context("starting file watcher")?;
    let mut watched = HashSet::new();
    watch_dirs(&mut watcher, &targets.dirs, &mut watched);

    let runner = spawn_runner(session, Arc::clone(&pipeline), manifest.clone());
    println!(
        "{} watching {} files, press Ctrl-C to stop",
        style("👀").bold(),
        targets.files.len()
    );

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,

            event = event_rx.recv() => {
                let Some(event) = event else { break };
                let event = match event {
                    Ok(event) => event,
                    Err(e) => {
                        tracing::warn!(error = %e, "Watcher error");
                        continue;
                    }
                };

                let changed = targets.relevant(&event);
                if changed.contains(&manifest) {
                    match load_manifest(&manifest) {
                        Ok(commands) => {
                            targets = WatchTargets::new(&root, &manifest, &commands);
                            watch_dirs(&mut watcher, &targets.dirs, &mut watched);
                        }
                        Err(e) => tracing::warn!(error = %e, "Manifest reload failed"),
                    }
                }
                for path in changed {
                    tracing::debug!(path = %path.display(), "Source changed");
                    runner.trigger(path);
                }
            }
        }
    }

    println!("{} stopping", style("⏹").dim());
    runner.shutdown().await;
    Ok(())
}

fn spawn_runner(
    session: &WorkspaceSession,
    pipeline: Arc<SummaryPipeline>,
    manifest: PathBuf,
) -> DebouncedRunner {
    DebouncedRunner::spawn(session.debounce(), move |paths, cancel| {
        let pipeline = Arc::clone(&pipeline);
        let manifest = manifest.clone();
        async move {
            tracing::info!(changed = paths.len(), "Re-syncing after changes");
            let commands = match load_manifest(&manifest) {
                Ok(commands) => commands,
                Err(e) => {
                    tracing::warn!(error = %e, "Manifest unreadable, skipping run");
                    return;
                }
            };
            match pipeline.run(commands, &cancel).await {
                Ok(report) => print_report(&report),
                Err(e) => tracing::error!(error = %e, "Pipeline run failed"),
            }
        }
    })
}
