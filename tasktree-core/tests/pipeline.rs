//! End-to-end pipeline behavior against an in-memory store and fake backends.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tasktree_agent::{Summarizer, Summary, SummaryRequest};
use tasktree_common::{Error, FileSystem, Result};
use tasktree_core::{DebouncedRunner, DiscoveredCommand, Stage, SummaryPipeline};
use tasktree_memory::{content_hash, CommandStore, EmbeddingProvider};
use tokio_util::sync::CancellationToken;

const ROOT: &str = "/work";

// ── Fakes ──────────────────────────────────────────────────────

#[derive(Default)]
struct MemoryFs {
    files: Mutex<HashMap<PathBuf, String>>,
    unreadable: Mutex<HashSet<PathBuf>>,
}

impl MemoryFs {
    fn put(&self, rel: &str, content: &str) {
        self.files
            .lock()
            .unwrap()
            .insert(Path::new(ROOT).join(rel), content.to_string());
    }

    fn break_file(&self, rel: &str) {
        self.unreadable.lock().unwrap().insert(Path::new(ROOT).join(rel));
    }
}

#[async_trait]
impl FileSystem for MemoryFs {
    async fn read_file(&self, path: &Path) -> Result<String> {
        if self.unreadable.lock().unwrap().contains(path) {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "permission denied",
            )));
        }
        self.files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| Error::NotFound(path.display().to_string()))
    }

    async fn write_file(&self, path: &Path, content: &str) -> Result<()> {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), content.to_string());
        Ok(())
    }

    async fn exists(&self, path: &Path) -> bool {
        self.files.lock().unwrap().contains_key(path)
            || self.unreadable.lock().unwrap().contains(path)
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        self.files.lock().unwrap().remove(path);
        Ok(())
    }
}

/// Records every request; fails for labels in `failing`.
#[derive(Default)]
struct FakeSummarizer {
    requests: Mutex<Vec<SummaryRequest>>,
    failing: Mutex<HashSet<String>>,
    cancel_on_call: Mutex<Option<CancellationToken>>,
}

impl FakeSummarizer {
    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn fail_for(&self, label: &str) {
        self.failing.lock().unwrap().insert(label.to_string());
    }

    fn heal(&self) {
        self.failing.lock().unwrap().clear();
    }
}

#[async_trait]
impl Summarizer for FakeSummarizer {
    fn name(&self) -> &str {
        "fake"
    }

    async fn summarize(&self, request: &SummaryRequest) -> anyhow::Result<Summary> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(token) = self.cancel_on_call.lock().unwrap().as_ref() {
            token.cancel();
        }
        if self.failing.lock().unwrap().contains(&request.label) {
            anyhow::bail!("model unavailable");
        }
        Ok(Summary {
            summary: format!("{} ({} chars)", request.label, request.content.len()),
            security_warning: request
                .content
                .contains("rm -rf")
                .then(|| "Deletes files recursively".to_string()),
        })
    }
}

#[derive(Default)]
struct FakeEmbedder {
    down: AtomicBool,
    calls: AtomicUsize,
}

#[async_trait]
impl EmbeddingProvider for FakeEmbedder {
    fn name(&self) -> &str {
        "fake"
    }

    fn dimensions(&self) -> usize {
        2
    }

    async fn embed(&self, texts: &[&str]) -> anyhow::Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.down.load(Ordering::SeqCst) {
            anyhow::bail!("connection refused");
        }
        Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
    }
}

struct PanickingSummarizer;

#[async_trait]
impl Summarizer for PanickingSummarizer {
    fn name(&self) -> &str {
        "panicking"
    }

    async fn summarize(&self, _request: &SummaryRequest) -> anyhow::Result<Summary> {
        panic!("summarizer blew up");
    }
}

// ── Fixtures ───────────────────────────────────────────────────

struct Harness {
    store: Arc<CommandStore>,
    fs: Arc<MemoryFs>,
    summarizer: Arc<FakeSummarizer>,
    embedder: Arc<FakeEmbedder>,
}

impl Harness {
    fn new() -> Self {
        let fs = Arc::new(MemoryFs::default());
        fs.put("package.json", r#"{"scripts":{"build":"tsc","lint":"eslint ."}}"#);
        fs.put("Makefile", "clean:\n\trm -rf dist\n");
        Self {
            store: Arc::new(CommandStore::open_in_memory().unwrap()),
            fs,
            summarizer: Arc::new(FakeSummarizer::default()),
            embedder: Arc::new(FakeEmbedder::default()),
        }
    }

    fn pipeline(&self) -> SummaryPipeline {
        SummaryPipeline::new(Arc::clone(&self.store), self.fs.clone(), ROOT)
            .with_summarizer(self.summarizer.clone())
            .with_embedder(self.embedder.clone())
    }
}

fn cmd(kind: &str, file: &str, name: &str, command: &str) -> DiscoveredCommand {
    DiscoveredCommand {
        label: name.into(),
        kind: kind.into(),
        name: name.into(),
        file_path: PathBuf::from(file),
        command: command.into(),
    }
}

fn commands() -> Vec<DiscoveredCommand> {
    vec![
        cmd("npm", "package.json", "build", "npm run build"),
        cmd("npm", "package.json", "lint", "npm run lint"),
        cmd("make", "Makefile", "clean", "make clean"),
    ]
}

async fn run(pipeline: &SummaryPipeline, commands: Vec<DiscoveredCommand>) -> tasktree_core::PipelineReport {
    pipeline.run(commands, &CancellationToken::new()).await.unwrap()
}

// ── Tests ──────────────────────────────────────────────────────

#[tokio::test]
async fn first_run_summarizes_and_embeds_everything() {
    let h = Harness::new();
    let report = run(&h.pipeline(), commands()).await;

    assert_eq!(report.registered, 3);
    assert_eq!(report.summarized, 3);
    assert_eq!(report.embedded, 3);
    assert_eq!(report.up_to_date, 0);
    assert!(report.is_clean(), "{report:?}");

    let row = h.store.get_row("make:Makefile:clean").unwrap().unwrap();
    assert!(row.summary.starts_with("clean"));
    assert_eq!(row.security_warning.as_deref(), Some("Deletes files recursively"));
    assert_eq!(row.content_hash, content_hash("clean:\n\trm -rf dist\n"));
    assert!(row.embedding.is_some());

    let build = h.store.get_row("npm:package.json:build").unwrap().unwrap();
    assert!(build.security_warning.is_none());
}

#[tokio::test]
async fn unchanged_content_is_not_resummarized() {
    let h = Harness::new();
    let pipeline = h.pipeline();
    run(&pipeline, commands()).await;
    let calls = h.summarizer.calls();

    let report = run(&pipeline, commands()).await;
    assert_eq!(h.summarizer.calls(), calls);
    assert_eq!(report.up_to_date, 3);
    assert_eq!(report.summarized, 0);
    assert_eq!(report.embedded, 0);
}

#[tokio::test]
async fn changed_source_resummarizes_only_its_commands() {
    let h = Harness::new();
    let pipeline = h.pipeline();
    run(&pipeline, commands()).await;
    let before = h.store.get_row("make:Makefile:clean").unwrap().unwrap();

    h.fs.put("Makefile", "clean:\n\trm -rf dist build coverage\n");
    let report = run(&pipeline, commands()).await;

    assert_eq!(report.summarized, 1);
    assert_eq!(report.up_to_date, 2);
    let after = h.store.get_row("make:Makefile:clean").unwrap().unwrap();
    assert_ne!(after.content_hash, before.content_hash);
    assert_ne!(after.summary, before.summary);
    assert!(after.embedding.is_some());
}

#[tokio::test]
async fn summarizer_failure_is_isolated_and_retried() {
    let h = Harness::new();
    let pipeline = h.pipeline();
    h.summarizer.fail_for("lint");

    let report = run(&pipeline, commands()).await;
    assert_eq!(report.registered, 3);
    assert_eq!(report.summarized, 2);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].command_id, "npm:package.json:lint");
    assert_eq!(report.failures[0].stage, Stage::Summarize);
    assert!(report.failures[0].message.contains("model unavailable"));

    // registered, but with nothing to show yet
    let lint = h.store.get_row("npm:package.json:lint").unwrap().unwrap();
    assert!(lint.summary.is_empty());
    assert!(lint.embedding.is_none());

    h.summarizer.heal();
    let report = run(&pipeline, commands()).await;
    assert_eq!(report.summarized, 1);
    assert_eq!(report.up_to_date, 2);
    assert!(report.is_clean());
    let lint = h.store.get_row("npm:package.json:lint").unwrap().unwrap();
    assert!(!lint.summary.is_empty());
}

#[tokio::test]
async fn embedding_failure_is_backfilled_next_run() {
    let h = Harness::new();
    let pipeline = h.pipeline();
    h.embedder.down.store(true, Ordering::SeqCst);

    let report = run(&pipeline, commands()).await;
    assert_eq!(report.summarized, 3);
    assert_eq!(report.embedded, 0);
    assert_eq!(report.failures.len(), 3);
    assert!(report.failures.iter().all(|f| f.stage == Stage::Embed));
    assert!(h.store.get_all_rows().unwrap().iter().all(|r| r.needs_embedding()));

    h.embedder.down.store(false, Ordering::SeqCst);
    let calls = h.summarizer.calls();
    let report = run(&pipeline, commands()).await;
    assert_eq!(h.summarizer.calls(), calls);
    assert_eq!(report.up_to_date, 3);
    assert_eq!(report.embedded, 3);
    assert!(h.store.get_all_rows().unwrap().iter().all(|r| r.embedding.is_some()));
}

#[tokio::test]
async fn resummarized_command_drops_old_embedding_until_reembedded() {
    let h = Harness::new();
    let pipeline = h.pipeline();
    run(&pipeline, commands()).await;
    let before = h.store.get_row("make:Makefile:clean").unwrap().unwrap();
    assert_eq!(before.embedding, Some(vec![before.summary.len() as f32, 1.0]));

    h.fs.put("Makefile", "clean:\n\trm -rf dist build coverage node_modules .cache tmp\n");
    h.embedder.down.store(true, Ordering::SeqCst);
    let report = run(&pipeline, commands()).await;
    assert_eq!(report.summarized, 1);
    assert_eq!(report.embedded, 0);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].stage, Stage::Embed);

    let stale = h.store.get_row("make:Makefile:clean").unwrap().unwrap();
    assert_ne!(stale.summary, before.summary);
    assert_eq!(stale.embedding, None);

    h.embedder.down.store(false, Ordering::SeqCst);
    let report = run(&pipeline, commands()).await;
    assert_eq!(report.up_to_date, 3);
    assert_eq!(report.embedded, 1);

    let after = h.store.get_row("make:Makefile:clean").unwrap().unwrap();
    assert_eq!(after.summary, stale.summary);
    assert_eq!(after.embedding, Some(vec![after.summary.len() as f32, 1.0]));
}

#[tokio::test]
async fn cancelled_before_start_touches_nothing() {
    let h = Harness::new();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = h.pipeline().run(commands(), &cancel).await.unwrap();
    assert!(report.cancelled);
    assert_eq!(report.skipped, 3);
    assert_eq!(report.registered, 0);
    assert_eq!(h.store.count_commands().unwrap(), 0);
    assert_eq!(h.summarizer.calls(), 0);
}

#[tokio::test]
async fn cancellation_mid_run_finishes_current_command() {
    let h = Harness::new();
    let cancel = CancellationToken::new();
    *h.summarizer.cancel_on_call.lock().unwrap() = Some(cancel.clone());

    let pipeline = h.pipeline().with_concurrency(1);
    let report = pipeline.run(commands(), &cancel).await.unwrap();

    assert!(report.cancelled);
    assert_eq!(report.summarized, 1);
    assert_eq!(report.skipped, 2);
    assert_eq!(h.store.count_commands().unwrap(), 1);
}

#[tokio::test]
async fn cancellation_during_last_command_is_reported() {
    let h = Harness::new();
    let cancel = CancellationToken::new();
    *h.summarizer.cancel_on_call.lock().unwrap() = Some(cancel.clone());

    let only_build = commands().into_iter().take(1).collect();
    let report = h.pipeline().run(only_build, &cancel).await.unwrap();

    assert_eq!(report.summarized, 1);
    assert_eq!(report.skipped, 0);
    assert!(report.cancelled);
}

#[tokio::test]
async fn panicking_task_is_reported_without_stopping_siblings() {
    let h = Harness::new();
    let pipeline = SummaryPipeline::new(Arc::clone(&h.store), h.fs.clone(), ROOT)
        .with_summarizer(Arc::new(PanickingSummarizer));

    let report = run(&pipeline, commands()).await;

    assert_eq!(report.failures.len(), 3);
    assert!(report.failures.iter().all(|f| f.stage == Stage::Task));
    assert!(report.failures.iter().all(|f| f.command_id.is_empty()));
    // registration happens before the summarizer is reached
    assert_eq!(h.store.count_commands().unwrap(), 3);
}

#[tokio::test]
async fn missing_source_hashes_command_text() {
    let h = Harness::new();
    let ghost = cmd("shell", "scripts/deploy.sh", "deploy", "./scripts/deploy.sh prod");

    let report = run(&h.pipeline(), vec![ghost.clone()]).await;
    assert!(report.is_clean());
    let row = h.store.get_row(&ghost.id()).unwrap().unwrap();
    assert_eq!(row.content_hash, content_hash("./scripts/deploy.sh prod"));

    let requests = h.summarizer.requests.lock().unwrap();
    assert_eq!(requests[0].content, "./scripts/deploy.sh prod");
}

#[tokio::test]
async fn unreadable_source_records_read_failure_and_continues() {
    let h = Harness::new();
    h.fs.break_file("Makefile");

    let report = run(&h.pipeline(), commands()).await;
    assert_eq!(report.summarized, 3);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].stage, Stage::Read);
    assert_eq!(report.failures[0].command_id, "make:Makefile:clean");

    let row = h.store.get_row("make:Makefile:clean").unwrap().unwrap();
    assert_eq!(row.content_hash, content_hash("make clean"));
}

#[tokio::test]
async fn without_summarizer_commands_are_only_registered() {
    let h = Harness::new();
    let pipeline = SummaryPipeline::new(Arc::clone(&h.store), h.fs.clone(), ROOT)
        .with_embedder(h.embedder.clone());

    let report = run(&pipeline, commands()).await;
    assert_eq!(report.registered, 3);
    assert_eq!(report.summarized, 0);
    assert_eq!(report.embedded, 0);
    assert!(report.is_clean());
    assert_eq!(h.embedder.calls.load(Ordering::SeqCst), 0);
    assert!(h
        .store
        .get_all_rows()
        .unwrap()
        .iter()
        .all(|r| r.summary.is_empty()));
}

#[tokio::test]
async fn duplicate_commands_in_batch_are_processed_once() {
    let h = Harness::new();
    let mut batch = commands();
    batch.push(cmd("npm", "package.json", "build", "npm run build -- --watch"));

    let report = run(&h.pipeline(), batch).await;
    assert_eq!(report.registered, 3);
    assert_eq!(h.summarizer.calls(), 3);
    let requests = h.summarizer.requests.lock().unwrap();
    assert!(requests
        .iter()
        .any(|r| r.command == "npm run build -- --watch"));
}

#[tokio::test]
async fn tags_survive_resummarization() {
    let h = Harness::new();
    let pipeline = h.pipeline();
    h.store
        .add_tag_to_command("make:Makefile:clean", "quick")
        .unwrap();

    run(&pipeline, commands()).await;
    h.fs.put("Makefile", "clean:\n\tgit clean -fdx\n");
    run(&pipeline, commands()).await;

    assert_eq!(
        h.store.get_command_ids_by_tag("quick").unwrap(),
        vec!["make:Makefile:clean".to_string()]
    );
}

#[tokio::test(start_paused = true)]
async fn debounced_edits_run_once_with_latest_content() {
    let h = Harness::new();
    let pipeline = Arc::new(h.pipeline());
    let batch = vec![cmd("make", "Makefile", "clean", "make clean")];

    let job_pipeline = Arc::clone(&pipeline);
    let runner = DebouncedRunner::spawn(Duration::from_millis(1000), move |_paths, cancel| {
        let pipeline = Arc::clone(&job_pipeline);
        let batch = batch.clone();
        async move {
            if let Err(e) = pipeline.run(batch, &cancel).await {
                panic!("pipeline failed: {e}");
            }
        }
    });

    for (step, body) in ["clean:\n\trm -rf a\n", "clean:\n\trm -rf ab\n", "clean:\n\trm -rf abc\n"]
        .into_iter()
        .enumerate()
    {
        if step > 0 {
            tokio::time::sleep(Duration::from_millis(300)).await;
        }
        h.fs.put("Makefile", body);
        runner.trigger(Path::new(ROOT).join("Makefile"));
    }

    tokio::time::sleep(Duration::from_secs(3)).await;
    runner.shutdown().await;

    assert_eq!(h.summarizer.calls(), 1);
    let requests = h.summarizer.requests.lock().unwrap();
    assert_eq!(requests[0].content, "clean:\n\trm -rf abc\n");
}
