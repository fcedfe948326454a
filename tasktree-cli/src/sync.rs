//! One-shot pipeline run over a discovery manifest.

use crate::prompt::DialoguerPrompt;
use anyhow::{Context, Result};
use console::style;
use std::path::Path;
use std::sync::Arc;
use tasktree_agent::Summarizer;
use tasktree_core::{parse_manifest, DiscoveredCommand, PipelineReport, WorkspaceSession};
use tokio_util::sync::CancellationToken;

pub fn load_manifest(path: &Path) -> Result<Vec<DiscoveredCommand>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading manifest {}", path.display()))?;
    Ok(parse_manifest(&raw)?)
}

/// Resolve the summarizer, falling back to registration-only when no
/// model can be used.
pub async fn summarizer_or_none(session: &WorkspaceSession) -> Option<Arc<dyn Summarizer>> {
    match session.summarizer(Arc::new(DialoguerPrompt)).await {
        Ok(summarizer) => summarizer,
        Err(e) => {
            tracing::warn!(error = %e, "Summarization unavailable, registering only");
            eprintln!(
                "{} summarization unavailable ({e}); commands will be registered only",
                style("!").yellow().bold()
            );
            None
        }
    }
}

pub async fn run(session: &WorkspaceSession, manifest: &Path, json: bool) -> Result<()> {
    let commands = load_manifest(manifest)?;
    let summarizer = summarizer_or_none(session).await;
    let pipeline = session.pipeline(summarizer);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, finishing in-flight commands");
            on_signal.cancel();
        }
    });

    let report = pipeline.run(commands, &cancel).await;
    ctrl_c.abort();
    let report = report?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

pub fn print_report(report: &PipelineReport) {
    let mark = if report.is_clean() {
        style("✓").green().bold()
    } else {
        style("!").yellow().bold()
    };
    println!(
        "{mark} {} registered, {} summarized, {} embedded, {} up to date ({} ms)",
        report.registered, report.summarized, report.embedded, report.up_to_date, report.duration_ms
    );
    if report.cancelled {
        println!("  {} cancelled, {} commands skipped", style("⏹").dim(), report.skipped);
    }
    for failure in &report.failures {
        println!(
            "  {} {} [{}] {}",
            style("✗").red(),
            failure.command_id,
            failure.stage,
            style(&failure.message).dim()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_loads_from_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("commands.json");
        std::fs::write(
            &path,
            r#"[{"label":"build","kind":"npm","name":"build","filePath":"package.json","command":"npm run build"}]"#,
        )
        .unwrap();

        let commands = load_manifest(&path).unwrap();
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].id(), "npm:package.json:build");
    }

    #[test]
    fn missing_manifest_names_the_file() {
        let err = load_manifest(Path::new("/nonexistent/commands.json")).unwrap_err();
        assert!(format!("{err:#}").contains("commands.json"));
    }
}
