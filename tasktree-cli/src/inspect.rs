//! Read-side commands plus legacy import and maintenance.

use anyhow::{bail, Context, Result};
use console::style;
use std::path::Path;
use tasktree_common::util::truncate_with_ellipsis;
use tasktree_core::WorkspaceSession;
use tasktree_memory::{parse_legacy_summaries, parse_legacy_tags, CommandRow};

const SUMMARY_WIDTH: usize = 72;

pub async fn search(
    session: &WorkspaceSession,
    query: &str,
    top_k: Option<usize>,
    threshold: Option<f32>,
) -> Result<()> {
    let mut search = session.search();
    if let Some(k) = top_k {
        search = search.with_top_k(k);
    }
    if let Some(t) = threshold {
        if !(-1.0..=1.0).contains(&t) {
            bail!("--threshold must be between -1.0 and 1.0, got {t}");
        }
        search = search.with_threshold(t);
    }

    let hits = search.search(query).await?;
    if hits.is_empty() {
        println!("No matching commands.");
        return Ok(());
    }
    for hit in hits {
        println!(
            "{} {}",
            style(format!("{:.2}", hit.score)).cyan(),
            style(&hit.command_id).bold()
        );
        println!("     {}", truncate_with_ellipsis(&hit.summary, SUMMARY_WIDTH));
        if let Some(warning) = &hit.security_warning {
            println!("     {} {warning}", style("⚠").yellow());
        }
    }
    Ok(())
}

pub fn show(session: &WorkspaceSession, command_id: &str) -> Result<()> {
    let store = session.store();
    let Some(row) = store.get_row(command_id)? else {
        bail!("no command with id '{command_id}'");
    };
    let tags = store.get_tags_for_command(command_id)?;

    println!("{}", style(&row.command_id).bold());
    println!("  Hash:       {}", display_or_dash(&row.content_hash));
    println!("  Summary:    {}", display_or_dash(&row.summary));
    if let Some(warning) = &row.security_warning {
        println!("  Warning:    {} {warning}", style("⚠").yellow());
    }
    println!(
        "  Embedding:  {}",
        row.embedding
            .as_ref()
            .map_or_else(|| "none".to_string(), |v| format!("{} dims", v.len()))
    );
    println!("  Tags:       {}", if tags.is_empty() { "-".to_string() } else { tags.join(", ") });
    println!("  Updated:    {}", format_millis(row.last_updated));
    Ok(())
}

pub fn list(session: &WorkspaceSession, tag: Option<&str>) -> Result<()> {
    let store = session.store();
    match tag {
        Some(tag) => {
            let ids = store.get_command_ids_by_tag(tag)?;
            if ids.is_empty() {
                println!("No commands tagged '{tag}'.");
            }
            for (position, id) in ids.iter().enumerate() {
                let summary = store.get_row(id)?.map(|r| r.summary).unwrap_or_default();
                println!(
                    "{:>3}. {}  {}",
                    position + 1,
                    style(id).bold(),
                    style(truncate_with_ellipsis(&summary, SUMMARY_WIDTH)).dim()
                );
            }
        }
        None => {
            let rows = store.get_all_rows()?;
            if rows.is_empty() {
                println!("No commands stored yet. Run `tasktree sync --manifest <file>`.");
            }
            for row in &rows {
                println!("{} {}", status_marker(row), style(&row.command_id).bold());
                if !row.summary.is_empty() {
                    println!("    {}", truncate_with_ellipsis(&row.summary, SUMMARY_WIDTH));
                }
            }
        }
    }
    Ok(())
}

pub fn import_tags(session: &WorkspaceSession, file: &Path) -> Result<()> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("reading {}", file.display()))?;
    let tags = parse_legacy_tags(&raw)?;
    let report = session.store().import_legacy_tags(&tags)?;
    println!(
        "{} imported {} tag associations ({} skipped); existing tags were replaced",
        style("✓").green().bold(),
        report.imported,
        report.skipped
    );
    Ok(())
}

pub fn import_summaries(session: &WorkspaceSession, file: &Path) -> Result<()> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("reading {}", file.display()))?;
    let entries = parse_legacy_summaries(&raw)?;
    let report = session.store().import_legacy_summaries(&entries)?;
    println!(
        "{} imported {} summaries ({} already present); run `sync` to embed them",
        style("✓").green().bold(),
        report.imported,
        report.skipped
    );
    Ok(())
}

pub fn cleanup(session: &WorkspaceSession) -> Result<()> {
    let removed = session.store().cleanup_orphaned_records()?;
    println!("{} removed {removed} orphaned tag associations", style("✓").green().bold());
    Ok(())
}

fn status_marker(row: &CommandRow) -> console::StyledObject<&'static str> {
    if row.summary.is_empty() {
        style("○").dim()
    } else if row.security_warning.is_some() {
        style("⚠").yellow()
    } else if row.embedding.is_some() {
        style("●").green()
    } else {
        style("◐").cyan()
    }
}

fn display_or_dash(value: &str) -> &str {
    if value.is_empty() {
        "-"
    } else {
        value
    }
}

fn format_millis(millis: i64) -> String {
    chrono::DateTime::<chrono::Utc>::from_timestamp_millis(millis)
        .map_or_else(|| millis.to_string(), |t| t.to_rfc3339())
}
