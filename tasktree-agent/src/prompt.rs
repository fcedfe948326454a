//! Summarization prompt and response parsing.
//!
//! Models are asked for a small JSON object. Smaller local models often wrap
//! it in a code fence or answer in prose instead, so parsing falls back to a
//! plain-text reading where a `SECURITY:` line carries the warning.

use crate::summarizer::{Summary, SummaryRequest};
use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;
use tasktree_common::util::truncate_with_ellipsis;

pub const SYSTEM_PROMPT: &str = "You summarize developer commands for a task runner. \
Reply with a JSON object only: {\"summary\": string, \"securityWarning\": string}. \
The summary is one or two plain sentences describing what the command does. \
Set securityWarning to a short description if the command deletes files outside the \
project, uses elevated privileges, downloads and executes remote code, exposes secrets, \
or force-pushes; otherwise set it to an empty string.";

static SECURITY_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^\s*(?:\*\*)?security(?:[ _-]?warning)?(?:\*\*)?\s*:\s*(.*)$").unwrap()
});

static SUMMARY_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*(?:\*\*)?summary(?:\*\*)?\s*:\s*").unwrap());

static CODE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json)?\s*(.*?)\s*```").unwrap());

/// Build the user message for one command.
pub fn build_prompt(request: &SummaryRequest, max_content_chars: usize) -> String {
    let mut prompt = format!(
        "Command: {}\nType: {}\nRuns: {}\n",
        request.label, request.kind, request.command
    );
    let content = request.content.trim();
    if !content.is_empty() {
        prompt.push_str("\nSource:\n");
        prompt.push_str(&truncate_with_ellipsis(content, max_content_chars));
        prompt.push('\n');
    }
    prompt
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSummary {
    #[serde(default)]
    summary: String,
    #[serde(default, alias = "security_warning", alias = "warning")]
    security_warning: Option<String>,
}

/// Blank and placeholder warnings mean "no warning".
fn clean_warning(warning: Option<&str>) -> Option<String> {
    let w = warning?.trim().trim_matches('"').trim();
    match w.to_ascii_lowercase().as_str() {
        "" | "none" | "null" | "n/a" | "no" | "false" => None,
        _ => Some(w.to_string()),
    }
}

fn parse_json(text: &str) -> Option<RawSummary> {
    let body = CODE_FENCE
        .captures(text)
        .and_then(|c| c.get(1))
        .map_or(text, |m| m.as_str());
    let start = body.find('{')?;
    let end = body.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&body[start..=end]).ok()
}

fn parse_plain(text: &str) -> Option<Summary> {
    let warning = SECURITY_LINE
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str());

    let summary = text
        .lines()
        .filter(|line| !SECURITY_LINE.is_match(line))
        .map(|line| SUMMARY_PREFIX.replace(line, "").trim().to_string())
        .filter(|line| !line.is_empty() && !line.starts_with("```"))
        .collect::<Vec<_>>()
        .join(" ");

    if summary.is_empty() {
        return None;
    }
    Some(Summary {
        summary,
        security_warning: clean_warning(warning),
    })
}

/// Parse a model reply into a summary.
pub fn parse_response(text: &str) -> anyhow::Result<Summary> {
    if let Some(raw) = parse_json(text) {
        let summary = raw.summary.trim();
        if summary.is_empty() {
            anyhow::bail!("model returned an empty summary");
        }
        return Ok(Summary {
            summary: summary.to_string(),
            security_warning: clean_warning(raw.security_warning.as_deref()),
        });
    }

    parse_plain(text).ok_or_else(|| anyhow::anyhow!("model returned an empty summary"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(content: &str) -> SummaryRequest {
        SummaryRequest {
            label: "build".into(),
            kind: "npm".into(),
            command: "npm run build".into(),
            content: content.into(),
        }
    }

    #[test]
    fn prompt_includes_fields() {
        let prompt = build_prompt(&request("tsc -p ."), 100);
        assert!(prompt.contains("Command: build"));
        assert!(prompt.contains("Type: npm"));
        assert!(prompt.contains("Runs: npm run build"));
        assert!(prompt.contains("tsc -p ."));
    }

    #[test]
    fn prompt_truncates_content() {
        let long = "x".repeat(500);
        let prompt = build_prompt(&request(&long), 50);
        assert!(prompt.contains(&format!("{}...", "x".repeat(50))));
        assert!(!prompt.contains(&"x".repeat(51)));
    }

    #[test]
    fn prompt_omits_empty_source() {
        assert!(!build_prompt(&request("   "), 100).contains("Source:"));
    }

    #[test]
    fn parses_json() {
        let s = parse_response(r#"{"summary": "Compiles TypeScript.", "securityWarning": ""}"#)
            .unwrap();
        assert_eq!(s.summary, "Compiles TypeScript.");
        assert!(s.security_warning.is_none());
    }

    #[test]
    fn parses_fenced_json_with_warning() {
        let text = "Here you go:\n```json\n{\"summary\": \"Deletes the cache.\", \"securityWarning\": \"Runs rm -rf on $HOME\"}\n```";
        let s = parse_response(text).unwrap();
        assert_eq!(s.summary, "Deletes the cache.");
        assert_eq!(s.security_warning.as_deref(), Some("Runs rm -rf on $HOME"));
    }

    #[test]
    fn parses_snake_case_warning() {
        let s = parse_response(r#"{"summary": "Deploys.", "security_warning": "none"}"#).unwrap();
        assert!(s.security_warning.is_none());
    }

    #[test]
    fn falls_back_to_plain_text() {
        let text = "Summary: Installs dependencies and builds the app.\nSECURITY: pipes curl into sh";
        let s = parse_response(text).unwrap();
        assert_eq!(s.summary, "Installs dependencies and builds the app.");
        assert_eq!(s.security_warning.as_deref(), Some("pipes curl into sh"));
    }

    #[test]
    fn plain_text_security_none() {
        let s = parse_response("Runs the tests.\nSecurity warning: None").unwrap();
        assert_eq!(s.summary, "Runs the tests.");
        assert!(s.security_warning.is_none());
    }

    #[test]
    fn empty_summary_is_error() {
        assert!(parse_response(r#"{"summary": "  ", "securityWarning": "sudo"}"#).is_err());
        assert!(parse_response("   \n  ").is_err());
        assert!(parse_response("SECURITY: sudo").is_err());
    }
}
