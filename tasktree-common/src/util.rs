//! Utility functions shared across tasktree crates.

/// Truncate a string to at most `max_chars` characters, appending "..." if truncated.
///
/// Cuts on character boundaries, so multi-byte UTF-8 input is safe.
pub fn truncate_with_ellipsis(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => {
            let truncated = &s[..idx];
            format!("{}...", truncated.trim_end())
        }
        None => s.to_string(),
    }
}

/// Normalize a path-like string to forward slashes.
pub fn normalize_separators(path: &str) -> String {
    path.replace('\\', "/")
}
