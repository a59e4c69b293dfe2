//! Helpers for keeping span attributes and log lines free of user data.
//!
//! Job records carry usernames, emails and free-text prompts written by
//! parents. Spans get file names and short previews only.

use std::path::Path;

/// Returns only the filename component of a path (no directory).
pub fn redact_path(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
        .to_string()
}

/// Masks the local part of an email address: `alice@example.com` → `a****@example.com`.
pub fn redact_email(email: &str) -> String {
    match email.split_once('@') {
        Some((local, domain)) => {
            let first: String = local.chars().take(1).collect();
            format!("{}****@{}", first, domain)
        }
        None => "****".to_string(),
    }
}

/// First `max_chars` characters of `text`, with an ellipsis when truncated.
pub fn preview(text: &str, max_chars: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{}…", head)
    } else {
        head
    }
}
