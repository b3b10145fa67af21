//! Utility functions for text cleanup, string truncation and JSON diagnostics.
//!
//! This module provides helper functions used throughout the application:
//! - HTML stripping and whitespace collapsing for feed text
//! - Unicode-aware truncation for capped fields
//! - String truncation for logging
//! - JSON error detection for handling LLM response truncation

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Html;

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static regex"));

/// Strip HTML from feed text and normalize it for display.
///
/// The input is parsed as an HTML fragment so tags are removed and entities
/// decoded. Runs of whitespace collapse to a single space, any remaining
/// `<` or `>` characters are dropped, and the result is capped at `max_chars`
/// Unicode scalar values.
///
/// # Arguments
///
/// * `raw` - Text as found in the feed (may contain markup or entities)
/// * `max_chars` - Maximum length of the returned string, in characters
///
/// # Returns
///
/// The cleaned, trimmed and truncated text. Empty input yields an empty string.
pub fn clean_text(raw: &str, max_chars: usize) -> String {
    if raw.trim().is_empty() {
        return String::new();
    }
    let fragment = Html::parse_fragment(raw);
    let text: String = fragment.root_element().text().collect();
    let text = text.replace(['<', '>'], " ");
    let collapsed = WHITESPACE.replace_all(text.trim(), " ");
    truncate_chars(collapsed.trim(), max_chars)
}

/// Keep at most `max` characters of `s`, never splitting a code point.
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].trim_end().to_string(),
        None => s.to_string(),
    }
}

/// Truncate a string for logging purposes.
///
/// Long strings are truncated to `max` bytes (rounded down to a character
/// boundary) with an ellipsis and byte count indicator appended.
///
/// # Arguments
///
/// * `s` - The string to potentially truncate
/// * `max` - Maximum number of bytes to keep
///
/// # Returns
///
/// The original string if shorter than `max`, otherwise a truncated version
/// with `"…(+N bytes)"` appended.
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}

/// Detect if a serde_json error indicates truncated/incomplete JSON.
///
/// When the LLM response is cut off (e.g., due to token limits), the
/// resulting JSON will fail to parse with an EOF error. Callers use this to
/// decide whether asking again is worthwhile.
pub fn looks_truncated(e: &serde_json::Error) -> bool {
    use serde_json::error::Category;
    matches!(e.classify(), Category::Eof)
}

/// Count characters that are not whitespace.
pub fn non_whitespace_len(s: &str) -> usize {
    s.chars().filter(|c| !c.is_whitespace()).count()
}
