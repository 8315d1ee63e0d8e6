//! Text canonicalization and keyword extraction shared by the working store
//! dedupe key and the long-term `MemoryRecord.metadata.keywords` field.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

const MAX_CANONICAL_LEN: usize = 500;
const MIN_KEYWORD_LEN: usize = 4;

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z0-9_]+").unwrap());

/// Collapse whitespace runs to a single space, trim, and cap at 500 chars.
pub fn canonicalize(text: &str) -> String {
    let collapsed = WHITESPACE.replace_all(text, " ");
    let trimmed = collapsed.trim();
    if trimmed.chars().count() <= MAX_CANONICAL_LEN {
        trimmed.to_string()
    } else {
        trimmed.chars().take(MAX_CANONICAL_LEN).collect()
    }
}

/// Lowercase, split on word characters, keep tokens of length >= 4, dedupe
/// and sort.
pub fn extract_keywords(text: &str) -> BTreeSet<String> {
    let lower = text.to_lowercase();
    WORD.find_iter(&lower)
        .map(|m| m.as_str().to_string())
        .filter(|t| t.chars().count() >= MIN_KEYWORD_LEN)
        .collect()
}
