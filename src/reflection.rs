//! Post-reply reflection line: picks at most one recalled memory related to
//! the current exchange and renders it as a short aside.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::MemoryRecord;

static WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z0-9_]+").unwrap());

const LOGISTICS_KEYWORDS: &[&str] = &[
    "token",
    "secret",
    "password",
    "api key",
    "ip",
    "port",
    "localhost",
    "127.",
    "host.docker.internal",
];

const OVERLAP_THRESHOLD: f64 = 0.05;
const SNIPPET_WORD_LIMIT: usize = 25;

/// Every word token, lowercased, no minimum-length filter — unlike
/// [`crate::policy::canonical::extract_keywords`], which drops short tokens
/// for the long-term keyword field.
fn tokenize(text: &str) -> HashSet<String> {
    let lower = text.to_lowercase();
    WORD.find_iter(&lower).map(|m| m.as_str().to_string()).collect()
}

/// `|tokens(a) ∩ tokens(b)| / |tokens(b)|`. Asymmetric by design: the
/// denominator is always the current exchange, so the score answers "how
/// much of what's being discussed does this memory cover".
fn overlap_score(a: &str, b: &str) -> f64 {
    let ta = tokenize(a);
    let tb = tokenize(b);
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }
    let intersection = ta.intersection(&tb).count();
    intersection as f64 / tb.len() as f64
}

fn is_eligible(record: &MemoryRecord, combined: &str, combined_lower: &str) -> bool {
    let kind_eligible = record
        .kind()
        .map(|k| matches!(k.as_str(), "thread" | "preference"))
        .unwrap_or(false)
        || record.sticky();
    if !kind_eligible {
        return false;
    }
    if record.text.is_empty() {
        return false;
    }
    if record.sensitive() && overlap_score(&record.text, combined) == 0.0 {
        return false;
    }
    let text_lower = record.text.to_lowercase();
    let text_has_logistics = LOGISTICS_KEYWORDS.iter().any(|k| text_lower.contains(k));
    let convo_has_logistics = LOGISTICS_KEYWORDS.iter().any(|k| combined_lower.contains(k));
    if text_has_logistics && !convo_has_logistics {
        return false;
    }
    true
}

fn truncate_snippet(text: &str) -> String {
    let trimmed = text.trim();
    let words: Vec<&str> = trimmed.split_whitespace().collect();
    if words.len() <= SNIPPET_WORD_LIMIT {
        return trimmed.to_string();
    }
    let head = words[..SNIPPET_WORD_LIMIT].join(" ");
    format!("{}…", head.trim_end_matches([',', '.', ';']))
}

/// Pick the single best-matching eligible memory from `candidates` and
/// render it as `"Sam: This connects to <snippet>"`. Returns `None` when no
/// memory is eligible or the best overlap is below the noise floor.
pub fn select(candidates: &[MemoryRecord], user_message: &str, assistant_reply: &str) -> Option<String> {
    let combined = format!("{} {}", user_message, assistant_reply)
        .trim()
        .to_string();
    let combined_lower = combined.to_lowercase();

    let mut scored: Vec<(f64, &MemoryRecord)> = candidates
        .iter()
        .filter(|record| is_eligible(record, &combined, &combined_lower))
        .map(|record| (overlap_score(&record.text, &combined), record))
        .collect();

    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

    let (best_score, best) = scored.into_iter().next()?;
    if best_score < OVERLAP_THRESHOLD {
        return None;
    }

    let snippet = truncate_snippet(&best.text);
    Some(format!("Sam: This connects to {snippet}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn record(text: &str, kind: &str, sticky: bool, sensitive: bool) -> MemoryRecord {
        let mut metadata = HashMap::new();
        metadata.insert("kind".to_string(), serde_json::json!(kind));
        metadata.insert("sticky".to_string(), serde_json::json!(sticky));
        metadata.insert("sensitive".to_string(), serde_json::json!(sensitive));
        MemoryRecord {
            id: "id".to_string(),
            user_id: "alice".to_string(),
            text: text.to_string(),
            metadata,
            score: None,
        }
    }

    #[test]
    fn non_thread_non_preference_non_sticky_is_excluded() {
        let candidates = vec![record("we discussed the trip to japan", "episodic", false, false)];
        let out = select(&candidates, "tell me about japan", "sure, here's what I know");
        assert!(out.is_none());
    }

    #[test]
    fn sticky_memory_is_eligible_regardless_of_kind() {
        let candidates = vec![record(
            "always prefers window seats on flights to japan",
            "episodic",
            true,
            false,
        )];
        let out = select(&candidates, "book me a flight to japan", "booking your flight to japan");
        assert!(out.is_some());
        assert!(out.unwrap().starts_with("Sam: This connects to"));
    }

    #[test]
    fn sensitive_memory_is_dropped_when_no_overlap() {
        let candidates = vec![record("the secret launch code is unrelated", "preference", false, true)];
        let out = select(&candidates, "what's the weather like", "it's sunny");
        assert!(out.is_none());
    }

    #[test]
    fn logistics_keyword_is_dropped_unless_present_in_conversation() {
        let candidates = vec![record(
            "the api key rotation schedule is quarterly",
            "preference",
            false,
            false,
        )];
        let out = select(&candidates, "remind me about rotation schedules", "sure thing");
        assert!(out.is_none());

        let out_with_context = select(
            &candidates,
            "what's the api key rotation schedule again",
            "let me check",
        );
        assert!(out_with_context.is_some());
    }

    #[test]
    fn snippet_truncates_to_25_words_with_ellipsis() {
        let long_text = (0..40).map(|i| format!("word{i}")).collect::<Vec<_>>().join(" ");
        let candidates = vec![record(&long_text, "thread", false, false)];
        let out = select(&candidates, "word0 word1 word2", "word3 word4").unwrap();
        assert!(out.ends_with('…'));
        let word_count = out
            .trim_start_matches("Sam: This connects to ")
            .trim_end_matches('…')
            .split_whitespace()
            .count();
        assert_eq!(word_count, 25);
    }

    #[test]
    fn no_eligible_candidates_returns_none() {
        let out = select(&[], "hello", "hi there");
        assert!(out.is_none());
    }
}
