//! Salience scoring: deciding whether an observation is worth ignoring,
//! holding in working memory, or queuing as a long-term candidate.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

const BASE_SCORE: f64 = 0.1;
const LENGTH_DIVISOR: f64 = 4000.0;
const LENGTH_CAP: f64 = 0.5;
const KEYWORD_WEIGHT: f64 = 0.15;
const KEYWORD_CAP: f64 = 1.0;

const IGNORE_THRESHOLD: f64 = 0.2;
const WORKING_THRESHOLD: f64 = 0.4;

const EXPLICIT_CLAMP: f64 = 0.9;
const COMMITMENT_CLAMP: f64 = 0.6;

/// Keyword watchlist; each match contributes `KEYWORD_WEIGHT`, capped at
/// `KEYWORD_CAP` before it is added to the base score.
const KEYWORD_WATCHLIST: &[&str] = &[
    "remember",
    "note",
    "important",
    "prefer",
    "always",
    "never",
    "please",
    "do not",
    "don't",
    "todo",
    "task",
    "tomorrow",
    "next week",
];

static COMMITMENT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(always|never|prefer|i will|i'll|please remember)\b").unwrap()
});

/// Classification produced for a raw observation: `ignore`, `working`, or
/// `candidate`, with the salience score that drove the decision.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObserveDecision {
    pub salience: f64,
    pub kind: crate::types::ObserveDecisionKind,
}

fn keyword_term(lower_text: &str) -> f64 {
    let matches = KEYWORD_WATCHLIST
        .iter()
        .filter(|kw| lower_text.contains(*kw))
        .count();
    (matches as f64 * KEYWORD_WEIGHT).min(KEYWORD_CAP)
}

/// Compute the raw salience score for `text`, before explicit/commitment
/// clamps are applied. Exposed for the monotonicity property test.
pub fn score(text: &str) -> f64 {
    let lower = text.to_lowercase();
    let length_term = (text.chars().count() as f64 / LENGTH_DIVISOR).min(LENGTH_CAP);
    let score = BASE_SCORE + length_term + keyword_term(&lower);
    score.clamp(0.0, 1.0)
}

/// Classify an observation into ignore/working/candidate per the salience
/// contract: explicit commands and `reason == "explicit"` clamp to >= 0.9;
/// commitment phrases clamp to >= 0.6.
pub fn classify_observation(text: &str, explicit_reason: bool) -> ObserveDecision {
    let mut s = score(text);

    let is_explicit_command = text.trim_start().starts_with("!remember")
        || text.trim_start().starts_with("!recall");
    if is_explicit_command || explicit_reason {
        s = s.max(EXPLICIT_CLAMP);
    }
    if COMMITMENT_RE.is_match(text) {
        s = s.max(COMMITMENT_CLAMP);
    }
    s = s.clamp(0.0, 1.0);

    let kind = if s < IGNORE_THRESHOLD {
        crate::types::ObserveDecisionKind::Ignore
    } else if s < WORKING_THRESHOLD {
        crate::types::ObserveDecisionKind::Working
    } else {
        crate::types::ObserveDecisionKind::Candidate
    };

    ObserveDecision { salience: s, kind }
}
