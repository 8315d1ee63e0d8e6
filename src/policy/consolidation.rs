//! Consolidation: turning a batch of working-store events into episodic,
//! semantic, and procedural long-term memory candidates.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::policy::canonical::canonicalize;
use crate::types::{Scope, WorkingEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsolidationMode {
    Episodic,
    Semantic,
    Procedural,
    All,
}

impl ConsolidationMode {
    pub fn parse(s: &str) -> Self {
        match s {
            "episodic" => ConsolidationMode::Episodic,
            "semantic" => ConsolidationMode::Semantic,
            "procedural" => ConsolidationMode::Procedural,
            _ => ConsolidationMode::All,
        }
    }

    fn includes_episodic(&self) -> bool {
        matches!(self, ConsolidationMode::Episodic | ConsolidationMode::All)
    }

    fn includes_semantic(&self) -> bool {
        matches!(self, ConsolidationMode::Semantic | ConsolidationMode::All)
    }

    fn includes_procedural(&self) -> bool {
        matches!(self, ConsolidationMode::Procedural | ConsolidationMode::All)
    }
}

const SEMANTIC_TRIGGERS: &[&str] = &[
    "prefer",
    "always",
    "never",
    "like",
    "please remember",
    "compose",
    "plugin",
];
const SEMANTIC_HIGH_CONFIDENCE_TRIGGERS: &[&str] = &["prefer", "always", "never"];

const PROCEDURAL_FIRST_TOKENS: &[&str] =
    &["run", "use", "start", "stop", "runbook", "task", "todo"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolidationProvenance {
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    pub scope_kind: String,
    pub scope_id: String,
    pub timestamp: i64,
}

/// A single long-term candidate produced by consolidation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolidatedItem {
    pub text: String,
    pub kind: &'static str,
    pub confidence: f64,
    pub provenance: ConsolidationProvenance,
    pub timestamp: i64,
}

/// Result of running consolidation over a batch: the emitted items (already
/// capped to `max_items` per kind), the overflow count skipped, and the
/// newest timestamp seen (for advancing the cursor).
#[derive(Debug, Clone, Default)]
pub struct ConsolidationResult {
    pub items: Vec<ConsolidatedItem>,
    pub skipped: usize,
    pub newest_timestamp: Option<i64>,
}

fn provenance_for(event: &WorkingEvent, scope: &Scope) -> ConsolidationProvenance {
    ConsolidationProvenance {
        source: event.source.clone(),
        event_id: event.event_id.clone(),
        scope_kind: scope.kind.as_str().to_string(),
        scope_id: scope.id.clone(),
        timestamp: event.timestamp,
    }
}

/// Extract episodic/semantic/procedural candidates from `events`, capping
/// each kind at `max_items` and reporting the overflow count.
pub fn consolidate_events(
    events: &[WorkingEvent],
    scope: &Scope,
    mode: ConsolidationMode,
    max_items: usize,
) -> ConsolidationResult {
    let mut result = ConsolidationResult::default();
    let mut emitted: HashMap<&'static str, usize> = HashMap::new();

    for event in events {
        if let Some(ts) = result.newest_timestamp {
            if event.timestamp > ts {
                result.newest_timestamp = Some(event.timestamp);
            }
        } else {
            result.newest_timestamp = Some(event.timestamp);
        }

        let canonical = canonicalize(&event.text);
        let lower = canonical.to_lowercase();

        if mode.includes_episodic() {
            push_or_skip(
                &mut result,
                &mut emitted,
                max_items,
                ConsolidatedItem {
                    text: event.text.clone(),
                    kind: "episodic",
                    confidence: 0.5,
                    provenance: provenance_for(event, scope),
                    timestamp: event.timestamp,
                },
            );
        }

        if mode.includes_semantic() && SEMANTIC_TRIGGERS.iter().any(|t| lower.contains(t)) {
            let confidence = if SEMANTIC_HIGH_CONFIDENCE_TRIGGERS
                .iter()
                .any(|t| lower.contains(t))
            {
                0.7
            } else {
                0.6
            };
            push_or_skip(
                &mut result,
                &mut emitted,
                max_items,
                ConsolidatedItem {
                    text: canonical.clone(),
                    kind: "semantic",
                    confidence,
                    provenance: provenance_for(event, scope),
                    timestamp: event.timestamp,
                },
            );
        }

        if mode.includes_procedural() && is_procedural(&lower) {
            let confidence = if lower.contains("runbook") { 0.65 } else { 0.55 };
            push_or_skip(
                &mut result,
                &mut emitted,
                max_items,
                ConsolidatedItem {
                    text: canonical.clone(),
                    kind: "procedural",
                    confidence,
                    provenance: provenance_for(event, scope),
                    timestamp: event.timestamp,
                },
            );
        }
    }

    result
}

fn is_procedural(lower: &str) -> bool {
    let first_token = lower.split_whitespace().next().unwrap_or("");
    PROCEDURAL_FIRST_TOKENS.contains(&first_token)
        || lower.contains("runbook")
        || lower.contains("restart")
}

fn push_or_skip(
    result: &mut ConsolidationResult,
    emitted: &mut HashMap<&'static str, usize>,
    max_items: usize,
    item: ConsolidatedItem,
) {
    let count = emitted.entry(item.kind).or_insert(0);
    if *count >= max_items {
        result.skipped += 1;
        return;
    }
    *count += 1;
    result.items.push(item);
}
