//! Recall ranking: turns raw `MemoryRecord`s returned by the write-back
//! client's query into filtered, confidence/recency-scored `RecallItem`s,
//! with an optional LLM rerank pass layered on top.

use crate::types::{MemoryRecord, RecallFilters, RecallItem, RecallProvenance};

/// `max(0, 1 - age_days/30)`: a memory loses all recency weight past 30 days.
pub fn recency_score(timestamp: Option<i64>, now: i64) -> f64 {
    match timestamp {
        Some(ts) => {
            let age_days = ((now - ts).max(0) as f64) / 86400.0;
            (1.0 - age_days / 30.0).max(0.0)
        }
        None => 0.3,
    }
}

/// `0.7*confidence + 0.3*recency`, confidence defaulting to 0.5 when absent.
fn combined_score(confidence: Option<f64>, timestamp: Option<i64>, now: i64) -> f64 {
    let confidence = confidence.unwrap_or(0.5);
    let recency = recency_score(timestamp, now);
    confidence * 0.7 + recency * 0.3
}

fn passes_filters(record: &MemoryRecord, filters: &RecallFilters) -> bool {
    if let Some(kinds) = &filters.kinds {
        if let Some(kind) = record.kind() {
            if !kinds.iter().any(|k| k == kind.as_str()) {
                return false;
            }
        }
    }
    if let Some(min_confidence) = filters.min_confidence {
        if let Some(confidence) = record.confidence() {
            if confidence < min_confidence {
                return false;
            }
        }
    }
    if let Some(since_days) = filters.since_days {
        if let Some(ts) = record.timestamp() {
            let now = chrono::Utc::now().timestamp();
            let age_days = (now - ts) as f64 / 86400.0;
            if age_days > since_days as f64 {
                return false;
            }
        }
    }
    true
}

fn to_recall_item(record: &MemoryRecord) -> RecallItem {
    RecallItem {
        text: record.text.clone(),
        kind: record.kind().map(|k| k.as_str().to_string()),
        confidence: record.confidence(),
        timestamp: record.timestamp(),
        provenance: RecallProvenance {
            source: record.source().map(str::to_string),
            event_id: record.event_id().map(str::to_string),
            room_id: record
                .metadata
                .get("room_id")
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .or_else(|| {
                    record
                        .metadata
                        .get("scope")
                        .and_then(|v| v.get("id"))
                        .and_then(|v| v.as_str())
                        .map(str::to_string)
                }),
        },
    }
}

/// Filter `candidates` by `filters`, score by confidence/recency, sort
/// descending, and truncate to `k`.
pub fn rank(candidates: &[MemoryRecord], filters: &RecallFilters, k: usize) -> Vec<RecallItem> {
    let now = chrono::Utc::now().timestamp();
    let mut scored: Vec<(f64, RecallItem)> = candidates
        .iter()
        .filter(|record| passes_filters(record, filters))
        .map(|record| {
            let score = combined_score(record.confidence(), record.timestamp(), now);
            (score, to_recall_item(record))
        })
        .collect();

    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    scored.into_iter().take(k).map(|(_, item)| item).collect()
}
