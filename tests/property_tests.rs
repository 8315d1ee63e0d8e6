//! Property-based tests over the public `memory_fabric` API: invariants that
//! must hold for any input, not just the fixed scenarios in golden_tests.rs.
//!
//! Run with: cargo test --test property_tests

use proptest::prelude::*;
use std::collections::HashMap;

use memory_fabric::policy::canonical::{canonicalize, extract_keywords};
use memory_fabric::policy::consolidation::{consolidate_events, ConsolidationMode};
use memory_fabric::policy::salience::{classify_observation, score};
use memory_fabric::recall::{self, recency_score};
use memory_fabric::storage::StorageAdapter;
use memory_fabric::types::{MemoryRecord, ObserveDecisionKind, RecallFilters, Scope, WorkingEvent};

fn record(id: &str, text: &str) -> MemoryRecord {
    MemoryRecord {
        id: id.to_string(),
        user_id: "alice".to_string(),
        text: text.to_string(),
        metadata: HashMap::new(),
        score: None,
    }
}

// ============================================================================
// CANONICALIZATION / KEYWORD EXTRACTION
// ============================================================================

mod canonical_tests {
    use super::*;

    proptest! {
        /// Canonicalizing never panics on arbitrary text, and the result is
        /// always within the 500-char cap.
        #[test]
        fn never_panics_and_bounded(s in ".{0,2000}") {
            let out = canonicalize(&s);
            prop_assert!(out.chars().count() <= 500);
        }

        /// Canonicalization is idempotent once the whitespace is already
        /// collapsed and the string fits the cap.
        #[test]
        fn idempotent_on_already_canonical(s in "[a-z ]{1,100}") {
            let once = canonicalize(&s);
            let twice = canonicalize(&once);
            prop_assert_eq!(once, twice);
        }

        /// Extracted keywords never include a token shorter than 4 chars.
        #[test]
        fn keywords_respect_minimum_length(s in "[a-zA-Z ]{0,200}") {
            let keywords = extract_keywords(&s);
            prop_assert!(keywords.iter().all(|k| k.chars().count() >= 4));
        }

        /// Keyword extraction never panics on arbitrary input.
        #[test]
        fn keyword_extraction_never_panics(s in ".{0,500}") {
            let _ = extract_keywords(&s);
        }
    }
}

// ============================================================================
// SALIENCE MONOTONICITY
// ============================================================================

mod salience_tests {
    use super::*;

    proptest! {
        /// Salience score is always clamped to [0, 1].
        #[test]
        fn score_is_clamped(s in ".{0,5000}") {
            let v = score(&s);
            prop_assert!((0.0..=1.0).contains(&v));
        }

        /// classify_observation never panics and its salience is clamped.
        #[test]
        fn classify_never_panics_and_clamped(s in ".{0,2000}", explicit in any::<bool>()) {
            let d = classify_observation(&s, explicit);
            prop_assert!((0.0..=1.0).contains(&d.salience));
        }

        /// Appending a watchlist keyword never decreases the raw score.
        #[test]
        fn appending_keyword_never_decreases_score(base in "[a-z ]{0,100}") {
            let with_keyword = format!("{base} please remember");
            prop_assert!(score(&with_keyword) >= score(&base));
        }

        /// An explicit `!remember` prefix always clamps into the candidate
        /// band, regardless of the rest of the text.
        #[test]
        fn explicit_prefix_always_reaches_candidate(rest in "[a-z ]{0,100}") {
            let text = format!("!remember {rest}");
            let d = classify_observation(&text, false);
            prop_assert_eq!(d.kind, ObserveDecisionKind::Candidate);
            prop_assert!(d.salience >= 0.9);
        }
    }
}

// ============================================================================
// CONSOLIDATION CURSOR MONOTONICITY
// ============================================================================

mod consolidation_tests {
    use super::*;
    use chrono::Utc;

    fn event(text: &str, timestamp: i64) -> WorkingEvent {
        WorkingEvent {
            source: "chat".to_string(),
            user_id: "alice".to_string(),
            text: text.to_string(),
            normalized_text: canonicalize(text).to_lowercase(),
            timestamp,
            scope: Scope::global(),
            event_id: None,
            metadata: HashMap::new(),
            inserted_at: Utc::now(),
            consolidated: false,
        }
    }

    proptest! {
        /// The cursor returned never exceeds the newest timestamp fed in.
        #[test]
        fn cursor_never_exceeds_max_input_timestamp(timestamps in prop::collection::vec(0i64..1_000_000, 1..20)) {
            let events: Vec<_> = timestamps.iter().enumerate()
                .map(|(i, ts)| event(&format!("event number {i}"), *ts))
                .collect();
            let max_ts = *timestamps.iter().max().unwrap();
            let result = consolidate_events(&events, &Scope::global(), ConsolidationMode::All, 1000);
            prop_assert_eq!(result.newest_timestamp, Some(max_ts));
        }

        /// Per-kind emitted counts never exceed max_items, and skipped plus
        /// emitted accounts for every episodic candidate (every event is one).
        #[test]
        fn per_kind_cap_is_respected(n in 1usize..30, max_items in 1usize..10) {
            let events: Vec<_> = (0..n).map(|i| event("met bob at the park", i as i64)).collect();
            let result = consolidate_events(&events, &Scope::global(), ConsolidationMode::Episodic, max_items);
            let episodic_count = result.items.iter().filter(|i| i.kind == "episodic").count();
            prop_assert!(episodic_count <= max_items);
            prop_assert_eq!(episodic_count + result.skipped, n);
        }
    }
}

// ============================================================================
// RECALL RANKING
// ============================================================================

mod recall_tests {
    use super::*;

    proptest! {
        /// Recency score is always within [0, 1].
        #[test]
        fn recency_is_bounded(now in 0i64..10_000_000, delta in -5_000_000i64..5_000_000) {
            let v = recency_score(Some(now - delta), now);
            prop_assert!((0.0..=1.0).contains(&v));
        }

        /// rank() never returns more than k items, regardless of the input
        /// candidate count.
        #[test]
        fn rank_respects_k(n in 0usize..30, k in 0usize..10) {
            let candidates: Vec<_> = (0..n).map(|i| record(&i.to_string(), "met bob at the park")).collect();
            let ranked = recall::rank(&candidates, &RecallFilters::default(), k);
            prop_assert!(ranked.len() <= k);
            prop_assert!(ranked.len() <= candidates.len());
        }
    }
}

// ============================================================================
// STORAGE ADAPTER ROUND TRIP / FALLBACK IDEMPOTENCE
// ============================================================================

mod storage_tests {
    use super::*;
    use memory_fabric::config::Config;

    fn memory_config() -> Config {
        let mut cfg = Config::for_tests();
        cfg.storage_backend = "memory".to_string();
        cfg
    }

    proptest! {
        /// Every added record can be found again by substring query on its
        /// own text, for arbitrary alphabetic text.
        #[test]
        fn add_then_query_round_trips(word in "[a-z]{3,12}") {
            let text = format!("a note about {word} today");
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            let found_it = runtime.block_on(async {
                let adapter = StorageAdapter::new(&memory_config());
                let added = adapter.add("alice", &text, HashMap::new()).await;
                let found = adapter.query("alice", &word, 10).await;
                found.iter().any(|r| r.id == added.id)
            });
            prop_assert!(found_it);
        }
    }
}

// ============================================================================
// REFLECTION NON-LEAK
// ============================================================================

mod reflection_tests {
    use super::*;
    use memory_fabric::reflection;

    proptest! {
        /// Reflection never surfaces a memory whose kind is neither thread
        /// nor preference and that isn't marked sticky, no matter the text.
        #[test]
        fn never_surfaces_ineligible_kind(text in "[a-z ]{1,80}") {
            let mut metadata = HashMap::new();
            metadata.insert("kind".to_string(), serde_json::json!("episodic"));
            let candidate = MemoryRecord {
                id: "id".to_string(),
                user_id: "alice".to_string(),
                text: text.clone(),
                metadata,
                score: None,
            };
            let out = reflection::select(std::slice::from_ref(&candidate), &text, "ok");
            prop_assert!(out.is_none());
        }
    }
}
