//! Governor runtime: wires the working store, durable queue, write-back
//! client, storage adapter, and policy functions together, and implements
//! the `/observe`, `/remember`, `/recall`, `/consolidate`, and `/reflect`
//! orchestration.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::config::Config;
use crate::error::Result;
use crate::llm::LlmClient;
use crate::policy::canonical::{canonicalize, extract_keywords};
use crate::policy::consolidation::{consolidate_events, ConsolidationMode};
use crate::policy::salience::classify_observation;
use crate::queue::{runtime_queue, DurableQueue, RuntimeQueue, RuntimeQueueReceiver};
use crate::recall;
use crate::reflection;
use crate::storage::StorageAdapter;
use crate::types::{
    ConsolidateCounts, ConsolidateRequest, ConsolidateResponse, MemoryRecord, ObserveDecision,
    ObserveDecisionKind, ObserveRequest, ObserveResponse, QueueJob, RecallRequest, RecallResponse,
    ReflectRequest, ReflectResponse, RememberRequest, RememberResponse, WorkingEvent, WriteBackPayload,
};
use crate::working::{StreamLog, StreamRecord, WorkingStore};
use crate::writeback::WriteBackClient;

fn keywords_from_text(text: &str) -> Vec<String> {
    extract_keywords(text).into_iter().collect()
}

/// Wires every memory-lifecycle component together behind a single async
/// API. Shared across HTTP handlers and the worker task as an `Arc<Governor>`.
pub struct Governor {
    config: Config,
    working: WorkingStore,
    stream: Option<StreamLog>,
    queue: DurableQueue,
    runtime_queue: RuntimeQueue,
    pub storage: StorageAdapter,
    writeback: WriteBackClient,
    pub llm: LlmClient,
}

impl Governor {
    /// Build the runtime and return it already wrapped in an `Arc`, plus the
    /// receiver half of the runtime queue the caller must hand to
    /// [`Governor::spawn_worker`]. Every job still pending in the durable
    /// spool at startup is re-queued onto the runtime channel.
    pub fn new(config: Config) -> Result<(Arc<Governor>, RuntimeQueueReceiver)> {
        config.ensure_state_dirs()?;

        let working = WorkingStore::open(&config.db_path(), config.working_ttl_hours)?;
        working.cleanup()?;

        let stream = if config.stream_enable {
            let log = StreamLog::new(config.stream_log_path(), config.stream_ttl_days);
            log.cleanup()?;
            Some(log)
        } else {
            None
        };

        let queue = DurableQueue::open(config.spool_path())?;
        let (runtime_queue, receiver) = runtime_queue();
        let pending = queue.pending();
        tracing::info!(pending = pending.len(), "memory governor worker starting");
        for job in pending {
            runtime_queue.push(job);
        }

        let storage = StorageAdapter::new(&config);
        let writeback = WriteBackClient::new(
            config.ingest_url.clone(),
            config.hippocampus_url.clone(),
            config.hippocampus_api_key.clone(),
            Duration::from_secs(config.writeback_timeout_secs),
        )
        .map_err(crate::error::FabricError::Http)?;
        let llm = LlmClient::new(
            config.litellm_base_url.clone(),
            config.litellm_api_key.clone(),
            Duration::from_secs(config.summarize_timeout_secs),
        )?;

        let governor = Arc::new(Governor {
            config,
            working,
            stream,
            queue,
            runtime_queue,
            storage,
            writeback,
            llm,
        });
        Ok((governor, receiver))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Spawn the write-back worker loop: drains the runtime queue, posts each
    /// job through the write-back client, marks it done in the durable spool
    /// on success, and on failure sleeps a constant delay before requeuing —
    /// there is no max-attempts/dead-letter path.
    pub fn spawn_worker(self: &Arc<Self>, mut receiver: RuntimeQueueReceiver) -> tokio::task::JoinHandle<()> {
        let governor = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(job) = receiver.recv().await {
                let ok = governor
                    .writeback
                    .post_memory(&job.payload.user_id, &job.payload.text, &job.payload.metadata)
                    .await
                    .is_some();
                if ok {
                    if let Err(err) = governor.queue.mark_done(&job.id) {
                        tracing::error!(error = %err, job_id = %job.id, "failed to mark write-back job done");
                    }
                } else {
                    tracing::warn!(job_id = %job.id, "write-back failed, retrying after backoff");
                    tokio::time::sleep(Duration::from_secs(governor.config.retry_delay_secs)).await;
                    governor.runtime_queue.push(job);
                }
            }
        })
    }

    fn enqueue_memory(&self, user_id: &str, text: &str, metadata: HashMap<String, serde_json::Value>) -> Result<QueueJob> {
        let job = self.queue.enqueue(WriteBackPayload {
            user_id: user_id.to_string(),
            text: text.to_string(),
            metadata,
        })?;
        self.runtime_queue.push(job.clone());
        Ok(job)
    }

    /// `POST /observe`: classify salience first — below the ignore threshold
    /// short-circuits with no working-store insert and no enqueue — then
    /// insert into the working store (deduped), optionally append to the
    /// stream log, and enqueue a long-term write-back when the
    /// classification is `candidate`.
    pub async fn observe(&self, request: ObserveRequest) -> Result<ObserveResponse> {
        let timestamp = request.timestamp.unwrap_or_else(|| Utc::now().timestamp());
        let normalized_text = canonicalize(&request.text).to_lowercase();
        let event_id = request
            .metadata
            .get("event_id")
            .and_then(|v| v.as_str())
            .map(str::to_string);

        let event = WorkingEvent {
            source: request.source.clone(),
            user_id: request.user_id.clone(),
            text: request.text.clone(),
            normalized_text,
            timestamp,
            scope: request.scope.clone(),
            event_id,
            metadata: request.metadata.clone(),
            inserted_at: Utc::now(),
            consolidated: false,
        };

        let explicit_reason = request
            .metadata
            .get("reason")
            .and_then(|v| v.as_str())
            .map(|s| s == "explicit")
            .unwrap_or(false);
        let decision = classify_observation(&request.text, explicit_reason);

        // score < 0.2 -> no working-store insert, no enqueue.
        if decision.kind == ObserveDecisionKind::Ignore {
            return Ok(ObserveResponse {
                status: "ok".to_string(),
                action: "ignored".to_string(),
                decision: ObserveDecision {
                    salience: decision.salience,
                    kind: decision.kind,
                },
            });
        }

        let inserted = self.working.add(&event)?;
        if !inserted {
            return Ok(ObserveResponse {
                status: "ok".to_string(),
                action: "working".to_string(),
                decision: ObserveDecision {
                    salience: 0.0,
                    kind: ObserveDecisionKind::Ignore,
                },
            });
        }

        if let Some(stream) = &self.stream {
            stream.append(&StreamRecord {
                source: request.source.clone(),
                user_id: request.user_id.clone(),
                text: request.text.clone(),
                timestamp,
                scope: request.scope.clone(),
                metadata: request.metadata.clone(),
            })?;
        }

        if decision.kind == ObserveDecisionKind::Candidate {
            let keywords = keywords_from_text(&request.text);
            let mut metadata = request.metadata.clone();
            metadata.insert("source".to_string(), serde_json::json!(request.source));
            metadata.insert("scope".to_string(), serde_json::json!(request.scope));
            metadata.insert("kind".to_string(), serde_json::json!("episodic"));
            metadata.insert("salience".to_string(), serde_json::json!(decision.salience.max(0.7)));
            metadata.insert("keywords".to_string(), serde_json::json!(keywords));
            metadata.insert("timestamp".to_string(), serde_json::json!(timestamp));
            self.enqueue_memory(&request.user_id, &request.text, metadata)?;
        }

        Ok(ObserveResponse {
            status: "ok".to_string(),
            action: "working".to_string(),
            decision: ObserveDecision {
                salience: decision.salience,
                kind: decision.kind,
            },
        })
    }

    /// `POST /remember`: an explicit, always-salient write — canonicalizes
    /// the text, stamps `salience=1.0`/`confidence=0.95`, and enqueues it
    /// unconditionally.
    pub async fn remember(&self, request: RememberRequest) -> Result<RememberResponse> {
        let canonical = canonicalize(&request.text);
        let keywords = keywords_from_text(&canonical);
        let mut metadata = request.metadata.clone();
        metadata.insert("source".to_string(), serde_json::json!(request.source));
        metadata.insert("scope".to_string(), serde_json::json!(request.scope));
        metadata.insert("kind".to_string(), serde_json::json!(request.kind));
        metadata.insert("salience".to_string(), serde_json::json!(1.0));
        metadata.insert("confidence".to_string(), serde_json::json!(0.95));
        metadata.insert("keywords".to_string(), serde_json::json!(keywords));
        metadata.insert("timestamp".to_string(), serde_json::json!(Utc::now().timestamp()));

        let job = self.enqueue_memory(&request.user_id, &canonical, metadata)?;
        Ok(RememberResponse {
            status: "stored".to_string(),
            memory_id: Some(job.id),
        })
    }

    /// `POST /recall`: query through the write-back client's cross-process
    /// path, then filter/rank with [`crate::recall::rank`], optionally
    /// reranked by the LLM client when `rerank_enabled`.
    pub async fn recall(&self, request: RecallRequest) -> Result<RecallResponse> {
        let candidates: Vec<MemoryRecord> = self
            .writeback
            .query_memories(&request.user_id, &request.query, Some(request.k))
            .await;

        let mut ranked = recall::rank(&candidates, &request.filters, request.k);

        if self.config.rerank_enabled && !ranked.is_empty() {
            let capped: Vec<_> = ranked.into_iter().take(self.config.rerank_max).collect();
            ranked = self
                .llm
                .rerank(&request.query, capped, &self.config.rerank_model)
                .await;
        }

        Ok(RecallResponse { results: ranked })
    }

    /// `POST /consolidate`: pulls working-store events for `scope`,
    /// extracts episodic/semantic/procedural candidates, enqueues each
    /// (capped at `max_items` per kind), and advances the consolidation
    /// cursor to the newest event timestamp seen.
    pub async fn consolidate(&self, request: ConsolidateRequest) -> Result<ConsolidateResponse> {
        let events = self
            .working
            .recent_for_scope(&request.scope, request.max_items * 3)?;

        if events.is_empty() {
            return Ok(ConsolidateResponse {
                status: "ok".to_string(),
                written: ConsolidateCounts::default(),
                skipped: 0,
            });
        }

        let mode = ConsolidationMode::parse(&request.mode);
        let result = consolidate_events(&events, &request.scope, mode, request.max_items);

        let user_id = events
            .first()
            .map(|e| e.user_id.as_str())
            .unwrap_or("unknown")
            .to_string();

        let mut written = ConsolidateCounts::default();
        for item in &result.items {
            let mut metadata = HashMap::new();
            metadata.insert("source".to_string(), serde_json::json!(item.provenance.source));
            metadata.insert("kind".to_string(), serde_json::json!(item.kind));
            metadata.insert("confidence".to_string(), serde_json::json!(item.confidence));
            metadata.insert("timestamp".to_string(), serde_json::json!(item.timestamp));
            if let Some(event_id) = &item.provenance.event_id {
                metadata.insert("event_id".to_string(), serde_json::json!(event_id));
            }
            metadata.insert("room_id".to_string(), serde_json::json!(item.provenance.scope_id));

            self.enqueue_memory(&user_id, &item.text, metadata)?;

            match item.kind {
                "episodic" => written.episodic += 1,
                "semantic" => written.semantic += 1,
                "procedural" => written.procedural += 1,
                _ => {}
            }
        }

        let newest_ts = result
            .newest_timestamp
            .unwrap_or_else(|| events.iter().map(|e| e.timestamp).max().unwrap_or(0));
        self.working.mark_consolidated(&request.scope, newest_ts)?;

        Ok(ConsolidateResponse {
            status: "ok".to_string(),
            written,
            skipped: result.skipped,
        })
    }

    /// `POST /reflect`: query up to `max_candidates` long-term memories by
    /// the concatenation of the user message and assistant reply, then hand
    /// them to [`reflection::select`] for eligibility filtering and
    /// overlap-scored selection.
    pub async fn reflect(&self, request: ReflectRequest) -> ReflectResponse {
        let combined = format!("{} {}", request.user_message, request.assistant_reply);
        let candidates = self
            .writeback
            .query_memories(&request.user_id, &combined, Some(request.max_candidates))
            .await;
        let reflection = reflection::select(&candidates, &request.user_message, &request.assistant_reply);
        ReflectResponse { reflection }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ConsolidateRequest, ObserveRequest, ReflectRequest, RememberRequest, Scope};

    async fn test_governor() -> Arc<Governor> {
        let config = Config::for_tests();
        let (governor, _receiver) = Governor::new(config).unwrap();
        governor
    }

    #[tokio::test]
    async fn observing_a_short_message_is_ignored_and_not_enqueued() {
        let governor = test_governor().await;
        let response = governor
            .observe(ObserveRequest {
                source: "chat".to_string(),
                user_id: "alice".to_string(),
                text: "hi".to_string(),
                timestamp: None,
                scope: Scope::global(),
                metadata: HashMap::new(),
            })
            .await
            .unwrap();
        assert_eq!(response.decision.kind, ObserveDecisionKind::Ignore);
        assert!(governor.queue.pending().is_empty());
    }

    #[tokio::test]
    async fn ignored_observation_is_absent_from_the_working_store() {
        let governor = test_governor().await;
        let scope = Scope::global();
        governor
            .observe(ObserveRequest {
                source: "chat".to_string(),
                user_id: "alice".to_string(),
                text: "hi".to_string(),
                timestamp: None,
                scope: scope.clone(),
                metadata: HashMap::new(),
            })
            .await
            .unwrap();
        let recent = governor.working.recent_for_scope(&scope, 10).unwrap();
        assert!(recent.is_empty());
    }

    #[tokio::test]
    async fn observing_an_explicit_command_enqueues_a_write_back_job() {
        let governor = test_governor().await;
        let response = governor
            .observe(ObserveRequest {
                source: "chat".to_string(),
                user_id: "alice".to_string(),
                text: "!remember buy milk tomorrow".to_string(),
                timestamp: None,
                scope: Scope::global(),
                metadata: HashMap::new(),
            })
            .await
            .unwrap();
        assert_eq!(response.decision.kind, ObserveDecisionKind::Candidate);
        assert_eq!(governor.queue.pending().len(), 1);
    }

    #[tokio::test]
    async fn duplicate_observation_within_24h_is_deduped_and_not_requeued() {
        let governor = test_governor().await;
        let request = ObserveRequest {
            source: "chat".to_string(),
            user_id: "alice".to_string(),
            text: "!remember buy milk tomorrow".to_string(),
            timestamp: Some(1_000),
            scope: Scope::global(),
            metadata: HashMap::new(),
        };
        governor.observe(request.clone()).await.unwrap();
        let second = governor.observe(request).await.unwrap();
        assert_eq!(second.decision.kind, ObserveDecisionKind::Ignore);
        assert_eq!(governor.queue.pending().len(), 1);
    }

    #[tokio::test]
    async fn remember_always_enqueues_regardless_of_salience() {
        let governor = test_governor().await;
        let response = governor
            .remember(RememberRequest {
                source: "chat".to_string(),
                user_id: "alice".to_string(),
                text: "hi".to_string(),
                kind: "semantic".to_string(),
                scope: Scope::global(),
                metadata: HashMap::new(),
            })
            .await
            .unwrap();
        assert_eq!(response.status, "stored");
        assert!(response.memory_id.is_some());
        assert_eq!(governor.queue.pending().len(), 1);
    }

    #[tokio::test]
    async fn consolidate_with_no_working_events_is_a_noop() {
        let governor = test_governor().await;
        let response = governor
            .consolidate(ConsolidateRequest {
                scope: Scope::global(),
                mode: "all".to_string(),
                max_items: 20,
            })
            .await
            .unwrap();
        assert_eq!(response.status, "ok");
        assert_eq!(response.skipped, 0);
        assert_eq!(response.written.episodic, 0);
    }

    #[tokio::test]
    async fn consolidate_enqueues_episodic_candidates_from_working_events() {
        let governor = test_governor().await;
        governor
            .observe(ObserveRequest {
                source: "chat".to_string(),
                user_id: "alice".to_string(),
                text: "met bob at the park".to_string(),
                timestamp: Some(1_000),
                scope: Scope::global(),
                metadata: HashMap::new(),
            })
            .await
            .unwrap();
        let response = governor
            .consolidate(ConsolidateRequest {
                scope: Scope::global(),
                mode: "episodic".to_string(),
                max_items: 20,
            })
            .await
            .unwrap();
        assert_eq!(response.written.episodic, 1);
        assert_eq!(
            governor.working.consolidated_cursor(&Scope::global()).unwrap(),
            Some(1_000)
        );
    }

    #[tokio::test]
    async fn reflect_with_no_reachable_candidates_returns_none() {
        let governor = test_governor().await;
        let response = governor
            .reflect(ReflectRequest {
                user_id: "alice".to_string(),
                user_message: "tell me about the trip to japan".to_string(),
                assistant_reply: "sure, here's what I recall".to_string(),
                max_candidates: 3,
            })
            .await;
        assert!(response.reflection.is_none());
    }
}
