//! Storage adapter: a façade over one primary backend with an always-present
//! in-memory fallback. The dispatcher is closed over the `MemoryBackend`
//! trait rather than duck typing, so "primary lacks the method" can't happen
//! at runtime — only the primary-then-fallback-on-error case remains.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::backend::{normalize_payload, MemoryBackend, Payload};
use super::memory_backend::InMemoryBackend;
use super::sqlite_backend::SqliteBackend;
use crate::config::Config;
use crate::types::MemoryRecord;

#[cfg(feature = "remote-backend")]
use super::remote_backend::RemoteBackend;

/// Façade selecting a primary backend by configured name, always backed by
/// an in-memory fallback.
pub struct StorageAdapter {
    primary: Arc<dyn MemoryBackend>,
    fallback: Arc<InMemoryBackend>,
}

impl StorageAdapter {
    pub fn new(config: &Config) -> Self {
        let fallback = Arc::new(InMemoryBackend::new());
        let primary = Self::build_primary(config, fallback.clone());
        StorageAdapter { primary, fallback }
    }

    fn build_primary(config: &Config, fallback: Arc<InMemoryBackend>) -> Arc<dyn MemoryBackend> {
        let backend_name = config.storage_backend.to_lowercase();

        match backend_name.as_str() {
            "memory" | "inmemory" | "disabled" => fallback as Arc<dyn MemoryBackend>,
            "sqlite" | "persistent" | "fallback" => {
                let db_path = config.resolved_storage_db_path();
                match SqliteBackend::open(&db_path.to_string_lossy()) {
                    Ok(backend) => Arc::new(backend),
                    Err(err) => {
                        tracing::warn!(
                            error = %err,
                            "failed to open embedded-SQL storage backend, falling back to in-memory"
                        );
                        fallback as Arc<dyn MemoryBackend>
                    }
                }
            }
            "remote" | "mem0" => Self::build_remote(config, fallback),
            other => {
                tracing::warn!(backend = other, "unknown storage backend, defaulting to in-memory");
                fallback as Arc<dyn MemoryBackend>
            }
        }
    }

    #[cfg(feature = "remote-backend")]
    fn build_remote(config: &Config, fallback: Arc<InMemoryBackend>) -> Arc<dyn MemoryBackend> {
        let result = RemoteBackend::new(
            config.storage_backend_url.clone(),
            config.hippocampus_api_key.clone(),
            config.query_limit,
            config.summary_max_length,
            Duration::from_secs(5),
        );
        match result {
            Ok(backend) => Arc::new(backend),
            Err(err) => {
                tracing::warn!(error = %err, "failed to initialize remote storage backend, falling back to in-memory");
                fallback as Arc<dyn MemoryBackend>
            }
        }
    }

    #[cfg(not(feature = "remote-backend"))]
    fn build_remote(_config: &Config, fallback: Arc<InMemoryBackend>) -> Arc<dyn MemoryBackend> {
        tracing::warn!("remote storage backend requested but the 'remote-backend' feature is not compiled in, falling back to in-memory");
        fallback as Arc<dyn MemoryBackend>
    }

    pub async fn add(
        &self,
        user_id: &str,
        text: &str,
        metadata: HashMap<String, serde_json::Value>,
    ) -> MemoryRecord {
        let payload = match self.primary.add(user_id, text, metadata.clone()).await {
            Ok(payload) => payload,
            Err(err) => {
                tracing::warn!(method = "add", error = %err, "primary storage backend failed, falling back to in-memory");
                self.fallback
                    .add(user_id, text, metadata)
                    .await
                    .unwrap_or_else(|_| {
                        let mut payload: Payload = HashMap::new();
                        payload.insert("user_id".to_string(), serde_json::json!(user_id));
                        payload.insert("text".to_string(), serde_json::json!(text));
                        payload
                    })
            }
        };
        normalize_payload(payload, user_id)
    }

    pub async fn query(&self, user_id: &str, query: &str, limit: usize) -> Vec<MemoryRecord> {
        let payloads = match self.primary.query(user_id, query, limit).await {
            Ok(payloads) => payloads,
            Err(err) => {
                tracing::warn!(method = "query", error = %err, "primary storage backend failed, falling back to in-memory");
                self.fallback.query(user_id, query, limit).await.unwrap_or_default()
            }
        };
        payloads
            .into_iter()
            .map(|p| normalize_payload(p, user_id))
            .collect()
    }

    pub async fn list(&self, user_id: Option<&str>, limit: usize) -> Vec<MemoryRecord> {
        let payloads = match self.primary.list(user_id, limit).await {
            Ok(payloads) => payloads,
            Err(err) => {
                tracing::warn!(method = "list", error = %err, "primary storage backend failed, falling back to in-memory");
                self.fallback.list(user_id, limit).await.unwrap_or_default()
            }
        };
        let hint = user_id.unwrap_or("unknown");
        payloads.into_iter().map(|p| normalize_payload(p, hint)).collect()
    }

    pub async fn delete(&self, id: &str) -> bool {
        match self.primary.delete(id).await {
            Ok(deleted) => deleted,
            Err(err) => {
                tracing::warn!(method = "delete", error = %err, "primary storage backend failed, falling back to in-memory");
                self.fallback.delete(id).await.unwrap_or(false)
            }
        }
    }

    pub async fn summarize(&self, texts: &[String], max_length: usize) -> String {
        match self.primary.summarize(texts, max_length).await {
            Ok(summary) => summary,
            Err(err) => {
                tracing::warn!(method = "summarize", error = %err, "primary storage backend failed, falling back to in-memory");
                self.fallback
                    .summarize(texts, max_length)
                    .await
                    .unwrap_or_default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn memory_config() -> Config {
        let mut cfg = Config::for_tests();
        cfg.storage_backend = "memory".to_string();
        cfg
    }

    #[tokio::test]
    async fn add_then_query_round_trips() {
        let adapter = StorageAdapter::new(&memory_config());
        let record = adapter.add("alice", "Met Bob at the park", HashMap::new()).await;
        let results = adapter.query("alice", "park", 10).await;
        assert!(results.iter().any(|r| r.id == record.id));
    }

    #[tokio::test]
    async fn unknown_backend_falls_back_to_memory() {
        let mut cfg = memory_config();
        cfg.storage_backend = "nonsense".to_string();
        let adapter = StorageAdapter::new(&cfg);
        adapter.add("alice", "hello", HashMap::new()).await;
        let results = adapter.query("alice", "hello", 10).await;
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn sqlite_backend_persists_within_adapter_lifetime() {
        let mut cfg = memory_config();
        cfg.storage_backend = "sqlite".to_string();
        cfg.storage_db_path = Some(PathBuf::from(":memory:"));
        let adapter = StorageAdapter::new(&cfg);
        adapter.add("alice", "Met Bob at the park", HashMap::new()).await;
        let results = adapter.query("alice", "park", 10).await;
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn delete_then_query_returns_empty() {
        let adapter = StorageAdapter::new(&memory_config());
        let record = adapter.add("alice", "hello there", HashMap::new()).await;
        assert!(adapter.delete(&record.id).await);
        let results = adapter.query("alice", "hello", 10).await;
        assert!(results.is_empty());
    }
}
