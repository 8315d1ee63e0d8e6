//! The closed capability set every concrete memory backend implements.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::Result;
use crate::types::MemoryRecord;

/// A JSON-like payload as returned directly by a backend, before the
/// storage adapter normalizes it into a `MemoryRecord`.
pub type Payload = HashMap<String, serde_json::Value>;

/// The identical capability set implemented by the in-memory, embedded-SQL,
/// and remote-SDK backends. Closed by construction: there is no duck-typed
/// "does this backend support X" branch anywhere above this trait.
#[async_trait]
pub trait MemoryBackend: Send + Sync {
    async fn add(
        &self,
        user_id: &str,
        text: &str,
        metadata: HashMap<String, serde_json::Value>,
    ) -> Result<Payload>;

    async fn query(&self, user_id: &str, query: &str, limit: usize) -> Result<Vec<Payload>>;

    async fn list(&self, user_id: Option<&str>, limit: usize) -> Result<Vec<Payload>>;

    async fn delete(&self, id: &str) -> Result<bool>;

    async fn summarize(&self, texts: &[String], max_length: usize) -> Result<String>;
}

/// Convert a raw payload into a `MemoryRecord`.
///
/// - `id` is taken from the first non-empty of `id`, `_id`, `memory_id`,
///   else a freshly generated one.
/// - a non-map `metadata` value is coerced into `{"value": <v>}`.
/// - `score` is parsed as a float; parse failure yields `None`.
pub fn normalize_payload(mut payload: Payload, user_id_hint: &str) -> MemoryRecord {
    let id = ["id", "_id", "memory_id"]
        .iter()
        .find_map(|key| {
            payload.get(*key).and_then(|v| v.as_str()).and_then(|s| {
                if s.is_empty() {
                    None
                } else {
                    Some(s.to_string())
                }
            })
        })
        .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());

    let user_id = payload
        .get("user_id")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| user_id_hint.to_string());

    // `memory` is a remote-SDK alias for `text` (see RemoteBackend::query).
    let text = payload
        .get("text")
        .and_then(|v| v.as_str())
        .or_else(|| payload.get("memory").and_then(|v| v.as_str()))
        .unwrap_or("")
        .to_string();

    let metadata = match payload.remove("metadata") {
        Some(serde_json::Value::Object(map)) => map.into_iter().collect(),
        Some(other) => {
            let mut m = HashMap::new();
            m.insert("value".to_string(), other);
            m
        }
        None => HashMap::new(),
    };

    let score = payload.get("score").and_then(|v| v.as_f64());

    MemoryRecord {
        id,
        user_id,
        text,
        metadata,
        score,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_fresh_id_when_absent() {
        let payload: Payload = HashMap::new();
        let record = normalize_payload(payload, "alice");
        assert!(!record.id.is_empty());
        assert_eq!(record.user_id, "alice");
    }

    #[test]
    fn prefers_id_over_underscore_id() {
        let mut payload: Payload = HashMap::new();
        payload.insert("id".to_string(), serde_json::json!("abc"));
        payload.insert("_id".to_string(), serde_json::json!("def"));
        let record = normalize_payload(payload, "alice");
        assert_eq!(record.id, "abc");
    }

    #[test]
    fn non_map_metadata_is_coerced_into_value_key() {
        let mut payload: Payload = HashMap::new();
        payload.insert("metadata".to_string(), serde_json::json!("plain string"));
        let record = normalize_payload(payload, "alice");
        assert_eq!(
            record.metadata.get("value"),
            Some(&serde_json::json!("plain string"))
        );
    }

    #[test]
    fn memory_key_is_copied_into_text_when_text_absent() {
        let mut payload: Payload = HashMap::new();
        payload.insert("memory".to_string(), serde_json::json!("remembered this"));
        let record = normalize_payload(payload, "alice");
        assert_eq!(record.text, "remembered this");
    }
}
