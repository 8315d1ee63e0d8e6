//! In-memory backend: an ordered sequence of payloads held behind a mutex.
//! This is also the storage adapter's always-present fallback.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;

use super::backend::{MemoryBackend, Payload};
use crate::error::Result;

#[derive(Default)]
pub struct InMemoryBackend {
    payloads: Mutex<Vec<Payload>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MemoryBackend for InMemoryBackend {
    async fn add(
        &self,
        user_id: &str,
        text: &str,
        metadata: HashMap<String, serde_json::Value>,
    ) -> Result<Payload> {
        let mut payload: Payload = HashMap::new();
        payload.insert(
            "id".to_string(),
            serde_json::json!(uuid::Uuid::new_v4().simple().to_string()),
        );
        payload.insert("user_id".to_string(), serde_json::json!(user_id));
        payload.insert("text".to_string(), serde_json::json!(text));
        payload.insert(
            "metadata".to_string(),
            serde_json::Value::Object(metadata.into_iter().collect()),
        );

        self.payloads.lock().push(payload.clone());
        Ok(payload)
    }

    async fn query(&self, user_id: &str, query: &str, limit: usize) -> Result<Vec<Payload>> {
        let needle = query.to_lowercase();
        let payloads = self.payloads.lock();
        Ok(payloads
            .iter()
            .filter(|p| {
                p.get("user_id").and_then(|v| v.as_str()) == Some(user_id)
                    && p.get("text")
                        .and_then(|v| v.as_str())
                        .map(|t| t.to_lowercase().contains(&needle))
                        .unwrap_or(false)
            })
            .take(limit)
            .cloned()
            .collect())
    }

    async fn list(&self, user_id: Option<&str>, limit: usize) -> Result<Vec<Payload>> {
        let payloads = self.payloads.lock();
        Ok(payloads
            .iter()
            .filter(|p| match user_id {
                Some(uid) => p.get("user_id").and_then(|v| v.as_str()) == Some(uid),
                None => true,
            })
            .take(limit)
            .cloned()
            .collect())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let mut payloads = self.payloads.lock();
        let before = payloads.len();
        payloads.retain(|p| p.get("id").and_then(|v| v.as_str()) != Some(id));
        Ok(payloads.len() != before)
    }

    async fn summarize(&self, texts: &[String], max_length: usize) -> Result<String> {
        let joined = texts.join(" ");
        if joined.chars().count() <= max_length {
            Ok(joined)
        } else {
            let clipped: String = joined.chars().take(max_length.saturating_sub(1)).collect();
            Ok(format!("{clipped}…"))
        }
    }
}
