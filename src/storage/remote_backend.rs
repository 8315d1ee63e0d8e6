//! Remote-SDK backend: stands in for a managed memory service (Mem0-style)
//! reached over HTTP. Gated behind the `remote-backend` feature; when the
//! feature is off the storage adapter treats the backend as unavailable the
//! same way it treats a missing API key.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

use super::backend::{MemoryBackend, Payload};
use crate::error::{FabricError, Result};

pub struct RemoteBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    default_query_limit: usize,
    summary_max_length: usize,
}

impl RemoteBackend {
    /// Construction fails with a `Config` error when no API key is
    /// supplied, mirroring the original SDK's `ValueError` on a missing key.
    pub fn new(
        base_url: String,
        api_key: Option<String>,
        default_query_limit: usize,
        summary_max_length: usize,
        timeout: Duration,
    ) -> Result<Self> {
        let api_key = api_key
            .ok_or_else(|| FabricError::Config("remote backend requires an API key".to_string()))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(FabricError::Http)?;
        Ok(RemoteBackend {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            default_query_limit,
            summary_max_length,
        })
    }

    fn extract_results(payload: serde_json::Value) -> Vec<Payload> {
        let raw_items: Vec<serde_json::Value> = match payload {
            serde_json::Value::Object(mut map) => match map.remove("results") {
                Some(serde_json::Value::Array(items)) => items,
                _ => Vec::new(),
            },
            serde_json::Value::Array(items) => items,
            _ => Vec::new(),
        };

        raw_items
            .into_iter()
            .filter_map(|item| match item {
                serde_json::Value::Object(map) => {
                    let mut payload: Payload = map.into_iter().collect();
                    if !payload.contains_key("text") {
                        if let Some(memory) = payload.get("memory").cloned() {
                            payload.insert("text".to_string(), memory);
                        }
                    }
                    Some(payload)
                }
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl MemoryBackend for RemoteBackend {
    async fn add(
        &self,
        user_id: &str,
        text: &str,
        metadata: HashMap<String, serde_json::Value>,
    ) -> Result<Payload> {
        let body = serde_json::json!({
            "messages": [{"role": "user", "content": text}],
            "user_id": user_id,
            "metadata": metadata,
        });
        let resp = self
            .client
            .post(format!("{}/v1/memories/", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        let data: serde_json::Value = resp.json().await?;
        let mut results = Self::extract_results(data);
        Ok(results.pop().unwrap_or_else(|| {
            let mut fallback: Payload = HashMap::new();
            fallback.insert("user_id".to_string(), serde_json::json!(user_id));
            fallback.insert("text".to_string(), serde_json::json!(text));
            fallback
        }))
    }

    async fn query(&self, user_id: &str, query: &str, limit: usize) -> Result<Vec<Payload>> {
        let top_k = if limit == 0 { self.default_query_limit } else { limit };
        let body = serde_json::json!({
            "query": query,
            "user_id": user_id,
            "top_k": top_k,
        });
        let resp = self
            .client
            .post(format!("{}/v1/memories/search/", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        let data: serde_json::Value = resp.json().await?;
        Ok(Self::extract_results(data))
    }

    async fn list(&self, user_id: Option<&str>, limit: usize) -> Result<Vec<Payload>> {
        let top_k = if limit == 0 { self.default_query_limit } else { limit };
        let body = serde_json::json!({
            "query": "",
            "user_id": user_id,
            "top_k": top_k,
        });
        let resp = self
            .client
            .post(format!("{}/v1/memories/search/", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        let data: serde_json::Value = resp.json().await?;
        Ok(Self::extract_results(data))
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let resp = self
            .client
            .delete(format!("{}/v1/memories/{}/", self.base_url, id))
            .bearer_auth(&self.api_key)
            .send()
            .await?
            .error_for_status()?;
        let data: serde_json::Value = resp.json().await.unwrap_or(serde_json::Value::Null);
        let deleted = match &data {
            serde_json::Value::Object(map) => {
                if let Some(results) = map.get("results") {
                    !matches!(results, serde_json::Value::Array(a) if a.is_empty())
                        && !matches!(results, serde_json::Value::Null)
                } else {
                    let message = map
                        .get("message")
                        .and_then(|v| v.as_str())
                        .unwrap_or("")
                        .to_lowercase();
                    message.contains("deleted") || message.contains("success")
                }
            }
            _ => true,
        };
        Ok(deleted)
    }

    /// The managed service has no remote summarization endpoint in the
    /// original SDK either; this truncates locally, same as the fallback.
    async fn summarize(&self, texts: &[String], max_length: usize) -> Result<String> {
        let max_chars = if max_length == 0 { self.summary_max_length } else { max_length };
        let joined = texts.join(" ");
        if joined.chars().count() <= max_chars {
            Ok(joined)
        } else {
            let clipped: String = joined.chars().take(max_chars.saturating_sub(1)).collect();
            Ok(format!("{clipped}…"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn construction_fails_without_api_key() {
        let result = RemoteBackend::new(
            "http://localhost:7700".to_string(),
            None,
            5,
            480,
            Duration::from_secs(5),
        );
        assert!(matches!(result, Err(FabricError::Config(_))));
    }

    #[test]
    fn extract_results_copies_memory_into_text() {
        let payload = serde_json::json!({
            "results": [{"id": "abc", "memory": "remembered this"}]
        });
        let results = RemoteBackend::extract_results(payload);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].get("text").unwrap().as_str(), Some("remembered this"));
    }

    #[test]
    fn extract_results_handles_bare_array() {
        let payload = serde_json::json!([{"id": "abc", "text": "hi"}]);
        let results = RemoteBackend::extract_results(payload);
        assert_eq!(results.len(), 1);
    }
}
