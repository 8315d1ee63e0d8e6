//! Shared client for the optional LiteLLM-compatible gateway: backs the
//! recall reranker, the `/summaries` LLM-first path, and the `/doctor`
//! health probe.

use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};

use crate::error::Result;

pub struct LlmClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl LlmClient {
    pub fn new(base_url: String, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(crate::error::FabricError::Http)?;
        Ok(LlmClient {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    async fn chat_completion(&self, model: &str, prompt: &str) -> Result<String> {
        let mut request = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .header("Content-Type", "application/json")
            .json(&serde_json::json!({
                "model": model,
                "messages": [{"role": "user", "content": prompt}],
            }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let resp = request.send().await?.error_for_status()?;
        let data: serde_json::Value = resp.json().await?;
        data["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| {
                crate::error::FabricError::Internal(
                    "LLM response missing choices[0].message.content".to_string(),
                )
            })
    }

    /// Reorder `candidates` by relevance to `query`. On any failure
    /// (network, non-2xx, a response body that doesn't parse back into
    /// `Vec<T>`), returns `candidates` unchanged — a rerank failure is never
    /// allowed to surface as an error to the caller.
    pub async fn rerank<T>(&self, query: &str, candidates: Vec<T>, model: &str) -> Vec<T>
    where
        T: Serialize + DeserializeOwned,
    {
        if candidates.is_empty() {
            return candidates;
        }
        let serialized = match serde_json::to_value(&candidates) {
            Ok(v) => v,
            Err(_) => return candidates,
        };
        let prompt = format!(
            "Reorder the following memories by relevance to the query. \
             Return a JSON array of the memory objects, unchanged, just reordered.\n\
             Query: {query}\n\
             Memories: {serialized}"
        );
        let content = match self.chat_completion(model, &prompt).await {
            Ok(c) => c,
            Err(err) => {
                tracing::warn!(error = %err, "rerank failed, using original order");
                return candidates;
            }
        };
        match serde_json::from_str::<Vec<T>>(&content) {
            Ok(reordered) if !reordered.is_empty() => reordered,
            _ => {
                tracing::warn!("rerank response did not parse as a JSON array, using original order");
                candidates
            }
        }
    }

    /// Summarize `texts` via chat completion. Returns `Ok(None)` (not an
    /// error) on any failure so the caller can fall back to the storage
    /// adapter's local summarizer.
    pub async fn summarize(&self, texts: &[String], model: &str, max_length: usize) -> Option<String> {
        if texts.is_empty() {
            return None;
        }
        let prompt = format!(
            "Summarize the following notes in at most {max_length} characters:\n{}",
            texts.join("\n")
        );
        match self.chat_completion(model, &prompt).await {
            Ok(summary) => Some(summary),
            Err(err) => {
                tracing::warn!(error = %err, "LLM summarization failed, falling back to local summarizer");
                None
            }
        }
    }

    /// GETs `<base_url>/v1/models`; reports `"ok"` with the model ids on
    /// success, `"error: <cause>"` otherwise. Never returns an `Err` — this
    /// backs the `/doctor` endpoint, whose whole point is to report reachability.
    pub async fn check_litellm(&self) -> DoctorStatus {
        let url = format!("{}/v1/models", self.base_url);
        match self.client.get(&url).send().await {
            Ok(resp) => match resp.error_for_status() {
                Ok(resp) => match resp.json::<serde_json::Value>().await {
                    Ok(data) => {
                        let models = data["data"]
                            .as_array()
                            .map(|arr| {
                                arr.iter()
                                    .filter_map(|m| m["id"].as_str().map(str::to_string))
                                    .collect()
                            })
                            .unwrap_or_default();
                        DoctorStatus::Ok { models }
                    }
                    Err(err) => DoctorStatus::Error(err.to_string()),
                },
                Err(err) => DoctorStatus::Error(err.to_string()),
            },
            Err(err) => DoctorStatus::Error(err.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DoctorStatus {
    Ok { models: Vec<String> },
    Error(String),
}

impl DoctorStatus {
    pub fn as_report_string(&self) -> String {
        match self {
            DoctorStatus::Ok { .. } => "ok".to_string(),
            DoctorStatus::Error(cause) => format!("error: {cause}"),
        }
    }
}
