//! HTTP client the write-back worker uses to persist a memory into the
//! Hippocampus surface, and that cross-process recall reads back through.
//! Ingest is tried first, a direct Hippocampus `/memories` POST is the
//! fallback, and query falls back to a local AND-then-OR token match with
//! recency weighting when the remote search comes back empty.

use std::collections::HashMap;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::{ListMemoriesResponse, MemoryRecord};

static WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z0-9_]+").unwrap());

/// Unfiltered word-character tokenization — unlike
/// [`crate::policy::canonical::extract_keywords`], this keeps tokens of any
/// length so short logistics terms ("ip", "ok", a port number) still match.
fn tokenize_query(text: &str) -> Vec<String> {
    WORD.find_iter(text).map(|m| m.as_str().to_string()).collect()
}

pub struct WriteBackClient {
    client: reqwest::Client,
    ingest_url: String,
    hippocampus_url: String,
    hippocampus_api_key: Option<String>,
}

impl WriteBackClient {
    pub fn new(
        ingest_url: String,
        hippocampus_url: String,
        hippocampus_api_key: Option<String>,
        timeout: Duration,
    ) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(WriteBackClient {
            client,
            ingest_url,
            hippocampus_url: hippocampus_url.trim_end_matches('/').to_string(),
            hippocampus_api_key,
        })
    }

    fn auth_header(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.hippocampus_api_key {
            Some(key) => builder.header("X-API-Key", key),
            None => builder,
        }
    }

    /// POST `payload` to the ingest endpoint first; on any failure, POST
    /// directly to the Hippocampus `/memories` endpoint instead. Returns
    /// `None` only when both writes fail — the worker keeps the job in the
    /// durable queue in that case and retries later.
    pub async fn post_memory(
        &self,
        user_id: &str,
        text: &str,
        metadata: &HashMap<String, serde_json::Value>,
    ) -> Option<String> {
        let body = serde_json::json!({
            "user_id": user_id,
            "text": text,
            "metadata": metadata,
        });

        match self.client.post(&self.ingest_url).json(&body).send().await {
            Ok(resp) => match resp.error_for_status() {
                Ok(resp) => match resp.json::<serde_json::Value>().await {
                    Ok(data) => {
                        if let Some(id) = data
                            .get("memory_id")
                            .or_else(|| data.get("id"))
                            .and_then(|v| v.as_str())
                        {
                            return Some(id.to_string());
                        }
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "ingest response did not parse, falling back to Hippocampus");
                    }
                },
                Err(err) => {
                    tracing::warn!(error = %err, "ingest write failed, falling back to Hippocampus");
                }
            },
            Err(err) => {
                tracing::warn!(error = %err, "ingest write failed, falling back to Hippocampus");
            }
        }

        let url = format!("{}/memories", self.hippocampus_url);
        let request = self.auth_header(self.client.post(&url).json(&body));
        match request.send().await {
            Ok(resp) => match resp.error_for_status() {
                Ok(resp) => match resp.json::<serde_json::Value>().await {
                    Ok(data) => data
                        .get("memory")
                        .and_then(|m| m.get("id"))
                        .or_else(|| data.get("id"))
                        .and_then(|v| v.as_str())
                        .map(str::to_string),
                    Err(err) => {
                        tracing::error!(error = %err, "Hippocampus write response did not parse");
                        None
                    }
                },
                Err(err) => {
                    tracing::error!(error = %err, "Hippocampus write failed");
                    None
                }
            },
            Err(err) => {
                tracing::error!(error = %err, "Hippocampus write failed");
                None
            }
        }
    }

    /// Query memories for `user_id`. Tries the remote search first; if it
    /// comes back empty, lists recent memories and filters/ranks locally.
    pub async fn query_memories(
        &self,
        user_id: &str,
        query: &str,
        limit: Option<usize>,
    ) -> Vec<MemoryRecord> {
        let mut results = self.remote_search(user_id, query, limit).await;

        if results.is_empty() {
            results = self.remote_list(user_id, limit.unwrap_or(50)).await;
        }

        local_filter_and_rank(results, query, limit)
    }

    async fn remote_search(
        &self,
        user_id: &str,
        query: &str,
        limit: Option<usize>,
    ) -> Vec<MemoryRecord> {
        let url = format!("{}/memories/{}", self.hippocampus_url, user_id);
        let mut params = vec![("query", query.to_string())];
        if let Some(limit) = limit {
            params.push(("limit", limit.to_string()));
        }
        self.get_memories(&url, &params).await
    }

    async fn remote_list(&self, user_id: &str, limit: usize) -> Vec<MemoryRecord> {
        let url = format!("{}/memories/{}", self.hippocampus_url, user_id);
        let params = vec![("limit", limit.to_string())];
        self.get_memories(&url, &params).await
    }

    async fn get_memories(&self, url: &str, params: &[(&str, String)]) -> Vec<MemoryRecord> {
        let request = self.auth_header(self.client.get(url).query(params));
        match request.send().await {
            Ok(resp) => match resp.error_for_status() {
                Ok(resp) => match resp.json::<ListMemoriesResponse>().await {
                    Ok(body) => body.memories,
                    Err(err) => {
                        tracing::error!(error = %err, "Hippocampus query response did not parse");
                        Vec::new()
                    }
                },
                Err(err) => {
                    tracing::error!(error = %err, "Hippocampus query failed");
                    Vec::new()
                }
            },
            Err(err) => {
                tracing::error!(error = %err, "Hippocampus query failed");
                Vec::new()
            }
        }
    }
}

/// Case-insensitive substring/keyword match, AND-first then OR fallback,
/// sorted by the same recency formula recall uses.
fn local_filter_and_rank(
    results: Vec<MemoryRecord>,
    query: &str,
    limit: Option<usize>,
) -> Vec<MemoryRecord> {
    let q = query.to_lowercase();
    let tokens = tokenize_query(&q);

    let text_of = |mem: &MemoryRecord| -> String { mem.text.to_lowercase() };
    let keywords_of = |mem: &MemoryRecord| -> Vec<String> {
        mem.keywords().into_iter().map(|k| k.to_lowercase()).collect()
    };

    let mut matched: Vec<MemoryRecord> = Vec::new();
    for mem in &results {
        let text = text_of(mem);
        let keywords = keywords_of(mem);
        let kw_joined = keywords.join(" ");
        let substring_hit = !q.is_empty() && (text.contains(&q) || kw_joined.contains(&q));
        let and_hit = !tokens.is_empty()
            && tokens
                .iter()
                .all(|tok| text.contains(tok.as_str()) || keywords.iter().any(|k| k == tok));
        if substring_hit || and_hit {
            matched.push(mem.clone());
        }
    }

    if matched.is_empty() && !tokens.is_empty() {
        for mem in &results {
            let text = text_of(mem);
            let keywords = keywords_of(mem);
            let or_hit = tokens
                .iter()
                .any(|tok| text.contains(tok.as_str()) || keywords.iter().any(|k| k == tok));
            if or_hit {
                matched.push(mem.clone());
            }
        }
    }

    if !matched.is_empty() {
        let now = chrono::Utc::now().timestamp();
        matched.sort_by(|a, b| {
            let score_a = recency_score(a, now);
            let score_b = recency_score(b, now);
            score_b
                .partial_cmp(&score_a)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        return match limit {
            Some(limit) => matched.into_iter().take(limit).collect(),
            None => matched,
        };
    }

    match limit {
        Some(limit) => results.into_iter().take(limit).collect(),
        None => results,
    }
}

fn recency_score(mem: &MemoryRecord, now: i64) -> f64 {
    match mem.timestamp() {
        Some(ts) => {
            let age_days = ((now - ts).max(0) as f64) / 86400.0;
            (1.0 - age_days / 30.0).max(0.0)
        }
        None => 0.3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_with(text: &str, keywords: &[&str], timestamp: i64) -> MemoryRecord {
        let mut mem = MemoryRecord::new("alice", text);
        mem.metadata.insert(
            "keywords".to_string(),
            serde_json::json!(keywords.to_vec()),
        );
        mem.metadata.insert("timestamp".to_string(), serde_json::json!(timestamp));
        mem
    }

    #[test]
    fn and_match_beats_no_match() {
        let now = chrono::Utc::now().timestamp();
        let results = vec![
            memory_with("the weather is nice today", &[], now),
            memory_with("project deadline is next friday", &["deadline", "friday"], now),
        ];
        let filtered = local_filter_and_rank(results, "project deadline", None);
        assert_eq!(filtered.len(), 1);
        assert!(filtered[0].text.contains("deadline"));
    }

    #[test]
    fn or_fallback_when_no_and_match() {
        let now = chrono::Utc::now().timestamp();
        let results = vec![
            memory_with("likes coffee in the morning", &["coffee"], now),
            memory_with("deadline is friday", &["deadline", "friday"], now),
        ];
        let filtered = local_filter_and_rank(results, "coffee deadline", None);
        assert_eq!(filtered.len(), 2);
    }

    #[test]
    fn more_recent_memory_ranks_first() {
        let now = chrono::Utc::now().timestamp();
        let old = memory_with("deadline next week", &["deadline"], now - 20 * 86400);
        let fresh = memory_with("deadline tomorrow", &["deadline"], now - 86400);
        let filtered = local_filter_and_rank(vec![old, fresh.clone()], "deadline", None);
        assert_eq!(filtered[0].text, fresh.text);
    }

    #[test]
    fn no_match_falls_back_to_unfiltered_results_truncated_to_limit() {
        let now = chrono::Utc::now().timestamp();
        let results = vec![
            memory_with("alpha", &[], now),
            memory_with("beta", &[], now),
            memory_with("gamma", &[], now),
        ];
        let filtered = local_filter_and_rank(results, "nonexistent query terms", Some(2));
        assert_eq!(filtered.len(), 2);
    }

    #[test]
    fn short_query_tokens_are_not_dropped() {
        let now = chrono::Utc::now().timestamp();
        let results = vec![
            memory_with("internal ip address is 10.0.0.22 for the gateway", &[], now),
            memory_with("completely different topic about weather", &[], now),
        ];
        let filtered = local_filter_and_rank(results, "ip 22", None);
        assert_eq!(filtered.len(), 1);
        assert!(filtered[0].text.contains("10.0.0.22"));
    }
}
