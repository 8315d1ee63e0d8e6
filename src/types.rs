//! Core types shared across the memory fabric: the persisted record model,
//! working-store events, queue jobs, and the HTTP request/response DTOs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Opaque globally-unique memory identifier (random 128-bit, hex-encoded).
pub type MemoryId = String;

fn new_memory_id() -> MemoryId {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Kind of long-term memory. Unknown values round-trip via `Other`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryKind {
    Episodic,
    Semantic,
    Procedural,
    Thread,
    Preference,
    Other(String),
}

impl MemoryKind {
    pub fn as_str(&self) -> &str {
        match self {
            MemoryKind::Episodic => "episodic",
            MemoryKind::Semantic => "semantic",
            MemoryKind::Procedural => "procedural",
            MemoryKind::Thread => "thread",
            MemoryKind::Preference => "preference",
            MemoryKind::Other(s) => s.as_str(),
        }
    }
}

impl std::str::FromStr for MemoryKind {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s {
            "episodic" => MemoryKind::Episodic,
            "semantic" => MemoryKind::Semantic,
            "procedural" => MemoryKind::Procedural,
            "thread" => MemoryKind::Thread,
            "preference" => MemoryKind::Preference,
            other => MemoryKind::Other(other.to_string()),
        })
    }
}

impl Serialize for MemoryKind {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for MemoryKind {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(s.parse().expect("MemoryKind::from_str is infallible"))
    }
}

/// A conversational container: a room, a user, or the global scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
    pub kind: ScopeKind,
    pub id: String,
}

impl Scope {
    pub fn global() -> Self {
        Scope {
            kind: ScopeKind::Global,
            id: "global".to_string(),
        }
    }

    /// `"<kind>:<id>"`, the consolidation cursor's map key.
    pub fn scope_key(&self) -> String {
        format!("{}:{}", self.kind.as_str(), self.id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeKind {
    Room,
    User,
    Global,
}

impl ScopeKind {
    pub fn as_str(&self) -> &str {
        match self {
            ScopeKind::Room => "room",
            ScopeKind::User => "user",
            ScopeKind::Global => "global",
        }
    }
}

/// The persisted unit held by the Hippocampus store.
///
/// `metadata` is an open map; recognized keys are promoted via the typed
/// accessors below, everything else round-trips untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: MemoryId,
    pub user_id: String,
    pub text: String,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub score: Option<f64>,
}

impl MemoryRecord {
    pub fn new(user_id: impl Into<String>, text: impl Into<String>) -> Self {
        MemoryRecord {
            id: new_memory_id(),
            user_id: user_id.into(),
            text: text.into(),
            metadata: HashMap::new(),
            score: None,
        }
    }

    pub fn source(&self) -> Option<&str> {
        self.metadata.get("source").and_then(|v| v.as_str())
    }

    pub fn kind(&self) -> Option<MemoryKind> {
        self.metadata
            .get("kind")
            .and_then(|v| v.as_str())
            .map(|s| s.parse().expect("MemoryKind::from_str is infallible"))
    }

    pub fn salience(&self) -> Option<f64> {
        self.metadata.get("salience").and_then(|v| v.as_f64())
    }

    pub fn confidence(&self) -> Option<f64> {
        self.metadata.get("confidence").and_then(|v| v.as_f64())
    }

    pub fn keywords(&self) -> Vec<String> {
        self.metadata
            .get("keywords")
            .and_then(|v| v.as_array())
            .map(|a| {
                a.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn timestamp(&self) -> Option<i64> {
        self.metadata.get("timestamp").and_then(|v| v.as_i64())
    }

    pub fn event_id(&self) -> Option<&str> {
        self.metadata.get("event_id").and_then(|v| v.as_str())
    }

    pub fn sticky(&self) -> bool {
        self.metadata
            .get("sticky")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    pub fn sensitive(&self) -> bool {
        self.metadata
            .get("sensitive")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    pub fn title(&self) -> Option<&str> {
        self.metadata.get("title").and_then(|v| v.as_str())
    }
}

/// A short-term observation held in the working store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkingEvent {
    pub source: String,
    pub user_id: String,
    pub text: String,
    pub normalized_text: String,
    pub timestamp: i64,
    pub scope: Scope,
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    pub inserted_at: DateTime<Utc>,
    #[serde(default)]
    pub consolidated: bool,
}

/// Durable write-back unit: persisted before acknowledgment, removed only
/// after the write succeeds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueJob {
    pub id: String,
    pub ts: i64,
    pub payload: WriteBackPayload,
}

/// The memory write request carried by a `QueueJob`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteBackPayload {
    pub user_id: String,
    pub text: String,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Outcome of classifying an observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObserveDecisionKind {
    Ignore,
    Working,
    Candidate,
}

impl ObserveDecisionKind {
    pub fn as_str(&self) -> &str {
        match self {
            ObserveDecisionKind::Ignore => "ignore",
            ObserveDecisionKind::Working => "working",
            ObserveDecisionKind::Candidate => "candidate",
        }
    }
}

// ---- HTTP DTOs -------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct CreateMemoryRequest {
    pub user_id: String,
    pub text: String,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateMemoryResponse {
    pub memory: MemoryRecord,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListMemoriesResponse {
    pub memories: Vec<MemoryRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteMemoryResponse {
    pub deleted: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SummarizeRequest {
    pub texts: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SummarizeResponse {
    pub summary: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObserveRequest {
    pub source: String,
    pub user_id: String,
    pub text: String,
    #[serde(default)]
    pub timestamp: Option<i64>,
    pub scope: Scope,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ObserveDecision {
    pub salience: f64,
    pub kind: ObserveDecisionKind,
}

#[derive(Debug, Clone, Serialize)]
pub struct ObserveResponse {
    pub status: String,
    pub action: String,
    pub decision: ObserveDecision,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RememberRequest {
    pub source: String,
    pub user_id: String,
    pub text: String,
    #[serde(default = "default_remember_kind")]
    pub kind: String,
    pub scope: Scope,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

fn default_remember_kind() -> String {
    "semantic".to_string()
}

#[derive(Debug, Clone, Serialize)]
pub struct RememberResponse {
    pub status: String,
    pub memory_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecallFilters {
    #[serde(default)]
    pub kinds: Option<Vec<String>>,
    #[serde(default)]
    pub min_confidence: Option<f64>,
    #[serde(default)]
    pub since_days: Option<i64>,
    #[serde(default)]
    pub scope: Option<Scope>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecallRequest {
    pub user_id: String,
    pub query: String,
    #[serde(default = "default_recall_k")]
    pub k: usize,
    #[serde(default)]
    pub filters: RecallFilters,
}

fn default_recall_k() -> usize {
    5
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecallProvenance {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecallItem {
    pub text: String,
    pub kind: Option<String>,
    pub confidence: Option<f64>,
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub provenance: RecallProvenance,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecallResponse {
    pub results: Vec<RecallItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConsolidateRequest {
    pub scope: Scope,
    #[serde(default = "default_consolidate_mode")]
    pub mode: String,
    #[serde(default = "default_max_items")]
    pub max_items: usize,
}

fn default_consolidate_mode() -> String {
    "all".to_string()
}

fn default_max_items() -> usize {
    20
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ConsolidateCounts {
    pub episodic: usize,
    pub semantic: usize,
    pub procedural: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConsolidateResponse {
    pub status: String,
    pub written: ConsolidateCounts,
    pub skipped: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IngestRequest {
    pub source: String,
    pub user_id: String,
    pub text: String,
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestResponse {
    pub logged: bool,
    pub status: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReflectRequest {
    pub user_id: String,
    pub user_message: String,
    pub assistant_reply: String,
    #[serde(default = "default_reflect_max_candidates")]
    pub max_candidates: usize,
}

fn default_reflect_max_candidates() -> usize {
    3
}

#[derive(Debug, Clone, Serialize)]
pub struct ReflectResponse {
    pub reflection: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DoctorResponse {
    pub litellm: String,
}
