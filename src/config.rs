//! Runtime configuration for the Memory Governor and the Hippocampus storage
//! adapter it embeds. Collected from CLI flags and environment variables via
//! `clap`'s `env` attribute rather than a hand-rolled environment-variable
//! lookup.

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "memory-fabric-server")]
#[command(about = "Memory fabric HTTP service: ingest, salience, durable write-back, and recall")]
pub struct Config {
    /// Address the HTTP server binds to.
    #[arg(long, env = "MG_BIND_HOST", default_value = "127.0.0.1")]
    pub bind_host: String,

    /// Port the HTTP server listens on.
    #[arg(long, env = "MG_PORT", default_value_t = 54323)]
    pub port: u16,

    /// Ingest endpoint the write-back client tries first.
    #[arg(long, env = "INGEST_URL", default_value = "http://127.0.0.1:54322/ingest")]
    pub ingest_url: String,

    /// Hippocampus HTTP surface the write-back client falls back to, and
    /// that cross-process recall reads through.
    #[arg(long, env = "HIPPOCAMPUS_URL", default_value = "http://127.0.0.1:54321")]
    pub hippocampus_url: String,

    /// Shared-secret header sent to the Hippocampus HTTP surface.
    #[arg(long, env = "HIPPOCAMPUS_API_KEY")]
    pub hippocampus_api_key: Option<String>,

    /// Base URL of an OpenAI-compatible LLM gateway (litellm), used for the
    /// optional recall reranker, the `/summaries` fallback, and `/doctor`.
    #[arg(long, env = "LITELLM_BASE_URL", default_value = "http://127.0.0.1:4000")]
    pub litellm_base_url: String,

    #[arg(long, env = "LITELLM_API_KEY")]
    pub litellm_api_key: Option<String>,

    /// Whether inbound observations are also appended to `stream.log`.
    #[arg(long, env = "MG_STREAM_ENABLE")]
    pub stream_enable: bool,

    #[arg(long, env = "MG_STREAM_TTL_DAYS", default_value_t = 14)]
    pub stream_ttl_days: i64,

    #[arg(long, env = "MG_WORKING_TTL_HOURS", default_value_t = 24)]
    pub working_ttl_hours: i64,

    /// Root directory for `state.db`, `stream.log`, and `durable.spool`.
    #[arg(long, env = "MG_STATE_DIR", default_value = "./var/memory-governor")]
    pub state_dir: PathBuf,

    /// Shared-secret the HTTP surface requires on every request when set.
    /// Deliberately thin: a single header comparison, not a full auth system.
    #[arg(long, env = "MG_API_KEY")]
    pub api_key: Option<String>,

    #[arg(long, env = "MG_API_KEY_HEADER", default_value = "X-API-Key")]
    pub api_key_header: String,

    /// Hippocampus storage backend: memory/inmemory, sqlite/persistent/fallback,
    /// remote/mem0, or disabled. Anything else falls back to in-memory.
    #[arg(long, env = "HIPPOCAMPUS_BACKEND", default_value = "memory")]
    pub storage_backend: String,

    /// Base URL of the remote managed-memory service (remote/mem0 backend).
    #[arg(long, env = "HIPPOCAMPUS_BACKEND_URL", default_value = "http://localhost:7700")]
    pub storage_backend_url: String,

    /// Embedded-SQL backend database path. Defaults to `<state_dir>/data/hippocampus_memories.sqlite`.
    #[arg(long, env = "HIPPOCAMPUS_DB_PATH")]
    pub storage_db_path: Option<PathBuf>,

    #[arg(long, env = "HIPPOCAMPUS_SUMMARY_MAX_LENGTH", default_value_t = 480)]
    pub summary_max_length: usize,

    #[arg(long, env = "HIPPOCAMPUS_QUERY_LIMIT", default_value_t = 5)]
    pub query_limit: usize,

    /// Enable the optional LLM rerank pass over recall candidates.
    #[arg(long, env = "MG_RERANK_ENABLED")]
    pub rerank_enabled: bool,

    #[arg(long, env = "MG_RERANK_MODEL", default_value = "gpt-4o-mini")]
    pub rerank_model: String,

    #[arg(long, env = "MG_RERANK_MAX", default_value_t = 10)]
    pub rerank_max: usize,

    /// Constant backoff between write-back worker retries. There is no
    /// max-attempts cutoff; the worker retries forever at this delay.
    #[arg(long, env = "MG_RETRY_DELAY_SECS", default_value_t = 2)]
    pub retry_delay_secs: u64,

    /// Write-back client HTTP timeout.
    #[arg(long, env = "MG_WRITEBACK_TIMEOUT_SECS", default_value_t = 5)]
    pub writeback_timeout_secs: u64,

    /// Plugin ingest HTTP timeout (the `/ingest` endpoint's own outbound call).
    #[arg(long, env = "MG_INGEST_TIMEOUT_SECS", default_value_t = 2)]
    pub ingest_timeout_secs: u64,

    /// Summarization HTTP timeout (LLM-backed `/summaries`).
    #[arg(long, env = "MG_SUMMARIZE_TIMEOUT_SECS", default_value_t = 10)]
    pub summarize_timeout_secs: u64,

    /// Maximum eligible candidates considered for a post-reply reflection line.
    #[arg(long, env = "MG_REFLECTION_MAX_CANDIDATES", default_value_t = 3)]
    pub reflection_max_candidates: usize,
}

impl Config {
    pub fn db_path(&self) -> PathBuf {
        self.state_dir.join("state.db")
    }

    pub fn stream_log_path(&self) -> PathBuf {
        self.state_dir.join("stream.log")
    }

    pub fn spool_path(&self) -> PathBuf {
        self.state_dir.join("durable.spool")
    }

    pub fn resolved_storage_db_path(&self) -> PathBuf {
        self.storage_db_path
            .clone()
            .unwrap_or_else(|| self.state_dir.join("data").join("hippocampus_memories.sqlite"))
    }

    /// Ensure `state_dir` (and its `data/` subdirectory) exist.
    pub fn ensure_state_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.state_dir)?;
        if let Some(parent) = self.resolved_storage_db_path().parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    /// A config suitable for unit/integration tests: everything isolated to
    /// a freshly created temp directory, in-memory storage backend.
    pub fn for_tests() -> Self {
        let state_dir = std::env::temp_dir().join(format!(
            "memory-fabric-test-{}",
            uuid::Uuid::new_v4().simple()
        ));
        Config {
            bind_host: "127.0.0.1".to_string(),
            port: 0,
            ingest_url: "http://127.0.0.1:54322/ingest".to_string(),
            hippocampus_url: "http://127.0.0.1:54321".to_string(),
            hippocampus_api_key: None,
            litellm_base_url: "http://127.0.0.1:4000".to_string(),
            litellm_api_key: None,
            stream_enable: false,
            stream_ttl_days: 14,
            working_ttl_hours: 24,
            state_dir,
            api_key: None,
            api_key_header: "X-API-Key".to_string(),
            storage_backend: "memory".to_string(),
            storage_backend_url: "http://localhost:7700".to_string(),
            storage_db_path: Some(PathBuf::from(":memory:")),
            summary_max_length: 480,
            query_limit: 5,
            rerank_enabled: false,
            rerank_model: "gpt-4o-mini".to_string(),
            rerank_max: 10,
            retry_delay_secs: 2,
            writeback_timeout_secs: 5,
            ingest_timeout_secs: 2,
            summarize_timeout_secs: 10,
            reflection_max_candidates: 3,
        }
    }
}
