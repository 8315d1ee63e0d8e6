//! Memory Fabric - two-tier memory infrastructure for a conversational agent
//!
//! A Memory Governor ingests raw observation events, scores their salience,
//! dedupes them against a TTL-bounded working store, queues durable
//! write-backs, and periodically consolidates working memory into
//! long-term episodic/semantic/procedural memories. A Hippocampus storage
//! adapter persists those memories through a pluggable backend and exposes
//! them for recall and reflection.

pub mod config;
pub mod error;
pub mod governor;
pub mod http;
pub mod llm;
pub mod policy;
pub mod queue;
pub mod recall;
pub mod reflection;
pub mod storage;
pub mod types;
pub mod working;
pub mod writeback;

pub use config::Config;
pub use error::{FabricError, Result};
pub use governor::Governor;
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
