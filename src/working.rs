//! Working store: the TTL-bounded short-term observation store, plus the
//! optional append-only stream log. The embedded-SQL connection handling
//! uses WAL pragmas, a single mutex-guarded connection, and idempotent
//! schema creation keyed by a `schema_version` table.

use std::path::{Path, PathBuf};

use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags};

use crate::error::Result;
use crate::types::{Scope, ScopeKind, WorkingEvent};

fn open_connection(db_path: &str) -> Result<Connection> {
    let conn = if db_path == ":memory:" {
        Connection::open_in_memory()?
    } else {
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        Connection::open_with_flags(db_path, flags)?
    };
    conn.execute_batch(
        r#"
        PRAGMA journal_mode=WAL;
        PRAGMA synchronous=NORMAL;
        PRAGMA busy_timeout=30000;
        "#,
    )?;
    Ok(conn)
}

fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)",
    )?;
    let current: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;

    if current < 1 {
        // `normalized_text` ships from the first migration rather than
        // being added lazily in a later one.
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS working_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source TEXT NOT NULL,
                user_id TEXT NOT NULL,
                text TEXT NOT NULL,
                normalized_text TEXT NOT NULL,
                ts INTEGER NOT NULL,
                scope_kind TEXT NOT NULL,
                scope_id TEXT NOT NULL,
                event_id TEXT,
                metadata TEXT NOT NULL DEFAULT '{}',
                inserted_at INTEGER NOT NULL,
                consolidated INTEGER NOT NULL DEFAULT 0
            );
            CREATE UNIQUE INDEX IF NOT EXISTS idx_working_event_id
                ON working_events(source, event_id) WHERE event_id IS NOT NULL;
            CREATE INDEX IF NOT EXISTS idx_working_dedupe
                ON working_events(user_id, normalized_text, ts);
            CREATE INDEX IF NOT EXISTS idx_working_scope
                ON working_events(scope_kind, scope_id, ts DESC);

            CREATE TABLE IF NOT EXISTS consolidation_state (
                scope_key TEXT PRIMARY KEY,
                last_ts INTEGER NOT NULL
            );

            INSERT INTO schema_version (version) VALUES (1);
            "#,
        )?;
    }

    Ok(())
}

fn parse_scope_kind(s: &str) -> ScopeKind {
    match s {
        "room" => ScopeKind::Room,
        "user" => ScopeKind::User,
        _ => ScopeKind::Global,
    }
}

/// TTL-bounded short-term observation store with event-id and
/// normalized-text dedupe, scoped reads, and a per-scope consolidation
/// cursor.
pub struct WorkingStore {
    conn: Mutex<Connection>,
    ttl_hours: i64,
}

impl WorkingStore {
    pub fn open(db_path: &Path, ttl_hours: i64) -> Result<Self> {
        let conn = open_connection(&db_path.to_string_lossy())?;
        run_migrations(&conn)?;
        Ok(WorkingStore {
            conn: Mutex::new(conn),
            ttl_hours,
        })
    }

    pub fn in_memory(ttl_hours: i64) -> Result<Self> {
        Self::open(Path::new(":memory:"), ttl_hours)
    }

    /// Insert `event`. Rejects (returns `false`) when `(source, event_id)`
    /// already exists, or when an event with the same `normalized_text` for
    /// the same `user_id` was inserted within the last 24h.
    pub fn add(&self, event: &WorkingEvent) -> Result<bool> {
        let conn = self.conn.lock();
        let dedupe_cutoff = event.timestamp - 24 * 3600;

        if let Some(event_id) = &event.event_id {
            let exists: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM working_events WHERE source = ?1 AND event_id = ?2 LIMIT 1",
                    params![event.source, event_id],
                    |row| row.get(0),
                )
                .ok();
            if exists.is_some() {
                return Ok(false);
            }
        }

        let dup_norm: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM working_events \
                 WHERE user_id = ?1 AND normalized_text = ?2 AND ts >= ?3 LIMIT 1",
                params![event.user_id, event.normalized_text, dedupe_cutoff],
                |row| row.get(0),
            )
            .ok();
        if dup_norm.is_some() {
            return Ok(false);
        }

        let metadata_json = serde_json::to_string(&event.metadata)?;
        conn.execute(
            "INSERT INTO working_events \
             (source, user_id, text, normalized_text, ts, scope_kind, scope_id, event_id, metadata, inserted_at, consolidated) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 0)",
            params![
                event.source,
                event.user_id,
                event.text,
                event.normalized_text,
                event.timestamp,
                event.scope.kind.as_str(),
                event.scope.id,
                event.event_id,
                metadata_json,
                event.inserted_at.timestamp(),
            ],
        )?;
        Ok(true)
    }

    /// Returns the `limit` most recent events for `scope`, newest first.
    pub fn recent_for_scope(&self, scope: &Scope, limit: usize) -> Result<Vec<WorkingEvent>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT source, user_id, text, normalized_text, ts, scope_kind, scope_id, \
                    event_id, metadata, inserted_at, consolidated \
             FROM working_events \
             WHERE scope_kind = ?1 AND scope_id = ?2 \
             ORDER BY ts DESC LIMIT ?3",
        )?;
        let rows = stmt.query_map(
            params![scope.kind.as_str(), scope.id, limit as i64],
            Self::row_to_event,
        )?;
        let mut events = Vec::new();
        for row in rows {
            events.push(row?);
        }
        Ok(events)
    }

    /// Upsert the consolidation cursor for `scope`. Never decreases.
    pub fn mark_consolidated(&self, scope: &Scope, up_to_ts: i64) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO consolidation_state (scope_key, last_ts) VALUES (?1, ?2) \
             ON CONFLICT(scope_key) DO UPDATE SET last_ts = MAX(last_ts, excluded.last_ts)",
            params![scope.scope_key(), up_to_ts],
        )?;
        Ok(())
    }

    pub fn consolidated_cursor(&self, scope: &Scope) -> Result<Option<i64>> {
        let conn = self.conn.lock();
        let cursor = conn
            .query_row(
                "SELECT last_ts FROM consolidation_state WHERE scope_key = ?1",
                params![scope.scope_key()],
                |row| row.get(0),
            )
            .ok();
        Ok(cursor)
    }

    /// Delete events older than `ttl_hours` ago. Called at startup and
    /// periodically.
    pub fn cleanup(&self) -> Result<usize> {
        let cutoff = Utc::now().timestamp() - self.ttl_hours * 3600;
        let conn = self.conn.lock();
        let deleted = conn.execute("DELETE FROM working_events WHERE ts < ?1", params![cutoff])?;
        Ok(deleted)
    }

    fn row_to_event(row: &rusqlite::Row) -> rusqlite::Result<WorkingEvent> {
        let metadata_json: String = row.get(8)?;
        let metadata = serde_json::from_str(&metadata_json).unwrap_or_default();
        let inserted_at_ts: i64 = row.get(9)?;
        Ok(WorkingEvent {
            source: row.get(0)?,
            user_id: row.get(1)?,
            text: row.get(2)?,
            normalized_text: row.get(3)?,
            timestamp: row.get(4)?,
            scope: Scope {
                kind: parse_scope_kind(&row.get::<_, String>(5)?),
                id: row.get(6)?,
            },
            event_id: row.get(7)?,
            metadata,
            inserted_at: Utc
                .timestamp_opt(inserted_at_ts, 0)
                .single()
                .unwrap_or_else(Utc::now),
            consolidated: row.get::<_, i64>(10)? != 0,
        })
    }
}

/// Optional append-only JSON-lines log of every inbound observation,
/// independent of dedupe/TTL semantics.
pub struct StreamLog {
    path: PathBuf,
    ttl_days: i64,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct StreamRecord {
    pub source: String,
    pub user_id: String,
    pub text: String,
    pub timestamp: i64,
    pub scope: Scope,
    #[serde(default)]
    pub metadata: std::collections::HashMap<String, serde_json::Value>,
}

impl StreamLog {
    pub fn new(path: PathBuf, ttl_days: i64) -> Self {
        StreamLog { path, ttl_days }
    }

    pub fn append(&self, record: &StreamRecord) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        use std::io::Write;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", serde_json::to_string(record)?)?;
        Ok(())
    }

    /// Trim lines older than `ttl_days`. Called at startup.
    pub fn cleanup(&self) -> Result<()> {
        if !self.path.exists() {
            return Ok(());
        }
        let cutoff = Utc::now().timestamp() - self.ttl_days * 86400;
        let contents = std::fs::read_to_string(&self.path)?;
        let kept: Vec<&str> = contents
            .lines()
            .filter(|line| {
                serde_json::from_str::<StreamRecord>(line)
                    .map(|record| record.timestamp >= cutoff)
                    .unwrap_or(false)
            })
            .collect();
        let mut body = kept.join("\n");
        if !kept.is_empty() {
            body.push('\n');
        }
        std::fs::write(&self.path, body)?;
        Ok(())
    }
}
