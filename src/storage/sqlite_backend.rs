//! Embedded-SQL backend: durably stores payloads in a single `memories`
//! table, serialized by one mutex-guarded connection.

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags};
use std::collections::HashMap;
use std::path::Path;

use super::backend::{MemoryBackend, Payload};
use crate::error::Result;

pub struct SqliteBackend {
    conn: Mutex<Connection>,
}

impl SqliteBackend {
    pub fn open(db_path: &str) -> Result<Self> {
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

        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> Result<Self> {
        Self::open(":memory:")
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS memories (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                text TEXT NOT NULL,
                metadata TEXT NOT NULL DEFAULT '{}',
                score REAL,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );
            CREATE INDEX IF NOT EXISTS idx_memories_user_id ON memories(user_id);
            "#,
        )?;
        Ok(())
    }

    fn row_to_payload(
        id: String,
        user_id: String,
        text: String,
        metadata_json: String,
        score: Option<f64>,
    ) -> Result<Payload> {
        let metadata: serde_json::Value =
            serde_json::from_str(&metadata_json).unwrap_or(serde_json::json!({}));
        let mut payload: Payload = HashMap::new();
        payload.insert("id".to_string(), serde_json::json!(id));
        payload.insert("user_id".to_string(), serde_json::json!(user_id));
        payload.insert("text".to_string(), serde_json::json!(text));
        payload.insert("metadata".to_string(), metadata);
        if let Some(s) = score {
            payload.insert("score".to_string(), serde_json::json!(s));
        }
        Ok(payload)
    }
}

#[async_trait]
impl MemoryBackend for SqliteBackend {
    async fn add(
        &self,
        user_id: &str,
        text: &str,
        metadata: HashMap<String, serde_json::Value>,
    ) -> Result<Payload> {
        let id = uuid::Uuid::new_v4().simple().to_string();
        let metadata_json =
            serde_json::to_string(&serde_json::Value::Object(metadata.clone().into_iter().collect()))?;

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO memories (id, user_id, text, metadata) VALUES (?1, ?2, ?3, ?4)",
            params![id, user_id, text, metadata_json],
        )?;
        drop(conn);

        Self::row_to_payload(id, user_id.to_string(), text.to_string(), metadata_json, None)
    }

    async fn query(&self, user_id: &str, query: &str, limit: usize) -> Result<Vec<Payload>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, user_id, text, metadata, score FROM memories \
             WHERE user_id = ?1 AND lower(text) LIKE '%' || lower(?2) || '%' \
             ORDER BY rowid DESC LIMIT ?3",
        )?;
        let rows = stmt.query_map(params![user_id, query, limit as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<f64>>(4)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (id, uid, text, metadata_json, score) = row?;
            out.push(Self::row_to_payload(id, uid, text, metadata_json, score)?);
        }
        Ok(out)
    }

    async fn list(&self, user_id: Option<&str>, limit: usize) -> Result<Vec<Payload>> {
        let conn = self.conn.lock();
        let mut out = Vec::new();
        match user_id {
            Some(uid) => {
                let mut stmt = conn.prepare(
                    "SELECT id, user_id, text, metadata, score FROM memories \
                     WHERE user_id = ?1 ORDER BY rowid DESC LIMIT ?2",
                )?;
                let rows = stmt.query_map(params![uid, limit as i64], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, Option<f64>>(4)?,
                    ))
                })?;
                for row in rows {
                    let (id, uid, text, metadata_json, score) = row?;
                    out.push(Self::row_to_payload(id, uid, text, metadata_json, score)?);
                }
            }
            None => {
                let mut stmt = conn.prepare(
                    "SELECT id, user_id, text, metadata, score FROM memories \
                     ORDER BY rowid DESC LIMIT ?1",
                )?;
                let rows = stmt.query_map(params![limit as i64], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, Option<f64>>(4)?,
                    ))
                })?;
                for row in rows {
                    let (id, uid, text, metadata_json, score) = row?;
                    out.push(Self::row_to_payload(id, uid, text, metadata_json, score)?);
                }
            }
        }
        Ok(out)
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let affected = conn.execute("DELETE FROM memories WHERE id = ?1", params![id])?;
        Ok(affected > 0)
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

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn add_then_query_by_substring() {
        let backend = SqliteBackend::in_memory().unwrap();
        backend
            .add("alice", "Met Bob at the park", HashMap::new())
            .await
            .unwrap();
        let results = backend.query("alice", "park", 10).await.unwrap();
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn schema_init_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        SqliteBackend::init_schema(&conn).unwrap();
        SqliteBackend::init_schema(&conn).unwrap();
    }

    #[tokio::test]
    async fn delete_then_query_returns_empty() {
        let backend = SqliteBackend::in_memory().unwrap();
        let payload = backend
            .add("alice", "Met Bob at the park", HashMap::new())
            .await
            .unwrap();
        let id = payload.get("id").unwrap().as_str().unwrap().to_string();
        assert!(backend.delete(&id).await.unwrap());
        let results = backend.query("alice", "park", 10).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn summarize_empty_is_empty_string() {
        let backend = SqliteBackend::in_memory().unwrap();
        assert_eq!(backend.summarize(&[], 100).await.unwrap(), "");
    }
}
