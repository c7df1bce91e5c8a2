//! SQLite-backed generation store.
//!
//! All generations share a single database file; entries are keyed by
//! `(generation, key)`. Thread-safe via an internal mutex on the connection.

use super::traits::{CacheKey, CacheStore, DynGeneration, Generation, GenerationStats, StoredEntry};
use crate::error::{AgentError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::StatusCode;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};
use url::Url;

type SharedConnection = Arc<Mutex<Connection>>;

fn lock(conn: &SharedConnection) -> Result<MutexGuard<'_, Connection>> {
    conn.lock().map_err(|e| AgentError::Database {
        message: format!("Failed to lock database: {}", e),
        source: None,
    })
}

fn encode_headers(headers: &HeaderMap) -> Result<String> {
    let pairs: Vec<(&str, &str)> = headers
        .iter()
        .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str(), v)))
        .collect();
    Ok(serde_json::to_string(&pairs)?)
}

fn decode_headers(raw: &str) -> HeaderMap {
    let pairs: Vec<(String, String)> = serde_json::from_str(raw).unwrap_or_else(|e| {
        warn!("Stored headers unreadable, dropping them: {}", e);
        Vec::new()
    });
    let mut headers = HeaderMap::new();
    for (name, value) in pairs {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(&value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.append(name, value);
            }
            _ => warn!("Dropping unreadable stored header {}", name),
        }
    }
    headers
}

fn generation_exists(conn: &Connection, name: &str) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT id FROM generations WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

fn write_entry(conn: &Connection, generation: &str, entry: &StoredEntry) -> Result<()> {
    conn.execute(
        r#"
        INSERT OR REPLACE INTO entries
        (generation, key, status, headers, url, body, size_bytes, stored_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
        params![
            generation,
            entry.key.as_str(),
            entry.status.as_u16() as i64,
            encode_headers(&entry.headers)?,
            entry.url.as_ref().map(|u| u.as_str()),
            entry.body.as_ref(),
            entry.size_bytes() as i64,
            entry.stored_at.to_rfc3339(),
        ],
    )
    .map_err(|e| AgentError::Database {
        message: format!("Failed to store entry {}: {}", entry.key, e),
        source: Some(e),
    })?;
    Ok(())
}

/// SQLite-backed generation store.
pub struct SqliteCacheStore {
    conn: SharedConnection,
}

impl SqliteCacheStore {
    /// Open (or create) a store at the given database path.
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| AgentError::Io {
                message: format!("Failed to create cache directory: {}", e),
                path: Some(parent.to_path_buf()),
                source: Some(e),
            })?;
        }

        let conn = Connection::open(db_path).map_err(|e| AgentError::Database {
            message: format!("Failed to open cache database: {}", e),
            source: Some(e),
        })?;

        // WAL keeps readers unblocked while a background write commits
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| AgentError::Database {
                message: format!("Failed to set pragmas: {}", e),
                source: Some(e),
            })?;

        Self::with_connection(conn)
    }

    /// Create a store backed by a private in-memory database.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = lock(&self.conn)?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS generations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS entries (
                generation TEXT NOT NULL,
                key TEXT NOT NULL,
                status INTEGER NOT NULL,
                headers TEXT NOT NULL,
                url TEXT,
                body BLOB NOT NULL,
                size_bytes INTEGER NOT NULL,
                stored_at TEXT NOT NULL,
                PRIMARY KEY (generation, key)
            );

            CREATE INDEX IF NOT EXISTS idx_entries_generation
                ON entries(generation);
            "#,
        )
        .map_err(|e| AgentError::Database {
            message: format!("Failed to initialize cache schema: {}", e),
            source: Some(e),
        })?;
        Ok(())
    }
}

#[async_trait]
impl CacheStore for SqliteCacheStore {
    async fn open(&self, name: &str) -> Result<DynGeneration> {
        {
            let conn = lock(&self.conn)?;
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO generations (name, created_at) VALUES (?1, ?2)",
                params![name, Utc::now().to_rfc3339()],
            )?;
            if inserted > 0 {
                debug!("Creating cache generation {}", name);
            }
        }
        Ok(Arc::new(SqliteGeneration {
            name: name.to_string(),
            conn: self.conn.clone(),
        }))
    }

    async fn has(&self, name: &str) -> Result<bool> {
        let conn = lock(&self.conn)?;
        generation_exists(&conn, name)
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        let mut conn = lock(&self.conn)?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM entries WHERE generation = ?1", params![name])?;
        let removed = tx.execute("DELETE FROM generations WHERE name = ?1", params![name])?;
        tx.commit()?;
        Ok(removed > 0)
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let conn = lock(&self.conn)?;
        let mut stmt = conn.prepare("SELECT name FROM generations ORDER BY id")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(names)
    }

    async fn stats(&self) -> Result<Vec<GenerationStats>> {
        let conn = lock(&self.conn)?;
        let mut stmt = conn.prepare(
            r#"
            SELECT g.name, COUNT(e.key), COALESCE(SUM(e.size_bytes), 0)
            FROM generations g
            LEFT JOIN entries e ON e.generation = g.name
            GROUP BY g.id
            ORDER BY g.id
            "#,
        )?;
        let stats = stmt
            .query_map([], |row| {
                Ok(GenerationStats {
                    name: row.get(0)?,
                    entry_count: row.get::<_, i64>(1)? as usize,
                    total_size_bytes: row.get::<_, i64>(2)? as u64,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(stats)
    }
}

/// Handle to one generation inside a [`SqliteCacheStore`].
pub struct SqliteGeneration {
    name: String,
    conn: SharedConnection,
}

#[async_trait]
impl Generation for SqliteGeneration {
    fn name(&self) -> &str {
        &self.name
    }

    async fn lookup(&self, key: &CacheKey) -> Result<Option<StoredEntry>> {
        let conn = lock(&self.conn)?;
        let row: Option<(i64, String, Option<String>, Vec<u8>, String)> = conn
            .query_row(
                r#"
                SELECT status, headers, url, body, stored_at
                FROM entries
                WHERE generation = ?1 AND key = ?2
                "#,
                params![self.name, key.as_str()],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                    ))
                },
            )
            .optional()
            .map_err(|e| AgentError::Database {
                message: format!("Failed to query entry {}: {}", key, e),
                source: Some(e),
            })?;

        let (status, headers, url, body, stored_at) = match row {
            Some(r) => r,
            None => return Ok(None),
        };

        let status = StatusCode::from_u16(status as u16).map_err(|e| AgentError::Database {
            message: format!("Stored status for {} is invalid: {}", key, e),
            source: None,
        })?;
        let stored_at = DateTime::parse_from_rfc3339(&stored_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        Ok(Some(StoredEntry {
            key: key.clone(),
            status,
            headers: decode_headers(&headers),
            url: url.and_then(|u| Url::parse(&u).ok()),
            body: Bytes::from(body),
            stored_at,
        }))
    }

    async fn insert(&self, entry: StoredEntry) -> Result<()> {
        let conn = lock(&self.conn)?;
        if !generation_exists(&conn, &self.name)? {
            return Err(AgentError::GenerationNotFound(self.name.clone()));
        }
        write_entry(&conn, &self.name, &entry)
    }

    async fn insert_all(&self, entries: Vec<StoredEntry>) -> Result<()> {
        let mut conn = lock(&self.conn)?;
        let tx = conn.transaction()?;
        if !generation_exists(&tx, &self.name)? {
            return Err(AgentError::GenerationNotFound(self.name.clone()));
        }
        for entry in &entries {
            write_entry(&tx, &self.name, entry)?;
        }
        tx.commit()?;
        Ok(())
    }

    async fn remove(&self, key: &CacheKey) -> Result<bool> {
        let conn = lock(&self.conn)?;
        let removed = conn.execute(
            "DELETE FROM entries WHERE generation = ?1 AND key = ?2",
            params![self.name, key.as_str()],
        )?;
        Ok(removed > 0)
    }

    async fn keys(&self) -> Result<Vec<CacheKey>> {
        let conn = lock(&self.conn)?;
        let mut stmt = conn.prepare("SELECT key FROM entries WHERE generation = ?1")?;
        let keys = stmt
            .query_map(params![self.name], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        keys.into_iter()
            .map(|k| {
                Url::parse(&k)
                    .map(|u| CacheKey::for_url(&u))
                    .map_err(|e| AgentError::InvalidUrl {
                        url: k,
                        message: e.to_string(),
                    })
            })
            .collect()
    }
}
