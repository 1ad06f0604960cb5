//! Core KvStore implementation

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

/// Errors from the key-value store
#[derive(Debug, thiserror::Error)]
pub enum KvError {
    /// Underlying sqlite failure
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Value did not round-trip through JSON
    #[error("invalid JSON value for key '{key}': {source}")]
    Json {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Embedded key-value store with JSON text values
///
/// The connection lives behind a mutex; callers on async runtimes should go
/// through `spawn_blocking` for the round-trip.
pub struct KvStore {
    conn: Mutex<Connection>,
}

impl KvStore {
    /// Open or create a store at the given path
    ///
    /// Parent directories are created if missing.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, KvError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).ok();
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv (
                key        TEXT PRIMARY KEY,
                value      TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );",
        )?;

        debug!(path = %path.display(), "kv store opened");
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// In-memory store, used by tests
    pub fn open_in_memory() -> Result<Self, KvError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv (
                key        TEXT PRIMARY KEY,
                value      TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );",
        )?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Write a value, replacing any previous one under the same key
    pub fn set_json<T: Serialize>(&self, key: &str, value: &T) -> Result<(), KvError> {
        let text = serde_json::to_string(value).map_err(|source| KvError::Json {
            key: key.to_string(),
            source,
        })?;
        self.set_raw(key, &text)
    }

    /// Read a value, `None` when the key is absent
    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, KvError> {
        match self.get_raw(key)? {
            Some(text) => {
                let value = serde_json::from_str(&text).map_err(|source| KvError::Json {
                    key: key.to_string(),
                    source,
                })?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Write a pre-serialized JSON value
    pub fn set_raw(&self, key: &str, value: &str) -> Result<(), KvError> {
        let now = chrono::Utc::now().to_rfc3339();
        let conn = self.conn.lock().expect("kv mutex poisoned");
        conn.execute(
            "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = ?2, updated_at = ?3",
            params![key, value, now],
        )?;
        Ok(())
    }

    /// Read the raw JSON text for a key
    pub fn get_raw(&self, key: &str) -> Result<Option<String>, KvError> {
        let conn = self.conn.lock().expect("kv mutex poisoned");
        let value = conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get::<_, String>(0)
            })
            .optional()?;
        Ok(value)
    }

    /// Remove a key; returns whether it existed
    pub fn delete(&self, key: &str) -> Result<bool, KvError> {
        let conn = self.conn.lock().expect("kv mutex poisoned");
        let changed = conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(changed > 0)
    }

    /// List keys matching a prefix, sorted
    pub fn keys(&self, prefix: &str) -> Result<Vec<String>, KvError> {
        let conn = self.conn.lock().expect("kv mutex poisoned");
        let pattern = format!("{}%", prefix.replace('%', "\\%").replace('_', "\\_"));
        let mut stmt = conn.prepare("SELECT key FROM kv WHERE key LIKE ?1 ESCAPE '\\' ORDER BY key")?;
        let keys = stmt
            .query_map(params![pattern], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(keys)
    }
}
