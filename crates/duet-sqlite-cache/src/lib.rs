//! SQLite-based message cache for duet.
//!
//! Implements [`LocalCache`] on top of a single SQLite file shared by every
//! conversation. Rows are keyed by `(conversation_id, id)` and are never
//! updated in place; appends use `INSERT OR IGNORE` so the first stored copy
//! of an id wins.
//!
//! ```no_run
//! use duet_sqlite_cache::SqliteLocalCache;
//!
//! let cache = SqliteLocalCache::open_in_data_dir("/path/to/data")?;
//! # Ok::<(), duet_sqlite_cache::error::Error>(())
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::bare_urls)]

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use duet_storage_traits::{Backend, CacheError, ConversationId, LocalCache, Message};
use rusqlite::{Connection, params};

mod db;
pub mod error;

use self::error::Error;

/// File name of the cache database inside the app data directory
pub const CACHE_FILE_NAME: &str = "chat_cache.sqlite3";

/// A SQLite-based [`LocalCache`].
#[derive(Clone)]
pub struct SqliteLocalCache {
    connection: Arc<Mutex<Connection>>,
}

impl SqliteLocalCache {
    /// Open (or create) the cache database at `file_path`.
    pub fn open<P>(file_path: P) -> Result<Self, Error>
    where
        P: AsRef<Path>,
    {
        let file_path = file_path.as_ref();
        if let Some(parent) = file_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let connection = Connection::open(file_path)?;
        Self::from_connection(connection)
    }

    /// Open the cache at `<data_dir>/chat_cache.sqlite3`.
    pub fn open_in_data_dir<P>(data_dir: P) -> Result<Self, Error>
    where
        P: AsRef<Path>,
    {
        Self::open(data_dir.as_ref().join(CACHE_FILE_NAME))
    }

    /// In-memory database, mostly useful for tests.
    pub fn open_in_memory() -> Result<Self, Error> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(connection: Connection) -> Result<Self, Error> {
        db::init_schema(&connection)?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Run `f` against the connection on tokio's blocking pool.
    async fn with_connection<T, F>(&self, f: F) -> Result<T, Error>
    where
        F: FnOnce(&Connection) -> Result<T, Error> + Send + 'static,
        T: Send + 'static,
    {
        let connection = Arc::clone(&self.connection);
        tokio::task::spawn_blocking(move || f(&lock_connection(&connection))).await?
    }
}

fn lock_connection(connection: &Mutex<Connection>) -> MutexGuard<'_, Connection> {
    // Every statement is atomic, so a poisoned connection is still consistent.
    connection
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn select_messages(
    conn: &Connection,
    conversation_id: &ConversationId,
) -> Result<Vec<Message>, Error> {
    let mut stmt = conn.prepare_cached(
        "SELECT conversation_id, id, sender_id, sender_name, text, created_at
         FROM chat_messages
         WHERE conversation_id = ?
         ORDER BY created_at ASC, id ASC",
    )?;
    let rows = stmt.query_map(params![conversation_id.as_str()], db::row_to_message)?;
    let mut messages = Vec::new();
    for row in rows {
        messages.push(row?);
    }
    Ok(messages)
}

fn insert_message(conn: &Connection, message: &Message) -> Result<(), Error> {
    conn.execute(
        "INSERT OR IGNORE INTO chat_messages
         (conversation_id, id, sender_id, sender_name, text, created_at)
         VALUES (?, ?, ?, ?, ?, ?)",
        params![
            message.conversation_id.as_str(),
            &message.id,
            &message.sender_id,
            &message.sender_name,
            &message.text,
            db::to_micros(message.created_at),
        ],
    )?;
    Ok(())
}

fn delete_older_than(
    conn: &Connection,
    conversation_id: &ConversationId,
    cutoff: DateTime<Utc>,
) -> Result<usize, Error> {
    let removed = conn.execute(
        "DELETE FROM chat_messages WHERE conversation_id = ? AND created_at < ?",
        params![conversation_id.as_str(), db::to_micros(cutoff)],
    )?;
    Ok(removed)
}

#[async_trait]
impl LocalCache for SqliteLocalCache {
    fn backend(&self) -> Backend {
        Backend::SQLite
    }

    async fn load_messages(&self, conversation_id: &ConversationId) -> Vec<Message> {
        let conversation = conversation_id.clone();
        let loaded = self
            .with_connection(move |conn| select_messages(conn, &conversation))
            .await;
        match loaded {
            Ok(messages) => messages,
            Err(e) => {
                tracing::warn!(%e, conversation = %conversation_id, "cache load failed");
                Vec::new()
            }
        }
    }

    async fn append_message(&self, message: &Message) -> Result<(), CacheError> {
        let message = message.clone();
        self.with_connection(move |conn| insert_message(conn, &message))
            .await
            .map_err(CacheError::from)
    }

    async fn prune_older_than(
        &self,
        conversation_id: &ConversationId,
        cutoff: DateTime<Utc>,
    ) -> usize {
        let conversation = conversation_id.clone();
        let pruned = self
            .with_connection(move |conn| delete_older_than(conn, &conversation, cutoff))
            .await;
        match pruned {
            Ok(removed) => {
                if removed > 0 {
                    tracing::debug!(removed, conversation = %conversation_id, "pruned cache");
                }
                removed
            }
            Err(e) => {
                tracing::warn!(%e, conversation = %conversation_id, "cache prune failed");
                0
            }
        }
    }
}
