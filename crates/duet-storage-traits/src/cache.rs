//! Local cache module
//!
//! The local cache is a durable, append-only, per-conversation message store.
//! It is physically one store shared by all conversations and logically
//! partitioned by [`ConversationId`]. Access is read, append and prune only;
//! existing entries are never rewritten.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{Backend, ConversationId, Message};

/// Error type for local cache operations
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The backing database rejected the operation
    #[error("Database error: {0}")]
    Database(String),
    /// The cache has been closed or is otherwise unusable
    #[error("Cache unavailable: {0}")]
    Unavailable(String),
}

/// Storage interface for the on-device message cache
#[async_trait]
pub trait LocalCache: Send + Sync {
    /// Returns the backend type.
    fn backend(&self) -> Backend;

    /// All cached messages for the conversation, unfiltered by time.
    ///
    /// Never fails: backend errors are logged and yield an empty list.
    async fn load_messages(&self, conversation_id: &ConversationId) -> Vec<Message>;

    /// Append a message.
    ///
    /// Idempotent: appending an id that already exists in the conversation is
    /// a successful no-op and keeps the first stored copy.
    async fn append_message(&self, message: &Message) -> Result<(), CacheError>;

    /// Remove every cached message of the conversation with
    /// `created_at < cutoff`. Best effort; returns the number of removed
    /// messages (0 when the backend failed).
    async fn prune_older_than(
        &self,
        conversation_id: &ConversationId,
        cutoff: DateTime<Utc>,
    ) -> usize;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_error_display() {
        let err = CacheError::Database("disk full".to_string());
        assert_eq!(err.to_string(), "Database error: disk full");

        let err = CacheError::Unavailable("closed".to_string());
        assert_eq!(err.to_string(), "Cache unavailable: closed");
    }
}
