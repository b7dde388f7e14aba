//! In-memory [`LocalCache`].

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use duet_storage_traits::{Backend, CacheError, ConversationId, LocalCache, Message};
use parking_lot::RwLock;

/// A memory-based [`LocalCache`].
#[derive(Default)]
pub struct MemoryLocalCache {
    conversations: RwLock<HashMap<ConversationId, Vec<Message>>>,
    fail_appends: AtomicBool,
}

impl MemoryLocalCache {
    /// Make every following append fail (or succeed again).
    pub fn set_fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }

    /// Total number of cached messages across all conversations.
    pub fn len(&self) -> usize {
        self.conversations.read().values().map(Vec::len).sum()
    }

    /// Whether the cache holds no messages at all.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for MemoryLocalCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryLocalCache")
            .field("messages", &self.len())
            .field("fail_appends", &self.fail_appends.load(Ordering::SeqCst))
            .finish()
    }
}

#[async_trait]
impl LocalCache for MemoryLocalCache {
    fn backend(&self) -> Backend {
        Backend::Memory
    }

    async fn load_messages(&self, conversation_id: &ConversationId) -> Vec<Message> {
        let mut messages = self
            .conversations
            .read()
            .get(conversation_id)
            .cloned()
            .unwrap_or_default();
        messages.sort_by(|a, b| a.display_order_cmp(b));
        messages
    }

    async fn append_message(&self, message: &Message) -> Result<(), CacheError> {
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable("append rejected".to_string()));
        }
        let mut conversations = self.conversations.write();
        let entries = conversations
            .entry(message.conversation_id.clone())
            .or_default();
        if !entries.iter().any(|m| m.id == message.id) {
            entries.push(message.clone());
        }
        Ok(())
    }

    async fn prune_older_than(
        &self,
        conversation_id: &ConversationId,
        cutoff: DateTime<Utc>,
    ) -> usize {
        let mut conversations = self.conversations.write();
        let Some(entries) = conversations.get_mut(conversation_id) else {
            return 0;
        };
        let before = entries.len();
        entries.retain(|m| m.is_retained(cutoff));
        before - entries.len()
    }
}

#[cfg(test)]
mod tests {
    use duet_storage_traits::test_utils::message_minutes_ago;

    use super::*;

    #[tokio::test]
    async fn test_failing_appends_leave_cache_untouched() {
        let cache = MemoryLocalCache::default();
        cache.set_fail_appends(true);
        let err = cache
            .append_message(&message_minutes_ago("c1", "m1", "alice", 1))
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::Unavailable(_)));
        assert!(cache.is_empty());

        cache.set_fail_appends(false);
        cache
            .append_message(&message_minutes_ago("c1", "m1", "alice", 1))
            .await
            .unwrap();
        assert_eq!(cache.len(), 1);
    }
}
