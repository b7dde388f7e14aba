//! In-memory [`RemoteStore`] with fault injection.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use duet_storage_traits::{ConversationId, InsertSubscription, Message, RemoteError, RemoteStore};
use parking_lot::RwLock;

#[derive(Default)]
struct Faults {
    insert: Option<RemoteError>,
    query: Option<RemoteError>,
    subscribe: Option<RemoteError>,
    delete: Option<RemoteError>,
    insert_delay: Duration,
    subscribe_delay: Duration,
    query_delays: HashMap<ConversationId, Duration>,
}

#[derive(Default)]
struct Channels {
    next_id: u64,
    subscribers: HashMap<ConversationId, Vec<(u64, flume::Sender<Message>)>>,
}

impl Channels {
    fn broadcast(&mut self, message: &Message) {
        if let Some(subs) = self.subscribers.get_mut(&message.conversation_id) {
            subs.retain(|(_, tx)| tx.send(message.clone()).is_ok());
        }
    }

    fn remove(&mut self, conversation_id: &ConversationId, sub_id: u64) {
        if let Some(subs) = self.subscribers.get_mut(conversation_id) {
            subs.retain(|(id, _)| *id != sub_id);
            if subs.is_empty() {
                self.subscribers.remove(conversation_id);
            }
        }
    }
}

/// A memory-based [`RemoteStore`].
///
/// Successful inserts are echoed to every live subscriber of the
/// conversation, including the sender's own session.
#[derive(Clone, Default)]
pub struct MemoryRemoteStore {
    rows: Arc<RwLock<HashMap<ConversationId, Vec<Message>>>>,
    channels: Arc<RwLock<Channels>>,
    faults: Arc<RwLock<Faults>>,
    insert_attempts: Arc<AtomicUsize>,
    delete_calls: Arc<AtomicUsize>,
}

impl MemoryRemoteStore {
    /// Make inserts fail with `error` until reset with `None`.
    pub fn fail_inserts_with(&self, error: Option<RemoteError>) {
        self.faults.write().insert = error;
    }

    /// Make history queries fail with `error` until reset with `None`.
    pub fn fail_queries_with(&self, error: Option<RemoteError>) {
        self.faults.write().query = error;
    }

    /// Make subscribing fail with `error` until reset with `None`.
    pub fn fail_subscribe_with(&self, error: Option<RemoteError>) {
        self.faults.write().subscribe = error;
    }

    /// Make remote prune fail with `error` until reset with `None`.
    pub fn fail_deletes_with(&self, error: Option<RemoteError>) {
        self.faults.write().delete = error;
    }

    /// Delay every insert by `delay` before it is applied.
    pub fn set_insert_delay(&self, delay: Duration) {
        self.faults.write().insert_delay = delay;
    }

    /// Delay every subscribe by `delay`, as a slow websocket join would.
    pub fn set_subscribe_delay(&self, delay: Duration) {
        self.faults.write().subscribe_delay = delay;
    }

    /// Delay history queries of one conversation by `delay`.
    pub fn set_query_delay(&self, conversation_id: &ConversationId, delay: Duration) {
        self.faults
            .write()
            .query_delays
            .insert(conversation_id.clone(), delay);
    }

    /// Seed history without notifying subscribers.
    pub fn seed(&self, message: Message) {
        self.store(&message);
    }

    /// Simulate the partner inserting a message: it is stored and broadcast.
    pub fn inject_insert(&self, message: Message) {
        self.store(&message);
        self.channels.write().broadcast(&message);
    }

    /// Deliver an insert event again without touching stored rows.
    pub fn redeliver(&self, message: &Message) {
        self.channels.write().broadcast(message);
    }

    /// Silently end every live feed of the conversation, as a dropped
    /// connection would.
    pub fn drop_feeds(&self, conversation_id: &ConversationId) {
        self.channels.write().subscribers.remove(conversation_id);
    }

    /// Number of live subscriptions on the conversation's channel.
    pub fn subscriber_count(&self, conversation_id: &ConversationId) -> usize {
        self.channels
            .read()
            .subscribers
            .get(conversation_id)
            .map_or(0, Vec::len)
    }

    /// Stored rows of the conversation in display order.
    pub fn messages(&self, conversation_id: &ConversationId) -> Vec<Message> {
        let mut messages = self
            .rows
            .read()
            .get(conversation_id)
            .cloned()
            .unwrap_or_default();
        messages.sort_by(|a, b| a.display_order_cmp(b));
        messages
    }

    /// Number of insert calls, failed ones included.
    pub fn insert_attempts(&self) -> usize {
        self.insert_attempts.load(Ordering::SeqCst)
    }

    /// Number of `delete_older_than` calls, failed ones included.
    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    fn store(&self, message: &Message) -> bool {
        let mut rows = self.rows.write();
        let entries = rows.entry(message.conversation_id.clone()).or_default();
        if entries.iter().any(|m| m.id == message.id) {
            return false;
        }
        entries.push(message.clone());
        true
    }
}

impl fmt::Debug for MemoryRemoteStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryRemoteStore")
            .field("conversations", &self.rows.read().len())
            .field("insert_attempts", &self.insert_attempts())
            .finish()
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn query(
        &self,
        conversation_id: &ConversationId,
        since: DateTime<Utc>,
    ) -> Result<Vec<Message>, RemoteError> {
        let (delay, failure) = {
            let faults = self.faults.read();
            (
                faults.query_delays.get(conversation_id).copied(),
                faults.query.clone(),
            )
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = failure {
            return Err(err);
        }
        // Newest first, to make sure callers sort.
        let mut messages: Vec<Message> = self
            .rows
            .read()
            .get(conversation_id)
            .map(|rows| rows.iter().filter(|m| m.created_at >= since).cloned().collect())
            .unwrap_or_default();
        messages.sort_by(|a, b| b.display_order_cmp(a));
        Ok(messages)
    }

    async fn insert(&self, message: &Message) -> Result<(), RemoteError> {
        self.insert_attempts.fetch_add(1, Ordering::SeqCst);
        let (delay, failure) = {
            let faults = self.faults.read();
            (faults.insert_delay, faults.insert.clone())
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = failure {
            return Err(err);
        }
        if self.store(message) {
            self.channels.write().broadcast(message);
        }
        Ok(())
    }

    async fn delete_older_than(
        &self,
        conversation_id: &ConversationId,
        cutoff: DateTime<Utc>,
    ) -> Result<(), RemoteError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.faults.read().delete.clone() {
            return Err(err);
        }
        if let Some(rows) = self.rows.write().get_mut(conversation_id) {
            rows.retain(|m| m.is_retained(cutoff));
        }
        Ok(())
    }

    async fn subscribe_inserts(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<InsertSubscription, RemoteError> {
        let (delay, failure) = {
            let faults = self.faults.read();
            (faults.subscribe_delay, faults.subscribe.clone())
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = failure {
            return Err(err);
        }
        let (tx, rx) = flume::unbounded();
        let sub_id = {
            let mut channels = self.channels.write();
            channels.next_id += 1;
            let sub_id = channels.next_id;
            channels
                .subscribers
                .entry(conversation_id.clone())
                .or_default()
                .push((sub_id, tx));
            sub_id
        };

        let channels = Arc::downgrade(&self.channels);
        let conversation = conversation_id.clone();
        Ok(InsertSubscription::new(
            conversation_id.clone(),
            rx,
            move || {
                if let Some(channels) = channels.upgrade() {
                    channels.write().remove(&conversation, sub_id);
                }
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration as ChronoDuration;
    use duet_storage_traits::test_utils::{message_at, message_minutes_ago};

    use super::*;

    #[tokio::test]
    async fn test_insert_is_echoed_to_subscribers() {
        let remote = MemoryRemoteStore::default();
        let conv = ConversationId::new("c1");
        let mut sub = remote.subscribe_inserts(&conv).await.unwrap();
        assert_eq!(remote.subscriber_count(&conv), 1);

        let msg = message_minutes_ago("c1", "m1", "alice", 0);
        remote.insert(&msg).await.unwrap();

        assert_eq!(sub.next().await.map(|m| m.id), Some("m1".to_string()));
        assert_eq!(remote.messages(&conv).len(), 1);
    }

    #[tokio::test]
    async fn test_feeds_are_scoped_to_conversation() {
        let remote = MemoryRemoteStore::default();
        let mut sub = remote
            .subscribe_inserts(&ConversationId::new("c1"))
            .await
            .unwrap();

        remote.inject_insert(message_minutes_ago("c2", "other", "carol", 0));
        remote.inject_insert(message_minutes_ago("c1", "mine", "bob", 0));

        assert_eq!(sub.next().await.map(|m| m.id), Some("mine".to_string()));
    }

    #[tokio::test]
    async fn test_unsubscribe_removes_subscriber() {
        let remote = MemoryRemoteStore::default();
        let conv = ConversationId::new("c1");
        let sub = remote.subscribe_inserts(&conv).await.unwrap();
        let second = remote.subscribe_inserts(&conv).await.unwrap();
        assert_eq!(remote.subscriber_count(&conv), 2);

        sub.unsubscribe();
        assert_eq!(remote.subscriber_count(&conv), 1);
        drop(second);
        assert_eq!(remote.subscriber_count(&conv), 0);
    }

    #[tokio::test]
    async fn test_failed_insert_is_not_stored() {
        let remote = MemoryRemoteStore::default();
        remote.fail_inserts_with(Some(RemoteError::PermissionDenied("rls".into())));
        let msg = message_minutes_ago("c1", "m1", "alice", 0);

        let err = remote.insert(&msg).await.unwrap_err();
        assert!(err.is_permission_denied());
        assert_eq!(remote.insert_attempts(), 1);
        assert!(remote.messages(&ConversationId::new("c1")).is_empty());
    }

    #[tokio::test]
    async fn test_query_filters_on_since() {
        let remote = MemoryRemoteStore::default();
        let now = Utc::now();
        remote.seed(message_at("c1", "old", "alice", now - ChronoDuration::hours(30)));
        remote.seed(message_at("c1", "new", "bob", now - ChronoDuration::hours(1)));

        let since = now - ChronoDuration::hours(24);
        let rows = remote
            .query(&ConversationId::new("c1"), since)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, "new");
    }

    #[tokio::test]
    async fn test_delete_older_than() {
        let remote = MemoryRemoteStore::default();
        let now = Utc::now();
        remote.seed(message_at("c1", "old", "alice", now - ChronoDuration::hours(30)));
        remote.seed(message_at("c1", "new", "bob", now));

        remote
            .delete_older_than(&ConversationId::new("c1"), now - ChronoDuration::hours(24))
            .await
            .unwrap();
        let ids: Vec<String> = remote
            .messages(&ConversationId::new("c1"))
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, vec!["new"]);
        assert_eq!(remote.delete_calls(), 1);
    }

    #[tokio::test]
    async fn test_drop_feeds_ends_subscription() {
        let remote = MemoryRemoteStore::default();
        let conv = ConversationId::new("c1");
        let mut sub = remote.subscribe_inserts(&conv).await.unwrap();
        remote.drop_feeds(&conv);
        assert_eq!(sub.next().await, None);
    }
}
