//! Messages module
//!
//! The message is the only entity the sync core handles. It is created by the
//! sender (id and timestamp are client-assigned) and never changes afterwards.

use std::cmp::Ordering;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::ConversationId;

/// Retention window in hours. Messages older than this are pruned from both
/// storage tiers and excluded from freshly loaded views.
pub const RETENTION_HOURS: i64 = 24;

/// Oldest `created_at` that is still visible when loading at `now`.
pub fn retention_cutoff(now: DateTime<Utc>) -> DateTime<Utc> {
    now - Duration::hours(RETENTION_HOURS)
}

/// A chat message
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Message {
    /// Globally unique id, generated by the sender. Deduplication key.
    pub id: String,
    /// The conversation this message belongs to
    pub conversation_id: ConversationId,
    /// Author id, compared with the local user's id for ownership
    pub sender_id: String,
    /// Author display name
    pub sender_name: String,
    /// Message body
    pub text: String,
    /// Client-assigned creation time
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Build a new outgoing message with a fresh id and the current time.
    pub fn new(
        conversation_id: ConversationId,
        sender_id: impl Into<String>,
        sender_name: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            conversation_id,
            sender_id: sender_id.into(),
            sender_name: sender_name.into(),
            text: text.into(),
            created_at: Utc::now(),
        }
    }

    /// Compares two messages for display ordering.
    ///
    /// Ascending by `created_at`, then by `id` so that messages sharing a
    /// timestamp keep a stable order across re-renders. This ordering is used
    /// by every timeline and storage backend.
    pub fn display_order_cmp(&self, other: &Self) -> Ordering {
        self.created_at
            .cmp(&other.created_at)
            .then_with(|| self.id.cmp(&other.id))
    }

    /// Whether the message is still inside the retention window for `cutoff`.
    pub fn is_retained(&self, cutoff: DateTime<Utc>) -> bool {
        self.created_at >= cutoff
    }

    /// Whether the given user authored this message
    pub fn is_from(&self, user_id: &str) -> bool {
        self.sender_id == user_id
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at(id: &str, secs: i64) -> Message {
        Message {
            id: id.to_string(),
            conversation_id: ConversationId::new("c1"),
            sender_id: "alice".to_string(),
            sender_name: "Alice".to_string(),
            text: "hi".to_string(),
            created_at: Utc.timestamp_opt(secs, 0).single().unwrap(),
        }
    }

    #[test]
    fn new_messages_get_unique_ids() {
        let a = Message::new(ConversationId::new("c1"), "alice", "Alice", "one");
        let b = Message::new(ConversationId::new("c1"), "alice", "Alice", "two");
        assert_ne!(a.id, b.id);
        assert!(a.is_from("alice"));
        assert!(!a.is_from("bob"));
    }

    #[test]
    fn display_order_breaks_ties_on_id() {
        let a = at("a", 10);
        let b = at("b", 10);
        let c = at("0", 11);
        assert_eq!(a.display_order_cmp(&b), Ordering::Less);
        assert_eq!(b.display_order_cmp(&c), Ordering::Less);
        assert_eq!(a.display_order_cmp(&a.clone()), Ordering::Equal);
    }

    #[test]
    fn retention_boundary_is_inclusive() {
        let now = Utc.timestamp_opt(1_000_000, 0).single().unwrap();
        let cutoff = retention_cutoff(now);
        assert_eq!(cutoff, now - Duration::hours(24));

        let on_edge = at("edge", cutoff.timestamp());
        let just_older = at("old", cutoff.timestamp() - 1);
        assert!(on_edge.is_retained(cutoff));
        assert!(!just_older.is_retained(cutoff));
    }
}
