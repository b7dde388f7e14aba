//! Local cache test functions

use chrono::{Duration, Utc};
use duet_storage_traits::test_utils::{message_at, message_minutes_ago};
use duet_storage_traits::{ConversationId, LocalCache, Message};

fn ids(messages: &[Message]) -> Vec<&str> {
    messages.iter().map(|m| m.id.as_str()).collect()
}

/// Loading a conversation that was never written yields an empty list
pub async fn test_load_empty<S>(storage: S)
where
    S: LocalCache,
{
    let messages = storage.load_messages(&ConversationId::new("nobody")).await;
    assert!(messages.is_empty());
}

/// Appended messages come back with every field intact
pub async fn test_append_and_load<S>(storage: S)
where
    S: LocalCache,
{
    let first = message_minutes_ago("c1", "m1", "alice", 10);
    let second = message_minutes_ago("c1", "m2", "bob", 5);

    storage.append_message(&first).await.unwrap();
    storage.append_message(&second).await.unwrap();

    let mut loaded = storage.load_messages(&ConversationId::new("c1")).await;
    loaded.sort_by(|a, b| a.display_order_cmp(b));
    assert_eq!(ids(&loaded), vec!["m1", "m2"]);

    let round_tripped = &loaded[0];
    assert_eq!(round_tripped.sender_id, "alice");
    assert_eq!(round_tripped.sender_name, "Alice");
    assert_eq!(round_tripped.text, "message m1");
    assert_eq!(round_tripped.conversation_id, ConversationId::new("c1"));
    assert_eq!(
        round_tripped.created_at.timestamp_micros(),
        first.created_at.timestamp_micros()
    );
}

/// Appending the same id twice succeeds and keeps the first copy
pub async fn test_append_is_idempotent<S>(storage: S)
where
    S: LocalCache,
{
    let original = message_minutes_ago("c1", "dup", "alice", 3);
    let mut rewritten = original.clone();
    rewritten.text = "edited".to_string();

    storage.append_message(&original).await.unwrap();
    storage.append_message(&rewritten).await.unwrap();

    let loaded = storage.load_messages(&ConversationId::new("c1")).await;
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].text, "message dup");
}

/// Conversations never see each other's messages
pub async fn test_conversations_are_partitioned<S>(storage: S)
where
    S: LocalCache,
{
    storage
        .append_message(&message_minutes_ago("c1", "a", "alice", 1))
        .await
        .unwrap();
    storage
        .append_message(&message_minutes_ago("c2", "b", "carol", 1))
        .await
        .unwrap();
    // Same id in another conversation is a distinct entry
    storage
        .append_message(&message_minutes_ago("c2", "a", "carol", 1))
        .await
        .unwrap();

    let c1 = storage.load_messages(&ConversationId::new("c1")).await;
    let mut c2 = storage.load_messages(&ConversationId::new("c2")).await;
    c2.sort_by(|a, b| a.id.cmp(&b.id));

    assert_eq!(ids(&c1), vec!["a"]);
    assert_eq!(c1[0].sender_id, "alice");
    assert_eq!(ids(&c2), vec!["a", "b"]);
    assert!(c2.iter().all(|m| m.sender_id == "carol"));
}

/// Load is not filtered by the retention window
pub async fn test_load_returns_expired_entries<S>(storage: S)
where
    S: LocalCache,
{
    let stale = message_at("c1", "old", "alice", Utc::now() - Duration::hours(48));
    storage.append_message(&stale).await.unwrap();

    let loaded = storage.load_messages(&ConversationId::new("c1")).await;
    assert_eq!(ids(&loaded), vec!["old"]);
}

/// Prune removes strictly older entries and keeps the boundary
pub async fn test_prune_boundary<S>(storage: S)
where
    S: LocalCache,
{
    let cutoff = Utc::now() - Duration::hours(24);
    storage
        .append_message(&message_at("c1", "older", "alice", cutoff - Duration::seconds(1)))
        .await
        .unwrap();
    storage
        .append_message(&message_at("c1", "edge", "alice", cutoff))
        .await
        .unwrap();
    storage
        .append_message(&message_at("c1", "newer", "bob", cutoff + Duration::minutes(1)))
        .await
        .unwrap();

    let removed = storage
        .prune_older_than(&ConversationId::new("c1"), cutoff)
        .await;
    assert_eq!(removed, 1);

    let mut remaining = storage.load_messages(&ConversationId::new("c1")).await;
    remaining.sort_by(|a, b| a.display_order_cmp(b));
    assert_eq!(ids(&remaining), vec!["edge", "newer"]);
}

/// Prune only touches the given conversation
pub async fn test_prune_is_scoped<S>(storage: S)
where
    S: LocalCache,
{
    let old = Utc::now() - Duration::hours(30);
    storage
        .append_message(&message_at("c1", "x", "alice", old))
        .await
        .unwrap();
    storage
        .append_message(&message_at("c2", "y", "carol", old))
        .await
        .unwrap();

    let removed = storage
        .prune_older_than(&ConversationId::new("c1"), Utc::now() - Duration::hours(24))
        .await;
    assert_eq!(removed, 1);
    assert!(storage.load_messages(&ConversationId::new("c1")).await.is_empty());
    assert_eq!(storage.load_messages(&ConversationId::new("c2")).await.len(), 1);

    // Nothing left to prune
    let removed = storage
        .prune_older_than(&ConversationId::new("c1"), Utc::now())
        .await;
    assert_eq!(removed, 0);
}

/// A pruned id may be appended again
pub async fn test_append_after_prune<S>(storage: S)
where
    S: LocalCache,
{
    let old = message_at("c1", "again", "alice", Utc::now() - Duration::hours(30));
    storage.append_message(&old).await.unwrap();
    storage
        .prune_older_than(&ConversationId::new("c1"), Utc::now() - Duration::hours(24))
        .await;

    let fresh = message_minutes_ago("c1", "again", "alice", 1);
    storage.append_message(&fresh).await.unwrap();

    let loaded = storage.load_messages(&ConversationId::new("c1")).await;
    assert_eq!(loaded.len(), 1);
    assert!(loaded[0].created_at > Utc::now() - Duration::hours(1));
}
