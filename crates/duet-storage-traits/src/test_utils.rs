//! Test helpers shared by storage backends and the core's integration tests

use chrono::{DateTime, Duration, Utc};

use crate::{ConversationId, Message};

/// Build a message with a fixed id and an explicit timestamp.
pub fn message_at(
    conversation_id: &str,
    id: &str,
    sender_id: &str,
    created_at: DateTime<Utc>,
) -> Message {
    Message {
        id: id.to_string(),
        conversation_id: ConversationId::new(conversation_id),
        sender_id: sender_id.to_string(),
        sender_name: display_name(sender_id),
        text: format!("message {id}"),
        created_at,
    }
}

/// Build a message created `minutes` minutes before now.
pub fn message_minutes_ago(
    conversation_id: &str,
    id: &str,
    sender_id: &str,
    minutes: i64,
) -> Message {
    message_at(
        conversation_id,
        id,
        sender_id,
        Utc::now() - Duration::minutes(minutes),
    )
}

fn display_name(sender_id: &str) -> String {
    let mut chars = sender_id.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
