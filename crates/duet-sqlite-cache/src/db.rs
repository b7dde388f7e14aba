//! Schema and row mapping for the message cache.

use chrono::{DateTime, Utc};
use duet_storage_traits::{ConversationId, Message};
use rusqlite::{Connection, Row, types::Type};

use crate::error::Error;

pub(crate) const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS chat_messages (
    conversation_id TEXT NOT NULL,
    id TEXT NOT NULL,
    sender_id TEXT NOT NULL,
    sender_name TEXT NOT NULL,
    text TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    PRIMARY KEY (conversation_id, id)
);
CREATE INDEX IF NOT EXISTS idx_chat_messages_created_at
    ON chat_messages(conversation_id, created_at);
";

pub(crate) fn init_schema(conn: &Connection) -> Result<(), Error> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

/// Timestamps are stored as unix microseconds.
pub(crate) fn to_micros(at: DateTime<Utc>) -> i64 {
    at.timestamp_micros()
}

pub(crate) fn from_micros(micros: i64) -> Result<DateTime<Utc>, Error> {
    DateTime::from_timestamp_micros(micros).ok_or(Error::InvalidTimestamp(micros))
}

pub(crate) fn row_to_message(row: &Row<'_>) -> rusqlite::Result<Message> {
    let conversation_id: String = row.get("conversation_id")?;
    let created_at: i64 = row.get("created_at")?;
    let created_at = from_micros(created_at).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(5, Type::Integer, Box::new(e))
    })?;

    Ok(Message {
        id: row.get("id")?,
        conversation_id: ConversationId::new(conversation_id),
        sender_id: row.get("sender_id")?,
        sender_name: row.get("sender_name")?,
        text: row.get("text")?,
        created_at,
    })
}
