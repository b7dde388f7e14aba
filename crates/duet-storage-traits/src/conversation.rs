//! Conversation identifier

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifies a two-party conversation (one per couple).
///
/// The remote store calls this the couple id; the core treats it as an opaque
/// partition key for both storage tiers.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    /// Create a conversation id from any string-like value
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Channel name used for the live insert feed of this conversation
    pub fn channel_name(&self) -> String {
        format!("chat:{}", self.0)
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConversationId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ConversationId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for ConversationId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_name_is_scoped_to_conversation() {
        let id = ConversationId::new("c1");
        assert_eq!(id.channel_name(), "chat:c1");
        assert_eq!(id.to_string(), "c1");
    }
}
