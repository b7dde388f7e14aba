use std::cmp::Ordering;
use std::collections::HashSet;

use chrono::{DateTime, Utc};
use duet_storage_traits::{ConversationId, Message};

/// Result of offering one message to a [`MessageTimeline`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// New entry, sorted at the end.
    Appended,
    /// New entry that sorted before the previous last entry.
    Reordered,
    /// An entry with this id already exists; the existing copy is kept.
    Duplicate,
    /// The message belongs to another conversation and was rejected.
    Foreign,
}

impl MergeOutcome {
    pub fn is_new(self) -> bool {
        matches!(self, Self::Appended | Self::Reordered)
    }
}

/// Deduplicated, time-ordered message list for one conversation.
///
/// `id` is the only merge key: the first copy of an id wins, whatever the
/// source. Entries are kept sorted by `(created_at, id)`.
#[derive(Debug, Clone)]
pub struct MessageTimeline {
    conversation_id: ConversationId,
    messages: Vec<Message>,
    ids: HashSet<String>,
}

impl MessageTimeline {
    pub fn new(conversation_id: ConversationId) -> Self {
        Self {
            conversation_id,
            messages: Vec::new(),
            ids: HashSet::new(),
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Merge a loaded batch (cache snapshot or remote query result).
    ///
    /// Entries older than `cutoff` are dropped. Returns how many entries were
    /// added.
    pub fn merge_snapshot(
        &mut self,
        batch: impl IntoIterator<Item = Message>,
        cutoff: DateTime<Utc>,
    ) -> usize {
        let mut added = 0;
        for message in batch {
            if !message.is_retained(cutoff) {
                continue;
            }
            if self.admit(&message).is_some() {
                continue;
            }
            self.ids.insert(message.id.clone());
            self.messages.push(message);
            added += 1;
        }
        if added > 0 {
            self.messages.sort_by(Message::display_order_cmp);
        }
        added
    }

    /// Merge a single message (live event or optimistic send). Not filtered by
    /// the retention window.
    pub fn insert(&mut self, message: Message) -> MergeOutcome {
        if let Some(rejected) = self.admit(&message) {
            return rejected;
        }
        let sorts_before_last = self
            .messages
            .last()
            .is_some_and(|last| message.display_order_cmp(last) == Ordering::Less);
        self.ids.insert(message.id.clone());
        self.messages.push(message);
        if sorts_before_last {
            self.messages.sort_by(Message::display_order_cmp);
            MergeOutcome::Reordered
        } else {
            MergeOutcome::Appended
        }
    }

    /// Remove an entry by id (optimistic rollback).
    pub fn remove(&mut self, id: &str) -> Option<Message> {
        if !self.ids.remove(id) {
            return None;
        }
        let idx = self.messages.iter().position(|m| m.id == id)?;
        Some(self.messages.remove(idx))
    }

    fn admit(&self, message: &Message) -> Option<MergeOutcome> {
        if message.conversation_id != self.conversation_id {
            return Some(MergeOutcome::Foreign);
        }
        if self.ids.contains(&message.id) {
            return Some(MergeOutcome::Duplicate);
        }
        None
    }
}
