use chrono::{DateTime, Utc};

#[derive(Clone, Debug, PartialEq)]
pub struct ChatState {
    pub rev: u64,
    pub phase: SessionPhase,
    pub current_conversation: Option<ConversationViewState>,
    pub unread: bool,
    pub surface: SurfaceState,
    pub busy: BusyState,
    pub toast: Option<String>,
}

impl ChatState {
    pub fn empty() -> Self {
        Self {
            rev: 0,
            phase: SessionPhase::Idle,
            current_conversation: None,
            unread: false,
            surface: SurfaceState::default(),
            busy: BusyState::idle(),
            toast: None,
        }
    }
}

/// Lifecycle of the open conversation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionPhase {
    /// No conversation open.
    Idle,
    /// Initial history load in progress, or the live feed is still connecting.
    Loading,
    /// History loaded and the live insert feed is running.
    Live,
    /// History loaded without a live feed (no remote, or the feed failed).
    LocalOnly,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ConversationViewState {
    pub conversation_id: String,
    pub messages: Vec<ChatMessage>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChatMessage {
    pub id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub is_mine: bool,
    pub delivery: MessageDeliveryState,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageDeliveryState {
    /// Shown optimistically, persistence not confirmed yet.
    Pending,
    /// Stored remotely.
    Sent,
    /// Stored in the local cache only.
    Cached,
}

/// Where a successful send ended up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    Remote,
    /// The remote refused the write on policy grounds; kept in the cache.
    LocalFallback,
    /// No remote configured.
    LocalOnly,
}

impl SendOutcome {
    pub fn delivery(self) -> MessageDeliveryState {
        match self {
            SendOutcome::Remote => MessageDeliveryState::Sent,
            SendOutcome::LocalFallback | SendOutcome::LocalOnly => MessageDeliveryState::Cached,
        }
    }
}

/// What the presentation layer reports about the chat surface.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SurfaceState {
    pub open: bool,
    pub focused: bool,
}

impl SurfaceState {
    /// The user is looking at the conversation.
    pub fn is_attentive(&self) -> bool {
        self.open && self.focused
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BusyState {
    pub sending: bool,
    pub loading_history: bool,
}

impl BusyState {
    pub fn idle() -> Self {
        Self {
            sending: false,
            loading_history: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attention_requires_open_and_focused() {
        let mut surface = SurfaceState::default();
        assert!(!surface.is_attentive());
        surface.open = true;
        assert!(!surface.is_attentive());
        surface.focused = true;
        assert!(surface.is_attentive());
    }

    #[test]
    fn local_outcomes_are_cached() {
        assert_eq!(SendOutcome::Remote.delivery(), MessageDeliveryState::Sent);
        assert_eq!(
            SendOutcome::LocalFallback.delivery(),
            MessageDeliveryState::Cached
        );
        assert_eq!(SendOutcome::LocalOnly.delivery(), MessageDeliveryState::Cached);
    }
}
