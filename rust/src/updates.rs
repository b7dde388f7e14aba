use duet_storage_traits::{ConversationId, Message, RemoteError};

use crate::state::{ChatState, SendOutcome};
use crate::ChatAction;

#[derive(Clone, Debug)]
pub enum ChatUpdate {
    FullState(ChatState),
    SendSucceeded {
        rev: u64,
        conversation_id: String,
        message_id: String,
        outcome: SendOutcome,
    },
    SendFailed {
        rev: u64,
        conversation_id: String,
        message_id: String,
        reason: String,
    },
    /// A message from the other party arrived while the user was not looking.
    IncomingMessage {
        rev: u64,
        conversation_id: String,
        message_id: String,
        sender_name: String,
        text: String,
    },
}

impl ChatUpdate {
    pub fn rev(&self) -> u64 {
        match self {
            ChatUpdate::FullState(s) => s.rev,
            ChatUpdate::SendSucceeded { rev, .. } => *rev,
            ChatUpdate::SendFailed { rev, .. } => *rev,
            ChatUpdate::IncomingMessage { rev, .. } => *rev,
        }
    }
}

#[derive(Debug)]
pub enum CoreMsg {
    Action(ChatAction),
    Internal(Box<InternalEvent>),
    Shutdown,
}

/// Results of async work, each tagged with the session token that spawned it.
#[derive(Debug)]
pub enum InternalEvent {
    // History load
    LocalHistoryLoaded {
        token: u64,
        messages: Vec<Message>,
    },
    RemoteHistoryLoaded {
        token: u64,
        result: Result<Vec<Message>, RemoteError>,
    },

    // Live feed
    LiveFeedStarted {
        token: u64,
    },
    LiveFeedFailed {
        token: u64,
        error: RemoteError,
    },
    LiveInsert {
        token: u64,
        message: Message,
    },
    LiveFeedEnded {
        token: u64,
    },

    // Send
    SendFinished {
        token: u64,
        conversation_id: ConversationId,
        message_id: String,
        result: Result<SendOutcome, String>,
    },
}

impl InternalEvent {
    pub fn token(&self) -> u64 {
        match self {
            InternalEvent::LocalHistoryLoaded { token, .. }
            | InternalEvent::RemoteHistoryLoaded { token, .. }
            | InternalEvent::LiveFeedStarted { token }
            | InternalEvent::LiveFeedFailed { token, .. }
            | InternalEvent::LiveInsert { token, .. }
            | InternalEvent::LiveFeedEnded { token }
            | InternalEvent::SendFinished { token, .. } => *token,
        }
    }
}
