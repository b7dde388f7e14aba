//! Remote store module
//!
//! The remote store is an optional hosted database with a realtime insert
//! feed. Adapters classify every failure at their boundary into a
//! [`RemoteError`]; the core never sees raw transport errors.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{ConversationId, Message};

/// Error type for remote store operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    /// The remote refused the operation because of access-control rules
    /// (row level security, missing grants, expired credentials).
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    /// The remote could not be reached (connect, TLS, timeout, socket closed)
    #[error("Remote unavailable: {0}")]
    Unavailable(String),
    /// The remote answered with a non-success status for another reason
    #[error("Remote error: {status} - {message}")]
    Status {
        /// Status code returned by the remote
        status: u16,
        /// Response body or error description
        message: String,
    },
    /// The remote answered with a payload that could not be decoded
    #[error("Invalid remote payload: {0}")]
    Decode(String),
}

impl RemoteError {
    /// Whether this is a policy rejection rather than a transport or
    /// availability fault. Sends branch on this distinction.
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Self::PermissionDenied(_))
    }
}

/// Storage interface for the hosted realtime database
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Historical messages of the conversation with `created_at >= since`.
    /// Order is not guaranteed.
    async fn query(
        &self,
        conversation_id: &ConversationId,
        since: DateTime<Utc>,
    ) -> Result<Vec<Message>, RemoteError>;

    /// Persist a message.
    async fn insert(&self, message: &Message) -> Result<(), RemoteError>;

    /// Best-effort remote pruning of messages with `created_at < cutoff`.
    async fn delete_older_than(
        &self,
        conversation_id: &ConversationId,
        cutoff: DateTime<Utc>,
    ) -> Result<(), RemoteError>;

    /// Register interest in insert events of the conversation's channel.
    ///
    /// Delivery is at-least-once, may contain duplicates, may be out of order
    /// and may stop silently when connectivity is lost.
    async fn subscribe_inserts(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<InsertSubscription, RemoteError>;
}

type UnsubscribeFn = Box<dyn FnOnce() + Send + 'static>;

/// Handle to a live insert feed.
///
/// Dropping the handle unsubscribes; no further events are yielded after
/// [`InsertSubscription::unsubscribe`] or drop.
pub struct InsertSubscription {
    conversation_id: ConversationId,
    events: flume::Receiver<Message>,
    on_unsubscribe: Option<UnsubscribeFn>,
}

impl InsertSubscription {
    /// Wrap a receiver of insert events and the adapter's teardown hook.
    pub fn new(
        conversation_id: ConversationId,
        events: flume::Receiver<Message>,
        on_unsubscribe: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            conversation_id,
            events,
            on_unsubscribe: Some(Box::new(on_unsubscribe)),
        }
    }

    /// The conversation this feed is scoped to
    pub fn conversation_id(&self) -> &ConversationId {
        &self.conversation_id
    }

    /// Wait for the next insert event. `None` once the feed has ended.
    pub async fn next(&mut self) -> Option<Message> {
        if self.on_unsubscribe.is_none() {
            return None;
        }
        self.events.recv_async().await.ok()
    }

    /// Tear down the feed.
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(hook) = self.on_unsubscribe.take() {
            hook();
        }
    }
}

impl Drop for InsertSubscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for InsertSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InsertSubscription")
            .field("conversation_id", &self.conversation_id)
            .field("active", &self.on_unsubscribe.is_some())
            .finish()
    }
}
