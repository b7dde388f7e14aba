//! Supabase remote store for duet.
//!
//! History, inserts and pruning go through PostgREST (`/rest/v1/{table}`);
//! the live insert feed is a Realtime (Phoenix channel) websocket subscribed
//! to `postgres_changes` INSERTs filtered on the conversation.
//!
//! Every failure is classified into a [`RemoteError`] before it leaves this
//! crate. Row level security denials surface as
//! [`RemoteError::PermissionDenied`].

#![forbid(unsafe_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use duet_storage_traits::{ConversationId, InsertSubscription, Message, RemoteError, RemoteStore};

pub mod realtime;
pub mod rest;
pub mod row;

use self::rest::RestClient;

/// Default table holding chat messages
pub const DEFAULT_MESSAGES_TABLE: &str = "messages";

/// Connection settings for a Supabase project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupabaseConfig {
    /// Project API URL (e.g. `https://xyz.supabase.co`)
    pub url: String,
    /// Project anonymous API key
    pub anon_key: String,
    /// Signed-in user's JWT. The anon key is used as bearer when absent.
    pub access_token: Option<String>,
    /// Messages table name
    pub table: String,
}

impl SupabaseConfig {
    pub fn new(url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            anon_key: anon_key.into(),
            access_token: None,
            table: DEFAULT_MESSAGES_TABLE.to_string(),
        }
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// The adapter is usable only with an http(s) URL and a non-empty key.
    pub fn is_usable(&self) -> bool {
        let url = self.url.trim();
        (url.starts_with("http://") || url.starts_with("https://"))
            && !self.anon_key.trim().is_empty()
    }

    pub(crate) fn bearer_token(&self) -> &str {
        self.access_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .unwrap_or(&self.anon_key)
    }
}

/// [`RemoteStore`] backed by a Supabase project.
#[derive(Clone)]
pub struct SupabaseRemoteStore {
    config: SupabaseConfig,
    rest: RestClient,
}

impl SupabaseRemoteStore {
    /// Returns `None` when the configuration is not usable.
    pub fn new(config: SupabaseConfig) -> Option<Self> {
        if !config.is_usable() {
            return None;
        }
        Some(Self {
            rest: RestClient::new(config.clone()),
            config,
        })
    }

    pub fn config(&self) -> &SupabaseConfig {
        &self.config
    }
}

#[async_trait]
impl RemoteStore for SupabaseRemoteStore {
    async fn query(
        &self,
        conversation_id: &ConversationId,
        since: DateTime<Utc>,
    ) -> Result<Vec<Message>, RemoteError> {
        self.rest.select_since(conversation_id, since).await
    }

    async fn insert(&self, message: &Message) -> Result<(), RemoteError> {
        self.rest.insert(message).await
    }

    async fn delete_older_than(
        &self,
        conversation_id: &ConversationId,
        cutoff: DateTime<Utc>,
    ) -> Result<(), RemoteError> {
        self.rest.delete_before(conversation_id, cutoff).await
    }

    async fn subscribe_inserts(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<InsertSubscription, RemoteError> {
        realtime::subscribe(&self.config, conversation_id).await
    }
}
