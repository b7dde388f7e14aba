//! PostgREST access to the messages table.

use chrono::{DateTime, Utc};
use duet_storage_traits::{ConversationId, Message, RemoteError};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::SupabaseConfig;
use crate::row::{MessageRow, format_timestamp};

/// Postgres `insufficient_privilege`, returned for row level security denials.
const INSUFFICIENT_PRIVILEGE: &str = "42501";

#[derive(Debug, Default, Deserialize)]
struct PostgrestError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Map a non-success response into a [`RemoteError`].
pub fn classify_response(status: u16, body: &str) -> RemoteError {
    let parsed: PostgrestError = serde_json::from_str(body).unwrap_or_default();
    let message = parsed
        .message
        .clone()
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| body.to_string());

    if status == 401 || status == 403 || parsed.code.as_deref() == Some(INSUFFICIENT_PRIVILEGE) {
        return RemoteError::PermissionDenied(message);
    }
    RemoteError::Status { status, message }
}

/// Map a transport-level failure into a [`RemoteError`].
pub fn classify_transport(e: reqwest::Error) -> RemoteError {
    if e.is_decode() {
        RemoteError::Decode(e.to_string())
    } else {
        RemoteError::Unavailable(e.to_string())
    }
}

#[derive(Clone)]
pub(crate) struct RestClient {
    http_client: reqwest::Client,
    config: SupabaseConfig,
}

impl RestClient {
    pub(crate) fn new(config: SupabaseConfig) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            config,
        }
    }

    /// Build the REST API URL for the messages table.
    pub(crate) fn rest_url(&self) -> String {
        format!(
            "{}/rest/v1/{}",
            self.config.url.trim_end_matches('/'),
            self.config.table
        )
    }

    fn request(&self, method: reqwest::Method) -> reqwest::RequestBuilder {
        self.http_client
            .request(method, self.rest_url())
            .header("apikey", &self.config.anon_key)
            .header(
                "Authorization",
                format!("Bearer {}", self.config.bearer_token()),
            )
    }

    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, RemoteError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let err = classify_response(status.as_u16(), &body);
        warn!(status = status.as_u16(), error = %err, "Supabase request failed");
        Err(err)
    }

    pub(crate) async fn select_since(
        &self,
        conversation_id: &ConversationId,
        since: DateTime<Utc>,
    ) -> Result<Vec<Message>, RemoteError> {
        let response = self
            .request(reqwest::Method::GET)
            .query(&[
                ("select", "*".to_string()),
                ("couple_id", format!("eq.{conversation_id}")),
                ("created_at", format!("gte.{}", format_timestamp(since))),
                ("order", "created_at.asc".to_string()),
            ])
            .send()
            .await
            .map_err(classify_transport)?;
        let response = Self::check_response(response).await?;
        let rows: Vec<MessageRow> = response.json().await.map_err(classify_transport)?;
        debug!(conversation = %conversation_id, rows = rows.len(), "Fetched remote history");
        Ok(rows.into_iter().map(Message::from).collect())
    }

    pub(crate) async fn insert(&self, message: &Message) -> Result<(), RemoteError> {
        let response = self
            .request(reqwest::Method::POST)
            .header("Prefer", "return=minimal")
            .json(&MessageRow::from(message))
            .send()
            .await
            .map_err(classify_transport)?;
        Self::check_response(response).await?;
        debug!(message_id = %message.id, "Message inserted into Supabase");
        Ok(())
    }

    pub(crate) async fn delete_before(
        &self,
        conversation_id: &ConversationId,
        cutoff: DateTime<Utc>,
    ) -> Result<(), RemoteError> {
        let response = self
            .request(reqwest::Method::DELETE)
            .query(&[
                ("couple_id", format!("eq.{conversation_id}")),
                ("created_at", format!("lt.{}", format_timestamp(cutoff))),
            ])
            .send()
            .await
            .map_err(classify_transport)?;
        Self::check_response(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rls_violation_is_permission_denied() {
        let body = r#"{"code":"42501","details":null,"hint":null,"message":"new row violates row-level security policy for table \"messages\""}"#;
        let err = classify_response(400, body);
        assert!(err.is_permission_denied());
        assert!(err.to_string().contains("row-level security"));
    }

    #[test]
    fn auth_statuses_are_permission_denied() {
        assert!(classify_response(401, "").is_permission_denied());
        assert!(classify_response(403, "forbidden").is_permission_denied());
    }

    #[test]
    fn other_failures_keep_status() {
        let err = classify_response(500, r#"{"code":"XX000","message":"internal"}"#);
        assert_eq!(
            err,
            RemoteError::Status {
                status: 500,
                message: "internal".to_string()
            }
        );

        let err = classify_response(409, "plain text");
        assert_eq!(
            err,
            RemoteError::Status {
                status: 409,
                message: "plain text".to_string()
            }
        );
    }

    #[test]
    fn rest_url_uses_table() {
        let client = RestClient::new(SupabaseConfig::new("https://xyz.supabase.co/", "anon"));
        assert_eq!(client.rest_url(), "https://xyz.supabase.co/rest/v1/messages");
    }
}
