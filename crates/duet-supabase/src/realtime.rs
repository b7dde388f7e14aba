//! Supabase Realtime (Phoenix channel) insert feed.

use duet_storage_traits::{ConversationId, InsertSubscription, Message, RemoteError};
use futures_util::{SinkExt, StreamExt};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::oneshot;
use tokio::time::{Duration, interval};
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tracing::{debug, info, warn};

use crate::SupabaseConfig;
use crate::row::MessageRow;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// A Phoenix channel frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhoenixFrame {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default, rename = "ref")]
    pub reference: Option<String>,
}

impl PhoenixFrame {
    fn to_text(&self) -> String {
        // Serializing a struct of strings and a JSON value cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// What an incoming frame means for the feed.
#[derive(Debug, PartialEq)]
pub enum FeedEvent {
    Insert(Message),
    JoinRejected(String),
    Closed,
    Ignored,
}

/// `ws(s)://…/realtime/v1/websocket?apikey=…&vsn=1.0.0` for the project URL.
pub fn realtime_url(config: &SupabaseConfig) -> Result<Url, RemoteError> {
    let mut url = Url::parse(config.url.trim_end_matches('/'))
        .map_err(|e| RemoteError::Unavailable(format!("invalid project url: {e}")))?;
    let scheme = match url.scheme() {
        "https" => "wss",
        "http" => "ws",
        other => {
            return Err(RemoteError::Unavailable(format!(
                "unsupported url scheme: {other}"
            )));
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| RemoteError::Unavailable("cannot switch to websocket scheme".into()))?;
    let base_path = url.path().trim_end_matches('/').to_string();
    url.set_path(&format!("{base_path}/realtime/v1/websocket"));
    url.query_pairs_mut()
        .clear()
        .append_pair("apikey", &config.anon_key)
        .append_pair("vsn", "1.0.0");
    Ok(url)
}

/// Channel topic for a conversation.
pub fn topic(conversation_id: &ConversationId) -> String {
    format!("realtime:{}", conversation_id.channel_name())
}

pub fn join_frame(config: &SupabaseConfig, conversation_id: &ConversationId) -> PhoenixFrame {
    PhoenixFrame {
        topic: topic(conversation_id),
        event: "phx_join".to_string(),
        payload: json!({
            "config": {
                "broadcast": { "self": false },
                "presence": { "key": "" },
                "postgres_changes": [{
                    "event": "INSERT",
                    "schema": "public",
                    "table": config.table,
                    "filter": format!("couple_id=eq.{conversation_id}"),
                }],
            },
            "access_token": config.bearer_token(),
        }),
        reference: Some("1".to_string()),
    }
}

pub fn leave_frame(conversation_id: &ConversationId, reference: u64) -> PhoenixFrame {
    PhoenixFrame {
        topic: topic(conversation_id),
        event: "phx_leave".to_string(),
        payload: json!({}),
        reference: Some(reference.to_string()),
    }
}

pub fn heartbeat_frame(reference: u64) -> PhoenixFrame {
    PhoenixFrame {
        topic: "phoenix".to_string(),
        event: "heartbeat".to_string(),
        payload: json!({}),
        reference: Some(reference.to_string()),
    }
}

/// Interpret a text frame received on the socket.
pub fn parse_frame(text: &str, conversation_id: &ConversationId) -> FeedEvent {
    let frame: PhoenixFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(error = %e, "Failed to parse realtime frame");
            return FeedEvent::Ignored;
        }
    };
    if frame.topic != topic(conversation_id) {
        return FeedEvent::Ignored;
    }
    match frame.event.as_str() {
        "postgres_changes" => {
            let data = &frame.payload["data"];
            if data["type"] != "INSERT" {
                return FeedEvent::Ignored;
            }
            match serde_json::from_value::<MessageRow>(data["record"].clone()) {
                Ok(row) if row.couple_id == conversation_id.as_str() => {
                    FeedEvent::Insert(Message::from(row))
                }
                Ok(_) => FeedEvent::Ignored,
                Err(e) => {
                    warn!(error = %e, "Failed to decode realtime record");
                    FeedEvent::Ignored
                }
            }
        }
        "phx_reply" if frame.payload["status"] == "error" => {
            FeedEvent::JoinRejected(frame.payload["response"].to_string())
        }
        "phx_close" | "phx_error" => FeedEvent::Closed,
        _ => FeedEvent::Ignored,
    }
}

/// Connect, join the conversation topic and pump insert events into an
/// [`InsertSubscription`] until it is dropped or the socket closes.
pub(crate) async fn subscribe(
    config: &SupabaseConfig,
    conversation_id: &ConversationId,
) -> Result<InsertSubscription, RemoteError> {
    let url = realtime_url(config)?;
    let (ws_stream, _) = connect_async(url.as_str())
        .await
        .map_err(|e| RemoteError::Unavailable(e.to_string()))?;
    let (mut write, mut read) = ws_stream.split();

    write
        .send(WsMessage::Text(join_frame(config, conversation_id).to_text().into()))
        .await
        .map_err(|e| RemoteError::Unavailable(e.to_string()))?;
    info!(topic = %topic(conversation_id), "Joined realtime channel");

    let (event_tx, event_rx) = flume::unbounded();
    let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
    let conversation = conversation_id.clone();

    tokio::spawn(async move {
        let mut heartbeat = interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut next_ref: u64 = 2;

        loop {
            tokio::select! {
                _ = &mut shutdown_rx => {
                    let leave = leave_frame(&conversation, next_ref);
                    let _ = write.send(WsMessage::Text(leave.to_text().into())).await;
                    let _ = write.close().await;
                    debug!(topic = %topic(&conversation), "Left realtime channel");
                    break;
                }
                _ = heartbeat.tick() => {
                    let frame = heartbeat_frame(next_ref);
                    next_ref += 1;
                    if write.send(WsMessage::Text(frame.to_text().into())).await.is_err() {
                        warn!("Realtime heartbeat failed");
                        break;
                    }
                }
                incoming = read.next() => match incoming {
                    Some(Ok(WsMessage::Text(text))) => match parse_frame(text.as_str(), &conversation) {
                        FeedEvent::Insert(message) => {
                            if event_tx.send(message).is_err() {
                                break;
                            }
                        }
                        FeedEvent::JoinRejected(reason) => {
                            warn!(%reason, "Realtime join rejected");
                            break;
                        }
                        FeedEvent::Closed => {
                            info!("Realtime channel closed by server");
                            break;
                        }
                        FeedEvent::Ignored => {}
                    },
                    Some(Ok(WsMessage::Ping(data))) => {
                        let _ = write.send(WsMessage::Pong(data)).await;
                    }
                    Some(Ok(WsMessage::Close(_))) | None => {
                        info!("Realtime connection closed");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "Realtime socket error");
                        break;
                    }
                },
            }
        }
    });

    Ok(InsertSubscription::new(
        conversation_id.clone(),
        event_rx,
        move || {
            let _ = shutdown_tx.send(());
        },
    ))
}
