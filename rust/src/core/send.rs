use duet_storage_traits::{ConversationId, LocalCache, Message, RemoteStore};

use super::AppCore;
use crate::state::{MessageDeliveryState, SendOutcome};
use crate::updates::{ChatUpdate, CoreMsg, InternalEvent};

const SEND_FAILED_TOAST: &str = "Message could not be sent";

/// Persist an outgoing message: remote first, the cache as durability
/// fallback. A remote success is reported before the cache copy is written.
async fn persist(
    remote: Option<&dyn RemoteStore>,
    cache: &dyn LocalCache,
    message: &Message,
) -> Result<SendOutcome, String> {
    let Some(remote) = remote else {
        return cache
            .append_message(message)
            .await
            .map(|()| SendOutcome::LocalOnly)
            .map_err(|e| e.to_string());
    };

    match remote.insert(message).await {
        Ok(()) => Ok(SendOutcome::Remote),
        Err(e) if e.is_permission_denied() => {
            tracing::info!(%e, message_id = %message.id, "remote rejected write, keeping message locally");
            cache
                .append_message(message)
                .await
                .map(|()| SendOutcome::LocalFallback)
                .map_err(|ce| format!("{e}; local fallback failed: {ce}"))
        }
        Err(e) => Err(e.to_string()),
    }
}

impl AppCore {
    /// Drop the conversation's guard if it belongs to `message_id`. Returns
    /// whether the open conversation's busy flag changed.
    pub(super) fn release_send_guard(
        &mut self,
        conversation_id: &ConversationId,
        message_id: &str,
    ) -> bool {
        if self.sends_in_flight.get(conversation_id).map(String::as_str) != Some(message_id) {
            return false;
        }
        self.sends_in_flight.remove(conversation_id);
        self.session
            .as_ref()
            .is_some_and(|sess| &sess.conversation_id == conversation_id)
    }

    pub(super) fn send_message(&mut self, text: String) {
        let text = text.trim().to_string();
        if text.is_empty() {
            tracing::debug!("send ignored: empty text");
            return;
        }
        let Some(sess) = self.session.as_mut() else {
            tracing::debug!("send ignored: no conversation open");
            return;
        };
        if let Some(in_flight) = self.sends_in_flight.get(&sess.conversation_id) {
            tracing::debug!(%in_flight, "send ignored: previous send in flight");
            return;
        }

        let message = Message::new(
            sess.conversation_id.clone(),
            self.me.id.clone(),
            self.me.name.clone(),
            text,
        );
        let message_id = message.id.clone();
        let conversation_id = sess.conversation_id.clone();
        let token = sess.token;

        // Optimistic UI: show the message right away.
        sess.timeline.insert(message.clone());
        sess.delivery
            .insert(message_id.clone(), MessageDeliveryState::Pending);
        self.sends_in_flight
            .insert(conversation_id.clone(), message_id.clone());
        self.refresh_and_emit();

        let remote = self.remote.clone();
        let cache = self.cache.clone();
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            let result = persist(remote.as_deref(), cache.as_ref(), &message).await;
            let stored_remotely = matches!(result, Ok(SendOutcome::Remote));
            let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::SendFinished {
                token,
                conversation_id,
                message_id,
                result,
            })));
            if stored_remotely {
                if let Err(e) = cache.append_message(&message).await {
                    tracing::warn!(%e, message_id = %message.id, "cache append after remote insert failed");
                }
            }
        });
    }

    pub(super) fn on_send_finished(
        &mut self,
        message_id: String,
        result: Result<SendOutcome, String>,
    ) {
        let Some(sess) = self.session.as_mut() else {
            return;
        };
        let conversation_id = sess.conversation_id.to_string();

        match result {
            Ok(outcome) => {
                tracing::info!(%message_id, ?outcome, "message sent");
                sess.delivery.insert(message_id.clone(), outcome.delivery());
                self.refresh_and_emit();
                self.emit_side_effect(|rev| ChatUpdate::SendSucceeded {
                    rev,
                    conversation_id,
                    message_id,
                    outcome,
                });
            }
            Err(reason) => {
                tracing::warn!(%message_id, %reason, "send failed, rolling back");
                sess.timeline.remove(&message_id);
                sess.delivery.remove(&message_id);
                self.state.toast = Some(SEND_FAILED_TOAST.to_string());
                self.refresh_and_emit();
                self.emit_side_effect(|rev| ChatUpdate::SendFailed {
                    rev,
                    conversation_id,
                    message_id,
                    reason,
                });
            }
        }
    }
}
