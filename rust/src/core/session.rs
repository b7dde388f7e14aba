use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use duet_storage_traits::{retention_cutoff, ConversationId, Message, RemoteError};

use super::{AppCore, FeedState, Session};
use crate::timeline::MessageTimeline;
use crate::updates::{ChatUpdate, CoreMsg, InternalEvent};

/// Abort the forwarding task. Dropping its future drops the subscription,
/// which releases the remote channel.
pub(super) fn stop_live_feed(sess: &mut Session) {
    sess.alive.store(false, Ordering::SeqCst);
    if let Some(task) = sess.live_task.take() {
        task.abort();
    }
}

impl AppCore {
    pub(super) fn open_conversation(&mut self, conversation_id: String) {
        let conversation_id = conversation_id.trim().to_string();
        if conversation_id.is_empty() {
            tracing::debug!("open ignored: empty conversation id");
            return;
        }
        let conversation_id = ConversationId::new(conversation_id);
        if let Some(sess) = self.session.as_ref() {
            if sess.conversation_id == conversation_id {
                tracing::debug!(conversation = %conversation_id, "already open");
                return;
            }
        }
        self.teardown_session();

        self.session_token = self.session_token.wrapping_add(1);
        let token = self.session_token;
        let alive = Arc::new(AtomicBool::new(true));
        tracing::info!(conversation = %conversation_id, token, "open conversation");

        self.session = Some(Session {
            timeline: MessageTimeline::new(conversation_id.clone()),
            conversation_id,
            token,
            cutoff: retention_cutoff(Utc::now()),
            delivery: HashMap::new(),
            history_loaded: false,
            history_in_flight: false,
            feed: if self.remote.is_some() {
                FeedState::Connecting
            } else {
                FeedState::Disabled
            },
            live_task: None,
            alive,
        });
        self.state.unread = false;

        self.start_live_feed();
        self.start_history_load();
        self.refresh_and_emit();
    }

    pub(super) fn close_conversation(&mut self) {
        if self.session.is_none() {
            return;
        }
        self.teardown_session();
        self.state.unread = false;
        self.refresh_and_emit();
    }

    pub(super) fn refresh_conversation(&mut self) {
        let Some(sess) = self.session.as_ref() else {
            tracing::debug!("refresh ignored: no conversation open");
            return;
        };
        if sess.history_in_flight {
            tracing::debug!(conversation = %sess.conversation_id, "refresh ignored: load in flight");
            return;
        }
        self.start_history_load();
        self.refresh_and_emit();
    }

    fn teardown_session(&mut self) {
        if let Some(mut sess) = self.session.take() {
            tracing::info!(conversation = %sess.conversation_id, token = sess.token, "close conversation");
            stop_live_feed(&mut sess);
        }
    }

    /// Local load, then prune of both tiers, then the remote query. Each
    /// step reports back through the actor.
    fn start_history_load(&mut self) {
        let Some(sess) = self.session.as_mut() else {
            return;
        };
        sess.history_in_flight = true;

        let token = sess.token;
        let cutoff = sess.cutoff;
        let conversation_id = sess.conversation_id.clone();
        let cache = self.cache.clone();
        let remote = self.remote.clone();
        let tx = self.core_sender.clone();

        self.runtime.spawn(async move {
            let messages = cache.load_messages(&conversation_id).await;
            let _ = tx.send(CoreMsg::Internal(Box::new(
                InternalEvent::LocalHistoryLoaded { token, messages },
            )));

            cache.prune_older_than(&conversation_id, cutoff).await;

            let Some(remote) = remote else {
                return;
            };
            if let Err(e) = remote.delete_older_than(&conversation_id, cutoff).await {
                tracing::warn!(%e, conversation = %conversation_id, "remote prune failed");
            }
            let result = remote.query(&conversation_id, cutoff).await;
            let _ = tx.send(CoreMsg::Internal(Box::new(
                InternalEvent::RemoteHistoryLoaded { token, result },
            )));
        });
    }

    fn start_live_feed(&mut self) {
        let Some(remote) = self.remote.clone() else {
            return;
        };
        let Some(sess) = self.session.as_mut() else {
            return;
        };
        let token = sess.token;
        let alive = sess.alive.clone();
        let conversation_id = sess.conversation_id.clone();
        let tx = self.core_sender.clone();

        let task = self.runtime.spawn(async move {
            let post = |event: InternalEvent| {
                let _ = tx.send(CoreMsg::Internal(Box::new(event)));
            };
            let mut subscription = match remote.subscribe_inserts(&conversation_id).await {
                Ok(sub) => sub,
                Err(error) => {
                    post(InternalEvent::LiveFeedFailed { token, error });
                    return;
                }
            };
            tracing::debug!(conversation = %subscription.conversation_id(), "subscribed to inserts");
            post(InternalEvent::LiveFeedStarted { token });

            while let Some(message) = subscription.next().await {
                if !alive.load(Ordering::SeqCst) {
                    return;
                }
                post(InternalEvent::LiveInsert { token, message });
            }
            post(InternalEvent::LiveFeedEnded { token });
        });
        sess.live_task = Some(task);
    }

    pub(super) fn on_local_history_loaded(&mut self, messages: Vec<Message>) {
        let remote_configured = self.remote.is_some();
        let Some(sess) = self.session.as_mut() else {
            return;
        };
        let added = sess.timeline.merge_snapshot(messages, sess.cutoff);
        tracing::debug!(conversation = %sess.conversation_id, added, "merged local history");
        sess.history_loaded = true;
        if !remote_configured {
            sess.history_in_flight = false;
        }
        self.refresh_and_emit();
    }

    pub(super) fn on_remote_history_loaded(&mut self, result: Result<Vec<Message>, RemoteError>) {
        let Some(sess) = self.session.as_mut() else {
            return;
        };
        sess.history_in_flight = false;
        match result {
            Ok(messages) => {
                let added = sess.timeline.merge_snapshot(messages, sess.cutoff);
                tracing::debug!(conversation = %sess.conversation_id, added, "merged remote history");
            }
            Err(e) => {
                // Keep the local-only view.
                tracing::warn!(%e, conversation = %sess.conversation_id, "remote history query failed");
            }
        }
        self.refresh_and_emit();
    }

    pub(super) fn on_live_feed_started(&mut self) {
        let Some(sess) = self.session.as_mut() else {
            return;
        };
        tracing::info!(conversation = %sess.conversation_id, "live feed started");
        sess.feed = FeedState::Live;
        self.refresh_and_emit();
    }

    pub(super) fn on_live_feed_down(&mut self, error: Option<RemoteError>) {
        let Some(sess) = self.session.as_mut() else {
            return;
        };
        match error {
            Some(e) => tracing::warn!(%e, conversation = %sess.conversation_id, "live feed unavailable"),
            None => tracing::info!(conversation = %sess.conversation_id, "live feed ended"),
        }
        sess.feed = FeedState::Down;
        sess.live_task = None;
        self.refresh_and_emit();
    }

    pub(super) fn on_live_insert(&mut self, message: Message) {
        let attentive = self.state.surface.is_attentive();
        let from_partner = !message.is_from(&self.me.id);
        let Some(sess) = self.session.as_mut() else {
            return;
        };
        let message_id = message.id.clone();
        let sender_name = message.sender_name.clone();
        let text = message.text.clone();

        let outcome = sess.timeline.insert(message);
        tracing::debug!(message_id = %message_id, ?outcome, "live insert");
        if !outcome.is_new() {
            return;
        }
        let conversation_id = sess.conversation_id.to_string();

        let notify = from_partner && !attentive;
        if notify {
            self.state.unread = true;
        }
        self.refresh_and_emit();
        if notify {
            self.emit_side_effect(|rev| ChatUpdate::IncomingMessage {
                rev,
                conversation_id,
                message_id,
                sender_name,
                text,
            });
        }
    }
}
