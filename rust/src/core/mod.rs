pub(crate) mod config;
mod send;
mod session;

use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use duet_storage_traits::{ConversationId, LocalCache, RemoteStore};
use flume::Sender;

use crate::actions::ChatAction;
use crate::state::{
    BusyState, ChatMessage, ChatState, ConversationViewState, MessageDeliveryState, SessionPhase,
};
use crate::timeline::MessageTimeline;
use crate::updates::{ChatUpdate, CoreMsg, InternalEvent};
use crate::LocalUser;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FeedState {
    /// No remote configured.
    Disabled,
    Connecting,
    Live,
    /// Subscribe failed or the feed ended.
    Down,
}

struct Session {
    conversation_id: ConversationId,
    token: u64,
    // Fixed at open; refreshes reuse it.
    cutoff: DateTime<Utc>,
    timeline: MessageTimeline,
    // message_id -> delivery, for messages sent from this session.
    delivery: HashMap<String, MessageDeliveryState>,
    history_loaded: bool,
    history_in_flight: bool,
    feed: FeedState,
    live_task: Option<tokio::task::JoinHandle<()>>,
    alive: Arc<AtomicBool>,
}

pub struct AppCore {
    pub state: ChatState,
    rev: u64,

    update_sender: Sender<ChatUpdate>,
    core_sender: Sender<CoreMsg>,
    shared_state: Arc<RwLock<ChatState>>,

    me: LocalUser,
    cache: Arc<dyn LocalCache>,
    remote: Option<Arc<dyn RemoteStore>>,
    runtime: tokio::runtime::Runtime,

    session: Option<Session>,
    session_token: u64,
    // conversation -> message id of its unresolved send. Outlives sessions,
    // so reopening a conversation does not lift the guard.
    sends_in_flight: HashMap<ConversationId, String>,
}

impl AppCore {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        update_sender: Sender<ChatUpdate>,
        core_sender: Sender<CoreMsg>,
        shared_state: Arc<RwLock<ChatState>>,
        me: LocalUser,
        cache: Arc<dyn LocalCache>,
        remote: Option<Arc<dyn RemoteStore>>,
        runtime: tokio::runtime::Runtime,
    ) -> Self {
        tracing::info!(
            user = %me.id,
            cache = ?cache.backend(),
            persistent = cache.backend().is_persistent(),
            remote = remote.is_some(),
            "AppCore::new()"
        );
        let this = Self {
            state: ChatState::empty(),
            rev: 0,
            update_sender,
            core_sender,
            shared_state,
            me,
            cache,
            remote,
            runtime,
            session: None,
            session_token: 0,
            sends_in_flight: HashMap::new(),
        };
        // Ensure DuetApp.state() has an immediately-available snapshot.
        let snapshot = this.state.clone();
        this.commit_state_snapshot(&snapshot);
        this
    }

    fn next_rev(&mut self) -> u64 {
        self.rev += 1;
        self.state.rev = self.rev;
        self.rev
    }

    fn commit_state_snapshot(&self, snapshot: &ChatState) {
        match self.shared_state.write() {
            Ok(mut g) => *g = snapshot.clone(),
            Err(poison) => *poison.into_inner() = snapshot.clone(),
        }
    }

    fn emit_state(&mut self) {
        self.next_rev();
        let snapshot = self.state.clone();
        self.commit_state_snapshot(&snapshot);
        let _ = self.update_sender.send(ChatUpdate::FullState(snapshot));
    }

    /// Emit a side-effect update. The snapshot rev follows the update stream.
    fn emit_side_effect(&mut self, build: impl FnOnce(u64) -> ChatUpdate) {
        let rev = self.next_rev();
        let snapshot = self.state.clone();
        self.commit_state_snapshot(&snapshot);
        let _ = self.update_sender.send(build(rev));
    }

    fn current_token(&self) -> Option<u64> {
        self.session.as_ref().map(|s| s.token)
    }

    /// Rebuild the derived parts of the snapshot (phase, visible messages,
    /// busy flags) from the session. Does not emit.
    fn sync_session_state(&mut self) {
        let Some(sess) = self.session.as_ref() else {
            self.state.phase = SessionPhase::Idle;
            self.state.current_conversation = None;
            self.state.busy = BusyState::idle();
            return;
        };

        self.state.phase = if !sess.history_loaded || sess.feed == FeedState::Connecting {
            SessionPhase::Loading
        } else if sess.feed == FeedState::Live {
            SessionPhase::Live
        } else {
            SessionPhase::LocalOnly
        };

        let messages = sess
            .timeline
            .messages()
            .iter()
            .map(|m| ChatMessage {
                id: m.id.clone(),
                sender_id: m.sender_id.clone(),
                sender_name: m.sender_name.clone(),
                text: m.text.clone(),
                created_at: m.created_at,
                is_mine: m.is_from(&self.me.id),
                delivery: sess
                    .delivery
                    .get(&m.id)
                    .copied()
                    .unwrap_or(MessageDeliveryState::Sent),
            })
            .collect();
        self.state.current_conversation = Some(ConversationViewState {
            conversation_id: sess.conversation_id.to_string(),
            messages,
        });
        self.state.busy = BusyState {
            sending: self.sends_in_flight.contains_key(&sess.conversation_id),
            loading_history: sess.history_in_flight,
        };
    }

    fn refresh_and_emit(&mut self) {
        self.sync_session_state();
        self.emit_state();
    }

    pub fn handle_message(&mut self, msg: CoreMsg) {
        match msg {
            CoreMsg::Action(ref action) => {
                // Never log `?action` directly: it carries message text.
                tracing::info!(action = action.tag(), "dispatch");
                self.handle_action(action.clone());
            }
            CoreMsg::Internal(internal) => self.handle_internal(*internal),
            CoreMsg::Shutdown => self.close_conversation(),
        }
    }

    fn handle_internal(&mut self, internal: InternalEvent) {
        // The send guard is released even when the session that sent is gone.
        // `guard_released` is true when the open conversation was the sender.
        let guard_released = match &internal {
            InternalEvent::SendFinished {
                conversation_id,
                message_id,
                ..
            } => self.release_send_guard(conversation_id, message_id),
            _ => false,
        };
        // Ignore stale results (conversation closed or switched meanwhile).
        if Some(internal.token()) != self.current_token() {
            tracing::debug!(token = internal.token(), "dropping stale internal event");
            if guard_released {
                self.refresh_and_emit();
            }
            return;
        }
        match internal {
            InternalEvent::LocalHistoryLoaded { messages, .. } => {
                self.on_local_history_loaded(messages)
            }
            InternalEvent::RemoteHistoryLoaded { result, .. } => {
                self.on_remote_history_loaded(result)
            }
            InternalEvent::LiveFeedStarted { .. } => self.on_live_feed_started(),
            InternalEvent::LiveFeedFailed { error, .. } => self.on_live_feed_down(Some(error)),
            InternalEvent::LiveFeedEnded { .. } => self.on_live_feed_down(None),
            InternalEvent::LiveInsert { message, .. } => self.on_live_insert(message),
            InternalEvent::SendFinished {
                message_id, result, ..
            } => self.on_send_finished(message_id, result),
        }
    }

    fn handle_action(&mut self, action: ChatAction) {
        match action {
            ChatAction::OpenConversation { conversation_id } => {
                self.open_conversation(conversation_id)
            }
            ChatAction::CloseConversation => self.close_conversation(),
            ChatAction::RefreshConversation => self.refresh_conversation(),
            ChatAction::SendMessage { text } => self.send_message(text),
            ChatAction::SurfaceOpened => self.update_surface(|s| {
                s.open = true;
                s.focused = true;
            }),
            ChatAction::SurfaceClosed => self.update_surface(|s| {
                s.open = false;
                s.focused = false;
            }),
            ChatAction::SurfaceFocused => self.update_surface(|s| s.focused = true),
            ChatAction::SurfaceBlurred => self.update_surface(|s| s.focused = false),
            ChatAction::ClearToast => {
                if self.state.toast.take().is_some() {
                    self.emit_state();
                }
            }
        }
    }

    fn update_surface(&mut self, f: impl FnOnce(&mut crate::state::SurfaceState)) {
        let mut next = self.state.surface;
        f(&mut next);
        let clears_unread = next.is_attentive() && self.state.unread;
        if next == self.state.surface && !clears_unread {
            return;
        }
        self.state.surface = next;
        if clears_unread {
            self.state.unread = false;
        }
        self.emit_state();
    }
}

impl Drop for AppCore {
    fn drop(&mut self) {
        if let Some(sess) = self.session.as_mut() {
            session::stop_live_feed(sess);
        }
    }
}
