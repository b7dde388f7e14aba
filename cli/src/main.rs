use std::collections::HashSet;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use duet_core::{
    ChatAction, ChatMessage, ChatReconciler, ChatState, ChatUpdate, DuetApp, LocalUser,
    SessionPhase,
};
use serde_json::json;

#[derive(Debug, Parser)]
#[command(name = "duet")]
#[command(about = "Two-party chat sync client for testing and scripting")]
struct Cli {
    /// Data directory (config, cache database and log live here)
    #[arg(long, default_value = ".duet", env = "DUET_DATA_DIR")]
    data_dir: PathBuf,

    /// Local user id
    #[arg(long, env = "DUET_USER_ID")]
    user_id: Option<String>,

    /// Display name sent with messages (defaults to the user id)
    #[arg(long, env = "DUET_USER_NAME")]
    user_name: Option<String>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the default duet_config.json
    Config,

    /// Load and print the retained history of a conversation
    History {
        /// Conversation id
        #[arg(long)]
        conversation: String,

        /// Seconds to wait for history to settle
        #[arg(long, default_value_t = 15)]
        timeout: u64,
    },

    /// Send one message and wait for the outcome
    Send {
        #[arg(long)]
        conversation: String,

        #[arg(long)]
        text: String,

        #[arg(long, default_value_t = 15)]
        timeout: u64,
    },

    /// Interactive session: stdin lines are sent, updates are printed as JSON
    Chat {
        #[arg(long)]
        conversation: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Command::Config = cli.cmd {
        println!("{}", duet_core::default_config_json());
        return Ok(());
    }

    std::fs::create_dir_all(&cli.data_dir)
        .with_context(|| format!("create data dir {}", cli.data_dir.display()))?;
    let user = local_user(&cli)?;
    let app = DuetApp::new(&cli.data_dir, user)?;

    match &cli.cmd {
        Command::Config => Ok(()),
        Command::History {
            conversation,
            timeout,
        } => cmd_history(&app, conversation, *timeout),
        Command::Send {
            conversation,
            text,
            timeout,
        } => cmd_send(&app, conversation, text, *timeout),
        Command::Chat { conversation } => cmd_chat(&app, conversation),
    }
}

fn local_user(cli: &Cli) -> anyhow::Result<LocalUser> {
    let Some(id) = cli.user_id.as_deref().map(str::trim).filter(|s| !s.is_empty()) else {
        bail!("--user-id (or DUET_USER_ID) is required");
    };
    let name = cli
        .user_name
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(id);
    Ok(LocalUser::new(id, name))
}

fn print(v: serde_json::Value) {
    println!("{v}");
}

fn message_json(m: &ChatMessage) -> serde_json::Value {
    json!({
        "id": m.id,
        "sender_id": m.sender_id,
        "sender_name": m.sender_name,
        "text": m.text,
        "created_at": m.created_at.to_rfc3339(),
        "is_mine": m.is_mine,
        "delivery": format!("{:?}", m.delivery),
    })
}

fn phase_name(phase: SessionPhase) -> &'static str {
    match phase {
        SessionPhase::Idle => "idle",
        SessionPhase::Loading => "loading",
        SessionPhase::Live => "live",
        SessionPhase::LocalOnly => "local_only",
    }
}

fn wait_for(
    app: &DuetApp,
    timeout: Duration,
    mut f: impl FnMut(&ChatState) -> bool,
) -> Option<ChatState> {
    let start = Instant::now();
    while start.elapsed() < timeout {
        let state = app.state();
        if f(&state) {
            return Some(state);
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    None
}

fn history_settled(state: &ChatState) -> bool {
    state.phase != SessionPhase::Loading
        && state.current_conversation.is_some()
        && !state.busy.loading_history
}

fn cmd_history(app: &DuetApp, conversation: &str, timeout: u64) -> anyhow::Result<()> {
    app.dispatch(ChatAction::OpenConversation {
        conversation_id: conversation.to_string(),
    });
    let Some(state) = wait_for(app, Duration::from_secs(timeout), history_settled) else {
        bail!("history did not load within {timeout}s");
    };
    let messages: Vec<_> = state
        .current_conversation
        .iter()
        .flat_map(|c| c.messages.iter().map(message_json))
        .collect();
    print(json!({
        "conversation": conversation,
        "phase": phase_name(state.phase),
        "messages": messages,
    }));
    Ok(())
}

/// Captures the outcome of one send.
struct SendWatcher {
    outcome: Arc<Mutex<Option<serde_json::Value>>>,
}

impl ChatReconciler for SendWatcher {
    fn reconcile(&self, update: ChatUpdate) {
        let v = match update {
            ChatUpdate::SendSucceeded {
                message_id,
                outcome,
                ..
            } => json!({ "ok": true, "message_id": message_id, "outcome": format!("{outcome:?}") }),
            ChatUpdate::SendFailed {
                message_id, reason, ..
            } => json!({ "ok": false, "message_id": message_id, "reason": reason }),
            _ => return,
        };
        if let Ok(mut slot) = self.outcome.lock() {
            slot.get_or_insert(v);
        }
    }
}

fn cmd_send(app: &DuetApp, conversation: &str, text: &str, timeout: u64) -> anyhow::Result<()> {
    let outcome = Arc::new(Mutex::new(None));
    app.listen_for_updates(Box::new(SendWatcher {
        outcome: outcome.clone(),
    }));
    app.dispatch(ChatAction::OpenConversation {
        conversation_id: conversation.to_string(),
    });
    // Sends are only accepted once the conversation is open.
    let opened = wait_for(app, Duration::from_secs(timeout), |s| {
        s.phase != SessionPhase::Loading && s.current_conversation.is_some()
    });
    if opened.is_none() {
        bail!("conversation did not open within {timeout}s");
    }
    app.dispatch(ChatAction::SendMessage {
        text: text.to_string(),
    });

    let deadline = Instant::now() + Duration::from_secs(timeout);
    while Instant::now() < deadline {
        let result = outcome.lock().ok().and_then(|g| g.clone());
        if let Some(v) = result {
            let ok = v["ok"].as_bool().unwrap_or(false);
            print(v);
            if !ok {
                bail!("send failed");
            }
            // Give the background cache write a moment before exiting.
            std::thread::sleep(Duration::from_millis(200));
            return Ok(());
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    bail!("no send outcome within {timeout}s")
}

/// Prints updates as JSON lines; new messages are printed once.
struct Printer {
    seen: Mutex<HashSet<String>>,
    phase: Mutex<Option<SessionPhase>>,
}

impl ChatReconciler for Printer {
    fn reconcile(&self, update: ChatUpdate) {
        match update {
            ChatUpdate::FullState(state) => {
                if let Ok(mut phase) = self.phase.lock() {
                    if *phase != Some(state.phase) {
                        *phase = Some(state.phase);
                        print(json!({ "type": "phase", "phase": phase_name(state.phase) }));
                    }
                }
                let Some(conversation) = state.current_conversation else {
                    return;
                };
                let Ok(mut seen) = self.seen.lock() else {
                    return;
                };
                for m in &conversation.messages {
                    if seen.insert(m.id.clone()) {
                        print(json!({ "type": "message", "message": message_json(m) }));
                    }
                }
                if let Some(toast) = state.toast {
                    print(json!({ "type": "toast", "text": toast }));
                }
            }
            ChatUpdate::SendSucceeded {
                message_id,
                outcome,
                ..
            } => print(json!({
                "type": "sent",
                "message_id": message_id,
                "outcome": format!("{outcome:?}"),
            })),
            ChatUpdate::SendFailed {
                message_id, reason, ..
            } => {
                if let Ok(mut seen) = self.seen.lock() {
                    seen.remove(&message_id);
                }
                print(json!({ "type": "send_failed", "message_id": message_id, "reason": reason }))
            }
            ChatUpdate::IncomingMessage {
                sender_name, text, ..
            } => print(json!({ "type": "notification", "sender_name": sender_name, "text": text })),
        }
    }
}

fn cmd_chat(app: &DuetApp, conversation: &str) -> anyhow::Result<()> {
    app.listen_for_updates(Box::new(Printer {
        seen: Mutex::new(HashSet::new()),
        phase: Mutex::new(None),
    }));
    app.dispatch(ChatAction::SurfaceOpened);
    app.dispatch(ChatAction::OpenConversation {
        conversation_id: conversation.to_string(),
    });

    for line in std::io::stdin().lock().lines() {
        let line = line.context("read stdin")?;
        match line.trim() {
            "/quit" => break,
            "/refresh" => app.dispatch(ChatAction::RefreshConversation),
            "/away" => app.dispatch(ChatAction::SurfaceBlurred),
            "/back" => app.dispatch(ChatAction::SurfaceFocused),
            "/clear" => app.dispatch(ChatAction::ClearToast),
            _ => app.dispatch(ChatAction::SendMessage { text: line.clone() }),
        }
    }
    app.dispatch(ChatAction::CloseConversation);
    Ok(())
}
