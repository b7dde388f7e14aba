mod actions;
mod core;
mod logging;
mod state;
mod timeline;
mod updates;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::thread;

use anyhow::Context;
use duet_memory_storage::MemoryLocalCache;
use duet_sqlite_cache::SqliteLocalCache;
use duet_storage_traits::{LocalCache, RemoteStore};
use flume::{Receiver, Sender};

pub use actions::ChatAction;
pub use state::*;
pub use timeline::{MergeOutcome, MessageTimeline};
pub use updates::*;

/// Return the default `duet_config.json` payload used when no config file exists.
pub fn default_config_json() -> String {
    core::config::default_app_config_json()
}

/// The signed-in participant on this device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalUser {
    pub id: String,
    pub name: String,
}

impl LocalUser {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

pub trait ChatReconciler: Send + Sync + 'static {
    fn reconcile(&self, update: ChatUpdate);
}

pub struct DuetApp {
    core_tx: Sender<CoreMsg>,
    update_rx: Receiver<ChatUpdate>,
    listening: AtomicBool,
    shared_state: Arc<RwLock<ChatState>>,
}

impl DuetApp {
    /// Build an app from `<data_dir>/duet_config.json` and the environment.
    ///
    /// The cache lives in `<data_dir>/chat_cache.sqlite3`. If it cannot be
    /// opened the app keeps running on an in-memory cache.
    pub fn new(data_dir: impl AsRef<Path>, user: LocalUser) -> anyhow::Result<Arc<Self>> {
        let data_dir = data_dir.as_ref().to_path_buf();
        // Before the stores open, so their warnings are captured.
        logging::init_logging(&data_dir);

        let config = core::config::load_app_config(&data_dir);
        let cache: Arc<dyn LocalCache> = match SqliteLocalCache::open_in_data_dir(&data_dir) {
            Ok(cache) => Arc::new(cache),
            Err(e) => {
                tracing::warn!(%e, data_dir = %data_dir.display(), "sqlite cache unavailable, using memory cache");
                Arc::new(MemoryLocalCache::default())
            }
        };
        let remote = config.remote_store();
        Self::spawn(data_dir, user, cache, remote)
    }

    /// Build an app over explicit stores. `remote = None` runs local-only.
    pub fn with_stores(
        data_dir: impl Into<PathBuf>,
        user: LocalUser,
        cache: Arc<dyn LocalCache>,
        remote: Option<Arc<dyn RemoteStore>>,
    ) -> anyhow::Result<Arc<Self>> {
        let data_dir = data_dir.into();
        logging::init_logging(&data_dir);
        Self::spawn(data_dir, user, cache, remote)
    }

    fn spawn(
        data_dir: PathBuf,
        user: LocalUser,
        cache: Arc<dyn LocalCache>,
        remote: Option<Arc<dyn RemoteStore>>,
    ) -> anyhow::Result<Arc<Self>> {
        tracing::info!(data_dir = %data_dir.display(), user = %user.id, "DuetApp starting");

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("duet-io")
            .enable_time()
            .enable_io()
            .build()
            .context("build tokio runtime")?;

        let (update_tx, update_rx) = flume::unbounded();
        let (core_tx, core_rx) = flume::unbounded::<CoreMsg>();
        let shared_state = Arc::new(RwLock::new(ChatState::empty()));

        // Actor loop thread (single threaded "app actor").
        let core_tx_for_core = core_tx.clone();
        let shared_for_core = shared_state.clone();
        thread::Builder::new()
            .name("duet-core".into())
            .spawn(move || {
                let mut core = crate::core::AppCore::new(
                    update_tx,
                    core_tx_for_core,
                    shared_for_core,
                    user,
                    cache,
                    remote,
                    runtime,
                );
                while let Ok(msg) = core_rx.recv() {
                    let shutdown = matches!(msg, CoreMsg::Shutdown);
                    core.handle_message(msg);
                    if shutdown {
                        break;
                    }
                }
            })
            .context("spawn core thread")?;

        Ok(Arc::new(Self {
            core_tx,
            update_rx,
            listening: AtomicBool::new(false),
            shared_state,
        }))
    }

    pub fn state(&self) -> ChatState {
        match self.shared_state.read() {
            Ok(g) => g.clone(),
            Err(poison) => poison.into_inner().clone(),
        }
    }

    pub fn dispatch(&self, action: ChatAction) {
        // Contract: never block caller.
        let _ = self.core_tx.send(CoreMsg::Action(action));
    }

    pub fn listen_for_updates(&self, reconciler: Box<dyn ChatReconciler>) {
        if self
            .listening
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            // Avoid multiple listeners that would split messages.
            return;
        }

        let rx = self.update_rx.clone();
        thread::spawn(move || {
            while let Ok(update) = rx.recv() {
                reconciler.reconcile(update);
            }
        });
    }
}

impl Drop for DuetApp {
    fn drop(&mut self) {
        let _ = self.core_tx.send(CoreMsg::Shutdown);
    }
}
