mod actions;
mod conversations;
mod core;
mod error;
mod identity;
mod logging;
mod mock_wallet;
mod state;
mod thread;
mod transport;
mod updates;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::thread as std_thread;

use flume::{Receiver, Sender};
use parking_lot::Mutex;

pub use crate::core::config::{load_app_config, AppConfig, CONFIG_FILE_NAME};
pub use actions::AppAction;
pub use conversations::ConversationIndex;
pub use error::TransportError;
pub use identity::{IdentityCache, SharedIdentityCache, DEFAULT_IDENTITY_CACHE_CAPACITY};
pub use logging::init_logging;
pub use mock_wallet::MockWallet;
pub use state::*;
pub use thread::MessageThread;
pub use transport::*;
pub use updates::*;

pub trait AppReconciler: Send + Sync + 'static {
    fn reconcile(&self, update: AppUpdate);
}

/// Handle to a running chat engine.
///
/// Every method returns immediately; work happens on the actor thread and
/// shows up as [`AppUpdate`]s and in [`ChatApp::state`].
pub struct ChatApp {
    core_tx: Sender<CoreMsg>,
    update_rx: Receiver<AppUpdate>,
    listening: AtomicBool,
    shared_state: Arc<RwLock<AppState>>,
    identities: SharedIdentityCache,
    actor: Mutex<Option<std_thread::JoinHandle<()>>>,
}

impl ChatApp {
    /// Start an engine for `self_key`, reading config from `data_dir`.
    pub fn new(
        data_dir: &str,
        self_key: impl Into<String>,
        transport: Arc<dyn WalletTransport>,
    ) -> std::io::Result<Arc<Self>> {
        logging::init_logging();
        let config = load_app_config(data_dir);
        tracing::info!(data_dir = %data_dir, "ChatApp::new() starting");
        Self::with_config(config, self_key, transport)
    }

    pub fn with_config(
        config: AppConfig,
        self_key: impl Into<String>,
        transport: Arc<dyn WalletTransport>,
    ) -> std::io::Result<Arc<Self>> {
        let (update_tx, update_rx) = flume::unbounded();
        let (core_tx, core_rx) = flume::unbounded::<CoreMsg>();
        let self_key = self_key.into();
        let shared_state = Arc::new(RwLock::new(AppState::empty(self_key.clone())));
        let identities = IdentityCache::shared(config.identity_cache_capacity);

        let mut core = crate::core::AppCore::new(
            update_tx,
            core_tx.clone(),
            shared_state.clone(),
            identities.clone(),
            config,
            self_key,
            transport,
        )?;

        // Actor loop thread (single threaded "app actor").
        let actor = std_thread::Builder::new()
            .name("chat-core".into())
            .spawn(move || {
                core.mount();
                while let Ok(msg) = core_rx.recv() {
                    core.handle_message(msg);
                    if core.is_shut_down() {
                        break;
                    }
                }
            })?;

        Ok(Arc::new(Self {
            core_tx,
            update_rx,
            listening: AtomicBool::new(false),
            shared_state,
            identities,
            actor: Mutex::new(Some(actor)),
        }))
    }

    pub fn state(&self) -> AppState {
        match self.shared_state.read() {
            Ok(g) => g.clone(),
            Err(poison) => poison.into_inner().clone(),
        }
    }

    pub fn dispatch(&self, action: AppAction) {
        // Contract: never block caller.
        let _ = self.core_tx.send(CoreMsg::Action(action));
    }

    pub fn listen_for_updates(&self, reconciler: Box<dyn AppReconciler>) {
        if self
            .listening
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            // Avoid multiple listeners that would split messages.
            return;
        }

        let rx = self.update_rx.clone();
        std_thread::spawn(move || {
            while let Ok(update) = rx.recv() {
                reconciler.reconcile(update);
            }
        });
    }

    /// Tag the session has seen for `peer_key`, without the `@`.
    pub fn lookup_tag(&self, peer_key: &str) -> Option<String> {
        let cache = match self.identities.read() {
            Ok(g) => g,
            Err(poison) => poison.into_inner(),
        };
        cache.lookup(peer_key).map(str::to_string)
    }

    /// Stop the engine and wait for the actor to exit. Idempotent.
    ///
    /// Once this returns the push subscription is gone and no further state
    /// changes are published.
    pub fn shutdown(&self) {
        let _ = self.core_tx.send(CoreMsg::Action(AppAction::Shutdown));
        if let Some(actor) = self.actor.lock().take() {
            if actor.join().is_err() {
                tracing::error!("chat core thread panicked");
            }
        }
    }
}

impl Drop for ChatApp {
    fn drop(&mut self) {
        let _ = self.core_tx.send(CoreMsg::Action(AppAction::Shutdown));
    }
}
