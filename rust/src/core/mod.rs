pub mod config;
mod history;
mod realtime;
mod refresh;
mod send;

use std::sync::atomic::AtomicBool;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use flume::Sender;

use crate::actions::AppAction;
use crate::conversations::ConversationIndex;
use crate::identity::{IdentityCache, SharedIdentityCache};
use crate::state::{peer_display, AppState, BusyState, DirectMessage, ThreadLoadState};
use crate::thread::MessageThread;
use crate::transport::{Subscription, WalletTransport};
use crate::updates::{AppUpdate, CoreMsg, InternalEvent};

use config::AppConfig;

struct ActiveSubscription {
    token: u64,
    // Flipped before unsubscribing so a handler racing teardown forwards nothing.
    gate: Arc<AtomicBool>,
    handle: Subscription,
}

/// Single-threaded owner of all conversation state.
///
/// Actions and async results arrive as [`CoreMsg`]s on one channel and are
/// handled strictly one at a time. Transport calls run on `runtime` and report
/// back through `core_sender`; anything they return is checked against the
/// generation or sequence it was issued under before it touches state.
pub struct AppCore {
    pub state: AppState,
    rev: u64,

    update_sender: Sender<AppUpdate>,
    core_sender: Sender<CoreMsg>,
    shared_state: Arc<RwLock<AppState>>,

    config: AppConfig,
    runtime: tokio::runtime::Runtime,
    transport: Arc<dyn WalletTransport>,

    identities: SharedIdentityCache,
    index: ConversationIndex,
    thread: Option<MessageThread>,

    // Bumped on every selection change and thread reload; page results carry it.
    selection_generation: u64,

    subscription: Option<ActiveSubscription>,
    subscription_token: u64,

    // Recipient of the send handed to the wallet and not yet answered.
    pending_send: Option<String>,
    // Recipient of a first message to a new peer, selected once the index shows it.
    pending_new_chat: Option<String>,

    shut_down: bool,
}

impl AppCore {
    pub fn new(
        update_sender: Sender<AppUpdate>,
        core_sender: Sender<CoreMsg>,
        shared_state: Arc<RwLock<AppState>>,
        identities: SharedIdentityCache,
        config: AppConfig,
        self_key: String,
        transport: Arc<dyn WalletTransport>,
    ) -> std::io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("chat-io")
            .enable_time()
            .build()?;

        let this = Self {
            state: AppState::empty(self_key),
            rev: 0,
            update_sender,
            core_sender,
            shared_state,
            config,
            runtime,
            transport,
            identities,
            index: ConversationIndex::new(),
            thread: None,
            selection_generation: 0,
            subscription: None,
            subscription_token: 0,
            pending_send: None,
            pending_new_chat: None,
            shut_down: false,
        };

        // Ensure ChatApp::state() has an immediately-available snapshot.
        let snapshot = this.state.clone();
        this.commit_state_snapshot(&snapshot);
        Ok(this)
    }

    /// Initial mount: start listening for pushes and fetch the conversation list.
    pub fn mount(&mut self) {
        self.resubscribe();
        self.request_refresh();
        self.emit_state();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    fn next_rev(&mut self) -> u64 {
        self.rev += 1;
        self.state.rev = self.rev;
        self.rev
    }

    fn commit_state_snapshot(&self, snapshot: &AppState) {
        match self.shared_state.write() {
            Ok(mut g) => *g = snapshot.clone(),
            Err(poison) => *poison.into_inner() = snapshot.clone(),
        }
    }

    /// Rebuild the derived parts of `state` from the index, thread and cache.
    fn sync_views(&mut self) {
        let cache = read_identities(&self.identities);

        self.state.conversations = self
            .index
            .summaries()
            .iter()
            .cloned()
            .map(|mut c| {
                c.display_name = peer_display(
                    &c.peer_key,
                    cache.resolve(&c.peer_key, c.peer_tag.as_deref()),
                );
                c
            })
            .collect();

        self.state.current_thread = self.thread.as_ref().map(|t| {
            let fresh = self
                .index
                .get(t.peer_key())
                .and_then(|c| c.peer_tag.as_deref());
            t.view(peer_display(t.peer_key(), cache.resolve(t.peer_key(), fresh)))
        });

        self.state.busy = BusyState {
            sending: self.pending_send.is_some(),
            loading_thread: self.thread.as_ref().is_some_and(|t| {
                t.load_state() == ThreadLoadState::Loading && !t.is_loading_older()
            }),
            loading_older: self.thread.as_ref().is_some_and(|t| t.is_loading_older()),
        };
    }

    fn emit_state(&mut self) {
        self.sync_views();
        self.next_rev();
        let snapshot = self.state.clone();
        self.commit_state_snapshot(&snapshot);
        let _ = self.update_sender.send(AppUpdate::FullState(snapshot));
    }

    /// Cache counterparty tags carried by `messages`, then fill in the ones they omit.
    fn learn_tags(&self, messages: &mut [DirectMessage]) {
        let mut cache = write_identities(&self.identities);
        for m in messages.iter() {
            cache.learn_from_message(m, &self.state.self_key);
        }
        for m in messages.iter_mut() {
            cache.backfill(m);
        }
    }

    /// Display name for `peer_key`, preferring the tag the index currently reports.
    fn display_for(&self, peer_key: &str) -> String {
        let fresh = self
            .index
            .get(peer_key)
            .and_then(|c| c.peer_tag.as_deref());
        let cache = read_identities(&self.identities);
        peer_display(peer_key, cache.resolve(peer_key, fresh))
    }

    /// Surface a failure of a user-initiated operation, replacing any previous one.
    fn set_error(&mut self, msg: impl Into<String>) {
        let msg = msg.into();
        tracing::info!(error = %msg, "user-visible error");
        self.state.error = Some(msg);
    }

    fn spawn_internal<F>(&self, fut: F)
    where
        F: std::future::Future<Output = InternalEvent> + Send + 'static,
    {
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            let event = fut.await;
            let _ = tx.send(CoreMsg::Internal(Box::new(event)));
        });
    }

    pub fn handle_message(&mut self, msg: CoreMsg) {
        if self.shut_down {
            return;
        }
        match msg {
            CoreMsg::Action(action) => {
                tracing::info!(action = action.tag(), "dispatch");
                self.handle_action(action);
            }
            CoreMsg::Internal(internal) => self.handle_internal(*internal),
        }
    }

    fn handle_internal(&mut self, internal: InternalEvent) {
        match internal {
            InternalEvent::IncomingEvent { token, payload } => {
                self.handle_incoming_event(token, payload);
            }
            InternalEvent::ConversationsFetched { seq, result } => {
                self.apply_conversations(seq, result);
            }
            InternalEvent::PageLoaded {
                generation,
                peer_key,
                result,
            } => {
                self.apply_initial_page(generation, &peer_key, result);
            }
            InternalEvent::OlderPageLoaded {
                generation,
                peer_key,
                result,
            } => {
                self.apply_older_page(generation, &peer_key, result);
            }
            InternalEvent::ReceiptsSubmitted { count, ok } => {
                tracing::debug!(count, ok, "read receipts submitted");
                self.request_refresh();
            }
            InternalEvent::SendCompleted {
                to,
                new_chat,
                result,
            } => {
                self.finish_send(&to, new_chat, result);
            }
        }
    }

    fn handle_action(&mut self, action: AppAction) {
        match action {
            AppAction::SelectPeer { peer_key } => {
                let peer_key = peer_key.trim().to_string();
                if peer_key.is_empty() {
                    return;
                }
                self.select_peer(peer_key);
                self.emit_state();
            }
            AppAction::ClearSelection => {
                self.clear_selection();
                self.emit_state();
            }
            AppAction::LoadOlder => {
                if self.load_older() {
                    self.emit_state();
                }
            }
            AppAction::RetryLoad => {
                if self.thread.is_none() {
                    return;
                }
                self.state.error = None;
                self.reload_thread();
                self.emit_state();
            }
            AppAction::StartNewChat { recipient } => {
                let recipient = recipient.trim().to_string();
                if recipient.is_empty() {
                    return;
                }
                self.clear_selection();
                self.state.new_chat_recipient = Some(recipient);
                self.emit_state();
            }
            AppAction::Send { content } => {
                self.begin_send(content);
            }
            AppAction::RefreshConversations => {
                self.request_refresh();
            }
            AppAction::ClearError => {
                if self.state.error.take().is_some() {
                    self.emit_state();
                }
            }
            AppAction::Shutdown => {
                self.teardown_subscription();
                self.thread = None;
                self.index.clear();
                self.pending_send = None;
                self.pending_new_chat = None;
                self.emit_state();
                self.shut_down = true;
                tracing::info!("chat core shut down");
            }
        }
    }

    fn select_peer(&mut self, peer_key: String) {
        tracing::debug!(peer = %peer_key, "select peer");
        self.selection_generation += 1;
        self.thread = Some(MessageThread::new(peer_key));
        self.state.error = None;
        self.state.new_chat_recipient = None;
        self.pending_new_chat = None;
        self.resubscribe();
        self.load_initial_page();
    }

    fn clear_selection(&mut self) {
        self.selection_generation += 1;
        self.thread = None;
        self.state.error = None;
        self.state.new_chat_recipient = None;
        self.pending_new_chat = None;
        self.resubscribe();
    }
}

pub(crate) fn read_identities(cache: &SharedIdentityCache) -> RwLockReadGuard<'_, IdentityCache> {
    match cache.read() {
        Ok(g) => g,
        Err(poison) => poison.into_inner(),
    }
}

pub(crate) fn write_identities(cache: &SharedIdentityCache) -> RwLockWriteGuard<'_, IdentityCache> {
    match cache.write() {
        Ok(g) => g,
        Err(poison) => poison.into_inner(),
    }
}
