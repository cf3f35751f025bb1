use super::AppCore;
use crate::error::TransportError;
use crate::transport::{GetMessagesParams, MessagePage};
use crate::updates::InternalEvent;

impl AppCore {
    /// Fetch the newest page for the selected peer under the current generation.
    pub(super) fn load_initial_page(&mut self) {
        let Some(thread) = self.thread.as_mut() else {
            return;
        };
        thread.begin_initial_load();
        let peer_key = thread.peer_key().to_string();
        let generation = self.selection_generation;
        let params = GetMessagesParams {
            peer_key: peer_key.clone(),
            limit: self.config.initial_page_size,
            before: None,
        };
        let transport = self.transport.clone();
        self.spawn_internal(async move {
            let result = transport.get_messages(params).await;
            InternalEvent::PageLoaded {
                generation,
                peer_key,
                result,
            }
        });
    }

    /// Re-fetch the selected thread. Anything still in flight for it goes stale.
    pub(super) fn reload_thread(&mut self) {
        if self.thread.is_none() {
            return;
        }
        self.selection_generation += 1;
        self.load_initial_page();
    }

    /// Returns false when there is nothing to page (no-op, no state change).
    pub(super) fn load_older(&mut self) -> bool {
        let Some(thread) = self.thread.as_mut() else {
            return false;
        };
        let Some(cursor) = thread.begin_load_older() else {
            tracing::debug!(peer = %thread.peer_key(), "load older ignored");
            return false;
        };
        let peer_key = thread.peer_key().to_string();
        let generation = self.selection_generation;
        let params = GetMessagesParams {
            peer_key: peer_key.clone(),
            limit: self.config.older_page_size,
            before: Some(cursor),
        };
        let transport = self.transport.clone();
        self.spawn_internal(async move {
            let result = transport.get_messages(params).await;
            InternalEvent::OlderPageLoaded {
                generation,
                peer_key,
                result,
            }
        });
        true
    }

    fn is_current(&self, generation: u64, peer_key: &str) -> bool {
        generation == self.selection_generation
            && self.thread.as_ref().is_some_and(|t| t.peer_key() == peer_key)
    }

    pub(super) fn apply_initial_page(
        &mut self,
        generation: u64,
        peer_key: &str,
        result: Result<MessagePage, TransportError>,
    ) {
        if !self.is_current(generation, peer_key) {
            tracing::debug!(peer = %peer_key, generation, "discarding stale page");
            return;
        }
        match result {
            Ok(mut page) => {
                self.learn_tags(&mut page.messages);
                let count = page.messages.len();
                let Some(thread) = self.thread.as_mut() else {
                    return;
                };
                thread.apply_initial_page(page);
                tracing::debug!(peer = %peer_key, count, has_more = thread.has_more(), "thread loaded");

                let self_key = &self.state.self_key;
                let unread: Vec<String> = thread
                    .messages()
                    .iter()
                    .filter(|m| m.is_unread_for(self_key))
                    .map(|m| m.id.clone())
                    .collect();
                if !unread.is_empty() {
                    self.submit_receipts(unread);
                }
            }
            Err(e) => self.fail_thread_load(peer_key, e),
        }
        self.emit_state();
    }

    pub(super) fn apply_older_page(
        &mut self,
        generation: u64,
        peer_key: &str,
        result: Result<MessagePage, TransportError>,
    ) {
        if !self.is_current(generation, peer_key) {
            tracing::debug!(peer = %peer_key, generation, "discarding stale older page");
            return;
        }
        match result {
            Ok(mut page) => {
                self.learn_tags(&mut page.messages);
                if let Some(thread) = self.thread.as_mut() {
                    thread.apply_older_page(page);
                }
            }
            Err(e) => self.fail_thread_load(peer_key, e),
        }
        self.emit_state();
    }

    fn fail_thread_load(&mut self, peer_key: &str, err: TransportError) {
        let Some(thread) = self.thread.as_mut() else {
            return;
        };
        if err.is_permission_denied() {
            // The wallet declined history access; the thread just stays as it was.
            tracing::debug!(peer = %peer_key, "history access not granted");
            thread.settle();
            return;
        }
        tracing::warn!(peer = %peer_key, error = %err, "thread load failed");
        thread.fail();
        self.set_error(err.user_visible_message());
    }

    /// Fire-and-forget read receipts; completion triggers an index refresh.
    pub(super) fn submit_receipts(&self, message_ids: Vec<String>) {
        let count = message_ids.len();
        let transport = self.transport.clone();
        self.spawn_internal(async move {
            let ok = match transport.mark_as_read(message_ids).await {
                Ok(()) => true,
                Err(e) => {
                    tracing::debug!(error = %e, "read receipt failed");
                    false
                }
            };
            InternalEvent::ReceiptsSubmitted { count, ok }
        });
    }
}
