use super::{read_identities, write_identities, AppCore};
use crate::error::TransportError;
use crate::state::{strip_at_prefix, ConversationSummary};
use crate::updates::InternalEvent;

impl AppCore {
    pub(super) fn request_refresh(&mut self) {
        let seq = self.index.begin_refresh();
        let transport = self.transport.clone();
        self.spawn_internal(async move {
            let result = transport.get_conversations().await;
            InternalEvent::ConversationsFetched { seq, result }
        });
    }

    pub(super) fn apply_conversations(
        &mut self,
        seq: u64,
        result: Result<Vec<ConversationSummary>, TransportError>,
    ) {
        let summaries = match result {
            Ok(summaries) => summaries,
            Err(e) => {
                tracing::debug!(seq, error = %e, "conversation refresh failed");
                return;
            }
        };
        if !self.index.apply(seq, summaries) {
            tracing::debug!(seq, "discarding stale conversation list");
            return;
        }

        {
            let mut cache = write_identities(&self.identities);
            for c in self.index.summaries() {
                cache.remember(&c.peer_key, c.peer_tag.as_deref());
                cache.learn_from_message(&c.last_message, &self.state.self_key);
            }
            self.index
                .for_each_mut(|c| cache.backfill(&mut c.last_message));
            if let Some(thread) = self.thread.as_mut() {
                thread.for_each_mut(|m| cache.backfill(m));
            }
        }
        tracing::debug!(
            seq,
            count = self.index.summaries().len(),
            newer_pending = self.index.in_flight(),
            "conversations refreshed"
        );

        if let Some(peer_key) = self.pending_new_chat_peer() {
            tracing::info!("new conversation surfaced, selecting it");
            self.pending_new_chat = None;
            self.select_peer(peer_key);
            self.request_refresh();
        }
        self.emit_state();
    }

    /// Key of the conversation the last new-chat send went to, once the index has it.
    fn pending_new_chat_peer(&self) -> Option<String> {
        let target = self.pending_new_chat.as_deref()?.trim();
        let bare = strip_at_prefix(target);
        let summaries = self.index.summaries();

        let by_index = summaries.iter().find(|c| {
            c.peer_key == bare
                || c
                    .peer_tag
                    .as_deref()
                    .is_some_and(|t| strip_at_prefix(t.trim()).eq_ignore_ascii_case(bare))
        });
        if let Some(c) = by_index {
            return Some(c.peer_key.clone());
        }

        let cache = read_identities(&self.identities);
        let key = cache
            .key_for_tag(bare)
            .filter(|key| self.index.get(key).is_some())
            .map(str::to_string);
        key
    }
}
