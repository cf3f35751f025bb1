use super::{read_identities, AppCore};
use crate::error::TransportError;
use crate::state::with_at_prefix;
use crate::transport::{SendAck, SendRequest};
use crate::updates::InternalEvent;

/// Pick the `to` field for an outgoing message.
///
/// With a peer selected: its conversation tag, then its cached tag, then the
/// raw key. Without one: the typed new-chat recipient. Tags always carry `@`.
pub(crate) fn resolve_recipient(
    conversation_tag: Option<&str>,
    cached_tag: Option<&str>,
    selected_peer: Option<&str>,
    new_chat: Option<&str>,
) -> Option<String> {
    fn non_empty(s: Option<&str>) -> Option<&str> {
        s.map(str::trim).filter(|s| !s.is_empty())
    }

    if let Some(peer) = non_empty(selected_peer) {
        let to = match non_empty(conversation_tag).or(non_empty(cached_tag)) {
            Some(tag) => with_at_prefix(tag),
            None => peer.to_string(),
        };
        return Some(to);
    }
    non_empty(new_chat).map(with_at_prefix)
}

impl AppCore {
    pub(super) fn begin_send(&mut self, content: String) {
        if self.pending_send.is_some() {
            tracing::debug!("send already in flight, ignoring");
            return;
        }
        let message = content.trim().to_string();
        if message.is_empty() {
            return;
        }
        self.state.draft = content;

        let selected = self.thread.as_ref().map(|t| t.peer_key().to_string());
        let to = {
            let cache = read_identities(&self.identities);
            let peer = selected.as_deref();
            resolve_recipient(
                peer.and_then(|p| self.index.get(p))
                    .and_then(|c| c.peer_tag.as_deref()),
                peer.and_then(|p| cache.lookup(p)),
                peer,
                self.state.new_chat_recipient.as_deref(),
            )
        };
        let Some(to) = to else {
            self.set_error("Choose a conversation or enter a recipient");
            self.emit_state();
            return;
        };

        let new_chat = selected.is_none();
        tracing::info!(new_chat, "sending direct message");
        self.pending_send = Some(to.clone());
        self.state.error = None;
        self.emit_state();

        let transport = self.transport.clone();
        let request = SendRequest { to: to.clone(), message };
        self.spawn_internal(async move {
            let result = transport
                .send_direct_message(request)
                .await
                .and_then(|ack| {
                    if ack.sent {
                        Ok(ack)
                    } else {
                        Err(TransportError::SendRejected("Message was not sent".into()))
                    }
                });
            InternalEvent::SendCompleted {
                to,
                new_chat,
                result,
            }
        });
    }

    pub(super) fn finish_send(
        &mut self,
        to: &str,
        new_chat: bool,
        result: Result<SendAck, TransportError>,
    ) {
        self.pending_send = None;
        match result {
            Ok(ack) => {
                tracing::info!(
                    message_id = ack.message_id.as_deref().unwrap_or(""),
                    new_chat,
                    "direct message sent"
                );
                self.state.draft.clear();
                if new_chat {
                    self.state.new_chat_recipient = None;
                    // Selection happens once a refresh shows the new peer, unless
                    // the user has moved on to another thread meanwhile.
                    if self.thread.is_none() {
                        self.pending_new_chat = Some(to.to_string());
                    }
                } else {
                    self.reload_thread();
                }
                self.request_refresh();
            }
            Err(e) => {
                tracing::warn!(error = %e, "send failed");
                self.set_error(e.user_visible_message());
            }
        }
        self.emit_state();
    }
}
