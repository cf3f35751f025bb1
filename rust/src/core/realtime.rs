use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::{ActiveSubscription, AppCore};
use crate::state::DirectMessage;
use crate::updates::{AppUpdate, CoreMsg, InternalEvent};

impl AppCore {
    /// Replace the push subscription. The old handler stops forwarding before the
    /// new one is registered; events it already forwarded are still folded.
    pub(super) fn resubscribe(&mut self) {
        self.teardown_subscription();

        self.subscription_token = self.subscription_token.wrapping_add(1);
        let token = self.subscription_token;
        let gate = Arc::new(AtomicBool::new(true));
        let handler_gate = gate.clone();
        let tx = self.core_sender.clone();
        let handle = self.transport.subscribe(
            &self.config.incoming_event,
            Box::new(move |payload| {
                if !handler_gate.load(Ordering::SeqCst) {
                    return;
                }
                let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::IncomingEvent {
                    token,
                    payload,
                })));
            }),
        );
        tracing::debug!(token, event = %self.config.incoming_event, "subscribed");
        self.subscription = Some(ActiveSubscription {
            token,
            gate,
            handle,
        });
    }

    pub(super) fn teardown_subscription(&mut self) {
        if let Some(mut sub) = self.subscription.take() {
            sub.gate.store(false, Ordering::SeqCst);
            sub.handle.unsubscribe();
            tracing::debug!(token = sub.token, "unsubscribed");
        }
    }

    pub(super) fn handle_incoming_event(&mut self, token: u64, payload: serde_json::Value) {
        // Only shutdown leaves no subscription behind. A selection change queued
        // ahead of this event must not lose it.
        if self.subscription.is_none() {
            tracing::debug!(token, "dropping event after teardown");
            return;
        }
        if token != self.subscription_token {
            tracing::debug!(
                token,
                current = self.subscription_token,
                "folding event forwarded before resubscribe"
            );
        }
        match serde_json::from_value::<DirectMessage>(payload) {
            Ok(message) => self.fold_incoming(message),
            Err(e) => tracing::warn!(error = %e, "dropping undecodable direct message event"),
        }
    }

    /// Fold one pushed message into the cache, the open thread and the index.
    fn fold_incoming(&mut self, mut message: DirectMessage) {
        self.learn_tags(std::slice::from_mut(&mut message));

        let self_key = self.state.self_key.clone();
        let peer_key = message.counterparty(&self_key).to_string();
        tracing::debug!(id = %message.id, peer = %peer_key, "incoming message");

        let mut fresh = true;
        if let Some(thread) = self.thread.as_mut().filter(|t| t.peer_key() == peer_key) {
            fresh = thread.merge(message.clone());
            if fresh && message.is_unread_for(&self_key) {
                self.submit_receipts(vec![message.id.clone()]);
            }
        }

        self.request_refresh();
        self.emit_state();

        if fresh {
            let peer_display = self.display_for(&peer_key);
            let _ = self.update_sender.send(AppUpdate::MessageReceived {
                rev: self.rev,
                message,
                peer_display,
            });
        }
    }
}
