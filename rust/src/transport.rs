use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::TransportError;
use crate::state::{ConversationSummary, DirectMessage};

/// Event name the wallet uses for newly delivered direct messages.
pub const EVENT_DIRECT_MESSAGE: &str = "message:dm";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GetMessagesParams {
    #[serde(rename = "peerPubkey")]
    pub peer_key: String,
    pub limit: u32,
    /// Only messages strictly older than this timestamp (ms).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<i64>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePage {
    /// Oldest first.
    pub messages: Vec<DirectMessage>,
    pub has_more: bool,
    pub oldest_timestamp: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SendRequest {
    /// `@tag` or a raw peer key.
    pub to: String,
    pub message: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendAck {
    pub sent: bool,
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

/// Callback invoked by the transport for every event on a subscription.
pub type EventHandler = Box<dyn Fn(serde_json::Value) + Send + Sync + 'static>;

/// Request/response and push primitives the engine consumes.
///
/// Implementations must be cheap to call concurrently; the engine issues
/// overlapping requests and does its own stale-result filtering.
#[async_trait]
pub trait WalletTransport: Send + Sync + 'static {
    async fn get_conversations(&self) -> Result<Vec<ConversationSummary>, TransportError>;

    async fn get_messages(&self, params: GetMessagesParams) -> Result<MessagePage, TransportError>;

    async fn mark_as_read(&self, message_ids: Vec<String>) -> Result<(), TransportError>;

    async fn send_direct_message(&self, request: SendRequest) -> Result<SendAck, TransportError>;

    /// Register `handler` for `event`. Delivery stops once the returned
    /// subscription is unsubscribed or dropped.
    fn subscribe(&self, event: &str, handler: EventHandler) -> Subscription;
}

/// Handle for a live event subscription.
///
/// `unsubscribe` is idempotent and also runs on drop. After it returns,
/// [`Subscription::is_active`] is false and the transport's cancel hook has run.
pub struct Subscription {
    active: Arc<AtomicBool>,
    on_cancel: Option<Box<dyn FnOnce() + Send + 'static>>,
}

impl Subscription {
    pub fn new(on_cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            active: Arc::new(AtomicBool::new(true)),
            on_cancel: Some(Box::new(on_cancel)),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn unsubscribe(&mut self) {
        self.active.store(false, Ordering::SeqCst);
        if let Some(cancel) = self.on_cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn unsubscribe_runs_cancel_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let mut sub = Subscription::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        assert!(sub.is_active());
        sub.unsubscribe();
        sub.unsubscribe();
        assert!(!sub.is_active());
        drop(sub);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn drop_cancels() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let sub = Subscription::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        drop(sub);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn params_serialize_without_empty_cursor() {
        let p = GetMessagesParams {
            peer_key: "02aa".into(),
            limit: 30,
            before: None,
        };
        assert_eq!(
            serde_json::to_value(&p).unwrap(),
            serde_json::json!({"peerPubkey": "02aa", "limit": 30})
        );
    }
}
