//! In-process wallet service for demos and tests.
//!
//! Keeps a directory of known peers, a flat message store and a set of push
//! subscribers. Faults and latency can be injected per call type.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::TransportError;
use crate::state::{now_millis, strip_at_prefix, ConversationSummary, DirectMessage};
use crate::transport::{
    EventHandler, GetMessagesParams, MessagePage, SendAck, SendRequest, Subscription,
    WalletTransport, EVENT_DIRECT_MESSAGE,
};

type SharedHandler = Arc<dyn Fn(serde_json::Value) + Send + Sync + 'static>;

#[derive(Default)]
struct Inner {
    // key -> tag (without `@`)
    directory: HashMap<String, Option<String>>,
    messages: Vec<DirectMessage>,
    subscribers: HashMap<u64, (String, SharedHandler)>,
    next_subscriber: u64,
    next_message: u64,
    last_timestamp: i64,

    page_delays: HashMap<String, Duration>,
    read_denied: bool,
    fail_next_page: Option<String>,
    reject_sends: Option<String>,
    omit_tags: bool,
    echo_outgoing: bool,

    receipts: Vec<String>,
    sent: Vec<SendRequest>,
}

impl Inner {
    fn next_timestamp(&mut self) -> i64 {
        self.last_timestamp = now_millis().max(self.last_timestamp + 1);
        self.last_timestamp
    }

    fn store(&mut self, from: &str, to: &str, content: &str, is_read: bool) -> DirectMessage {
        self.next_message += 1;
        let message = DirectMessage {
            id: format!("msg-{}", self.next_message),
            sender_key: from.to_string(),
            sender_tag: None,
            recipient_key: to.to_string(),
            recipient_tag: None,
            content: content.to_string(),
            timestamp: self.next_timestamp(),
            is_read,
        };
        self.messages.push(message.clone());
        self.decorate(message)
    }

    fn tag_of(&self, key: &str) -> Option<String> {
        if self.omit_tags {
            return None;
        }
        self.directory.get(key).cloned().flatten()
    }

    /// Attach directory tags the way the wallet reports them.
    fn decorate(&self, mut message: DirectMessage) -> DirectMessage {
        message.sender_tag = self.tag_of(&message.sender_key);
        message.recipient_tag = self.tag_of(&message.recipient_key);
        message
    }

    fn key_for_tag(&self, tag: &str) -> Option<String> {
        let tag = strip_at_prefix(tag.trim());
        self.directory
            .iter()
            .find(|(_, t)| t.as_deref().is_some_and(|t| t.eq_ignore_ascii_case(tag)))
            .map(|(k, _)| k.clone())
    }

    fn handlers_for(&self, event: &str) -> Vec<SharedHandler> {
        self.subscribers
            .values()
            .filter(|(e, _)| e == event)
            .map(|(_, h)| h.clone())
            .collect()
    }
}

pub struct MockWallet {
    self_key: String,
    inner: Arc<Mutex<Inner>>,
}

impl MockWallet {
    pub fn new(self_key: impl Into<String>, self_tag: Option<&str>) -> Arc<Self> {
        let self_key = self_key.into();
        let mut inner = Inner::default();
        inner
            .directory
            .insert(self_key.clone(), self_tag.map(|t| strip_at_prefix(t).to_string()));
        Arc::new(Self {
            self_key,
            inner: Arc::new(Mutex::new(inner)),
        })
    }

    /// Make `key` known to the wallet, optionally under `tag`.
    pub fn register_peer(&self, key: &str, tag: Option<&str>) {
        self.inner
            .lock()
            .directory
            .insert(key.to_string(), tag.map(|t| strip_at_prefix(t).to_string()));
    }

    pub fn key_for_tag(&self, tag: &str) -> Option<String> {
        self.inner.lock().key_for_tag(tag)
    }

    /// Add history without notifying subscribers.
    pub fn seed(&self, from: &str, to: &str, content: &str, is_read: bool) -> DirectMessage {
        self.inner.lock().store(from, to, content, is_read)
    }

    /// Store an unread message from `from` and push it to subscribers.
    pub fn deliver_incoming(&self, from: &str, content: &str) -> DirectMessage {
        let message = self.inner.lock().store(from, &self.self_key, content, false);
        self.push(message.clone());
        message
    }

    /// Push an existing message again, as a wallet might on reconnect.
    pub fn redeliver(&self, message: &DirectMessage) {
        self.push(message.clone());
    }

    /// Emit an arbitrary payload on `event`.
    pub fn emit_raw(&self, event: &str, payload: serde_json::Value) {
        let handlers = self.inner.lock().handlers_for(event);
        for handler in handlers {
            handler(payload.clone());
        }
    }

    fn push(&self, message: DirectMessage) {
        match serde_json::to_value(&message) {
            Ok(payload) => self.emit_raw(EVENT_DIRECT_MESSAGE, payload),
            Err(e) => tracing::warn!(error = %e, "mock wallet failed to encode event"),
        }
    }

    pub fn set_page_delay(&self, peer_key: &str, delay: Duration) {
        self.inner
            .lock()
            .page_delays
            .insert(peer_key.to_string(), delay);
    }

    pub fn set_read_permission(&self, granted: bool) {
        self.inner.lock().read_denied = !granted;
    }

    /// The next `get_messages` call fails with `reason`.
    pub fn fail_next_page(&self, reason: &str) {
        self.inner.lock().fail_next_page = Some(reason.to_string());
    }

    /// Refuse every send with `reason` until cleared with `None`.
    pub fn reject_sends(&self, reason: Option<&str>) {
        self.inner.lock().reject_sends = reason.map(str::to_string);
    }

    /// Report messages and conversations without tags.
    pub fn set_omit_tags(&self, omit: bool) {
        self.inner.lock().omit_tags = omit;
    }

    /// Push sent messages back to subscribers, like a wallet syncing its outbox.
    pub fn set_echo_outgoing(&self, echo: bool) {
        self.inner.lock().echo_outgoing = echo;
    }

    pub fn read_receipts(&self) -> Vec<String> {
        self.inner.lock().receipts.clone()
    }

    pub fn sent_requests(&self) -> Vec<SendRequest> {
        self.inner.lock().sent.clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().subscribers.len()
    }

    fn counterparty<'a>(&self, message: &'a DirectMessage) -> &'a str {
        message.counterparty(&self.self_key)
    }
}

#[async_trait]
impl WalletTransport for MockWallet {
    async fn get_conversations(&self) -> Result<Vec<ConversationSummary>, TransportError> {
        let inner = self.inner.lock();
        if inner.read_denied {
            return Err(TransportError::PermissionDenied("dm history".into()));
        }

        let mut by_peer: HashMap<&str, ConversationSummary> = HashMap::new();
        for m in &inner.messages {
            let peer = self.counterparty(m);
            let unread = u32::from(m.is_unread_for(&self.self_key));
            by_peer
                .entry(peer)
                .and_modify(|c| {
                    if m.timestamp >= c.last_message.timestamp {
                        c.last_message = inner.decorate(m.clone());
                    }
                    c.unread_count += unread;
                })
                .or_insert_with(|| ConversationSummary {
                    peer_key: peer.to_string(),
                    peer_tag: inner.tag_of(peer),
                    last_message: inner.decorate(m.clone()),
                    unread_count: unread,
                    display_name: String::new(),
                });
        }

        let mut list: Vec<ConversationSummary> = by_peer.into_values().collect();
        list.sort_by(|a, b| b.last_message.timestamp.cmp(&a.last_message.timestamp));
        Ok(list)
    }

    async fn get_messages(&self, params: GetMessagesParams) -> Result<MessagePage, TransportError> {
        let delay = {
            let mut inner = self.inner.lock();
            if inner.read_denied {
                return Err(TransportError::PermissionDenied("dm history".into()));
            }
            if let Some(reason) = inner.fail_next_page.take() {
                return Err(TransportError::Fetch(reason));
            }
            inner.page_delays.get(&params.peer_key).copied()
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let inner = self.inner.lock();
        let mut newest_first: Vec<DirectMessage> = inner
            .messages
            .iter()
            .rev()
            .filter(|m| self.counterparty(m) == params.peer_key)
            .filter(|m| params.before.map_or(true, |b| m.timestamp < b))
            .map(|m| inner.decorate(m.clone()))
            .collect();

        let limit = params.limit as usize;
        let has_more = newest_first.len() > limit;
        newest_first.truncate(limit);
        newest_first.reverse();
        let oldest_timestamp = newest_first.first().map(|m| m.timestamp);
        Ok(MessagePage {
            messages: newest_first,
            has_more,
            oldest_timestamp,
        })
    }

    async fn mark_as_read(&self, message_ids: Vec<String>) -> Result<(), TransportError> {
        let mut inner = self.inner.lock();
        for m in inner.messages.iter_mut() {
            if message_ids.contains(&m.id) {
                m.is_read = true;
            }
        }
        inner.receipts.extend(message_ids);
        Ok(())
    }

    async fn send_direct_message(&self, request: SendRequest) -> Result<SendAck, TransportError> {
        let (message, echo) = {
            let mut inner = self.inner.lock();
            if let Some(reason) = inner.reject_sends.clone() {
                return Err(TransportError::SendRejected(reason));
            }
            let to = request.to.trim();
            let recipient = if to.starts_with('@') {
                inner
                    .key_for_tag(to)
                    .ok_or_else(|| TransportError::SendRejected(format!("Nametag {to} not found")))?
            } else {
                inner.directory.entry(to.to_string()).or_insert(None);
                to.to_string()
            };
            inner.sent.push(request.clone());
            let message = inner.store(&self.self_key, &recipient, &request.message, false);
            (message, inner.echo_outgoing)
        };

        let ack = SendAck {
            sent: true,
            message_id: Some(message.id.clone()),
            timestamp: Some(message.timestamp),
        };
        if echo {
            self.push(message);
        }
        Ok(ack)
    }

    fn subscribe(&self, event: &str, handler: EventHandler) -> Subscription {
        let id = {
            let mut inner = self.inner.lock();
            inner.next_subscriber += 1;
            let id = inner.next_subscriber;
            inner
                .subscribers
                .insert(id, (event.to_string(), Arc::from(handler)));
            id
        };
        let weak: Weak<Mutex<Inner>> = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.lock().subscribers.remove(&id);
            }
        })
    }
}
