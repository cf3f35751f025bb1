use serde::{Deserialize, Serialize};

/// One direct message as the wallet reports it.
///
/// The wire shape matches the wallet's JSON (`senderPubkey`, `senderNametag`,
/// ...). Tags are optional on every source; the engine backfills them from the
/// identity cache before a message reaches a snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectMessage {
    pub id: String,
    #[serde(rename = "senderPubkey")]
    pub sender_key: String,
    #[serde(rename = "senderNametag", default, skip_serializing_if = "Option::is_none")]
    pub sender_tag: Option<String>,
    #[serde(rename = "recipientPubkey")]
    pub recipient_key: String,
    #[serde(
        rename = "recipientNametag",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub recipient_tag: Option<String>,
    pub content: String,
    /// Milliseconds since the unix epoch, on the wallet's clock.
    pub timestamp: i64,
    #[serde(default)]
    pub is_read: bool,
}

impl DirectMessage {
    /// The other participant from `self_key`'s point of view.
    pub fn counterparty(&self, self_key: &str) -> &str {
        if self.sender_key == self_key {
            &self.recipient_key
        } else {
            &self.sender_key
        }
    }

    pub fn is_from(&self, key: &str) -> bool {
        self.sender_key == key
    }

    /// Unread and addressed to `self_key`.
    pub fn is_unread_for(&self, self_key: &str) -> bool {
        !self.is_read && self.sender_key != self_key
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    #[serde(rename = "peerPubkey")]
    pub peer_key: String,
    #[serde(rename = "peerNametag", default, skip_serializing_if = "Option::is_none")]
    pub peer_tag: Option<String>,
    pub last_message: DirectMessage,
    #[serde(default)]
    pub unread_count: u32,
    /// Resolved by the engine; never part of the wallet payload.
    #[serde(skip)]
    pub display_name: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThreadLoadState {
    Empty,
    Loading,
    Loaded,
    Error,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ThreadViewState {
    pub peer_key: String,
    pub peer_display: String,
    pub messages: Vec<DirectMessage>,
    pub has_more: bool,
    pub oldest_loaded_timestamp: Option<i64>,
    pub load_state: ThreadLoadState,
}

/// "In flight" flags for operations the UI should reflect.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BusyState {
    pub sending: bool,
    pub loading_thread: bool,
    pub loading_older: bool,
}

impl BusyState {
    pub fn idle() -> Self {
        Self {
            sending: false,
            loading_thread: false,
            loading_older: false,
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppState {
    pub rev: u64,
    pub self_key: String,
    pub conversations: Vec<ConversationSummary>,
    pub current_thread: Option<ThreadViewState>,
    /// Identifier typed for a brand-new conversation (no peer selected).
    pub new_chat_recipient: Option<String>,
    /// Content of the last send attempt; kept when the send fails.
    pub draft: String,
    pub busy: BusyState,
    pub error: Option<String>,
}

impl AppState {
    pub fn empty(self_key: impl Into<String>) -> Self {
        Self {
            rev: 0,
            self_key: self_key.into(),
            conversations: vec![],
            current_thread: None,
            new_chat_recipient: None,
            draft: String::new(),
            busy: BusyState::idle(),
            error: None,
        }
    }

    pub fn selected_peer(&self) -> Option<&str> {
        self.current_thread.as_ref().map(|t| t.peer_key.as_str())
    }

    pub fn conversation(&self, peer_key: &str) -> Option<&ConversationSummary> {
        self.conversations.iter().find(|c| c.peer_key == peer_key)
    }

    /// Header text for the thread pane.
    pub fn thread_title(&self) -> Option<String> {
        if let Some(thread) = &self.current_thread {
            return Some(thread.peer_display.clone());
        }
        self.new_chat_recipient
            .as_deref()
            .map(|r| format!("New chat with {}", with_at_prefix(r)))
    }
}

pub fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Shorten a long key to `start...end` for display.
pub fn truncate_key(key: &str) -> String {
    const START: usize = 8;
    const END: usize = 6;
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= START + END + 3 {
        return key.to_string();
    }
    let head: String = chars[..START].iter().collect();
    let tail: String = chars[chars.len() - END..].iter().collect();
    format!("{head}...{tail}")
}

pub fn with_at_prefix(tag: &str) -> String {
    if tag.starts_with('@') {
        tag.to_string()
    } else {
        format!("@{tag}")
    }
}

pub fn strip_at_prefix(tag: &str) -> &str {
    tag.strip_prefix('@').unwrap_or(tag)
}

/// `@tag` when a tag is known, otherwise the truncated key.
pub fn peer_display(peer_key: &str, tag: Option<&str>) -> String {
    match tag.map(str::trim).filter(|t| !t.is_empty()) {
        Some(t) => with_at_prefix(t),
        None => truncate_key(peer_key),
    }
}

/// `HH:MM` for messages from today, `Mon d` for anything older.
pub fn format_chat_time(timestamp_ms: i64) -> String {
    use chrono::{Local, TimeZone};

    let Some(at) = Local.timestamp_millis_opt(timestamp_ms).single() else {
        return String::new();
    };
    if at.date_naive() == Local::now().date_naive() {
        at.format("%H:%M").to_string()
    } else {
        at.format("%b %-d").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dm(id: &str, from: &str, to: &str, is_read: bool) -> DirectMessage {
        DirectMessage {
            id: id.into(),
            sender_key: from.into(),
            sender_tag: None,
            recipient_key: to.into(),
            recipient_tag: None,
            content: "hi".into(),
            timestamp: 1,
            is_read,
        }
    }

    #[test]
    fn counterparty_is_the_other_side() {
        let incoming = dm("m1", "peer", "me", false);
        let outgoing = dm("m2", "me", "peer", true);
        assert_eq!(incoming.counterparty("me"), "peer");
        assert_eq!(outgoing.counterparty("me"), "peer");
        assert!(incoming.is_unread_for("me"));
        assert!(!outgoing.is_unread_for("me"));
    }

    #[test]
    fn decodes_wallet_payload() {
        let v = serde_json::json!({
            "id": "m1",
            "senderPubkey": "02aa",
            "senderNametag": "bob",
            "recipientPubkey": "02bb",
            "content": "hello",
            "timestamp": 1700000000000i64,
            "isRead": false,
        });
        let m: DirectMessage = serde_json::from_value(v).unwrap();
        assert_eq!(m.sender_tag.as_deref(), Some("bob"));
        assert_eq!(m.recipient_tag, None);
        assert_eq!(m.timestamp, 1_700_000_000_000);
    }

    #[test]
    fn truncates_only_long_keys() {
        assert_eq!(truncate_key("short"), "short");
        let key = "02abc123def456789012345678901234567890";
        assert_eq!(truncate_key(key), "02abc123...567890");
    }

    #[test]
    fn peer_display_prefers_tag() {
        assert_eq!(peer_display("02abcdef", Some("bob")), "@bob");
        assert_eq!(peer_display("02abcdef", Some("@bob")), "@bob");
        assert_eq!(peer_display("02abcdef", Some("  ")), "02abcdef");
        assert_eq!(peer_display("02abcdef", None), "02abcdef");
    }

    #[test]
    fn thread_title_falls_back_to_new_chat() {
        let mut s = AppState::empty("me");
        assert_eq!(s.thread_title(), None);
        s.new_chat_recipient = Some("dave".into());
        assert_eq!(s.thread_title().as_deref(), Some("New chat with @dave"));
    }

    #[test]
    fn chat_time_for_today_is_clock_time() {
        let out = format_chat_time(now_millis());
        assert_eq!(out.len(), 5);
        assert_eq!(&out[2..3], ":");
    }
}
