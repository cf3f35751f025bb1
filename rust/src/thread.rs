//! Ordered message history for the selected peer.

use std::collections::HashSet;

use crate::state::{DirectMessage, ThreadLoadState, ThreadViewState};
use crate::transport::MessagePage;

#[derive(Debug, Clone)]
pub struct MessageThread {
    peer_key: String,
    messages: Vec<DirectMessage>,
    ids: HashSet<String>,
    has_more: bool,
    oldest_loaded_timestamp: Option<i64>,
    load_state: ThreadLoadState,
    older_in_flight: bool,
}

impl MessageThread {
    pub fn new(peer_key: impl Into<String>) -> Self {
        Self {
            peer_key: peer_key.into(),
            messages: Vec::new(),
            ids: HashSet::new(),
            has_more: false,
            oldest_loaded_timestamp: None,
            load_state: ThreadLoadState::Empty,
            older_in_flight: false,
        }
    }

    pub fn peer_key(&self) -> &str {
        &self.peer_key
    }

    pub fn messages(&self) -> &[DirectMessage] {
        &self.messages
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn oldest_loaded_timestamp(&self) -> Option<i64> {
        self.oldest_loaded_timestamp
    }

    pub fn load_state(&self) -> ThreadLoadState {
        self.load_state
    }

    pub fn is_loading_older(&self) -> bool {
        self.older_in_flight
    }

    pub fn begin_initial_load(&mut self) {
        self.older_in_flight = false;
        self.load_state = ThreadLoadState::Loading;
    }

    /// Replace the contents with the newest page.
    ///
    /// Messages merged from push events while the page was in flight survive if
    /// the page does not already contain them and they are not older than the
    /// page's newest message.
    pub fn apply_initial_page(&mut self, page: MessagePage) {
        let page_newest = page.messages.iter().map(|m| m.timestamp).max();
        let carried: Vec<DirectMessage> = std::mem::take(&mut self.messages)
            .into_iter()
            .filter(|m| page_newest.map_or(true, |newest| m.timestamp >= newest))
            .collect();

        self.ids.clear();
        for m in page.messages {
            self.push_unique(m);
        }
        sort_stable(&mut self.messages);
        for m in carried {
            self.merge(m);
        }

        self.has_more = page.has_more;
        self.oldest_loaded_timestamp = page
            .oldest_timestamp
            .or_else(|| self.messages.first().map(|m| m.timestamp));
        self.load_state = ThreadLoadState::Loaded;
    }

    /// Cursor for the next older page, or `None` when paging is not possible.
    pub fn begin_load_older(&mut self) -> Option<i64> {
        if !self.has_more || self.older_in_flight {
            return None;
        }
        let cursor = self.oldest_loaded_timestamp?;
        self.older_in_flight = true;
        self.load_state = ThreadLoadState::Loading;
        Some(cursor)
    }

    /// Prepend a page of strictly older history.
    pub fn apply_older_page(&mut self, page: MessagePage) {
        self.older_in_flight = false;
        let cursor = self.oldest_loaded_timestamp;
        let mut older: Vec<DirectMessage> = page
            .messages
            .into_iter()
            .filter(|m| cursor.map_or(true, |c| m.timestamp < c))
            .filter(|m| !self.ids.contains(&m.id))
            .collect();
        sort_stable(&mut older);
        let mut seen = HashSet::new();
        older.retain(|m| seen.insert(m.id.clone()));
        self.ids.extend(older.iter().map(|m| m.id.clone()));
        older.append(&mut self.messages);
        self.messages = older;
        // Pushes merged earlier may predate this page.
        sort_stable(&mut self.messages);

        self.has_more = page.has_more;
        if let Some(ts) = page.oldest_timestamp {
            self.oldest_loaded_timestamp = Some(ts);
        } else if let Some(first) = self.messages.first() {
            self.oldest_loaded_timestamp = Some(first.timestamp);
        }
        self.load_state = ThreadLoadState::Loaded;
    }

    /// Insert a message keeping timestamp order. Returns false for duplicates.
    pub fn merge(&mut self, message: DirectMessage) -> bool {
        if self.ids.contains(&message.id) {
            return false;
        }
        // After every existing message with an equal or earlier timestamp, so ties
        // keep arrival order and the usual case is a plain append.
        let pos = self
            .messages
            .iter()
            .rposition(|m| m.timestamp <= message.timestamp)
            .map_or(0, |i| i + 1);
        self.ids.insert(message.id.clone());
        self.messages.insert(pos, message);
        true
    }

    pub fn fail(&mut self) {
        self.older_in_flight = false;
        self.load_state = ThreadLoadState::Error;
    }

    /// End an in-flight load without applying anything.
    pub fn settle(&mut self) {
        self.older_in_flight = false;
        if self.load_state == ThreadLoadState::Loading {
            self.load_state = if self.messages.is_empty() && self.oldest_loaded_timestamp.is_none() {
                ThreadLoadState::Empty
            } else {
                ThreadLoadState::Loaded
            };
        }
    }

    /// Apply `f` to every message, used for tag backfill.
    pub fn for_each_mut(&mut self, f: impl FnMut(&mut DirectMessage)) {
        self.messages.iter_mut().for_each(f);
    }

    pub fn view(&self, peer_display: String) -> ThreadViewState {
        ThreadViewState {
            peer_key: self.peer_key.clone(),
            peer_display,
            messages: self.messages.clone(),
            has_more: self.has_more,
            oldest_loaded_timestamp: self.oldest_loaded_timestamp,
            load_state: self.load_state,
        }
    }

    fn push_unique(&mut self, message: DirectMessage) {
        if self.ids.insert(message.id.clone()) {
            self.messages.push(message);
        }
    }
}

fn sort_stable(messages: &mut [DirectMessage]) {
    messages.sort_by_key(|m| m.timestamp);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dm(id: &str, ts: i64) -> DirectMessage {
        DirectMessage {
            id: id.into(),
            sender_key: "peer".into(),
            sender_tag: None,
            recipient_key: "me".into(),
            recipient_tag: None,
            content: format!("msg {id}"),
            timestamp: ts,
            is_read: false,
        }
    }

    fn page(msgs: Vec<DirectMessage>, has_more: bool) -> MessagePage {
        let oldest = msgs.iter().map(|m| m.timestamp).min();
        MessagePage {
            messages: msgs,
            has_more,
            oldest_timestamp: oldest,
        }
    }

    fn ids(t: &MessageThread) -> Vec<&str> {
        t.messages().iter().map(|m| m.id.as_str()).collect()
    }

    fn assert_ordered(t: &MessageThread) {
        let ts: Vec<i64> = t.messages().iter().map(|m| m.timestamp).collect();
        let mut sorted = ts.clone();
        sorted.sort();
        assert_eq!(ts, sorted);
    }

    #[test]
    fn initial_page_sets_cursor_and_state() {
        let mut t = MessageThread::new("peer");
        assert_eq!(t.load_state(), ThreadLoadState::Empty);
        t.begin_initial_load();
        assert_eq!(t.load_state(), ThreadLoadState::Loading);
        t.apply_initial_page(page(vec![dm("a", 10), dm("b", 20)], true));
        assert_eq!(t.load_state(), ThreadLoadState::Loaded);
        assert_eq!(ids(&t), vec!["a", "b"]);
        assert!(t.has_more());
        assert_eq!(t.oldest_loaded_timestamp(), Some(10));
    }

    #[test]
    fn merging_same_id_twice_is_idempotent() {
        let mut t = MessageThread::new("peer");
        t.apply_initial_page(page(vec![dm("a", 10)], false));
        assert!(t.merge(dm("b", 20)));
        let once = ids(&t).join(",");
        assert!(!t.merge(dm("b", 20)));
        assert_eq!(ids(&t).join(","), once);
        assert!(!t.merge(dm("a", 10)));
        assert_eq!(t.messages().len(), 2);
    }

    #[test]
    fn merge_keeps_order_and_tie_arrival_order() {
        let mut t = MessageThread::new("peer");
        t.apply_initial_page(page(vec![dm("a", 10), dm("c", 30)], false));
        t.merge(dm("b", 20));
        t.merge(dm("d", 30));
        t.merge(dm("e", 5));
        assert_eq!(ids(&t), vec!["e", "a", "b", "c", "d"]);
        assert_ordered(&t);
    }

    #[test]
    fn older_page_is_prepended_contiguously() {
        let mut t = MessageThread::new("peer");
        t.apply_initial_page(page(vec![dm("c", 30), dm("d", 40)], true));
        assert_eq!(t.begin_load_older(), Some(30));
        assert!(t.is_loading_older());
        // A second request while one is in flight is refused.
        assert_eq!(t.begin_load_older(), None);
        t.apply_older_page(page(vec![dm("a", 10), dm("b", 20)], false));
        assert_eq!(ids(&t), vec!["a", "b", "c", "d"]);
        assert_ordered(&t);
        assert!(!t.has_more());
        assert_eq!(t.oldest_loaded_timestamp(), Some(10));
        assert_eq!(t.begin_load_older(), None);
    }

    #[test]
    fn older_page_lands_in_order_around_early_push() {
        let mut t = MessageThread::new("peer");
        t.apply_initial_page(page(vec![dm("c", 30), dm("d", 40)], true));
        // Pushed message older than anything loaded so far.
        assert!(t.merge(dm("x", 5)));
        assert_eq!(t.begin_load_older(), Some(30));
        t.apply_older_page(page(vec![dm("a", 10), dm("b", 20)], true));
        assert_eq!(ids(&t), vec!["x", "a", "b", "c", "d"]);
        assert_ordered(&t);
        assert_eq!(t.oldest_loaded_timestamp(), Some(10));
    }

    #[test]
    fn older_page_drops_overlap_with_cursor() {
        let mut t = MessageThread::new("peer");
        t.apply_initial_page(page(vec![dm("c", 30), dm("d", 40)], true));
        t.begin_load_older();
        t.apply_older_page(page(vec![dm("b", 20), dm("c", 30)], true));
        assert_eq!(ids(&t), vec!["b", "c", "d"]);
    }

    #[test]
    fn load_older_without_cursor_is_refused() {
        let mut t = MessageThread::new("peer");
        assert_eq!(t.begin_load_older(), None);
        t.apply_initial_page(MessagePage {
            messages: vec![],
            has_more: true,
            oldest_timestamp: None,
        });
        assert_eq!(t.begin_load_older(), None);
    }

    #[test]
    fn push_during_initial_load_survives_page() {
        let mut t = MessageThread::new("peer");
        t.begin_initial_load();
        t.merge(dm("live", 50));
        t.apply_initial_page(page(vec![dm("a", 10), dm("live", 50)], false));
        assert_eq!(ids(&t), vec!["a", "live"]);

        let mut t = MessageThread::new("peer");
        t.begin_initial_load();
        t.merge(dm("live", 60));
        t.apply_initial_page(page(vec![dm("a", 10), dm("b", 50)], false));
        assert_eq!(ids(&t), vec!["a", "b", "live"]);
    }

    #[test]
    fn failure_keeps_messages() {
        let mut t = MessageThread::new("peer");
        t.apply_initial_page(page(vec![dm("a", 10)], true));
        t.begin_load_older();
        t.fail();
        assert_eq!(t.load_state(), ThreadLoadState::Error);
        assert_eq!(ids(&t), vec!["a"]);
        assert!(!t.is_loading_older());
        assert_eq!(t.begin_load_older(), Some(10));
    }
}
