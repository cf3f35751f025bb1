//! Session-scoped `peer key -> tag` memory.
//!
//! Wallet responses are inconsistent about tags: the conversation list may carry
//! a peer's tag while a later message page omits it. Every tag seen for a
//! non-self participant is remembered here so the UI can keep showing `@tag`
//! instead of a raw key for the rest of the session.

use std::num::NonZeroUsize;
use std::sync::{Arc, RwLock};

use lru::LruCache;

use crate::state::{strip_at_prefix, DirectMessage};

pub const DEFAULT_IDENTITY_CACHE_CAPACITY: usize = 4096;

pub type SharedIdentityCache = Arc<RwLock<IdentityCache>>;

#[derive(Debug)]
pub struct IdentityCache {
    tags: LruCache<String, String>,
}

impl IdentityCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            tags: LruCache::new(capacity),
        }
    }

    pub fn shared(capacity: usize) -> SharedIdentityCache {
        Arc::new(RwLock::new(Self::new(capacity)))
    }

    /// Store `tag` for `peer_key`. Absent or blank values never overwrite.
    pub fn remember(&mut self, peer_key: &str, tag: Option<&str>) {
        let peer_key = peer_key.trim();
        let Some(tag) = tag.map(|t| strip_at_prefix(t.trim())).filter(|t| !t.is_empty()) else {
            return;
        };
        if peer_key.is_empty() {
            return;
        }
        self.tags.put(peer_key.to_string(), tag.to_string());
    }

    pub fn lookup(&self, peer_key: &str) -> Option<&str> {
        self.tags.peek(peer_key).map(String::as_str)
    }

    /// Fresh tag from the current source wins; the cache is the fallback.
    pub fn resolve<'a>(&'a self, peer_key: &str, fresh: Option<&'a str>) -> Option<&'a str> {
        fresh
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(strip_at_prefix)
            .or_else(|| self.lookup(peer_key))
    }

    /// Learn tags for every participant of `message` other than `self_key`.
    pub fn learn_from_message(&mut self, message: &DirectMessage, self_key: &str) {
        if message.sender_key != self_key {
            self.remember(&message.sender_key, message.sender_tag.as_deref());
        }
        if message.recipient_key != self_key {
            self.remember(&message.recipient_key, message.recipient_tag.as_deref());
        }
    }

    /// Fill in missing tags on `message` from the cache.
    pub fn backfill(&self, message: &mut DirectMessage) {
        if message.sender_tag.as_deref().map_or(true, str::is_empty) {
            message.sender_tag = self.lookup(&message.sender_key).map(str::to_string);
        }
        if message.recipient_tag.as_deref().map_or(true, str::is_empty) {
            message.recipient_tag = self.lookup(&message.recipient_key).map(str::to_string);
        }
    }

    /// Reverse lookup, used to match a new conversation by the tag it was sent to.
    pub fn key_for_tag(&self, tag: &str) -> Option<&str> {
        let tag = strip_at_prefix(tag.trim());
        self.tags
            .iter()
            .find(|(_, t)| t.eq_ignore_ascii_case(tag))
            .map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

impl Default for IdentityCache {
    fn default() -> Self {
        Self::new(DEFAULT_IDENTITY_CACHE_CAPACITY)
    }
}
