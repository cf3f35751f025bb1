//! Per-peer conversation summaries, replaced wholesale on every refresh.

use std::collections::HashSet;

use crate::state::ConversationSummary;

/// Holds the last applied conversation list.
///
/// Refreshes may be issued from several triggers at once and resolve in any
/// order. Each one takes a ticket from [`ConversationIndex::begin_refresh`];
/// a result is applied only if its ticket is newer than the last applied one.
#[derive(Debug, Default)]
pub struct ConversationIndex {
    summaries: Vec<ConversationSummary>,
    issued_seq: u64,
    applied_seq: u64,
}

impl ConversationIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn summaries(&self) -> &[ConversationSummary] {
        &self.summaries
    }

    pub fn get(&self, peer_key: &str) -> Option<&ConversationSummary> {
        self.summaries.iter().find(|c| c.peer_key == peer_key)
    }

    pub fn begin_refresh(&mut self) -> u64 {
        self.issued_seq += 1;
        self.issued_seq
    }

    pub fn in_flight(&self) -> bool {
        self.issued_seq > self.applied_seq
    }

    /// Apply a completed refresh. Returns false if a newer one already landed.
    pub fn apply(&mut self, seq: u64, summaries: Vec<ConversationSummary>) -> bool {
        if seq <= self.applied_seq {
            return false;
        }
        self.applied_seq = seq;
        let mut seen = HashSet::new();
        self.summaries = summaries
            .into_iter()
            .filter(|c| seen.insert(c.peer_key.clone()))
            .collect();
        true
    }

    pub fn for_each_mut(&mut self, f: impl FnMut(&mut ConversationSummary)) {
        self.summaries.iter_mut().for_each(f);
    }

    pub fn clear(&mut self) {
        self.summaries.clear();
    }
}
