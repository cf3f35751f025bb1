use crate::error::TransportError;
use crate::state::{AppState, ConversationSummary, DirectMessage};
use crate::transport::{MessagePage, SendAck};
use crate::AppAction;

#[derive(Clone, Debug)]
pub enum AppUpdate {
    FullState(AppState),
    /// A pushed message was folded in. Sent after the matching `FullState`.
    MessageReceived {
        rev: u64,
        message: DirectMessage,
        peer_display: String,
    },
}

impl AppUpdate {
    pub fn rev(&self) -> u64 {
        match self {
            AppUpdate::FullState(s) => s.rev,
            AppUpdate::MessageReceived { rev, .. } => *rev,
        }
    }
}

#[derive(Debug)]
pub enum CoreMsg {
    Action(AppAction),
    Internal(Box<InternalEvent>),
}

#[derive(Debug)]
pub enum InternalEvent {
    // Push path
    IncomingEvent {
        token: u64,
        payload: serde_json::Value,
    },

    // Async results
    ConversationsFetched {
        seq: u64,
        result: Result<Vec<ConversationSummary>, TransportError>,
    },
    PageLoaded {
        generation: u64,
        peer_key: String,
        result: Result<MessagePage, TransportError>,
    },
    OlderPageLoaded {
        generation: u64,
        peer_key: String,
        result: Result<MessagePage, TransportError>,
    },
    ReceiptsSubmitted {
        count: usize,
        ok: bool,
    },
    SendCompleted {
        to: String,
        new_chat: bool,
        result: Result<SendAck, TransportError>,
    },
}
