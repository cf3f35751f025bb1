#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppAction {
    // Thread
    SelectPeer {
        peer_key: String,
    },
    ClearSelection,
    LoadOlder,
    RetryLoad,

    // Compose
    StartNewChat {
        recipient: String,
    },
    Send {
        content: String,
    },

    // Index
    RefreshConversations,

    // UI
    ClearError,

    // Lifecycle
    Shutdown,
}

impl AppAction {
    /// Log-safe action tag (never includes message content).
    pub fn tag(&self) -> &'static str {
        match self {
            // Thread
            AppAction::SelectPeer { .. } => "SelectPeer",
            AppAction::ClearSelection => "ClearSelection",
            AppAction::LoadOlder => "LoadOlder",
            AppAction::RetryLoad => "RetryLoad",

            // Compose
            AppAction::StartNewChat { .. } => "StartNewChat",
            AppAction::Send { .. } => "Send",

            // Index
            AppAction::RefreshConversations => "RefreshConversations",

            // UI
            AppAction::ClearError => "ClearError",

            // Lifecycle
            AppAction::Shutdown => "Shutdown",
        }
    }
}
