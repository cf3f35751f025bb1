//! Error types for wallet transport calls.

use thiserror::Error;

/// Failure reported by a [`crate::WalletTransport`] call.
///
/// The engine never treats one of these as fatal. Refresh-style callers log and
/// drop them; user-initiated operations surface [`Self::user_visible_message`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The wallet did not grant the read scope this call needs.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The request failed or timed out; a later attempt may succeed.
    #[error("fetch failed: {0}")]
    Fetch(String),

    /// The wallet (or its user) refused to send the message.
    #[error("send rejected: {0}")]
    SendRejected(String),

    /// The wallet connection is gone.
    #[error("wallet disconnected")]
    Disconnected,
}

impl TransportError {
    pub fn user_visible_message(&self) -> String {
        match self {
            TransportError::PermissionDenied(_) => "Message history access not granted".into(),
            TransportError::Fetch(msg) | TransportError::SendRejected(msg) => msg.clone(),
            TransportError::Disconnected => "Wallet disconnected".into(),
        }
    }

    pub fn is_permission_denied(&self) -> bool {
        matches!(self, TransportError::PermissionDenied(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_detail() {
        let err = TransportError::Fetch("timeout".to_string());
        assert_eq!(err.to_string(), "fetch failed: timeout");

        let err = TransportError::PermissionDenied("dm:read".to_string());
        assert_eq!(err.to_string(), "permission denied: dm:read");

        assert_eq!(TransportError::Disconnected.to_string(), "wallet disconnected");
    }

    #[test]
    fn user_visible_message_hides_scope_names() {
        let err = TransportError::PermissionDenied("dm:read".to_string());
        assert_eq!(err.user_visible_message(), "Message history access not granted");
        assert!(err.is_permission_denied());

        let err = TransportError::SendRejected("User rejected".to_string());
        assert_eq!(err.user_visible_message(), "User rejected");
        assert!(!err.is_permission_denied());
    }
}
