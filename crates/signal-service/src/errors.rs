//! Signal service error types.
//!
//! Client-facing failures surface as the wire `error { message }` event via
//! [`SignalError::client_message`]; internal details stay in server logs.

use thiserror::Error;

/// Signal service error type.
#[derive(Debug, Error)]
pub enum SignalError {
    /// A non-host attempted a host-only action.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Room does not exist.
    #[error("Room not found: {0}")]
    RoomNotFound(String),

    /// Target connection not in the expected list (e.g. admitting a
    /// connection that is not pending).
    #[error("Participant not found: {0}")]
    ParticipantNotFound(String),

    /// Configuration error during startup.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error (channel breakage, serialization).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SignalError {
    /// Returns a client-safe error message (no internal details).
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            SignalError::PermissionDenied(msg) => msg.clone(),
            SignalError::RoomNotFound(_) => "Room not found".to_string(),
            SignalError::ParticipantNotFound(_) => "Participant not found".to_string(),
            SignalError::Config(_) | SignalError::Internal(_) => {
                "An internal error occurred".to_string()
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn client_messages_hide_internal_details() {
        let err = SignalError::Internal("mpsc send failed: channel closed".to_string());
        assert_eq!(err.client_message(), "An internal error occurred");
        assert!(!err.client_message().contains("mpsc"));

        let err = SignalError::RoomNotFound("room-with-private-name".to_string());
        assert_eq!(err.client_message(), "Room not found");
        assert!(!err.client_message().contains("private"));
    }

    #[test]
    fn permission_denied_passes_its_message_through() {
        let err = SignalError::PermissionDenied("Only the host can admit participants".to_string());
        assert_eq!(
            err.client_message(),
            "Only the host can admit participants"
        );
    }

    #[test]
    fn display_formatting() {
        assert_eq!(
            format!("{}", SignalError::RoomNotFound("r1".to_string())),
            "Room not found: r1"
        );
        assert_eq!(
            format!("{}", SignalError::Config("bad bind address".to_string())),
            "Configuration error: bad bind address"
        );
    }
}
