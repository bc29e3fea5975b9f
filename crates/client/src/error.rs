//! Error types for the session sync layer and its ports.

/// Message shown when a request fails without a usable server message.
pub const GENERIC_FAILURE: &str = "Something went wrong. Please try again.";

/// Persistent message once the real-time channel has given up reconnecting.
pub const CONNECTION_LOST: &str =
    "Lost connection to the live board. Reload once your network is back.";

/// Failure of a room API call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// The server answered but refused the operation; the message is shown verbatim
    #[error("{0}")]
    Rejected(String),
    #[error("Request failed: {0}")]
    Transport(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Errors surfaced by [`crate::session::SessionSync`] operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    /// Local input check failed; nothing was sent
    #[error("{0}")]
    Validation(String),
    /// The room API call failed
    #[error("{message}")]
    Request { message: String },
    #[error("Join a room first.")]
    NotInRoom,
    /// Admin-only operation attempted by a non-admin; nothing was sent
    #[error("Only the room admin can do that.")]
    NotAdmin,
    #[error("Not connected to the live board.")]
    NotConnected,
    #[error("Real-time channel error: {0}")]
    Transport(String),
    /// The room changed (leave, logout) before the response arrived; the
    /// response was dropped
    #[error("The room changed before the request finished.")]
    Superseded,
}

impl SyncError {
    pub fn validation(message: impl Into<String>) -> Self {
        SyncError::Validation(message.into())
    }

    /// Text for the shared error slot
    pub fn user_message(&self) -> String {
        self.to_string()
    }
}

impl From<ApiError> for SyncError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Rejected(message) => SyncError::Request { message },
            other => {
                tracing::warn!(error = %other, "Room API request failed");
                SyncError::Request {
                    message: GENERIC_FAILURE.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejections_keep_server_message_verbatim() {
        let err: SyncError = ApiError::Rejected("Invite code expired".into()).into();
        assert_eq!(err.user_message(), "Invite code expired");
    }

    #[test]
    fn transport_failures_fall_back_to_generic_message() {
        let err: SyncError = ApiError::Transport("connection refused".into()).into();
        assert_eq!(err.user_message(), GENERIC_FAILURE);

        let err: SyncError = ApiError::InvalidResponse("expected value".into()).into();
        assert_eq!(err.user_message(), GENERIC_FAILURE);
    }
}
