use thiserror::Error;

use crate::models::ChatId;

/// Failures surfaced at the service and channel boundaries.
///
/// Variants carry rendered messages rather than source errors so outcomes can
/// be cloned into the session view and reported more than once.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    /// The request never produced a response (connection refused, reset, timeout).
    #[error("transport error: {0}")]
    Transport(String),

    /// The server answered with a non-success status.
    #[error("server returned {status}: {message}")]
    Status { status: u16, message: String },

    /// The response body did not have the expected shape.
    #[error("unexpected response body: {0}")]
    Decode(String),

    /// The server answered 2xx but reported `success: false`.
    #[error("request rejected: {0}")]
    Rejected(String),

    /// The realtime channel task has shut down.
    #[error("realtime channel closed")]
    ChannelClosed,

    /// An event or response for a chat that is no longer active.
    #[error("stale event for chat {chat_id}")]
    StaleEvent { chat_id: ChatId },
}

impl From<reqwest::Error> for ChatError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ChatError::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            ChatError::Status {
                status: status.as_u16(),
                message: e.to_string(),
            }
        } else {
            ChatError::Transport(e.to_string())
        }
    }
}

impl From<serde_json::Error> for ChatError {
    fn from(e: serde_json::Error) -> Self {
        ChatError::Decode(e.to_string())
    }
}
