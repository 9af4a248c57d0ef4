//! Error types for a chat turn.

use propchat_core::error::PropChatError;

/// Errors from the chat orchestrator.
///
/// `Persistence` and `Internal` carry detail for the server log only.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("Unauthorized - Please log in")]
    Unauthorized,
    #[error("Missing message or conversationId")]
    BadRequest,
    #[error("failed to save assistant message: {0}")]
    Persistence(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<PropChatError> for ChatError {
    fn from(err: PropChatError) -> Self {
        ChatError::Internal(err.to_string())
    }
}
