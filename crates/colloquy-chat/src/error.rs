//! Error types for the session and query controllers.

use colloquy_core::error::ColloquyError;
use colloquy_core::types::ConversationId;
use colloquy_transport::TransportError;

/// Errors surfaced by the controllers.
///
/// Every variant that stems from a remote failure keeps the transport error
/// as its source. Local state has already been restored when one of these
/// is returned.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("failed to create conversation: {0}")]
    Creation(#[source] TransportError),
    #[error("conversation not found: {0}")]
    NotFound(ConversationId),
    #[error("failed to send message: {0}")]
    Send(#[source] TransportError),
    #[error("failed to end conversation: {0}")]
    Termination(#[source] TransportError),
    #[error("invalid query: {0}")]
    InvalidQuery(String),
    #[error("query failed: {0}")]
    Query(#[source] TransportError),
    #[error("transport error: {0}")]
    Transport(#[source] TransportError),
    #[error("no active conversation")]
    NoActiveConversation,
    #[error("superseded by a newer request")]
    Superseded,
}

impl ChatError {
    /// The remote failure behind this error, if any.
    pub fn transport_cause(&self) -> Option<&TransportError> {
        match self {
            Self::Creation(e)
            | Self::Send(e)
            | Self::Termination(e)
            | Self::Query(e)
            | Self::Transport(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ChatError> for ColloquyError {
    fn from(err: ChatError) -> Self {
        ColloquyError::Chat(err.to_string())
    }
}
