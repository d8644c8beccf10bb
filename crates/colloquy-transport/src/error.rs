//! Error types for the transport layer.

use colloquy_core::error::ColloquyError;

/// Failures talking to the conversation service.
///
/// The controllers only branch on [`TransportError::is_not_found`]; every
/// other variant is carried through as the cause of a higher-level error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("request timed out")]
    Timeout,
    #[error("connection error: {0}")]
    Connection(String),
    #[error("service returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("service rejected request: {0}")]
    Rejected(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

impl TransportError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, TransportError::NotFound(_))
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else if err.is_decode() {
            TransportError::Decode(err.to_string())
        } else if err.is_builder() {
            TransportError::InvalidUrl(err.to_string())
        } else {
            TransportError::Connection(err.to_string())
        }
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        TransportError::Decode(err.to_string())
    }
}

impl From<TransportError> for ColloquyError {
    fn from(err: TransportError) -> Self {
        ColloquyError::Transport(err.to_string())
    }
}
