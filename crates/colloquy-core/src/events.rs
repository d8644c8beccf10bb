use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{ConversationId, MessageId, ProvisionalId};

/// User-initiated operations the controllers perform.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientOperation {
    StartConversation,
    LoadConversation,
    SendMessage,
    EndConversation,
    ListConversations,
    Query,
}

impl ClientOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StartConversation => "start_conversation",
            Self::LoadConversation => "load_conversation",
            Self::SendMessage => "send_message",
            Self::EndConversation => "end_conversation",
            Self::ListConversations => "list_conversations",
            Self::Query => "query",
        }
    }
}

impl fmt::Display for ClientOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observable state changes and failures published by the controllers.
///
/// Consumed by a notifier supplied by the presentation layer (console
/// output, dialogs, logs).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum ClientEvent {
    // =========================================================================
    // Session Events
    // =========================================================================
    /// A new conversation was created and bound as active.
    ConversationStarted { conversation_id: ConversationId },

    /// An existing conversation was fetched and bound as active.
    ConversationLoaded {
        conversation_id: ConversationId,
        message_count: usize,
    },

    /// A provisional message was replaced by its confirmed pair.
    MessageConfirmed {
        conversation_id: ConversationId,
        provisional_id: ProvisionalId,
        user_message_id: MessageId,
        assistant_message_id: MessageId,
    },

    /// A provisional message was removed after its send failed.
    MessageRolledBack {
        conversation_id: ConversationId,
        provisional_id: ProvisionalId,
    },

    /// The active conversation was terminated and detached.
    ConversationEnded { conversation_id: ConversationId },

    /// The known-conversations list was refreshed.
    ConversationsRefreshed { count: usize },

    // =========================================================================
    // Query Events
    // =========================================================================
    /// The latest query produced a result.
    QueryAnswered { sequence: u64, count: usize },

    /// A response arrived for a query that was no longer the latest.
    QueryDiscarded { sequence: u64 },

    // =========================================================================
    // Failures
    // =========================================================================
    /// An operation failed; local state was restored.
    OperationFailed {
        operation: ClientOperation,
        message: String,
    },
}

impl ClientEvent {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::OperationFailed { .. })
    }
}

impl fmt::Display for ClientEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConversationStarted { conversation_id } => {
                write!(f, "Conversation {} started", conversation_id)
            }
            Self::ConversationLoaded {
                conversation_id,
                message_count,
            } => write!(
                f,
                "Conversation {} loaded ({} messages)",
                conversation_id, message_count
            ),
            Self::MessageConfirmed {
                conversation_id, ..
            } => write!(f, "Message delivered in conversation {}", conversation_id),
            Self::MessageRolledBack {
                conversation_id, ..
            } => write!(f, "Message not delivered in conversation {}", conversation_id),
            Self::ConversationEnded { conversation_id } => write!(
                f,
                "Conversation {} ended and analyzed successfully",
                conversation_id
            ),
            Self::ConversationsRefreshed { count } => {
                write!(f, "{} active conversations", count)
            }
            Self::QueryAnswered { count, .. } => {
                write!(f, "{} relevant conversations found", count)
            }
            Self::QueryDiscarded { sequence } => {
                write!(f, "Discarded stale response for query #{}", sequence)
            }
            Self::OperationFailed { operation, message } => {
                write!(f, "Failed to {}: {}", operation.as_str().replace('_', " "), message)
            }
        }
    }
}
