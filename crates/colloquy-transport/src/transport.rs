//! The transport trait the controllers are written against.

use async_trait::async_trait;

use colloquy_core::types::{
    Conversation, ConversationId, Exchange, ListFilter, QueryRequest, QueryResult,
};

use crate::error::TransportError;

/// Typed request/response contract with the conversation service.
///
/// Implementations perform I/O only: no caching, no retries, no local
/// business rules. Timeouts surface as [`TransportError::Timeout`].
#[async_trait]
pub trait ConversationTransport: Send + Sync {
    /// List conversation summaries, newest first.
    async fn list_conversations(
        &self,
        filter: &ListFilter,
    ) -> Result<Vec<Conversation>, TransportError>;

    /// Fetch one conversation with its full ordered message history.
    ///
    /// Returns [`TransportError::NotFound`] for unknown ids.
    async fn get_conversation(&self, id: ConversationId) -> Result<Conversation, TransportError>;

    /// Create an active conversation with no messages.
    async fn create_conversation(
        &self,
        title: Option<&str>,
    ) -> Result<Conversation, TransportError>;

    /// Store a user message and return it with the assistant's reply.
    async fn send_message(
        &self,
        conversation_id: ConversationId,
        text: &str,
    ) -> Result<Exchange, TransportError>;

    /// Terminate a conversation. The service performs the analysis and
    /// returns the ended conversation.
    async fn end_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Conversation, TransportError>;

    /// Ask a question about past conversations.
    async fn query_conversations(
        &self,
        request: &QueryRequest,
    ) -> Result<QueryResult, TransportError>;
}
