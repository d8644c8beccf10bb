//! JSON shapes exchanged with the conversation service.
//!
//! Every response is wrapped in an envelope carrying a `success` flag and,
//! on failure, an `error` string or a field-level `errors` object. Bodies
//! are converted into `colloquy_core` types at this boundary so nothing
//! above the transport sees wire details.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use colloquy_core::types::{
    Conversation, ConversationAnalysis, ConversationId, ConversationStatus, Exchange, Lifecycle,
    Message, MessageId, MessagePreview, QueryRequest, QueryResult, Sender,
};

use crate::error::TransportError;

// =============================================================================
// Envelope
// =============================================================================

fn default_success() -> bool {
    true
}

/// Common response wrapper.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    #[serde(default = "default_success")]
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub errors: Option<serde_json::Value>,
    #[serde(flatten)]
    pub body: T,
}

impl<T> Envelope<T> {
    /// Unwrap the body, turning `success: false` into [`TransportError::Rejected`].
    pub fn into_body(self) -> Result<T, TransportError> {
        if self.success {
            Ok(self.body)
        } else {
            Err(TransportError::Rejected(self.failure_message()))
        }
    }

    /// Best human-readable explanation the service gave for a failure.
    pub fn failure_message(&self) -> String {
        if let Some(ref error) = self.error {
            return error.clone();
        }
        if let Some(ref errors) = self.errors {
            return errors.to_string();
        }
        "request failed".to_string()
    }
}

// =============================================================================
// Response bodies
// =============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct ConversationListBody {
    #[serde(default)]
    pub conversations: Vec<WireConversation>,
}

impl ConversationListBody {
    pub fn into_conversations(self) -> Vec<Conversation> {
        self.conversations
            .into_iter()
            .map(WireConversation::into_conversation)
            .collect()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ConversationBody {
    #[serde(default)]
    pub conversation: Option<WireConversation>,
}

impl ConversationBody {
    pub fn into_conversation(self) -> Result<Conversation, TransportError> {
        self.conversation
            .map(WireConversation::into_conversation)
            .ok_or_else(|| TransportError::Decode("response missing conversation".to_string()))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SendMessageBody {
    #[serde(default)]
    pub user_message: Option<WireMessage>,
    #[serde(default)]
    pub ai_response: Option<WireMessage>,
}

impl SendMessageBody {
    pub fn into_exchange(self) -> Result<Exchange, TransportError> {
        let user_message = self
            .user_message
            .ok_or_else(|| TransportError::Decode("response missing user_message".to_string()))?;
        let assistant_message = self
            .ai_response
            .ok_or_else(|| TransportError::Decode("response missing ai_response".to_string()))?;
        Ok(Exchange {
            user_message: user_message.into_message(),
            assistant_message: assistant_message.into_message(),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct QueryBody {
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub relevant_conversations: Vec<WireConversation>,
    #[serde(default)]
    pub count: Option<usize>,
}

impl QueryBody {
    /// Convert to a [`QueryResult`], keeping the service's ranking.
    ///
    /// The result's count is the length of the list; a disagreeing `count`
    /// field is logged and ignored.
    pub fn into_result(self) -> QueryResult {
        if let Some(count) = self.count {
            if count != self.relevant_conversations.len() {
                warn!(
                    reported = count,
                    received = self.relevant_conversations.len(),
                    "Query count does not match relevant conversations"
                );
            }
        }
        let relevant = self
            .relevant_conversations
            .into_iter()
            .map(WireConversation::into_conversation)
            .collect();
        QueryResult::new(self.answer.unwrap_or_default(), relevant)
    }
}

// =============================================================================
// Records
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireMessage {
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation: Option<i64>,
    pub content: String,
    pub sender: Sender,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub tokens_used: Option<u32>,
    #[serde(default)]
    pub model_used: Option<String>,
}

impl WireMessage {
    pub fn into_message(self) -> Message {
        Message {
            id: MessageId(self.id),
            content: self.content,
            sender: self.sender,
            timestamp: self.timestamp,
            tokens_used: self.tokens_used,
            model_used: self.model_used,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireMessagePreview {
    pub content: String,
    pub sender: Sender,
    pub timestamp: DateTime<Utc>,
}

/// Conversation as serialized by both the list and detail endpoints.
///
/// Analysis fields are flat on the wire; they are only honoured for ended
/// conversations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireConversation {
    pub id: i64,
    #[serde(default)]
    pub title: Option<String>,
    pub status: ConversationStatus,
    pub start_timestamp: DateTime<Utc>,
    #[serde(default)]
    pub end_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub topics: Option<Vec<String>>,
    #[serde(default)]
    pub key_points: Option<Vec<String>>,
    #[serde(default)]
    pub sentiment: Option<String>,
    #[serde(default)]
    pub message_count: Option<u32>,
    #[serde(default)]
    pub last_message: Option<WireMessagePreview>,
    #[serde(default)]
    pub messages: Vec<WireMessage>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl WireConversation {
    fn has_analysis(&self) -> bool {
        self.summary.is_some()
            || self.sentiment.is_some()
            || self.topics.as_ref().is_some_and(|t| !t.is_empty())
            || self.key_points.as_ref().is_some_and(|k| !k.is_empty())
    }

    pub fn into_conversation(self) -> Conversation {
        let lifecycle = match self.status {
            ConversationStatus::Active => {
                if self.has_analysis() {
                    debug!(
                        conversation_id = self.id,
                        "Ignoring analysis fields on active conversation"
                    );
                }
                Lifecycle::Active
            }
            ConversationStatus::Ended => Lifecycle::Ended {
                ended_at: self.end_timestamp,
                analysis: ConversationAnalysis {
                    summary: self.summary,
                    topics: self.topics.unwrap_or_default(),
                    key_points: self.key_points.unwrap_or_default(),
                    sentiment: self.sentiment,
                },
            },
        };

        let messages: Vec<Message> = self
            .messages
            .into_iter()
            .map(WireMessage::into_message)
            .collect();
        let message_count = self
            .message_count
            .unwrap_or_else(|| u32::try_from(messages.len()).unwrap_or(u32::MAX));

        Conversation {
            id: ConversationId(self.id),
            title: self.title,
            lifecycle,
            message_count,
            start_timestamp: self.start_timestamp,
            updated_at: self.updated_at,
            last_message: self.last_message.map(|p| MessagePreview {
                content: p.content,
                sender: p.sender,
                timestamp: p.timestamp,
            }),
            messages,
        }
    }
}

// =============================================================================
// Requests
// =============================================================================

#[derive(Debug, Serialize)]
pub struct CreateConversationRequest<'a> {
    pub title: &'a str,
}

#[derive(Debug, Serialize)]
pub struct SendMessageRequest<'a> {
    pub conversation_id: i64,
    pub message: &'a str,
}

#[derive(Debug, Serialize)]
pub struct EndConversationRequest {
    pub conversation_id: i64,
}

/// Body of the intelligence query endpoint. Dates go out as ISO 8601 UTC
/// with millisecond precision and a `Z` suffix.
#[derive(Debug, Serialize)]
pub struct QueryConversationsRequest<'a> {
    pub query: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

fn iso_utc(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl<'a> From<&'a QueryRequest> for QueryConversationsRequest<'a> {
    fn from(request: &'a QueryRequest) -> Self {
        Self {
            query: &request.query,
            date_from: request.date_from.as_ref().map(iso_utc),
            date_to: request.date_to.as_ref().map(iso_utc),
            limit: request.limit,
        }
    }
}
