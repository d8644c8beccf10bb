use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Title shown for conversations the service has not named yet.
pub const DEFAULT_TITLE: &str = "New Conversation";

/// Smallest result limit the search service accepts.
pub const MIN_QUERY_LIMIT: u32 = 1;

/// Largest result limit the search service accepts.
pub const MAX_QUERY_LIMIT: u32 = 20;

/// Result limit used when neither the caller nor the config sets one.
pub const DEFAULT_QUERY_LIMIT: u32 = 5;

// =============================================================================
// Enums
// =============================================================================

/// Lifecycle status of a conversation as reported by the service.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    /// Accepting new messages.
    Active,
    /// Terminated and analyzed. Terminal.
    Ended,
}

impl ConversationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Ended => "ended",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Some(Self::Active),
            "ended" => Some(Self::Ended),
            _ => None,
        }
    }
}

impl fmt::Display for ConversationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Author of a message.
///
/// The service historically labels assistant replies `"ai"`; both spellings
/// deserialize to [`Sender::Assistant`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    User,
    #[serde(alias = "ai")]
    Assistant,
}

impl Sender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Identifiers
// =============================================================================

/// Server-assigned conversation identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(pub i64);

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ConversationId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<i64>()
            .map(Self)
            .map_err(|_| format!("Invalid conversation id: {}", s))
    }
}

/// Server-assigned message identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub i64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Client-generated key for an optimistic message awaiting confirmation.
///
/// Lives in its own type so it can never be confused with a [`MessageId`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProvisionalId(Uuid);

impl ProvisionalId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ProvisionalId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ProvisionalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "local-{}", self.0)
    }
}

// =============================================================================
// Messages
// =============================================================================

/// A message confirmed by the service.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub content: String,
    pub sender: Sender,
    pub timestamp: DateTime<Utc>,
    /// Tokens consumed producing an assistant reply, when reported.
    #[serde(default)]
    pub tokens_used: Option<u32>,
    /// Model that produced an assistant reply, when reported.
    #[serde(default)]
    pub model_used: Option<String>,
}

impl Message {
    pub fn new(
        id: MessageId,
        sender: Sender,
        content: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            content: content.into(),
            sender,
            timestamp,
            tokens_used: None,
            model_used: None,
        }
    }
}

/// Short preview of the latest message, attached to list summaries.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MessagePreview {
    pub content: String,
    pub sender: Sender,
    pub timestamp: DateTime<Utc>,
}

/// The pair of messages the service stores for one user turn.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Exchange {
    pub user_message: Message,
    pub assistant_message: Message,
}

// =============================================================================
// Conversations
// =============================================================================

/// Post-conversation analysis produced by the service on termination.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationAnalysis {
    pub summary: Option<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub key_points: Vec<String>,
    pub sentiment: Option<String>,
}

/// Where a conversation is in its lifecycle.
///
/// Analysis only exists on the `Ended` variant, so an active conversation
/// cannot carry analysis fields and ending sets them in one step.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Lifecycle {
    Active,
    Ended {
        ended_at: Option<DateTime<Utc>>,
        analysis: ConversationAnalysis,
    },
}

/// A conversation as known to the client.
///
/// List endpoints return summaries with an empty `messages` vector; detail
/// endpoints include the full ordered history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub title: Option<String>,
    pub lifecycle: Lifecycle,
    pub message_count: u32,
    pub start_timestamp: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_message: Option<MessagePreview>,
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl Conversation {
    /// Build a fresh active conversation with no messages.
    pub fn new_active(
        id: ConversationId,
        title: Option<String>,
        start_timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            title,
            lifecycle: Lifecycle::Active,
            message_count: 0,
            start_timestamp,
            updated_at: Some(start_timestamp),
            last_message: None,
            messages: Vec::new(),
        }
    }

    pub fn status(&self) -> ConversationStatus {
        match self.lifecycle {
            Lifecycle::Active => ConversationStatus::Active,
            Lifecycle::Ended { .. } => ConversationStatus::Ended,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.lifecycle, Lifecycle::Active)
    }

    pub fn analysis(&self) -> Option<&ConversationAnalysis> {
        match &self.lifecycle {
            Lifecycle::Active => None,
            Lifecycle::Ended { analysis, .. } => Some(analysis),
        }
    }

    pub fn end_timestamp(&self) -> Option<DateTime<Utc>> {
        match &self.lifecycle {
            Lifecycle::Active => None,
            Lifecycle::Ended { ended_at, .. } => *ended_at,
        }
    }

    /// Elapsed time between start and end. `None` while active.
    pub fn duration(&self) -> Option<Duration> {
        self.end_timestamp()
            .map(|ended_at| ended_at - self.start_timestamp)
    }

    /// Title for display, falling back to [`DEFAULT_TITLE`].
    pub fn display_title(&self) -> &str {
        match self.title.as_deref() {
            Some(title) if !title.trim().is_empty() => title,
            _ => DEFAULT_TITLE,
        }
    }

    /// Move an active conversation to `Ended`, attaching its analysis.
    ///
    /// Returns `false` and leaves the conversation untouched if it had
    /// already ended.
    pub fn end(&mut self, ended_at: DateTime<Utc>, analysis: ConversationAnalysis) -> bool {
        if !self.is_active() {
            return false;
        }
        self.lifecycle = Lifecycle::Ended {
            ended_at: Some(ended_at),
            analysis,
        };
        self.updated_at = Some(ended_at);
        true
    }
}

/// Filter for listing conversations.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListFilter {
    pub status: Option<ConversationStatus>,
    /// Case-insensitive match against title and summary.
    pub search: Option<String>,
}

impl ListFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn active() -> Self {
        Self {
            status: Some(ConversationStatus::Active),
            search: None,
        }
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }
}

// =============================================================================
// Intelligence queries
// =============================================================================

/// A natural-language question about past conversations.
///
/// Date bounds are always held in UTC; the builder methods convert from any
/// timezone at the point of construction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
}

impl QueryRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            date_from: None,
            date_to: None,
            limit: None,
        }
    }

    pub fn with_date_from<Tz: TimeZone>(mut self, from: DateTime<Tz>) -> Self {
        self.date_from = Some(from.with_timezone(&Utc));
        self
    }

    pub fn with_date_to<Tz: TimeZone>(mut self, to: DateTime<Tz>) -> Self {
        self.date_to = Some(to.with_timezone(&Utc));
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Answer to an intelligence query.
///
/// `relevant_conversations` keeps the service's relevance order, most
/// relevant first.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub answer: String,
    pub relevant_conversations: Vec<Conversation>,
}

impl QueryResult {
    pub fn new(answer: impl Into<String>, relevant_conversations: Vec<Conversation>) -> Self {
        Self {
            answer: answer.into(),
            relevant_conversations,
        }
    }

    /// Number of relevant conversations. Always equals the vector length.
    pub fn count(&self) -> usize {
        self.relevant_conversations.len()
    }

    /// True for the "no relevant conversations" outcome.
    pub fn is_empty(&self) -> bool {
        self.relevant_conversations.is_empty()
    }
}
