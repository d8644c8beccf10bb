//! In-memory stand-in for the conversation service.
//!
//! Behaves like the real service for the operations the client uses
//! (id assignment, status checks, analysis on termination, date-filtered
//! search) and lets tests inject failures and hold responses to force a
//! particular resolution order.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::oneshot;

use colloquy_core::types::{
    Conversation, ConversationAnalysis, ConversationId, ConversationStatus, Exchange, ListFilter,
    Message, MessageId, MessagePreview, QueryRequest, QueryResult, Sender,
};

use crate::error::TransportError;
use crate::transport::ConversationTransport;

/// Answer the service gives when nothing matches.
pub const NO_MATCH_ANSWER: &str = "No relevant conversations found for your query.";

const DEFAULT_QUERY_LIMIT: usize = 5;
const TITLE_PREVIEW_CHARS: usize = 50;
const PREVIEW_CHARS: usize = 100;

/// Transport operations, used to target failures and holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Endpoint {
    ListConversations,
    GetConversation,
    CreateConversation,
    SendMessage,
    EndConversation,
    QueryConversations,
}

/// A call received by the fake, in arrival order.
#[derive(Clone, Debug, PartialEq)]
pub enum RecordedCall {
    ListConversations(ListFilter),
    GetConversation(ConversationId),
    CreateConversation(Option<String>),
    SendMessage {
        conversation_id: ConversationId,
        text: String,
    },
    EndConversation(ConversationId),
    QueryConversations(QueryRequest),
}

impl RecordedCall {
    pub fn endpoint(&self) -> Endpoint {
        match self {
            Self::ListConversations(_) => Endpoint::ListConversations,
            Self::GetConversation(_) => Endpoint::GetConversation,
            Self::CreateConversation(_) => Endpoint::CreateConversation,
            Self::SendMessage { .. } => Endpoint::SendMessage,
            Self::EndConversation(_) => Endpoint::EndConversation,
            Self::QueryConversations(_) => Endpoint::QueryConversations,
        }
    }
}

/// Releases one held response. Dropping the gate releases it as well.
pub struct Gate(oneshot::Sender<()>);

impl Gate {
    pub fn open(self) {
        let _ = self.0.send(());
    }
}

struct FakeState {
    /// Newest first, like the service's default ordering.
    conversations: Vec<Conversation>,
    next_conversation_id: i64,
    next_message_id: i64,
    reply: Option<String>,
    failures: HashMap<Endpoint, VecDeque<TransportError>>,
    holds: HashMap<Endpoint, VecDeque<oneshot::Receiver<()>>>,
    query_results: VecDeque<Result<QueryResult, TransportError>>,
    calls: Vec<RecordedCall>,
}

/// Stateful fake of the conversation service.
pub struct MockTransport {
    state: Mutex<FakeState>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState {
                conversations: Vec::new(),
                next_conversation_id: 1,
                next_message_id: 1,
                reply: None,
                failures: HashMap::new(),
                holds: HashMap::new(),
                query_results: VecDeque::new(),
                calls: Vec::new(),
            }),
        }
    }

    /// First id handed to the next created conversation.
    pub fn with_next_conversation_id(self, id: i64) -> Self {
        self.state().next_conversation_id = id;
        self
    }

    /// First id handed to the next stored message.
    pub fn with_next_message_id(self, id: i64) -> Self {
        self.state().next_message_id = id;
        self
    }

    /// Fixed assistant reply. Without one the fake echoes the user text.
    pub fn with_reply(self, reply: impl Into<String>) -> Self {
        self.state().reply = Some(reply.into());
        self
    }

    /// Seed an existing conversation (active or ended).
    pub fn with_conversation(self, conversation: Conversation) -> Self {
        {
            let mut state = self.state();
            state.next_conversation_id = state.next_conversation_id.max(conversation.id.0 + 1);
            let max_message = conversation.messages.iter().map(|m| m.id.0).max();
            if let Some(max_message) = max_message {
                state.next_message_id = state.next_message_id.max(max_message + 1);
            }
            state.conversations.push(conversation);
            state
                .conversations
                .sort_by(|a, b| b.start_timestamp.cmp(&a.start_timestamp));
        }
        self
    }

    /// Make the next call to `endpoint` fail with `error`.
    pub fn fail_next(&self, endpoint: Endpoint, error: TransportError) {
        self.state()
            .failures
            .entry(endpoint)
            .or_default()
            .push_back(error);
    }

    /// Hold the response of the next call to `endpoint` until the returned
    /// gate is opened. The call's effects are applied on arrival; only the
    /// response is delayed.
    pub fn hold_next(&self, endpoint: Endpoint) -> Gate {
        let (tx, rx) = oneshot::channel();
        self.state().holds.entry(endpoint).or_default().push_back(rx);
        Gate(tx)
    }

    /// Script the outcome of the next query instead of searching.
    pub fn push_query_result(&self, result: Result<QueryResult, TransportError>) {
        self.state().query_results.push_back(result);
    }

    /// Every call received so far.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state().calls.clone()
    }

    pub fn call_count(&self, endpoint: Endpoint) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|c| c.endpoint() == endpoint)
            .count()
    }

    /// Server-side view of a conversation.
    pub fn conversation(&self, id: ConversationId) -> Option<Conversation> {
        self.state()
            .conversations
            .iter()
            .find(|c| c.id == id)
            .cloned()
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record the call, then either apply `handler` or consume an injected
    /// failure. Returns the outcome plus any hold registered for the endpoint.
    fn dispatch<T>(
        &self,
        call: RecordedCall,
        handler: impl FnOnce(&mut FakeState) -> Result<T, TransportError>,
    ) -> (Result<T, TransportError>, Option<oneshot::Receiver<()>>) {
        let mut state = self.state();
        let endpoint = call.endpoint();
        state.calls.push(call);

        let hold = state.holds.get_mut(&endpoint).and_then(VecDeque::pop_front);
        let injected = state
            .failures
            .get_mut(&endpoint)
            .and_then(VecDeque::pop_front);
        let outcome = match injected {
            Some(error) => Err(error),
            None => handler(&mut state),
        };
        (outcome, hold)
    }

    async fn respond<T>(
        outcome: Result<T, TransportError>,
        hold: Option<oneshot::Receiver<()>>,
    ) -> Result<T, TransportError> {
        if let Some(hold) = hold {
            // A dropped gate counts as opened.
            let _ = hold.await;
        }
        outcome
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

fn find_mut(
    state: &mut FakeState,
    id: ConversationId,
) -> Result<&mut Conversation, TransportError> {
    state
        .conversations
        .iter_mut()
        .find(|c| c.id == id)
        .ok_or_else(|| TransportError::NotFound(format!("conversation {}", id)))
}

fn summary_of(conversation: &Conversation) -> Conversation {
    let mut summary = conversation.clone();
    summary.messages.clear();
    summary
}

fn matches_search(conversation: &Conversation, search: &str) -> bool {
    let needle = search.to_lowercase();
    let in_title = conversation
        .title
        .as_deref()
        .is_some_and(|t| t.to_lowercase().contains(&needle));
    let in_summary = conversation
        .analysis()
        .and_then(|a| a.summary.as_deref())
        .is_some_and(|s| s.to_lowercase().contains(&needle));
    in_title || in_summary
}

fn relevance(conversation: &Conversation, terms: &[String]) -> usize {
    let mut haystack = conversation.title.clone().unwrap_or_default();
    if let Some(analysis) = conversation.analysis() {
        haystack.push(' ');
        haystack.push_str(analysis.summary.as_deref().unwrap_or_default());
        for topic in &analysis.topics {
            haystack.push(' ');
            haystack.push_str(topic);
        }
    }
    for message in &conversation.messages {
        haystack.push(' ');
        haystack.push_str(&message.content);
    }
    let haystack = haystack.to_lowercase();
    terms.iter().filter(|t| haystack.contains(t.as_str())).count()
}

fn search(state: &FakeState, request: &QueryRequest) -> QueryResult {
    let terms: Vec<String> = request
        .query
        .split_whitespace()
        .map(str::to_lowercase)
        .filter(|t| t.chars().count() > 2)
        .collect();

    let mut scored: Vec<(usize, &Conversation)> = state
        .conversations
        .iter()
        .filter(|c| c.status() == ConversationStatus::Ended)
        .filter(|c| request.date_from.is_none_or(|from| c.start_timestamp >= from))
        .filter(|c| request.date_to.is_none_or(|to| c.start_timestamp <= to))
        .map(|c| (relevance(c, &terms), c))
        .filter(|(score, _)| *score > 0)
        .collect();
    // Stable: ties keep newest-first order.
    scored.sort_by(|a, b| b.0.cmp(&a.0));

    let limit = request
        .limit
        .map(|l| l as usize)
        .unwrap_or(DEFAULT_QUERY_LIMIT);
    let relevant: Vec<Conversation> = scored
        .into_iter()
        .take(limit)
        .map(|(_, c)| c.clone())
        .collect();

    if relevant.is_empty() {
        QueryResult::new(NO_MATCH_ANSWER, relevant)
    } else {
        let answer = format!(
            "Found {} relevant conversation(s) about \"{}\".",
            relevant.len(),
            request.query
        );
        QueryResult::new(answer, relevant)
    }
}

#[async_trait]
impl ConversationTransport for MockTransport {
    async fn list_conversations(
        &self,
        filter: &ListFilter,
    ) -> Result<Vec<Conversation>, TransportError> {
        let (outcome, hold) =
            self.dispatch(RecordedCall::ListConversations(filter.clone()), |state| {
                Ok(state
                    .conversations
                    .iter()
                    .filter(|c| filter.status.is_none_or(|s| c.status() == s))
                    .filter(|c| {
                        filter
                            .search
                            .as_deref()
                            .is_none_or(|s| matches_search(c, s))
                    })
                    .map(summary_of)
                    .collect())
            });
        Self::respond(outcome, hold).await
    }

    async fn get_conversation(&self, id: ConversationId) -> Result<Conversation, TransportError> {
        let (outcome, hold) = self.dispatch(RecordedCall::GetConversation(id), |state| {
            find_mut(state, id).map(|c| c.clone())
        });
        Self::respond(outcome, hold).await
    }

    async fn create_conversation(
        &self,
        title: Option<&str>,
    ) -> Result<Conversation, TransportError> {
        let call = RecordedCall::CreateConversation(title.map(str::to_string));
        let (outcome, hold) = self.dispatch(call, |state| {
            let id = ConversationId(state.next_conversation_id);
            state.next_conversation_id += 1;
            let title = title.filter(|t| !t.trim().is_empty()).map(str::to_string);
            let conversation = Conversation::new_active(id, title, Utc::now());
            state.conversations.insert(0, conversation.clone());
            Ok(conversation)
        });
        Self::respond(outcome, hold).await
    }

    async fn send_message(
        &self,
        conversation_id: ConversationId,
        text: &str,
    ) -> Result<Exchange, TransportError> {
        let call = RecordedCall::SendMessage {
            conversation_id,
            text: text.to_string(),
        };
        let (outcome, hold) = self.dispatch(call, |state| {
            let user_id = MessageId(state.next_message_id);
            let assistant_id = MessageId(state.next_message_id + 1);
            let reply = state
                .reply
                .clone()
                .unwrap_or_else(|| format!("Echo: {}", text));

            let conversation = find_mut(state, conversation_id)?;
            if !conversation.is_active() {
                return Err(TransportError::Rejected(
                    "Conversation is not active".to_string(),
                ));
            }

            let now = Utc::now();
            let user_message = Message::new(user_id, Sender::User, text, now);
            let mut assistant_message = Message::new(assistant_id, Sender::Assistant, reply, now);
            assistant_message.model_used = Some("mock".to_string());

            conversation.messages.push(user_message.clone());
            conversation.messages.push(assistant_message.clone());
            conversation.message_count += 2;
            conversation.updated_at = Some(now);
            conversation.last_message = Some(MessagePreview {
                content: truncate_chars(&assistant_message.content, PREVIEW_CHARS),
                sender: Sender::Assistant,
                timestamp: now,
            });
            if conversation.title.is_none() && conversation.message_count == 2 {
                let mut title = truncate_chars(text, TITLE_PREVIEW_CHARS);
                if text.chars().count() > TITLE_PREVIEW_CHARS {
                    title.push_str("...");
                }
                conversation.title = Some(title);
            }

            state.next_message_id += 2;
            Ok(Exchange {
                user_message,
                assistant_message,
            })
        });
        Self::respond(outcome, hold).await
    }

    async fn end_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Conversation, TransportError> {
        let (outcome, hold) =
            self.dispatch(RecordedCall::EndConversation(conversation_id), |state| {
                let conversation = find_mut(state, conversation_id)?;
                if !conversation.is_active() {
                    return Err(TransportError::Rejected(
                        "Conversation is already ended".to_string(),
                    ));
                }
                if conversation.messages.is_empty() {
                    return Err(TransportError::Rejected(
                        "Cannot end conversation with no messages".to_string(),
                    ));
                }

                let first_user = conversation
                    .messages
                    .iter()
                    .find(|m| m.sender == Sender::User)
                    .map(|m| truncate_chars(&m.content, PREVIEW_CHARS))
                    .unwrap_or_default();
                let analysis = ConversationAnalysis {
                    summary: Some(format!("The user asked about: {}", first_user)),
                    topics: Vec::new(),
                    key_points: Vec::new(),
                    sentiment: Some("neutral".to_string()),
                };
                conversation.end(Utc::now(), analysis);
                Ok(conversation.clone())
            });
        Self::respond(outcome, hold).await
    }

    async fn query_conversations(
        &self,
        request: &QueryRequest,
    ) -> Result<QueryResult, TransportError> {
        let (outcome, hold) =
            self.dispatch(RecordedCall::QueryConversations(request.clone()), |state| {
                match state.query_results.pop_front() {
                    Some(scripted) => scripted,
                    None => Ok(search(state, request)),
                }
            });
        Self::respond(outcome, hold).await
    }
}
