//! Client-side session state: known conversations, the active conversation
//! and its message sequence.
//!
//! Reads return snapshots. All mutation goes through the crate-private
//! methods used by [`SessionController`](crate::SessionController); each one
//! takes the lock once, so a reader never observes a half-applied change.

use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};

use colloquy_core::types::{
    Conversation, ConversationId, Exchange, Message, MessageId, ProvisionalId, Sender,
};

/// A user message shown before the service has confirmed it.
#[derive(Clone, Debug, PartialEq)]
pub struct ProvisionalMessage {
    pub local_id: ProvisionalId,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// One slot in the active conversation's message sequence.
#[derive(Clone, Debug, PartialEq)]
pub enum MessageEntry {
    Confirmed(Message),
    Provisional(ProvisionalMessage),
}

impl MessageEntry {
    pub fn is_provisional(&self) -> bool {
        matches!(self, Self::Provisional(_))
    }

    pub fn content(&self) -> &str {
        match self {
            Self::Confirmed(m) => &m.content,
            Self::Provisional(p) => &p.content,
        }
    }

    pub fn sender(&self) -> Sender {
        match self {
            Self::Confirmed(m) => m.sender,
            Self::Provisional(_) => Sender::User,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Confirmed(m) => m.timestamp,
            Self::Provisional(p) => p.timestamp,
        }
    }

    /// Server id, once confirmed.
    pub fn message_id(&self) -> Option<MessageId> {
        match self {
            Self::Confirmed(m) => Some(m.id),
            Self::Provisional(_) => None,
        }
    }

    fn local_id(&self) -> Option<ProvisionalId> {
        match self {
            Self::Confirmed(_) => None,
            Self::Provisional(p) => Some(p.local_id),
        }
    }
}

#[derive(Default)]
struct SessionState {
    /// Newest first.
    known: Vec<Conversation>,
    /// Bound conversation, without its history (that lives in `messages`).
    active: Option<Conversation>,
    messages: Vec<MessageEntry>,
    /// Incremented every time a start or load is issued.
    binding_seq: u64,
    /// Tickets above the last commit whose start or load failed.
    abandoned: BTreeSet<u64>,
}

/// Where a confirmed exchange ended up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Reconciled {
    /// Replaced its provisional entry, in that slot.
    InPlace,
    /// The same conversation was reloaded meanwhile; whichever of the two
    /// messages the reloaded history lacked were appended.
    Appended(usize),
    /// Another conversation is bound, or none.
    NotShown,
}

impl SessionState {
    /// A ticket may bind when every ticket issued after it has failed.
    fn holds_binding(&self, ticket: u64) -> bool {
        (ticket + 1..=self.binding_seq).all(|t| self.abandoned.contains(&t))
    }

    fn active_id(&self) -> Option<ConversationId> {
        self.active.as_ref().map(|c| c.id)
    }

    fn position_of(&self, local_id: ProvisionalId) -> Option<usize> {
        self.messages
            .iter()
            .position(|e| e.local_id() == Some(local_id))
    }

    fn upsert_known(&mut self, conversation: &Conversation) {
        let mut summary = conversation.clone();
        summary.messages.clear();
        match self.known.iter_mut().find(|c| c.id == summary.id) {
            Some(existing) => *existing = summary,
            None => self.known.insert(0, summary),
        }
    }
}

/// Shared session state, owned by the session controller.
#[derive(Default)]
pub struct SessionStore {
    state: Mutex<SessionState>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        // Every mutation completes under a single lock acquisition, so a
        // poisoned guard still holds consistent state.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    /// Known conversations, newest first.
    pub fn known_conversations(&self) -> Vec<Conversation> {
        self.lock().known.clone()
    }

    /// The bound conversation, without its message history.
    pub fn active_conversation(&self) -> Option<Conversation> {
        self.lock().active.clone()
    }

    pub fn active_id(&self) -> Option<ConversationId> {
        self.lock().active_id()
    }

    /// The active conversation's message sequence, provisional entries included.
    pub fn messages(&self) -> Vec<MessageEntry> {
        self.lock().messages.clone()
    }

    pub fn provisional_count(&self) -> usize {
        self.lock()
            .messages
            .iter()
            .filter(|e| e.is_provisional())
            .count()
    }

    // -------------------------------------------------------------------------
    // Binding (start / load)
    // -------------------------------------------------------------------------

    /// Issue a new binding ticket. Only the most recently issued ticket may
    /// rebind the active conversation.
    pub(crate) fn begin_binding(&self) -> u64 {
        let mut state = self.lock();
        state.binding_seq += 1;
        state.binding_seq
    }

    /// Withdraw the ticket of a start or load that failed, so it does not
    /// supersede earlier ones still in flight.
    pub(crate) fn abandon_binding(&self, ticket: u64) {
        let mut state = self.lock();
        if ticket <= state.binding_seq {
            state.abandoned.insert(ticket);
        }
    }

    /// Record a newly created conversation at the head of the known list and,
    /// if `ticket` is still current, bind it with an empty sequence.
    pub(crate) fn commit_started(&self, ticket: u64, conversation: Conversation) -> bool {
        let mut state = self.lock();
        state.upsert_known(&conversation);
        if !state.holds_binding(ticket) {
            return false;
        }
        state.abandoned.clear();
        let mut active = conversation;
        active.messages.clear();
        state.active = Some(active);
        state.messages.clear();
        true
    }

    /// Bind a fetched conversation, replacing the sequence wholesale with its
    /// history, if `ticket` is still current.
    pub(crate) fn commit_loaded(&self, ticket: u64, conversation: Conversation) -> bool {
        let mut state = self.lock();
        if !state.holds_binding(ticket) {
            return false;
        }
        state.abandoned.clear();
        if let Some(known) = state.known.iter_mut().find(|c| c.id == conversation.id) {
            let mut summary = conversation.clone();
            summary.messages.clear();
            *known = summary;
        }
        let mut active = conversation;
        let history = std::mem::take(&mut active.messages);
        state.active = Some(active);
        state.messages = history.into_iter().map(MessageEntry::Confirmed).collect();
        true
    }

    // -------------------------------------------------------------------------
    // Messages
    // -------------------------------------------------------------------------

    /// Append a provisional user message to the active conversation.
    ///
    /// Returns the conversation it belongs to and its local id, or `None`
    /// when nothing is bound.
    pub(crate) fn push_provisional(
        &self,
        content: &str,
        timestamp: DateTime<Utc>,
    ) -> Option<(ConversationId, ProvisionalId)> {
        let mut state = self.lock();
        let conversation_id = state.active.as_ref()?.id;
        let local_id = ProvisionalId::new();
        state
            .messages
            .push(MessageEntry::Provisional(ProvisionalMessage {
                local_id,
                content: content.to_string(),
                timestamp,
            }));
        Some((conversation_id, local_id))
    }

    /// Replace a provisional entry with the confirmed user and assistant
    /// messages, in its slot.
    ///
    /// If the entry is gone but `conversation_id` is still bound, the
    /// conversation was reloaded while the send was in flight: messages the
    /// reloaded history does not already hold (by server id) are appended.
    /// The known-list summary for `conversation_id` is updated in every case.
    pub(crate) fn reconcile(
        &self,
        conversation_id: ConversationId,
        local_id: ProvisionalId,
        exchange: Exchange,
        now: DateTime<Utc>,
    ) -> Reconciled {
        let mut state = self.lock();

        if let Some(known) = state.known.iter_mut().find(|c| c.id == conversation_id) {
            known.message_count += 2;
            known.updated_at = Some(now);
        }

        let confirmed = [exchange.user_message, exchange.assistant_message];
        let (outcome, added) = match state.position_of(local_id) {
            Some(index) => {
                state
                    .messages
                    .splice(index..=index, confirmed.map(MessageEntry::Confirmed));
                (Reconciled::InPlace, 2)
            }
            None if state.active_id() == Some(conversation_id) => {
                let missing: Vec<Message> = confirmed
                    .into_iter()
                    .filter(|m| !state.messages.iter().any(|e| e.message_id() == Some(m.id)))
                    .collect();
                let added = missing.len();
                state
                    .messages
                    .extend(missing.into_iter().map(MessageEntry::Confirmed));
                (Reconciled::Appended(added), added)
            }
            None => return Reconciled::NotShown,
        };

        if let Some(active) = state.active.as_mut() {
            active.message_count += added as u32;
            active.updated_at = Some(now);
        }
        outcome
    }

    /// Remove a provisional entry after its send failed.
    pub(crate) fn remove_provisional(&self, local_id: ProvisionalId) -> bool {
        let mut state = self.lock();
        match state.position_of(local_id) {
            Some(index) => {
                state.messages.remove(index);
                true
            }
            None => false,
        }
    }

    // -------------------------------------------------------------------------
    // Termination and refresh
    // -------------------------------------------------------------------------

    /// Drop local active state if `conversation_id` is still the bound one,
    /// and take the ended conversation out of the known list.
    pub(crate) fn detach(&self, conversation_id: ConversationId) -> bool {
        let mut state = self.lock();
        state.known.retain(|c| c.id != conversation_id);
        if state.active_id() != Some(conversation_id) {
            return false;
        }
        state.active = None;
        state.messages.clear();
        true
    }

    pub(crate) fn replace_known(&self, conversations: Vec<Conversation>) {
        self.lock().known = conversations;
    }
}
