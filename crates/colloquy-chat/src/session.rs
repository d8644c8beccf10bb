//! Session controller: conversation lifecycle with optimistic message updates.

use std::fmt::Display;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use colloquy_core::events::{ClientEvent, ClientOperation};
use colloquy_core::types::{Conversation, ConversationId, Exchange, ListFilter, DEFAULT_TITLE};
use colloquy_transport::{ConversationTransport, TransportError};

use crate::error::ChatError;
use crate::notifier::Notifier;
use crate::store::{MessageEntry, Reconciled, SessionStore};

/// Drives conversation creation, loading, messaging and termination against
/// the transport, keeping the [`SessionStore`] consistent with the service.
///
/// Start and load are guarded by a binding ticket: when several are in
/// flight, only the most recently issued one that has not failed binds the
/// active conversation. Sends resolve independently, each touching only its
/// own provisional entry.
pub struct SessionController {
    transport: Arc<dyn ConversationTransport>,
    notifier: Arc<dyn Notifier>,
    store: SessionStore,
    default_title: String,
    /// Held while a send starts the conversation it needs, so concurrent
    /// sends share one start.
    implicit_start: Mutex<()>,
}

impl SessionController {
    pub fn new(transport: Arc<dyn ConversationTransport>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            transport,
            notifier,
            store: SessionStore::new(),
            default_title: DEFAULT_TITLE.to_string(),
            implicit_start: Mutex::new(()),
        }
    }

    /// Title used when a conversation is started without one.
    pub fn with_default_title(mut self, title: impl Into<String>) -> Self {
        self.default_title = title.into();
        self
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn active_conversation(&self) -> Option<Conversation> {
        self.store.active_conversation()
    }

    pub fn messages(&self) -> Vec<MessageEntry> {
        self.store.messages()
    }

    pub fn known_conversations(&self) -> Vec<Conversation> {
        self.store.known_conversations()
    }

    /// Create a conversation and bind it as active with an empty sequence.
    ///
    /// The new conversation is added to the head of the known list even if a
    /// later start or load wins the binding, in which case this returns
    /// [`ChatError::Superseded`]. A start that fails leaves any earlier start
    /// or load still in flight free to bind.
    pub async fn start_conversation(&self, title: Option<&str>) -> Result<Conversation, ChatError> {
        let ticket = self.store.begin_binding();
        let title = title
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(self.default_title.as_str());

        let conversation = match self.transport.create_conversation(Some(title)).await {
            Ok(conversation) => conversation,
            Err(e) => {
                self.store.abandon_binding(ticket);
                self.report(ClientOperation::StartConversation, &e);
                return Err(ChatError::Creation(e));
            }
        };

        if !self.store.commit_started(ticket, conversation.clone()) {
            debug!(
                conversation_id = %conversation.id,
                "Start superseded by a newer start or load"
            );
            return Err(ChatError::Superseded);
        }

        info!(conversation_id = %conversation.id, "Conversation started");
        self.notifier.notify(&ClientEvent::ConversationStarted {
            conversation_id: conversation.id,
        });
        Ok(conversation)
    }

    /// Fetch a conversation with its history and bind it, replacing the
    /// active conversation and its messages wholesale.
    pub async fn load_conversation(&self, id: ConversationId) -> Result<Conversation, ChatError> {
        let ticket = self.store.begin_binding();

        let conversation = match self.transport.get_conversation(id).await {
            Ok(conversation) => conversation,
            Err(e) => {
                self.store.abandon_binding(ticket);
                self.report(ClientOperation::LoadConversation, &e);
                return Err(not_found_or(id, e, ChatError::Transport));
            }
        };

        let message_count = conversation.messages.len();
        if !self.store.commit_loaded(ticket, conversation.clone()) {
            debug!(conversation_id = %id, "Load superseded by a newer start or load");
            return Err(ChatError::Superseded);
        }

        info!(conversation_id = %id, message_count, "Conversation loaded");
        self.notifier.notify(&ClientEvent::ConversationLoaded {
            conversation_id: id,
            message_count,
        });
        Ok(conversation)
    }

    /// Send a user message to the active conversation, starting one first if
    /// none is bound. Sends issued while that start is in flight wait for it
    /// and go to the same conversation.
    ///
    /// Blank text is ignored and returns `Ok(None)` without contacting the
    /// service. The message is shown provisionally until the service confirms
    /// it, then replaced by the confirmed user and assistant messages; on
    /// failure the provisional entry is removed.
    pub async fn send_message(&self, text: &str) -> Result<Option<Exchange>, ChatError> {
        if text.trim().is_empty() {
            debug!("Ignoring blank message");
            return Ok(None);
        }

        if self.store.active_id().is_none() {
            let _starting = self.implicit_start.lock().await;
            if self.store.active_id().is_none() {
                self.start_conversation(None).await?;
            }
        }

        let (conversation_id, local_id) = self
            .store
            .push_provisional(text, Utc::now())
            .ok_or(ChatError::NoActiveConversation)?;
        debug!(conversation_id = %conversation_id, %local_id, "Message pending");

        match self.transport.send_message(conversation_id, text).await {
            Ok(exchange) => {
                let reconciled =
                    self.store
                        .reconcile(conversation_id, local_id, exchange.clone(), Utc::now());
                match reconciled {
                    Reconciled::InPlace => debug!(
                        conversation_id = %conversation_id,
                        %local_id,
                        user_message_id = %exchange.user_message.id,
                        assistant_message_id = %exchange.assistant_message.id,
                        "Message confirmed"
                    ),
                    Reconciled::Appended(added) => debug!(
                        conversation_id = %conversation_id,
                        %local_id,
                        added,
                        "Message confirmed after reload"
                    ),
                    Reconciled::NotShown => debug!(
                        conversation_id = %conversation_id,
                        %local_id,
                        "Conversation no longer bound, confirmed messages not shown"
                    ),
                }
                self.notifier.notify(&ClientEvent::MessageConfirmed {
                    conversation_id,
                    provisional_id: local_id,
                    user_message_id: exchange.user_message.id,
                    assistant_message_id: exchange.assistant_message.id,
                });
                Ok(Some(exchange))
            }
            Err(e) => {
                self.store.remove_provisional(local_id);
                self.notifier.notify(&ClientEvent::MessageRolledBack {
                    conversation_id,
                    provisional_id: local_id,
                });
                self.report(ClientOperation::SendMessage, &e);
                Err(ChatError::Send(e))
            }
        }
    }

    /// Terminate the active conversation. The service analyzes it; on success
    /// the local active state is dropped and the list of active
    /// conversations refreshed.
    ///
    /// Asking the user for confirmation is left to the caller.
    pub async fn end_conversation(&self) -> Result<Conversation, ChatError> {
        let conversation_id = self
            .store
            .active_id()
            .ok_or(ChatError::NoActiveConversation)?;

        let ended = match self.transport.end_conversation(conversation_id).await {
            Ok(ended) => ended,
            Err(e) => {
                self.report(ClientOperation::EndConversation, &e);
                return Err(ChatError::Termination(e));
            }
        };

        if !self.store.detach(conversation_id) {
            debug!(
                conversation_id = %conversation_id,
                "Ended conversation was no longer bound"
            );
        }
        info!(conversation_id = %conversation_id, "Conversation ended");
        self.notifier
            .notify(&ClientEvent::ConversationEnded { conversation_id });

        if let Err(e) = self.list_active_conversations().await {
            warn!(error = %e, "Failed to refresh conversations after ending");
        }
        Ok(ended)
    }

    /// Refresh the known list with the service's active conversations.
    ///
    /// Never touches the active conversation or its messages.
    pub async fn list_active_conversations(&self) -> Result<Vec<Conversation>, ChatError> {
        match self.transport.list_conversations(&ListFilter::active()).await {
            Ok(conversations) => {
                self.store.replace_known(conversations.clone());
                self.notifier.notify(&ClientEvent::ConversationsRefreshed {
                    count: conversations.len(),
                });
                Ok(conversations)
            }
            Err(e) => {
                self.report(ClientOperation::ListConversations, &e);
                Err(ChatError::Transport(e))
            }
        }
    }

    /// List conversations matching `filter` without touching session state.
    pub async fn browse(&self, filter: &ListFilter) -> Result<Vec<Conversation>, ChatError> {
        self.transport
            .list_conversations(filter)
            .await
            .map_err(ChatError::Transport)
    }

    /// Fetch a conversation with its history without binding it.
    pub async fn inspect(&self, id: ConversationId) -> Result<Conversation, ChatError> {
        self.transport
            .get_conversation(id)
            .await
            .map_err(|e| not_found_or(id, e, ChatError::Transport))
    }

    fn report(&self, operation: ClientOperation, error: &dyn Display) {
        self.notifier.notify(&ClientEvent::OperationFailed {
            operation,
            message: error.to_string(),
        });
    }
}

fn not_found_or(
    id: ConversationId,
    error: TransportError,
    otherwise: impl FnOnce(TransportError) -> ChatError,
) -> ChatError {
    if error.is_not_found() {
        ChatError::NotFound(id)
    } else {
        otherwise(error)
    }
}
