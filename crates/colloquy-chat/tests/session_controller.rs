//! Session controller behavior against the in-memory service fake.
//!
//! Interleavings are forced with `hold_next` gates: the fake applies a call
//! on arrival but withholds the response until its gate is opened, and
//! `tokio::join!` drives the competing operations on one task.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use colloquy_chat::{ChatError, MessageEntry, RecordingNotifier, SessionController};
use colloquy_core::events::{ClientEvent, ClientOperation};
use colloquy_core::types::{
    Conversation, ConversationId, ConversationStatus, Exchange, ListFilter, Message, MessageId,
    QueryRequest, QueryResult, Sender,
};
use colloquy_transport::{ConversationTransport, Endpoint, MockTransport, TransportError};

// =============================================================================
// Helpers
// =============================================================================

struct Harness {
    controller: SessionController,
    mock: Arc<MockTransport>,
    notifier: Arc<RecordingNotifier>,
}

fn harness(mock: MockTransport) -> Harness {
    let mock = Arc::new(mock);
    let notifier = Arc::new(RecordingNotifier::new());
    let controller = SessionController::new(mock.clone(), notifier.clone());
    Harness {
        controller,
        mock,
        notifier,
    }
}

/// An active conversation with a short confirmed history.
fn seeded(id: i64, first_message_id: i64) -> Conversation {
    let start = Utc.with_ymd_and_hms(2025, 1, 3, 9, 0, 0).unwrap();
    let mut conv = Conversation::new_active(ConversationId(id), Some(format!("Seeded {}", id)), start);
    conv.messages.push(Message::new(
        MessageId(first_message_id),
        Sender::User,
        "Earlier question",
        start,
    ));
    conv.messages.push(Message::new(
        MessageId(first_message_id + 1),
        Sender::Assistant,
        "Earlier answer",
        start,
    ));
    conv.message_count = 2;
    conv
}

fn confirmed_ids(controller: &SessionController) -> Vec<i64> {
    controller
        .messages()
        .iter()
        .filter_map(MessageEntry::message_id)
        .map(|id| id.0)
        .collect()
}

/// Serves history the way the service does while a reply is still being
/// generated: the user message is stored, the assistant reply is not yet.
struct ReplyPending(Arc<MockTransport>);

#[async_trait]
impl ConversationTransport for ReplyPending {
    async fn list_conversations(
        &self,
        filter: &ListFilter,
    ) -> Result<Vec<Conversation>, TransportError> {
        self.0.list_conversations(filter).await
    }

    async fn get_conversation(&self, id: ConversationId) -> Result<Conversation, TransportError> {
        let mut conversation = self.0.get_conversation(id).await?;
        if conversation
            .messages
            .last()
            .is_some_and(|m| m.sender == Sender::Assistant)
        {
            conversation.messages.pop();
        }
        Ok(conversation)
    }

    async fn create_conversation(
        &self,
        title: Option<&str>,
    ) -> Result<Conversation, TransportError> {
        self.0.create_conversation(title).await
    }

    async fn send_message(
        &self,
        conversation_id: ConversationId,
        text: &str,
    ) -> Result<Exchange, TransportError> {
        self.0.send_message(conversation_id, text).await
    }

    async fn end_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Conversation, TransportError> {
        self.0.end_conversation(conversation_id).await
    }

    async fn query_conversations(
        &self,
        request: &QueryRequest,
    ) -> Result<QueryResult, TransportError> {
        self.0.query_conversations(request).await
    }
}

async fn wait_for_provisional(controller: &SessionController, count: usize) {
    while controller.store().provisional_count() != count {
        tokio::task::yield_now().await;
    }
}

// =============================================================================
// Sending
// =============================================================================

#[tokio::test]
async fn test_confirmed_exchange_uses_server_ids() {
    let h = harness(
        MockTransport::new()
            .with_next_message_id(5)
            .with_reply("Hi there!"),
    );
    h.controller.start_conversation(None).await.unwrap();

    h.controller.send_message("Hello").await.unwrap();

    let messages = h.controller.messages();
    assert_eq!(confirmed_ids(&h.controller), vec![5, 6]);
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].content(), "Hello");
    assert_eq!(messages[0].sender(), Sender::User);
    assert_eq!(messages[1].content(), "Hi there!");
    assert_eq!(messages[1].sender(), Sender::Assistant);
}

#[tokio::test]
async fn test_successful_send_grows_sequence_by_two() {
    let h = harness(MockTransport::new());
    h.controller.start_conversation(None).await.unwrap();
    h.controller.send_message("one").await.unwrap();
    let before = h.controller.messages().len();

    h.controller.send_message("two").await.unwrap();

    assert_eq!(h.controller.messages().len(), before + 2);
    assert_eq!(h.controller.store().provisional_count(), 0);
}

#[tokio::test]
async fn test_failed_send_restores_sequence() {
    let h = harness(MockTransport::new());
    h.controller.start_conversation(None).await.unwrap();
    h.controller.send_message("one").await.unwrap();
    let before = h.controller.messages();

    h.mock.fail_next(
        Endpoint::SendMessage,
        TransportError::Connection("reset".to_string()),
    );
    let gate = h.mock.hold_next(Endpoint::SendMessage);
    let (result, ()) = tokio::join!(h.controller.send_message("two"), async {
        wait_for_provisional(&h.controller, 1).await;
        // Shown provisionally while in flight.
        let pending = h.controller.messages();
        assert_eq!(pending.len(), before.len() + 1);
        assert_eq!(pending.last().map(MessageEntry::content), Some("two"));
        gate.open();
    });

    let err = result.unwrap_err();
    assert!(matches!(err, ChatError::Send(TransportError::Connection(_))));
    assert_eq!(h.controller.messages(), before);

    let events = h.notifier.events();
    assert!(events
        .iter()
        .any(|e| matches!(e, ClientEvent::MessageRolledBack { .. })));
    assert!(events.iter().any(|e| matches!(
        e,
        ClientEvent::OperationFailed {
            operation: ClientOperation::SendMessage,
            ..
        }
    )));
}

#[tokio::test]
async fn test_blank_message_is_ignored() {
    let h = harness(MockTransport::new());
    h.controller.start_conversation(None).await.unwrap();
    h.controller.send_message("hello").await.unwrap();
    let before = h.controller.messages();
    let calls_before = h.mock.calls().len();

    assert!(h.controller.send_message("").await.unwrap().is_none());
    assert!(h.controller.send_message("   ").await.unwrap().is_none());

    assert_eq!(h.controller.messages(), before);
    assert_eq!(h.mock.calls().len(), calls_before);
}

#[tokio::test]
async fn test_blank_message_without_active_does_not_start() {
    let h = harness(MockTransport::new());
    assert!(h.controller.send_message(" \n\t").await.unwrap().is_none());
    assert!(h.mock.calls().is_empty());
    assert!(h.controller.active_conversation().is_none());
}

async fn interleaved_sends(resolve_second_first: bool) -> Vec<MessageEntry> {
    let h = harness(MockTransport::new().with_next_message_id(10));
    h.controller.start_conversation(None).await.unwrap();

    let gate_first = h.mock.hold_next(Endpoint::SendMessage);
    let gate_second = h.mock.hold_next(Endpoint::SendMessage);

    let (first, second, ()) = tokio::join!(
        h.controller.send_message("first"),
        h.controller.send_message("second"),
        async {
            wait_for_provisional(&h.controller, 2).await;
            let (early, late) = if resolve_second_first {
                (gate_second, gate_first)
            } else {
                (gate_first, gate_second)
            };
            early.open();
            wait_for_provisional(&h.controller, 1).await;
            late.open();
        }
    );
    first.unwrap();
    second.unwrap();

    assert_eq!(h.controller.store().provisional_count(), 0);
    assert_eq!(
        h.controller.known_conversations()[0].message_count,
        4,
        "known summary counts both exchanges"
    );
    h.controller.messages()
}

#[tokio::test]
async fn test_interleaved_sends_resolve_in_order() {
    let messages = interleaved_sends(false).await;
    assert_eq!(messages.len(), 4);
    assert!(messages.iter().all(|m| !m.is_provisional()));
    let contents: Vec<&str> = messages.iter().map(MessageEntry::content).collect();
    assert_eq!(
        contents,
        vec!["first", "Echo: first", "second", "Echo: second"]
    );
}

#[tokio::test]
async fn test_interleaved_sends_resolve_out_of_order() {
    let messages = interleaved_sends(true).await;
    assert_eq!(messages.len(), 4);
    assert!(messages.iter().all(|m| !m.is_provisional()));
    // Each exchange takes its own provisional slot, so submission order holds.
    let contents: Vec<&str> = messages.iter().map(MessageEntry::content).collect();
    assert_eq!(
        contents,
        vec!["first", "Echo: first", "second", "Echo: second"]
    );
}

#[tokio::test]
async fn test_send_to_ended_conversation_surfaces_send_error() {
    let h = harness(MockTransport::new());
    let conv = h.controller.start_conversation(None).await.unwrap();
    h.controller.send_message("hello").await.unwrap();

    // Ended elsewhere; the client still has it bound.
    let other = harness_with_shared(&h);
    other.load_conversation(conv.id).await.unwrap();
    other.end_conversation().await.unwrap();

    let err = h.controller.send_message("still there?").await.unwrap_err();
    match err {
        ChatError::Send(TransportError::Rejected(message)) => {
            assert_eq!(message, "Conversation is not active");
        }
        other => panic!("expected send error, got {other:?}"),
    }
    assert_eq!(h.controller.messages().len(), 2);
}

fn harness_with_shared(h: &Harness) -> SessionController {
    SessionController::new(h.mock.clone(), Arc::new(RecordingNotifier::new()))
}

#[tokio::test]
async fn test_confirmation_after_rebind_is_not_shown() {
    let h = harness(MockTransport::new().with_conversation(seeded(40, 100)));
    h.controller.start_conversation(None).await.unwrap();

    let gate = h.mock.hold_next(Endpoint::SendMessage);
    let (sent, ()) = tokio::join!(h.controller.send_message("hello"), async {
        wait_for_provisional(&h.controller, 1).await;
        h.controller
            .load_conversation(ConversationId(40))
            .await
            .unwrap();
        gate.open();
    });

    // The service stored the exchange; the bound conversation is the loaded one.
    assert!(sent.unwrap().is_some());
    assert_eq!(confirmed_ids(&h.controller), vec![100, 101]);
    assert_eq!(h.controller.store().provisional_count(), 0);
}

#[tokio::test]
async fn test_reply_shown_when_active_conversation_reloaded_mid_send() {
    let mock = Arc::new(MockTransport::new().with_next_message_id(5));
    let controller = SessionController::new(
        Arc::new(ReplyPending(mock.clone())),
        Arc::new(RecordingNotifier::new()),
    );
    let conv = controller.start_conversation(None).await.unwrap();

    let gate = mock.hold_next(Endpoint::SendMessage);
    let (sent, ()) = tokio::join!(controller.send_message("Hello"), async {
        wait_for_provisional(&controller, 1).await;
        controller.load_conversation(conv.id).await.unwrap();
        assert_eq!(confirmed_ids(&controller), vec![5]);
        gate.open();
    });

    assert!(sent.unwrap().is_some());
    assert_eq!(controller.active_conversation().unwrap().id, conv.id);
    assert_eq!(confirmed_ids(&controller), vec![5, 6]);
    assert_eq!(controller.messages()[1].content(), "Echo: Hello");
}

#[tokio::test]
async fn test_reload_mid_send_does_not_duplicate_messages() {
    let h = harness(MockTransport::new().with_next_message_id(5));
    let conv = h.controller.start_conversation(None).await.unwrap();

    let gate = h.mock.hold_next(Endpoint::SendMessage);
    let (sent, ()) = tokio::join!(h.controller.send_message("Hello"), async {
        wait_for_provisional(&h.controller, 1).await;
        // The fake stores both messages on arrival, so the reload has them.
        h.controller.load_conversation(conv.id).await.unwrap();
        gate.open();
    });

    assert!(sent.unwrap().is_some());
    assert_eq!(confirmed_ids(&h.controller), vec![5, 6]);
    assert_eq!(h.controller.messages().len(), 2);
}

#[tokio::test]
async fn test_concurrent_sends_share_one_implicit_start() {
    let h = harness(MockTransport::new());
    let gate = h.mock.hold_next(Endpoint::CreateConversation);

    let (first, second, ()) = tokio::join!(
        h.controller.send_message("first"),
        h.controller.send_message("second"),
        async {
            while h.mock.call_count(Endpoint::CreateConversation) == 0 {
                tokio::task::yield_now().await;
            }
            gate.open();
        }
    );

    assert!(first.unwrap().is_some());
    assert!(second.unwrap().is_some());
    assert_eq!(h.mock.call_count(Endpoint::CreateConversation), 1);
    assert_eq!(h.controller.known_conversations().len(), 1);
    let messages = h.controller.messages();
    let contents: Vec<&str> = messages.iter().map(MessageEntry::content).collect();
    assert_eq!(
        contents,
        vec!["first", "Echo: first", "second", "Echo: second"]
    );
}

#[tokio::test]
async fn test_send_after_failed_implicit_start_tries_again() {
    let h = harness(MockTransport::new());
    h.mock
        .fail_next(Endpoint::CreateConversation, TransportError::Timeout);

    assert!(h.controller.send_message("first").await.is_err());
    assert!(h.controller.send_message("second").await.unwrap().is_some());
    assert_eq!(h.mock.call_count(Endpoint::CreateConversation), 2);
    assert_eq!(h.controller.messages()[0].content(), "second");
}

// =============================================================================
// Start / load
// =============================================================================

#[tokio::test]
async fn test_start_inserts_at_head_of_known_list() {
    let h = harness(MockTransport::new());
    let first = h.controller.start_conversation(Some("First")).await.unwrap();
    let second = h.controller.start_conversation(Some("Second")).await.unwrap();

    let known: Vec<ConversationId> = h
        .controller
        .known_conversations()
        .iter()
        .map(|c| c.id)
        .collect();
    assert_eq!(known, vec![second.id, first.id]);
    assert_eq!(h.controller.active_conversation().unwrap().id, second.id);
    assert!(h.controller.messages().is_empty());
}

#[tokio::test]
async fn test_failed_start_preserves_active_state() {
    let h = harness(MockTransport::new());
    let conv = h.controller.start_conversation(None).await.unwrap();
    h.controller.send_message("hello").await.unwrap();
    let before = h.controller.messages();

    h.mock
        .fail_next(Endpoint::CreateConversation, TransportError::Timeout);
    let err = h.controller.start_conversation(None).await.unwrap_err();

    assert!(matches!(err, ChatError::Creation(TransportError::Timeout)));
    assert_eq!(h.controller.active_conversation().unwrap().id, conv.id);
    assert_eq!(h.controller.messages(), before);
    assert_eq!(h.controller.known_conversations().len(), 1);
}

#[tokio::test]
async fn test_load_replaces_active_state_wholesale() {
    let h = harness(MockTransport::new().with_conversation(seeded(7, 70)));
    h.controller.start_conversation(None).await.unwrap();
    h.controller.send_message("hello").await.unwrap();

    let loaded = h
        .controller
        .load_conversation(ConversationId(7))
        .await
        .unwrap();

    assert_eq!(loaded.messages.len(), 2);
    assert_eq!(h.controller.active_conversation().unwrap().id, ConversationId(7));
    assert_eq!(confirmed_ids(&h.controller), vec![70, 71]);
    assert!(h.notifier.events().contains(&ClientEvent::ConversationLoaded {
        conversation_id: ConversationId(7),
        message_count: 2,
    }));
}

#[tokio::test]
async fn test_load_unknown_conversation_preserves_state() {
    let h = harness(MockTransport::new());
    let conv = h.controller.start_conversation(None).await.unwrap();
    h.controller.send_message("hello").await.unwrap();
    let before = h.controller.messages();

    let err = h
        .controller
        .load_conversation(ConversationId(999))
        .await
        .unwrap_err();

    assert!(matches!(err, ChatError::NotFound(ConversationId(999))));
    assert_eq!(h.controller.active_conversation().unwrap().id, conv.id);
    assert_eq!(h.controller.messages(), before);
}

#[tokio::test]
async fn test_load_transport_failure_is_transport_error() {
    let h = harness(MockTransport::new().with_conversation(seeded(7, 70)));
    h.mock.fail_next(Endpoint::GetConversation, TransportError::Timeout);

    let err = h
        .controller
        .load_conversation(ConversationId(7))
        .await
        .unwrap_err();
    assert!(matches!(err, ChatError::Transport(TransportError::Timeout)));
    assert!(h.controller.active_conversation().is_none());
}

#[tokio::test]
async fn test_later_issued_start_wins_over_slow_load() {
    let h = harness(MockTransport::new().with_conversation(seeded(7, 70)));
    let gate = h.mock.hold_next(Endpoint::GetConversation);

    let (loaded, started) = tokio::join!(h.controller.load_conversation(ConversationId(7)), async {
        let started = h.controller.start_conversation(Some("Fresh")).await;
        gate.open();
        started
    });

    assert!(matches!(loaded, Err(ChatError::Superseded)));
    let started = started.unwrap();
    assert_eq!(h.controller.active_conversation().unwrap().id, started.id);
    assert!(h.controller.messages().is_empty());
}

#[tokio::test]
async fn test_failed_start_does_not_discard_earlier_load() {
    let h = harness(MockTransport::new().with_conversation(seeded(7, 70)));
    let gate = h.mock.hold_next(Endpoint::GetConversation);
    h.mock
        .fail_next(Endpoint::CreateConversation, TransportError::Timeout);

    let (loaded, started) = tokio::join!(h.controller.load_conversation(ConversationId(7)), async {
        let started = h.controller.start_conversation(None).await;
        gate.open();
        started
    });

    assert!(matches!(
        started,
        Err(ChatError::Creation(TransportError::Timeout))
    ));
    loaded.unwrap();
    assert_eq!(h.controller.active_conversation().unwrap().id, ConversationId(7));
    assert_eq!(confirmed_ids(&h.controller), vec![70, 71]);
}

#[tokio::test]
async fn test_later_issued_load_wins_over_slow_start() {
    let h = harness(MockTransport::new().with_conversation(seeded(7, 70)));
    let gate = h.mock.hold_next(Endpoint::CreateConversation);

    let (started, loaded) = tokio::join!(h.controller.start_conversation(None), async {
        let loaded = h.controller.load_conversation(ConversationId(7)).await;
        gate.open();
        loaded
    });

    assert!(matches!(started, Err(ChatError::Superseded)));
    loaded.unwrap();
    assert_eq!(h.controller.active_conversation().unwrap().id, ConversationId(7));
    assert_eq!(confirmed_ids(&h.controller), vec![70, 71]);
    // The created conversation still exists and is listed.
    assert_eq!(h.controller.known_conversations().len(), 1);
    assert_ne!(h.controller.known_conversations()[0].id, ConversationId(7));
}

// =============================================================================
// Ending and listing
// =============================================================================

#[tokio::test]
async fn test_ended_conversation_leaves_active_list() {
    let h = harness(MockTransport::new());
    let keep = h.controller.start_conversation(Some("Keep")).await.unwrap();
    h.controller.send_message("stay open").await.unwrap();
    let target = h.controller.start_conversation(Some("Finish")).await.unwrap();
    h.controller.send_message("wrap this up").await.unwrap();

    let ended = h.controller.end_conversation().await.unwrap();
    assert_eq!(ended.id, target.id);
    assert_eq!(ended.status(), ConversationStatus::Ended);
    assert!(ended.analysis().is_some());

    // Local active state is discarded.
    assert!(h.controller.active_conversation().is_none());
    assert!(h.controller.messages().is_empty());

    let active = h.controller.list_active_conversations().await.unwrap();
    let ids: Vec<ConversationId> = active.iter().map(|c| c.id).collect();
    assert_eq!(ids, vec![keep.id]);
    assert_eq!(
        h.controller
            .known_conversations()
            .iter()
            .map(|c| c.id)
            .collect::<Vec<_>>(),
        vec![keep.id]
    );
}

#[tokio::test]
async fn test_failed_end_preserves_active_state() {
    let h = harness(MockTransport::new());
    let conv = h.controller.start_conversation(None).await.unwrap();

    // The service refuses to end a conversation with no messages.
    let err = h.controller.end_conversation().await.unwrap_err();
    assert!(matches!(
        err,
        ChatError::Termination(TransportError::Rejected(_))
    ));
    assert_eq!(h.controller.active_conversation().unwrap().id, conv.id);
    assert!(h.notifier.failures().iter().any(|e| matches!(
        e,
        ClientEvent::OperationFailed {
            operation: ClientOperation::EndConversation,
            ..
        }
    )));
}

#[tokio::test]
async fn test_end_succeeds_when_refresh_fails() {
    let h = harness(MockTransport::new());
    h.controller.start_conversation(None).await.unwrap();
    h.controller.send_message("hello").await.unwrap();
    h.mock
        .fail_next(Endpoint::ListConversations, TransportError::Timeout);

    let ended = h.controller.end_conversation().await.unwrap();
    assert_eq!(ended.status(), ConversationStatus::Ended);
    assert!(h.controller.active_conversation().is_none());
    assert!(h.controller.known_conversations().is_empty());
}

#[tokio::test]
async fn test_list_active_never_touches_active_conversation() {
    let h = harness(MockTransport::new().with_conversation(seeded(3, 30)));
    let conv = h.controller.start_conversation(None).await.unwrap();
    h.controller.send_message("hello").await.unwrap();
    let before = h.controller.messages();

    let listed = h.controller.list_active_conversations().await.unwrap();

    assert_eq!(listed.len(), 2);
    assert_eq!(h.controller.active_conversation().unwrap().id, conv.id);
    assert_eq!(h.controller.messages(), before);
    assert!(h
        .notifier
        .events()
        .contains(&ClientEvent::ConversationsRefreshed { count: 2 }));
}

#[tokio::test]
async fn test_browse_and_inspect_do_not_bind() {
    let h = harness(MockTransport::new().with_conversation(seeded(3, 30)));

    let all = h.controller.browse(&ListFilter::all()).await.unwrap();
    assert_eq!(all.len(), 1);
    let conv = h.controller.inspect(ConversationId(3)).await.unwrap();
    assert_eq!(conv.messages.len(), 2);

    assert!(h.controller.active_conversation().is_none());
    assert!(h.controller.known_conversations().is_empty());
}
