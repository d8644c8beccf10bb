//! Plain-text rendering of conversations, messages and query results.

use chrono::Duration;

use colloquy_chat::{MessageEntry, Notifier};
use colloquy_core::events::ClientEvent;
use colloquy_core::types::{Conversation, QueryResult, Sender};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Prints failures and conversation endings to the terminal, the way the
/// chat window surfaces them as alerts.
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, event: &ClientEvent) {
        match event {
            ClientEvent::OperationFailed { .. } => eprintln!("! {}", event),
            ClientEvent::ConversationEnded { .. } => println!("* {}", event),
            other => tracing::debug!(event = %other, "Client event"),
        }
    }
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.num_seconds().max(0);
    match (secs / 3600, (secs % 3600) / 60, secs % 60) {
        (0, 0, s) => format!("{}s", s),
        (0, m, s) => format!("{}m {}s", m, s),
        (h, m, _) => format!("{}h {}m", h, m),
    }
}

fn speaker(sender: Sender) -> &'static str {
    match sender {
        Sender::User => "you",
        Sender::Assistant => "assistant",
    }
}

/// One-line summary used by listings.
pub fn conversation_line(conversation: &Conversation) -> String {
    let mut line = format!(
        "#{:<5} {:<40} {:<6} {:>3} msgs  {}",
        conversation.id.0,
        truncate(conversation.display_title(), 40),
        conversation.status().as_str(),
        conversation.message_count,
        conversation.start_timestamp.format(TIME_FORMAT)
    );
    if let Some(duration) = conversation.duration() {
        line.push_str(&format!("  ({})", format_duration(duration)));
    }
    line
}

pub fn message_line(entry: &MessageEntry) -> String {
    let mut line = format!("{}> {}", speaker(entry.sender()), entry.content());
    if entry.is_provisional() {
        line.push_str("  (sending...)");
    }
    line
}

/// Full view of a conversation: header, analysis when ended, then history.
pub fn conversation_detail(conversation: &Conversation) -> String {
    let mut out = vec![
        format!("#{} {}", conversation.id, conversation.display_title()),
        format!(
            "Status: {}   Messages: {}   Started: {}",
            conversation.status(),
            conversation.message_count,
            conversation.start_timestamp.format(TIME_FORMAT)
        ),
    ];
    if let Some(ended_at) = conversation.end_timestamp() {
        let duration = conversation
            .duration()
            .map(format_duration)
            .unwrap_or_default();
        out.push(format!(
            "Ended: {}   Duration: {}",
            ended_at.format(TIME_FORMAT),
            duration
        ));
    }

    if let Some(analysis) = conversation.analysis() {
        if let Some(ref summary) = analysis.summary {
            out.push(String::new());
            out.push(format!("Summary: {}", summary));
        }
        if !analysis.topics.is_empty() {
            out.push(format!("Topics: {}", analysis.topics.join(", ")));
        }
        if !analysis.key_points.is_empty() {
            out.push("Key points:".to_string());
            out.extend(analysis.key_points.iter().map(|p| format!("  - {}", p)));
        }
        if let Some(ref sentiment) = analysis.sentiment {
            out.push(format!("Sentiment: {}", sentiment));
        }
    }

    if !conversation.messages.is_empty() {
        out.push(String::new());
        for message in &conversation.messages {
            out.push(format!(
                "[{}] {}> {}",
                message.timestamp.format("%H:%M"),
                speaker(message.sender),
                message.content
            ));
        }
    }
    out.join("\n")
}

pub fn query_result(result: &QueryResult) -> String {
    let mut out = vec![result.answer.clone()];
    if result.is_empty() {
        return out.join("\n");
    }
    out.push(String::new());
    out.push(format!("Relevant conversations ({}):", result.count()));
    for conversation in &result.relevant_conversations {
        out.push(format!("  {}", conversation_line(conversation)));
        if let Some(summary) = conversation.analysis().and_then(|a| a.summary.as_deref()) {
            out.push(format!("         {}", summary));
        }
    }
    out.join("\n")
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max.saturating_sub(3)).collect();
    cut.push_str("...");
    cut
}
