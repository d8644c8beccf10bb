//! Interactive chat loop.
//!
//! Plain lines are sent to the active conversation. Lines starting with `/`
//! are commands.

use std::io::Write;

use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

use colloquy_chat::{ChatError, SessionController};
use colloquy_core::error::Result;
use colloquy_core::types::ConversationId;

use crate::render;

const HELP: &str = "\
Commands:
  /new [title]   start a new conversation
  /load <id>     continue an existing conversation
  /list          list active conversations
  /end           end and analyze the current conversation
  /help          show this help
  /quit          leave (the conversation stays active)
Anything else is sent as a message.";

#[derive(Debug, PartialEq)]
pub enum ReplCommand {
    Send(String),
    New(Option<String>),
    Load(ConversationId),
    List,
    End,
    Help,
    Quit,
    Invalid(String),
}

impl ReplCommand {
    pub fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        let Some(rest) = trimmed.strip_prefix('/') else {
            return Self::Send(line.to_string());
        };
        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (rest, ""),
        };
        match name {
            "new" => Self::New((!arg.is_empty()).then(|| arg.to_string())),
            "load" => match arg.parse() {
                Ok(id) => Self::Load(id),
                Err(e) => Self::Invalid(e),
            },
            "list" => Self::List,
            "end" => Self::End,
            "help" | "?" => Self::Help,
            "quit" | "exit" | "q" => Self::Quit,
            other => Self::Invalid(format!("Unknown command /{}. Type /help.", other)),
        }
    }
}

/// `y` or `yes`, case-insensitive. Anything else declines.
pub fn confirmed(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// Errors the notifier has not already shown.
fn report_local(err: &ChatError) {
    match err {
        ChatError::NoActiveConversation | ChatError::Superseded | ChatError::InvalidQuery(_) => {
            eprintln!("! {}", err)
        }
        _ => tracing::debug!(error = %err, "Failure already reported"),
    }
}

fn prompt(text: &str) -> Result<()> {
    print!("{}", text);
    std::io::stdout().flush()?;
    Ok(())
}

async fn read_line(lines: &mut Lines<BufReader<Stdin>>) -> Result<Option<String>> {
    Ok(lines.next_line().await?)
}

fn print_history(session: &SessionController) {
    for entry in session.messages() {
        println!("{}", render::message_line(&entry));
    }
}

async fn print_active_list(session: &SessionController) {
    match session.list_active_conversations().await {
        Ok(conversations) if conversations.is_empty() => println!("No active conversations."),
        Ok(conversations) => {
            println!("Active conversations:");
            for conversation in &conversations {
                println!("  {}", render::conversation_line(conversation));
            }
        }
        Err(e) => report_local(&e),
    }
}

/// Run the chat loop until `/quit` or end of input.
pub async fn run(session: &SessionController, resume: Option<ConversationId>) -> Result<()> {
    match resume {
        Some(id) => match session.load_conversation(id).await {
            Ok(conversation) => {
                println!("Resumed: {}", render::conversation_line(&conversation));
                print_history(session);
            }
            Err(e) => report_local(&e),
        },
        None => print_active_list(session).await,
    }
    println!("Type a message to start chatting, or /help.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        prompt("> ")?;
        let Some(line) = read_line(&mut lines).await? else {
            break;
        };

        match ReplCommand::parse(&line) {
            ReplCommand::Send(text) => match session.send_message(&text).await {
                Ok(Some(exchange)) => {
                    println!("assistant> {}", exchange.assistant_message.content);
                }
                Ok(None) => {}
                Err(e) => report_local(&e),
            },
            ReplCommand::New(title) => match session.start_conversation(title.as_deref()).await {
                Ok(conversation) => {
                    println!("Started: {}", render::conversation_line(&conversation))
                }
                Err(e) => report_local(&e),
            },
            ReplCommand::Load(id) => match session.load_conversation(id).await {
                Ok(conversation) => {
                    println!("Loaded: {}", render::conversation_line(&conversation));
                    print_history(session);
                }
                Err(e) => report_local(&e),
            },
            ReplCommand::List => print_active_list(session).await,
            ReplCommand::End => {
                if session.active_conversation().is_none() {
                    report_local(&ChatError::NoActiveConversation);
                    continue;
                }
                prompt("End this conversation? It will be analyzed and saved. [y/N] ")?;
                let answer = read_line(&mut lines).await?.unwrap_or_default();
                if !confirmed(&answer) {
                    println!("Kept open.");
                    continue;
                }
                match session.end_conversation().await {
                    Ok(ended) => println!("{}", render::conversation_detail(&ended)),
                    Err(e) => report_local(&e),
                }
            }
            ReplCommand::Help => println!("{}", HELP),
            ReplCommand::Quit => break,
            ReplCommand::Invalid(message) => eprintln!("! {}", message),
        }
    }
    Ok(())
}
