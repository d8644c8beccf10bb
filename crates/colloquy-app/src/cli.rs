//! CLI argument definitions for the `colloquy` binary.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use colloquy_core::types::{ConversationId, ConversationStatus};

/// Colloquy: chat with an AI assistant and ask questions about past conversations.
#[derive(Parser, Debug)]
#[command(name = "colloquy", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Base URL of the conversation service, including the `/api` prefix.
    #[arg(short = 'u', long = "base-url", global = true)]
    pub base_url: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// List conversations.
    List {
        /// Only show conversations with this status (active, ended).
        #[arg(long, value_parser = parse_status)]
        status: Option<ConversationStatus>,
        /// Match against titles and summaries.
        #[arg(long)]
        search: Option<String>,
    },
    /// Show a conversation with its messages and analysis.
    Show { id: ConversationId },
    /// Start an interactive chat session.
    Chat {
        /// Continue an existing conversation instead of starting fresh.
        #[arg(long)]
        resume: Option<ConversationId>,
    },
    /// Ask a question about past conversations.
    Ask {
        #[arg(required = true, num_args = 1..)]
        question: Vec<String>,
        /// Earliest conversation start (YYYY-MM-DD or RFC 3339).
        #[arg(long)]
        from: Option<String>,
        /// Latest conversation start (YYYY-MM-DD or RFC 3339).
        #[arg(long)]
        to: Option<String>,
        /// Maximum number of relevant conversations (1-20).
        #[arg(long)]
        limit: Option<u32>,
    },
}

fn parse_status(s: &str) -> Result<ConversationStatus, String> {
    ConversationStatus::parse(s).ok_or_else(|| format!("unknown status '{}' (active, ended)", s))
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > COLLOQUY_CONFIG env var > ~/.colloquy/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("COLLOQUY_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the service base URL.
    ///
    /// Priority: --base-url flag > COLLOQUY_BASE_URL env var > config file value.
    pub fn resolve_base_url(&self, config_url: &str) -> String {
        if let Some(ref url) = self.base_url {
            return url.clone();
        }
        if let Ok(url) = std::env::var("COLLOQUY_BASE_URL") {
            if !url.trim().is_empty() {
                return url;
            }
        }
        config_url.to_string()
    }

    /// Resolve the log level.
    ///
    /// Priority: --log-level flag > config file value > info.
    /// `RUST_LOG` overrides all of these when the subscriber is built.
    pub fn resolve_log_level(&self, config_level: Option<&str>) -> String {
        self.log_level
            .clone()
            .or_else(|| config_level.map(str::to_string))
            .unwrap_or_else(|| "info".to_string())
    }
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".colloquy").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".colloquy").join("config.toml");
    }
    PathBuf::from("config.toml")
}
