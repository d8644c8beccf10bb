//! Colloquy binary: composition root.
//!
//! 1. Parse arguments and load configuration from TOML
//! 2. Initialize tracing
//! 3. Build the HTTP transport and the controllers
//! 4. Run the requested command

mod cli;
mod render;
mod repl;

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use colloquy_chat::{parse_date_bound, QueryController, SessionController, TracingNotifier};
use colloquy_core::config::ColloquyConfig;
use colloquy_core::error::Result;
use colloquy_core::types::{ListFilter, QueryRequest};
use colloquy_transport::{ConversationTransport, HttpTransport};

use cli::{CliArgs, Command};
use render::ConsoleNotifier;

fn init_tracing(level: &str) {
    // Logs go to stderr so command output stays clean on stdout.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

async fn run(args: CliArgs, mut config: ColloquyConfig) -> Result<()> {
    config.transport.base_url = args.resolve_base_url(&config.transport.base_url);
    config.validate()?;

    let transport: Arc<dyn ConversationTransport> =
        Arc::new(HttpTransport::from_config(&config.transport)?);
    tracing::debug!(base_url = %config.transport.base_url, "Transport ready");

    match args.command {
        Command::List { status, search } => {
            let session = SessionController::new(transport, Arc::new(TracingNotifier));
            let filter = ListFilter { status, search };
            let conversations = session.browse(&filter).await?;
            if conversations.is_empty() {
                println!("No conversations found.");
            }
            for conversation in &conversations {
                println!("{}", render::conversation_line(conversation));
            }
        }
        Command::Show { id } => {
            let session = SessionController::new(transport, Arc::new(TracingNotifier));
            let conversation = session.inspect(id).await?;
            println!("{}", render::conversation_detail(&conversation));
        }
        Command::Chat { resume } => {
            let session = SessionController::new(transport, Arc::new(ConsoleNotifier))
                .with_default_title(config.chat.default_title.clone());
            repl::run(&session, resume).await?;
        }
        Command::Ask {
            question,
            from,
            to,
            limit,
        } => {
            let queries = QueryController::new(transport, Arc::new(TracingNotifier))
                .with_default_limit(config.query.default_limit);

            let mut request = QueryRequest::new(question.join(" "));
            if let Some(ref from) = from {
                request = request.with_date_from(parse_date_bound(from)?);
            }
            if let Some(ref to) = to {
                request = request.with_date_to(parse_date_bound(to)?);
            }
            if let Some(limit) = limit {
                request = request.with_limit(limit);
            }

            let result = queries.query(request).await?;
            println!("{}", render::query_result(&result));
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = CliArgs::parse();

    // Config is read before tracing starts so its log level can apply.
    let config_file = args.resolve_config_path();
    let loaded = if config_file.exists() {
        Some(ColloquyConfig::load(&config_file))
    } else {
        None
    };
    let config_level = match loaded {
        Some(Ok(ref config)) => Some(config.general.log_level.as_str()),
        _ => None,
    };
    init_tracing(&args.resolve_log_level(config_level));

    let config = match loaded {
        Some(Ok(config)) => {
            tracing::info!(path = %config_file.display(), "Configuration loaded");
            config
        }
        Some(Err(e)) => {
            tracing::warn!(
                path = %config_file.display(),
                error = %e,
                "Failed to load config, using defaults"
            );
            ColloquyConfig::default()
        }
        None => {
            tracing::debug!(path = %config_file.display(), "No config file, using defaults");
            ColloquyConfig::default()
        }
    };

    match run(args, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}
