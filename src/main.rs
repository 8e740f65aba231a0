mod cli;
mod completion;
mod error;
mod locale;
mod models;

use std::io;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use dotenv::dotenv;
use eyre::Result;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

use crate::cli::chat::{ChatContext, ChatSettings};
use crate::completion::{Backend, DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE, GenerationOptions};
use crate::error::ChatError;
use crate::locale::{Language, Locales};
use crate::models::ModelRegistry;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    chat: ChatArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a chat session
    Chat(ChatArgs),
}

#[derive(Args, Clone)]
struct ChatArgs {
    /// Input to send to the chat
    #[arg(short, long)]
    input: Option<String>,

    /// Conversation language (ja or en)
    #[arg(short, long, default_value = "ja")]
    language: Language,

    /// Completion backend (replicate or openai)
    #[arg(short, long, default_value = "replicate")]
    backend: Backend,

    /// Model id; defaults to the first model of the backend
    #[arg(short, long)]
    model: Option<String>,

    /// Sampling temperature between 0 and 1
    #[arg(short, long, default_value_t = DEFAULT_TEMPERATURE)]
    temperature: f64,

    /// Maximum response length, between 100 and 2000
    #[arg(long, default_value_t = DEFAULT_MAX_TOKENS)]
    max_tokens: u32,

    /// Fail a completion call that takes longer than this many seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Override the backend API base URL
    #[arg(long)]
    api_base: Option<String>,

    /// Replace the built-in system instruction
    #[arg(long)]
    system_prompt: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl ChatArgs {
    fn settings(&self) -> Result<ChatSettings, ChatError> {
        let model = match &self.model {
            Some(model) => model.clone(),
            None => ModelRegistry::builtin(self.backend)
                .default_id()
                .map(str::to_string)
                .ok_or_else(|| ChatError::UnknownModel(String::new()))?,
        };

        Ok(ChatSettings {
            language: self.language,
            backend: self.backend,
            model,
            options: GenerationOptions::new(self.temperature, self.max_tokens)?,
            timeout: self.timeout_secs.map(Duration::from_secs),
        })
    }

    fn locales(&self) -> Locales {
        match &self.system_prompt {
            Some(system_prompt) => Locales::builtin().with_system_prompt(system_prompt),
            None => Locales::builtin(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Load environment variables from .env file
    dotenv().ok();

    let cli = Cli::parse();
    let args = match cli.command {
        Some(Commands::Chat(args)) => args,
        None => cli.chat,
    };

    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting Kagami chat");

    let locales = args.locales();
    let settings = match args.settings() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{}", e);
            return Ok(ExitCode::FAILURE);
        }
    };

    let client = match settings.backend.client_from_env(args.api_base.as_deref()) {
        Ok(client) => client,
        Err(e) => {
            tracing::error!("Failed to initialize {} client: {}", settings.backend, e);
            if let Ok(strings) = locales.get(settings.language) {
                eprintln!("{}", strings.credential_error);
            }
            eprintln!("{}", e);
            return Ok(ExitCode::FAILURE);
        }
    };

    let interactive = args.input.is_none();
    let mut chat_context = match ChatContext::new(
        Box::new(io::stdout()),
        args.input.clone(),
        interactive,
        settings,
        locales,
        client,
    ) {
        Ok(context) => context,
        Err(e) => {
            eprintln!("{}", e);
            return Ok(ExitCode::FAILURE);
        }
    };

    chat_context.run().await
}
