pub mod openai;
pub mod replicate;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::cli::chat::conversation_state::Role;
use crate::error::ChatError;

pub use openai::OpenAiClient;
pub use replicate::ReplicateClient;

pub const DEFAULT_TEMPERATURE: f64 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 500;
pub const TOP_P: f64 = 0.9;
pub const REPETITION_PENALTY: f64 = 1.0;

pub const MIN_MAX_TOKENS: u32 = 100;
pub const MAX_MAX_TOKENS: u32 = 2000;

/// Sampling settings forwarded with every completion call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationOptions {
    pub temperature: f64,
    pub max_tokens: u32,
    pub top_p: f64,
    pub repetition_penalty: f64,
}

impl GenerationOptions {
    /// Validates the user-facing settings; `top_p` and `repetition_penalty` are fixed.
    pub fn new(temperature: f64, max_tokens: u32) -> Result<Self, ChatError> {
        if !(0.0..=1.0).contains(&temperature) {
            return Err(ChatError::validation(format!(
                "Temperature must be between 0 and 1, got {}",
                temperature
            )));
        }
        if !(MIN_MAX_TOKENS..=MAX_MAX_TOKENS).contains(&max_tokens) {
            return Err(ChatError::validation(format!(
                "Max tokens must be between {} and {}, got {}",
                MIN_MAX_TOKENS, MAX_MAX_TOKENS, max_tokens
            )));
        }
        Ok(Self {
            temperature,
            max_tokens,
            top_p: TOP_P,
            repetition_penalty: REPETITION_PENALTY,
        })
    }
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            top_p: TOP_P,
            repetition_penalty: REPETITION_PENALTY,
        }
    }
}

/// One entry of a chat-style request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role: role.as_str().to_string(),
            content: content.into(),
        }
    }
}

/// Everything a backend may need for one call.
///
/// Prompt-style backends read `prompt`, chat-style backends read `messages`.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model_ref: String,
    pub prompt: String,
    pub messages: Vec<ChatMessage>,
    pub options: GenerationOptions,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CompletionOutput {
    Text(String),
    Fragments(Vec<String>),
}

impl CompletionOutput {
    /// Join fragments in order and trim the surrounding whitespace.
    pub fn into_reply(self) -> String {
        match self {
            CompletionOutput::Text(text) => text.trim().to_string(),
            CompletionOutput::Fragments(fragments) => fragments.concat().trim().to_string(),
        }
    }
}

#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionOutput, ChatError>;
}

/// Run a completion call, failing with `ChatError::Timeout` when the limit passes.
pub async fn complete_with_timeout(
    client: &dyn CompletionClient,
    request: &CompletionRequest,
    limit: Option<Duration>,
) -> Result<CompletionOutput, ChatError> {
    match limit {
        Some(limit) => match tokio::time::timeout(limit, client.complete(request)).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Completion call exceeded {:?}", limit);
                Err(ChatError::Timeout(limit))
            }
        },
        None => client.complete(request).await,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    Replicate,
    OpenAi,
}

impl Backend {
    pub fn credential_var(&self) -> &'static str {
        match self {
            Backend::Replicate => "REPLICATE_API_TOKEN",
            Backend::OpenAi => "OPENAI_API_KEY",
        }
    }

    pub fn default_api_base(&self) -> &'static str {
        match self {
            Backend::Replicate => "https://api.replicate.com/",
            Backend::OpenAi => "https://api.openai.com/",
        }
    }

    /// Whether the backend takes a message list instead of a flattened prompt.
    pub fn uses_messages(&self) -> bool {
        matches!(self, Backend::OpenAi)
    }

    /// Builds a client from the credential found in the environment.
    pub fn client_from_env(&self, api_base: Option<&str>) -> Result<Box<dyn CompletionClient>, ChatError> {
        let api_key = std::env::var(self.credential_var())
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                ChatError::validation(format!(
                    "{} environment variable not set",
                    self.credential_var()
                ))
            })?;
        let api_base = api_base.unwrap_or(self.default_api_base());

        Ok(match self {
            Backend::Replicate => Box::new(ReplicateClient::new(api_key, api_base)?),
            Backend::OpenAi => Box::new(OpenAiClient::new(api_key, api_base)?),
        })
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Replicate => f.write_str("replicate"),
            Backend::OpenAi => f.write_str("openai"),
        }
    }
}

impl FromStr for Backend {
    type Err = ChatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "replicate" | "llama" => Ok(Backend::Replicate),
            "openai" | "gpt" => Ok(Backend::OpenAi),
            other => Err(ChatError::validation(format!("Unknown backend: {}", other))),
        }
    }
}

/// Ensures a base URL ends with `/` so `Url::join` appends instead of replacing.
pub(crate) fn parse_api_base(api_base: &str) -> Result<url::Url, ChatError> {
    let mut base = api_base.trim().to_string();
    if !base.ends_with('/') {
        base.push('/');
    }
    Ok(url::Url::parse(&base)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SlowClient;

    #[async_trait]
    impl CompletionClient for SlowClient {
        async fn complete(&self, _request: &CompletionRequest) -> Result<CompletionOutput, ChatError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(CompletionOutput::Text("late".to_string()))
        }
    }

    fn request() -> CompletionRequest {
        CompletionRequest {
            model_ref: "model".to_string(),
            prompt: "prompt".to_string(),
            messages: Vec::new(),
            options: GenerationOptions::default(),
        }
    }

    #[test]
    fn test_fragments_are_joined_and_trimmed() {
        let output = CompletionOutput::Fragments(vec![
            "Hel".to_string(),
            "lo ".to_string(),
            "Lee".to_string(),
        ]);
        assert_eq!(output.into_reply(), "Hello Lee");

        let output = CompletionOutput::Fragments(vec![" Hi".to_string(), " there \n".to_string()]);
        assert_eq!(output.into_reply(), "Hi there");
    }

    #[test]
    fn test_text_is_trimmed() {
        assert_eq!(
            CompletionOutput::Text("\n  Hello Lee  ".to_string()).into_reply(),
            "Hello Lee"
        );
    }

    #[test]
    fn test_options_accept_boundaries() {
        let low = GenerationOptions::new(0.0, 100).unwrap();
        assert_eq!(low.top_p, 0.9);
        assert_eq!(low.repetition_penalty, 1.0);
        assert!(GenerationOptions::new(1.0, 2000).is_ok());
    }

    #[test]
    fn test_options_reject_out_of_range() {
        assert!(matches!(
            GenerationOptions::new(1.5, 500),
            Err(ChatError::Validation(_))
        ));
        assert!(matches!(
            GenerationOptions::new(-0.1, 500),
            Err(ChatError::Validation(_))
        ));
        assert!(matches!(
            GenerationOptions::new(0.7, 99),
            Err(ChatError::Validation(_))
        ));
        assert!(matches!(
            GenerationOptions::new(0.7, 2001),
            Err(ChatError::Validation(_))
        ));
    }

    #[test]
    fn test_backend_parsing() {
        assert_eq!("Replicate".parse::<Backend>().unwrap(), Backend::Replicate);
        assert_eq!("openai".parse::<Backend>().unwrap(), Backend::OpenAi);
        assert!("claude".parse::<Backend>().is_err());
    }

    #[test]
    fn test_parse_api_base_appends_slash() {
        let base = parse_api_base("http://127.0.0.1:8080/proxy").unwrap();
        assert_eq!(
            base.join("v1/predictions").unwrap().as_str(),
            "http://127.0.0.1:8080/proxy/v1/predictions"
        );
    }

    #[tokio::test]
    async fn test_timeout_is_distinct_error() {
        let result =
            complete_with_timeout(&SlowClient, &request(), Some(Duration::from_millis(20))).await;
        assert!(matches!(result, Err(ChatError::Timeout(_))));
    }
}
