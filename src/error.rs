use std::time::Duration;

use thiserror::Error;

/// Errors surfaced to the user during a chat session.
///
/// None of these end the session. `Upstream` and `Timeout` are also written
/// into the conversation as an assistant turn so the history shows the failure.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Empty submission, missing credential, or an out-of-range setting
    #[error("{0}")]
    Validation(String),

    /// The selected model has no mapped upstream reference
    #[error("Unknown model: {0}")]
    UnknownModel(String),

    /// The completion call failed for a transport or API reason
    #[error("{0}")]
    Upstream(String),

    /// The completion call did not finish in time
    #[error("Completion request timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ChatError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Self::Upstream(message.into())
    }

    /// Whether the failure belongs in the conversation history.
    pub fn is_recorded(&self) -> bool {
        matches!(self, Self::Upstream(_) | Self::Timeout(_))
    }
}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        Self::Upstream(err.to_string())
    }
}

impl From<serde_json::Error> for ChatError {
    fn from(err: serde_json::Error) -> Self {
        Self::Upstream(format!("Malformed response: {}", err))
    }
}

impl From<url::ParseError> for ChatError {
    fn from(err: url::ParseError) -> Self {
        Self::Validation(format!("Invalid API base URL: {}", err))
    }
}
