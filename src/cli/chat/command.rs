use crate::error::ChatError;

/// A line typed at the chat prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Quit,
    Reset,
    History,
    Language(String),
    Model(Option<String>),
    Message(String),
}

impl Command {
    pub fn parse(input: &str) -> Result<Self, ChatError> {
        let trimmed = input.trim();
        if !trimmed.starts_with('/') {
            return Ok(Command::Message(input.to_string()));
        }

        let mut parts = trimmed.splitn(2, char::is_whitespace);
        let name = parts.next().unwrap_or_default();
        let arg = parts.next().map(str::trim).filter(|arg| !arg.is_empty());

        match (name, arg) {
            ("/help", _) => Ok(Command::Help),
            ("/quit" | "/exit", _) => Ok(Command::Quit),
            ("/reset" | "/clear", _) => Ok(Command::Reset),
            ("/history", _) => Ok(Command::History),
            ("/lang", Some(lang)) => Ok(Command::Language(lang.to_string())),
            ("/lang", None) => Err(ChatError::validation("Usage: /lang <ja|en>")),
            ("/model", arg) => Ok(Command::Model(arg.map(str::to_string))),
            (other, _) => Err(ChatError::validation(format!("Unknown command: {}", other))),
        }
    }
}
