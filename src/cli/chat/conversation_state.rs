use std::fmt;

use crate::error::ChatError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    /// Label used when a turn is flattened into a prompt line.
    pub fn label(&self) -> &'static str {
        match self {
            Role::System => "System",
            Role::User => "User",
            Role::Assistant => "Assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    role: Role,
    text: String,
}

impl Turn {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

/// The ordered turns of one chat session.
///
/// Once initialized the first turn is always the system instruction. Turns
/// are never removed individually; `reset` rebuilds the whole sequence.
#[derive(Debug, Clone, Default)]
pub struct ConversationState {
    turns: Vec<Turn>,
    seed: Option<(String, String)>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn initialize(&mut self, system_instruction: &str, greeting: &str) {
        self.seed = Some((system_instruction.to_string(), greeting.to_string()));
        self.reset();
    }

    pub fn append_user(&mut self, text: &str) -> Result<(), ChatError> {
        if text.trim().is_empty() {
            return Err(ChatError::validation("Message cannot be empty"));
        }
        self.turns.push(Turn::new(Role::User, text));
        Ok(())
    }

    pub fn append_assistant(&mut self, text: &str) {
        self.turns.push(Turn::new(Role::Assistant, text));
    }

    pub fn reset(&mut self) {
        self.turns.clear();
        if let Some((system_instruction, greeting)) = &self.seed {
            self.turns.push(Turn::new(Role::System, system_instruction.as_str()));
            self.turns.push(Turn::new(Role::Assistant, greeting.as_str()));
        }
    }

    pub fn last_role(&self) -> Option<Role> {
        self.turns.last().map(Turn::role)
    }

    /// True when the conversation ends in a turn that still waits for a reply.
    pub fn needs_completion(&self) -> bool {
        !self.is_empty() && self.last_role() != Some(Role::Assistant)
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn system_instruction(&self) -> Option<&str> {
        self.turns
            .first()
            .filter(|turn| turn.role() == Role::System)
            .map(Turn::text)
    }

    /// Turns after the system instruction, in order.
    pub fn visible_turns(&self) -> &[Turn] {
        match self.turns.first() {
            Some(first) if first.role() == Role::System => &self.turns[1..],
            _ => &self.turns,
        }
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}
