use super::conversation_state::{ConversationState, Role, Turn};
use crate::completion::ChatMessage;

/// Used when the conversation has no system turn yet.
pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "You are a helpful assistant.";

/// Number of turns after the system instruction sent to chat-style backends.
pub const MAX_HISTORY: usize = 5;

/// Flatten a conversation and a new user message into a single completion prompt.
///
/// Every turn after the system instruction becomes a `"<Role>: <text>"` line.
/// The prompt ends with an `Assistant: ` cue so the model answers in the
/// assistant voice.
pub fn build(conversation: &ConversationState, new_user_text: &str) -> String {
    let system = conversation
        .system_instruction()
        .unwrap_or(DEFAULT_SYSTEM_INSTRUCTION);

    let mut prompt = String::with_capacity(system.len() + new_user_text.len() + 64);
    prompt.push_str(system);
    prompt.push('\n');

    for turn in conversation.visible_turns() {
        render_turn(&mut prompt, turn);
    }

    prompt.push_str("\nUser: ");
    prompt.push_str(new_user_text);
    prompt.push_str("\n\nAssistant: ");
    prompt
}

fn render_turn(out: &mut String, turn: &Turn) {
    // only two labels appear in a prompt
    let label = match turn.role() {
        Role::Assistant => Role::Assistant.label(),
        Role::User | Role::System => Role::User.label(),
    };
    out.push_str(label);
    out.push_str(": ");
    out.push_str(turn.text());
    out.push('\n');
}

/// The system instruction followed by the last `max_history` turns, the new
/// user message counting as the most recent one.
pub fn message_window(
    conversation: &ConversationState,
    new_user_text: &str,
    max_history: usize,
) -> Vec<ChatMessage> {
    let system = conversation
        .system_instruction()
        .unwrap_or(DEFAULT_SYSTEM_INSTRUCTION);
    let history = conversation.visible_turns();
    let start = history.len().saturating_sub(max_history.saturating_sub(1));

    let mut messages = Vec::with_capacity(history.len() - start + 2);
    messages.push(ChatMessage::new(Role::System, system));
    messages.extend(
        history[start..]
            .iter()
            .map(|turn| ChatMessage::new(turn.role(), turn.text())),
    );
    messages.push(ChatMessage::new(Role::User, new_user_text));
    messages
}
