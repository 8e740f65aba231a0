use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::ChatError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    Japanese,
    English,
}

impl Language {
    pub fn code(&self) -> &'static str {
        match self {
            Language::Japanese => "ja",
            Language::English => "en",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Language::Japanese => f.write_str("日本語"),
            Language::English => f.write_str("English"),
        }
    }
}

impl FromStr for Language {
    type Err = ChatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ja" | "jp" | "japanese" | "日本語" => Ok(Language::Japanese),
            "en" | "english" => Ok(Language::English),
            other => Err(ChatError::validation(format!(
                "Unsupported language: {} (expected ja or en)",
                other
            ))),
        }
    }
}

/// User-facing text for one language.
#[derive(Debug, Clone)]
pub struct LocaleStrings {
    pub system_prompt: String,
    pub greeting: String,
    pub credential_error: String,
    pub welcome: String,
    pub help: String,
    pub reset_notice: String,
    pub pending: String,
    pub model_label: String,
    pub title: String,
    pub subtitle: String,
}

const SYSTEM_PROMPT_JA: &str = "あなたはセルフコンパッションの専門家です。まず、ユーザーにお名前を尋ね、その名前を使って対話を進めてください。以降の会話では、ユーザーの回答が一度に一つの項目に絞られるよう、各質問は必ず単一の回答のみを求める形式で1つずつ提示してください。ユーザーが体験を語る際は、具体的な内容に基づいて、安心できるように1つずつ丁寧な質問を行ってください。最後に温かい言葉で会話を締め、ユーザーに安心感を提供してください。";

const SYSTEM_PROMPT_EN: &str = "You are an expert in self-compassion. Begin by asking the user for their name and refer to them by that name throughout the conversation. Ensure that every question you ask requires only one single answer at a time. When the user shares experiences, ask one concrete question based on the details provided, one at a time. Conclude the conversation with warm, reassuring words that offer comfort and security.";

const HELP_JA: &str = "
/reset          会話をリセット
/lang <ja|en>   言語を切り替え (会話はリセットされます)
/model [id]     モデルの一覧表示・切り替え
/history        これまでの会話を表示
/help           このヘルプを表示
/quit           終了
";

const HELP_EN: &str = "
/reset          Reset the conversation
/lang <ja|en>   Switch language (resets the conversation)
/model [id]     List or switch models
/history        Show the conversation so far
/help           Show this help
/quit           Quit the application
";

/// Lookup table from language to its strings, built once at startup.
#[derive(Debug, Clone)]
pub struct Locales {
    table: HashMap<Language, LocaleStrings>,
}

impl Locales {
    pub fn builtin() -> Self {
        let mut table = HashMap::new();
        table.insert(
            Language::Japanese,
            LocaleStrings {
                system_prompt: SYSTEM_PROMPT_JA.to_string(),
                greeting: "こんにちは。お名前を教えてください。".to_string(),
                credential_error: "APIキーを設定してください。".to_string(),
                welcome: "もう1人の優しい自分に出会う".to_string(),
                help: HELP_JA.to_string(),
                reset_notice: "会話をリセットしました。".to_string(),
                pending: "考えています...".to_string(),
                model_label: "モデルを選んでください".to_string(),
                title: "Kagami".to_string(),
                subtitle: "/help でコマンド一覧".to_string(),
            },
        );
        table.insert(
            Language::English,
            LocaleStrings {
                system_prompt: SYSTEM_PROMPT_EN.to_string(),
                greeting: "Hello. Could you please tell me your name?".to_string(),
                credential_error: "Please set your API key.".to_string(),
                welcome: "Meet your kind inner self".to_string(),
                help: HELP_EN.to_string(),
                reset_notice: "Conversation reset.".to_string(),
                pending: "Thinking...".to_string(),
                model_label: "Select a model".to_string(),
                title: "Kagami".to_string(),
                subtitle: "Type /help for commands".to_string(),
            },
        );
        Self { table }
    }

    /// Replace the system instruction for every language.
    pub fn with_system_prompt(mut self, system_prompt: &str) -> Self {
        for strings in self.table.values_mut() {
            strings.system_prompt = system_prompt.to_string();
        }
        self
    }

    pub fn get(&self, language: Language) -> Result<&LocaleStrings, ChatError> {
        self.table.get(&language).ok_or_else(|| {
            ChatError::validation(format!("No strings configured for {}", language))
        })
    }
}
