use rustyline::{Config, Editor, Result};

use crate::locale::Language;

pub fn generate_prompt(language: Language) -> String {
    match language {
        Language::Japanese => "あなた> ".to_string(),
        Language::English => "You> ".to_string(),
    }
}

pub fn rl() -> Result<Editor<()>> {
    let config = Config::builder()
        .history_ignore_space(true)
        .history_ignore_dups(true)
        .build();
    Editor::with_config(config)
}
