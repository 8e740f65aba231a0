pub mod command;
pub mod conversation_state;
pub mod prompt;
pub mod prompt_builder;

use std::io::Write;
use std::process::ExitCode;
use std::time::Duration;

use color_print::cformat;
use command::Command;
use conversation_state::{ConversationState, Role};
use crossterm::cursor::MoveToColumn;
use crossterm::queue;
use crossterm::style::Print;
use crossterm::terminal::{Clear, ClearType};
use eyre::Result;
use prompt::generate_prompt;
use tracing::{debug, info, warn};

use crate::completion::{
    self, Backend, CompletionClient, CompletionRequest, GenerationOptions,
};
use crate::error::ChatError;
use crate::locale::{Language, LocaleStrings, Locales};
use crate::models::ModelRegistry;

/// Settings chosen at startup; language and model may change during the session.
#[derive(Debug, Clone)]
pub struct ChatSettings {
    pub language: Language,
    pub backend: Backend,
    pub model: String,
    pub options: GenerationOptions,
    pub timeout: Option<Duration>,
}

/// One chat session. Owns the only conversation and the completion client.
pub struct ChatContext {
    output: Box<dyn Write>,
    input: Option<String>,
    interactive: bool,
    settings: ChatSettings,
    locales: Locales,
    models: ModelRegistry,
    conversation_state: ConversationState,
    client: Box<dyn CompletionClient>,
}

impl ChatContext {
    pub fn new(
        output: Box<dyn Write>,
        input: Option<String>,
        interactive: bool,
        settings: ChatSettings,
        locales: Locales,
        client: Box<dyn CompletionClient>,
    ) -> Result<Self, ChatError> {
        let models = ModelRegistry::builtin(settings.backend);
        models.resolve(&settings.model)?;

        let mut conversation_state = ConversationState::new();
        let strings = locales.get(settings.language)?;
        conversation_state.initialize(&strings.system_prompt, &strings.greeting);

        Ok(Self {
            output,
            input,
            interactive,
            settings,
            locales,
            models,
            conversation_state,
            client,
        })
    }

    #[cfg(test)]
    pub fn conversation(&self) -> &ConversationState {
        &self.conversation_state
    }

    #[cfg(test)]
    pub fn settings(&self) -> &ChatSettings {
        &self.settings
    }

    pub async fn run(&mut self) -> Result<ExitCode> {
        info!(
            "Starting session: backend={} model={} language={}",
            self.settings.backend,
            self.settings.model,
            self.settings.language.code()
        );

        if self.interactive {
            self.print_welcome()?;
        }

        // Handle non-interactive mode (single query)
        if let Some(input) = self.input.take() {
            return match self.execute(&input).await {
                Ok(_) => Ok(ExitCode::SUCCESS),
                Err(err) => {
                    self.report(&err)?;
                    Ok(ExitCode::FAILURE)
                }
            };
        }

        if self.interactive {
            self.run_interactive().await?;
        }

        Ok(ExitCode::SUCCESS)
    }

    fn strings(&self) -> Result<LocaleStrings, ChatError> {
        self.locales.get(self.settings.language).cloned()
    }

    fn print_welcome(&mut self) -> Result<()> {
        let strings = self.strings()?;
        writeln!(
            self.output,
            "{}",
            cformat!("\n<bold>{}</> <dim>{}</>", strings.title, strings.welcome)
        )?;
        writeln!(self.output, "{}", cformat!("<dim>{}</>\n", strings.subtitle))?;
        self.print_latest_reply()?;
        Ok(())
    }

    async fn run_interactive(&mut self) -> Result<()> {
        let mut rl = prompt::rl()?;

        loop {
            let prompt_text = generate_prompt(self.settings.language);
            let readline = rl.readline(&prompt_text);

            match readline {
                Ok(line) => {
                    if line.trim().is_empty() {
                        continue;
                    }

                    rl.add_history_entry(line.as_str());

                    if !self.handle_input(&line).await? {
                        break;
                    }
                }
                Err(rustyline::error::ReadlineError::Interrupted)
                | Err(rustyline::error::ReadlineError::Eof) => break,
                Err(e) => {
                    writeln!(self.output, "Error: {}", e)?;
                    break;
                }
            }
        }

        Ok(())
    }

    /// Handles one line of input. Returns `false` when the session should end.
    ///
    /// Chat errors are printed and never end the session; only output
    /// failures propagate.
    pub async fn handle_input(&mut self, input: &str) -> Result<bool> {
        match self.execute(input).await {
            Ok(keep_going) => Ok(keep_going),
            Err(err) => {
                self.report(&err)?;
                Ok(true)
            }
        }
    }

    async fn execute(&mut self, input: &str) -> Result<bool, ChatError> {
        match Command::parse(input)? {
            Command::Quit => Ok(false),
            command => {
                self.dispatch(command).await?;
                Ok(true)
            }
        }
    }

    fn report(&mut self, err: &ChatError) -> Result<()> {
        warn!("{:?}", err);
        self.print_error(err)
    }

    async fn dispatch(&mut self, command: Command) -> Result<(), ChatError> {
        match command {
            Command::Help => {
                let strings = self.strings()?;
                writeln!(self.output, "{}", strings.help)?;
            }
            Command::Reset => {
                self.conversation_state.reset();
                let strings = self.strings()?;
                writeln!(self.output, "{}", strings.reset_notice)?;
                self.print_latest_reply()?;
            }
            Command::History => self.print_history()?,
            Command::Language(lang) => self.switch_language(lang.parse()?)?,
            Command::Model(None) => self.print_models()?,
            Command::Model(Some(id)) => {
                self.models.resolve(&id)?;
                info!("Switched model to {}", id);
                self.settings.model = id;
                writeln!(self.output, "Model: {}", self.settings.model)?;
            }
            Command::Message(text) => {
                self.submit(&text).await?;
                self.print_latest_reply()?;
            }
            Command::Quit => {}
        }
        Ok(())
    }

    /// Sends one user message and records exactly one assistant turn for it.
    ///
    /// Upstream failures and timeouts are recorded as an `Error: ...` turn
    /// and returned. Validation and model errors leave the conversation as is.
    pub async fn submit(&mut self, text: &str) -> Result<String, ChatError> {
        if text.trim().is_empty() {
            return Err(ChatError::validation("Message cannot be empty"));
        }
        let model_ref = self.models.resolve(&self.settings.model)?.to_string();

        let messages = if self.settings.backend.uses_messages() {
            prompt_builder::message_window(
                &self.conversation_state,
                text,
                prompt_builder::MAX_HISTORY,
            )
        } else {
            Vec::new()
        };
        let request = CompletionRequest {
            model_ref,
            prompt: prompt_builder::build(&self.conversation_state, text),
            messages,
            options: self.settings.options,
        };

        self.show_pending()?;
        let appended = self.conversation_state.append_user(text).and_then(|_| {
            if self.conversation_state.needs_completion() {
                Ok(())
            } else {
                Err(ChatError::validation("Conversation already has a reply"))
            }
        });
        if let Err(err) = appended {
            if let Err(clear_err) = self.clear_pending() {
                warn!("Failed to clear pending indicator: {}", clear_err);
            }
            return Err(err);
        }
        debug!("Requesting completion for turn {}", self.conversation_state.len());

        let result =
            completion::complete_with_timeout(&*self.client, &request, self.settings.timeout)
                .await;
        if let Err(err) = self.clear_pending() {
            warn!("Failed to clear pending indicator: {}", err);
        }

        match result {
            Ok(output) => {
                let reply = output.into_reply();
                self.conversation_state.append_assistant(&reply);
                Ok(reply)
            }
            Err(err) => {
                let err = if err.is_recorded() {
                    err
                } else {
                    ChatError::upstream(err.to_string())
                };
                self.conversation_state
                    .append_assistant(&format!("Error: {}", err));
                Err(err)
            }
        }
    }

    fn switch_language(&mut self, language: Language) -> Result<(), ChatError> {
        if language == self.settings.language {
            writeln!(self.output, "Language: {}", language)?;
            return Ok(());
        }

        let strings = self.locales.get(language)?.clone();
        self.settings.language = language;
        self.conversation_state
            .initialize(&strings.system_prompt, &strings.greeting);
        info!("Language changed to {}, conversation reset", language.code());

        writeln!(self.output, "Language: {}", language)?;
        self.print_latest_reply()?;
        Ok(())
    }

    fn show_pending(&mut self) -> Result<(), ChatError> {
        if !self.interactive {
            return Ok(());
        }
        let pending = self.strings()?.pending;
        queue!(self.output, Print(cformat!("<dim>{}</>", pending)))?;
        self.output.flush()?;
        Ok(())
    }

    fn clear_pending(&mut self) -> Result<(), ChatError> {
        if !self.interactive {
            return Ok(());
        }
        queue!(self.output, MoveToColumn(0), Clear(ClearType::CurrentLine))?;
        self.output.flush()?;
        Ok(())
    }

    fn print_latest_reply(&mut self) -> Result<(), ChatError> {
        if self.conversation_state.last_role() != Some(Role::Assistant) {
            return Ok(());
        }
        let reply = self
            .conversation_state
            .turns()
            .last()
            .map(|turn| turn.text().to_string())
            .unwrap_or_default();
        writeln!(self.output, "{}\n", cformat!("<cyan><bold>Kagami:</></> {}", reply))?;
        Ok(())
    }

    fn print_history(&mut self) -> Result<(), ChatError> {
        let lines: Vec<String> = self
            .conversation_state
            .visible_turns()
            .iter()
            .map(|turn| match turn.role() {
                Role::User => cformat!("<green><bold>You:</></> {}", turn.text()),
                _ => cformat!("<cyan><bold>Kagami:</></> {}", turn.text()),
            })
            .collect();
        for line in lines {
            writeln!(self.output, "{}", line)?;
        }
        Ok(())
    }

    fn print_models(&mut self) -> Result<(), ChatError> {
        let strings = self.strings()?;
        writeln!(self.output, "{}:", strings.model_label)?;
        let lines: Vec<String> = self
            .models
            .entries()
            .iter()
            .map(|entry| {
                let marker = if entry.id == self.settings.model { "*" } else { " " };
                format!(
                    "{} {:<20} {}",
                    marker,
                    entry.id,
                    entry.label(self.settings.language)
                )
            })
            .collect();
        for line in lines {
            writeln!(self.output, "{}", line)?;
        }
        Ok(())
    }

    fn print_error(&mut self, err: &ChatError) -> Result<()> {
        let message = match err {
            ChatError::Validation(_) | ChatError::UnknownModel(_) => err.to_string(),
            _ => format!("Error: {}", err),
        };
        writeln!(self.output, "{}", cformat!("<red>{}</>", message))?;
        Ok(())
    }
}
