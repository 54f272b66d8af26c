mod command;
pub mod conversation;
mod input_source;
pub mod model;
pub mod output_buffer;
pub mod parse;
pub mod parser;
pub mod pipeline;
pub mod tool_host;
pub mod tool_resolver;
mod tool_ui;

use std::io::{
    IsTerminal,
    Read,
    Write,
};
use std::process::ExitCode;
use std::sync::Arc;

use clap::Args;
use command::SlashCommand;
use conversation::ConversationState;
use crossterm::style::{
    self,
    Attribute,
    Color,
};
use crossterm::{
    execute,
    queue,
    terminal,
};
use eyre::{
    Result,
    bail,
};
use input_source::InputSource;
use output_buffer::{
    MarkdownRenderer,
    PlainRenderer,
};
use parse::TerminalRenderer;
use pipeline::ResponsePipeline;
use thiserror::Error;
use tool_host::NoToolHost;
use tool_resolver::ToolCategoryPreference;
use tool_ui::TerminalToolUi;
use tracing::{
    debug,
    error,
    info,
    warn,
};

use crate::api_client::{
    ApiClient,
    ApiClientError,
};
use crate::settings::{
    Setting,
    Settings,
};
use crate::util::DEFAULT_MODEL_ID;
use crate::util::spinner::SpinnerSlot;

pub const EXTRA_HELP: &str = color_print::cstr! {"
<cyan,em>Tips:</cyan,em>
<em>Ctrl(^) + j</em>         <black!>Insert new-line to provide multi-line prompt</black!>
                    <black!>Alternatively, [Alt(⌥) + Enter(⏎)]</black!>
<em>Ctrl(^) + c</em>         <black!>Quit the session</black!>
"};

const WELCOME_TEXT: &str = color_print::cstr! {"<em>Welcome to <cyan!>gchat</cyan!>!</em>"};

const POPULAR_SHORTCUTS: &str = color_print::cstr! {"<black!><green!>/help</green!> all commands  <em>•</em>  <green!>/tools</green!> attached tools  <em>•</em>  <green!>ctrl + j</green!> new lines</black!>"};

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("{0}")]
    Client(Box<ApiClientError>),
    #[error("{0}")]
    ResponseStream(Box<parser::RecvError>),
    #[error("{0}")]
    Std(#[from] std::io::Error),
    #[error("{0}")]
    Readline(#[from] rustyline::error::ReadlineError),
}

impl ChatError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ChatError::Client(e) => e.status_code(),
            ChatError::ResponseStream(e) => match &e.source {
                parser::RecvErrorKind::Client(e) => e.status_code(),
                parser::RecvErrorKind::Hook(_) => None,
            },
            ChatError::Std(_) => None,
            ChatError::Readline(_) => None,
        }
    }
}

impl From<ApiClientError> for ChatError {
    fn from(value: ApiClientError) -> Self {
        Self::Client(Box::new(value))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Args)]
pub struct ChatArgs {
    /// Model to use, for example gemini-2.5-pro
    #[arg(long = "model")]
    pub model: Option<String>,
    /// Which tools to attach to requests
    ///
    /// External tools come from a ToolHost supplied by an application embedding the gchat
    /// library. The gchat binary has no tool host, so `external` attaches no tools.
    #[arg(long = "tools", value_enum)]
    pub tools: Option<ToolCategoryPreference>,
    /// System instruction sent with every request
    #[arg(long = "system")]
    pub system: Option<String>,
    /// Whether the command should run without expecting user input
    #[arg(long, alias = "non-interactive")]
    pub no_interactive: bool,
    /// The first question to ask
    pub input: Option<String>,
}

impl ChatArgs {
    pub async fn execute(self) -> Result<ExitCode> {
        let settings = Settings::load().await?;
        let config = ChatConfig::resolve(&self, &settings);
        let interactive = !self.no_interactive;
        let mut input = self.input;

        if !interactive && input.is_none() {
            if !std::io::stdin().is_terminal() {
                let mut buffer = String::new();
                match std::io::stdin().read_to_string(&mut buffer) {
                    Ok(_) => {
                        if !buffer.trim().is_empty() {
                            input = Some(buffer.trim().to_string());
                        }
                    },
                    Err(e) => {
                        eprintln!("Error reading from stdin: {}", e);
                    },
                }
            }

            if input.is_none() {
                bail!("Input must be supplied when running in non-interactive mode");
            }
        }

        let client = ApiClient::new(&settings)?.with_tool_host(Arc::new(NoToolHost));
        let conversation = ConversationState::new(config.system_instruction);
        info!(conversation_id = conversation.conversation_id(), model_id = %config.model_id, "starting chat");

        let stdout: Box<dyn Write + Send> = Box::new(std::io::stdout());
        let stderr: Box<dyn Write + Send> = Box::new(std::io::stderr());
        let input_source = InputSource::new()?;

        if std::io::stdout().is_terminal() {
            let renderer = TerminalRenderer::new(terminal::window_size().map(|s| s.columns.into()).ok());
            let pipeline = ResponsePipeline::new(client, config.model_id, config.tool_preference, renderer);
            ChatSession::new(stdout, stderr, input_source, input, conversation, pipeline, interactive)
                .spawn()
                .await?;
        } else {
            let pipeline = ResponsePipeline::new(client, config.model_id, config.tool_preference, PlainRenderer);
            ChatSession::new(stdout, stderr, input_source, input, conversation, pipeline, interactive)
                .spawn()
                .await?;
        }

        Ok(ExitCode::SUCCESS)
    }
}

/// Configuration fixed for the whole session. Flags win over settings, settings over defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatConfig {
    pub model_id: String,
    pub tool_preference: ToolCategoryPreference,
    pub system_instruction: Option<String>,
}

impl ChatConfig {
    pub fn resolve(args: &ChatArgs, settings: &Settings) -> Self {
        let model_id = args
            .model
            .clone()
            .or_else(|| settings.get_string(Setting::ChatDefaultModel))
            .unwrap_or_else(|| DEFAULT_MODEL_ID.to_owned());
        if model::capability(&model_id).is_none() {
            warn!(%model_id, "unknown model, only external tools will be attached");
        }

        let tool_preference = args.tools.unwrap_or_else(|| {
            let Some(value) = settings.get_string(Setting::ChatToolPreference) else {
                return ToolCategoryPreference::default();
            };
            value.parse().unwrap_or_else(|_| {
                warn!(%value, "invalid {}, using the default", Setting::ChatToolPreference);
                ToolCategoryPreference::default()
            })
        });

        let system_instruction = args
            .system
            .clone()
            .or_else(|| settings.get_string(Setting::ChatSystemInstruction));

        Self {
            model_id,
            tool_preference,
            system_instruction,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatState {
    /// Prompt the user for the next input.
    PromptUser,
    /// Handle one line of user input.
    HandleInput { input: String },
    /// Exit the chat.
    Exit,
}

/// A cloneable handle to one output stream. Tool hooks get a clone of the session's stderr.
#[derive(Clone)]
pub struct SharedWriter(Arc<parking_lot::Mutex<Box<dyn Write + Send>>>);

impl SharedWriter {
    pub fn new(inner: Box<dyn Write + Send>) -> Self {
        Self(Arc::new(parking_lot::Mutex::new(inner)))
    }
}

impl Write for SharedWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.0.lock().flush()
    }
}

pub struct ChatSession<R> {
    stdout: Box<dyn Write + Send>,
    stderr: SharedWriter,
    input_source: InputSource,
    initial_input: Option<String>,
    conversation: ConversationState,
    pipeline: ResponsePipeline<R>,
    spinner: SpinnerSlot,
    interactive: bool,
}

impl<R: MarkdownRenderer + Clone> ChatSession<R> {
    pub fn new(
        stdout: Box<dyn Write + Send>,
        stderr: Box<dyn Write + Send>,
        input_source: InputSource,
        initial_input: Option<String>,
        conversation: ConversationState,
        pipeline: ResponsePipeline<R>,
        interactive: bool,
    ) -> Self {
        Self {
            stdout,
            stderr: SharedWriter::new(stderr),
            input_source,
            initial_input,
            conversation,
            pipeline,
            spinner: SpinnerSlot::default(),
            interactive,
        }
    }

    pub async fn spawn(&mut self) -> Result<(), ChatError> {
        if self.interactive {
            execute!(
                self.stderr,
                style::Print(format!("\n{WELCOME_TEXT}\n\n{POPULAR_SHORTCUTS}\n\n")),
                style::SetForegroundColor(Color::DarkGrey),
                style::Print(format!("Model: {}\n\n", self.pipeline.model_id())),
                style::SetForegroundColor(Color::Reset),
            )?;
        }

        let mut state = match self.initial_input.take() {
            Some(input) => ChatState::HandleInput { input },
            None => ChatState::PromptUser,
        };

        loop {
            state = match state {
                ChatState::PromptUser => self.prompt_user()?,
                ChatState::HandleInput { input } => self.handle_input(input).await?,
                ChatState::Exit => return Ok(()),
            };
        }
    }

    fn prompt_user(&mut self) -> Result<ChatState, ChatError> {
        if !self.interactive {
            return Ok(ChatState::Exit);
        }

        execute!(self.stderr, style::SetForegroundColor(Color::Magenta))?;
        let line = self.input_source.read_line(Some("> "))?;
        execute!(self.stderr, style::SetForegroundColor(Color::Reset))?;

        Ok(match line {
            Some(input) => ChatState::HandleInput { input },
            None => ChatState::Exit,
        })
    }

    async fn handle_input(&mut self, input: String) -> Result<ChatState, ChatError> {
        let input = input.trim();
        if input.is_empty() {
            return Ok(ChatState::PromptUser);
        }

        if let Some(command) = SlashCommand::from_input(input) {
            return match command {
                Ok(command) => command.execute(self),
                Err(err) => {
                    let rendered = err
                        .render()
                        .ansi()
                        .to_string()
                        .replace("slash_command ", "/")
                        .replace("slash_command\u{1b}[0m ", "/");
                    writeln!(self.stderr, "{}", rendered)?;
                    Ok(ChatState::PromptUser)
                },
            };
        }

        self.conversation.push_user_message(input);
        self.handle_response().await
    }

    async fn handle_response(&mut self) -> Result<ChatState, ChatError> {
        if self.interactive {
            execute!(self.stdout, style::Print("\n"))?;
            self.spinner.start(&mut self.stdout, "Thinking...")?;
        }

        let hooks = TerminalToolUi::new(self.stderr.clone(), self.spinner.clone());
        let result = self
            .pipeline
            .run(&self.conversation, Some(Box::new(hooks)), &self.spinner, &mut self.stdout)
            .await;
        self.spinner.stop(&mut self.stdout)?;

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(err) if self.interactive => {
                error!(status_code = ?err.status_code(), "response failed: {err}");
                execute!(
                    self.stderr,
                    style::Print("\n"),
                    style::SetForegroundColor(Color::Red),
                    style::SetAttribute(Attribute::Bold),
                    style::Print("error: "),
                    style::SetAttribute(Attribute::Reset),
                    style::SetForegroundColor(Color::Red),
                    style::Print(format!("{err}\n\n")),
                    style::SetForegroundColor(Color::Reset),
                )?;
                return Ok(ChatState::PromptUser);
            },
            Err(err) => {
                writeln!(self.stdout)?;
                return Err(err);
            },
        };

        debug!(request_id = ?outcome.request_id, "response received");
        if !outcome.assistant_text.ends_with('\n') {
            writeln!(self.stdout)?;
        }
        if outcome.used_tools && self.interactive {
            let width = terminal::window_size().map(|s| s.columns.into()).unwrap_or(80_usize);
            queue!(
                self.stdout,
                style::SetForegroundColor(Color::DarkGrey),
                style::Print(format!("{}\n", "▔".repeat(width))),
                style::SetForegroundColor(Color::Reset),
            )?;
        }
        if self.interactive {
            writeln!(self.stdout)?;
        }
        self.stdout.flush()?;
        self.conversation.push_assistant_message(outcome.assistant_text);

        Ok(ChatState::PromptUser)
    }
}
