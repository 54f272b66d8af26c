use std::io::Write;

use clap::Parser;
use crossterm::execute;
use crossterm::style::{
    self,
    Attribute,
    Color,
};

use crate::cli::chat::output_buffer::MarkdownRenderer;
use crate::cli::chat::tool_resolver::ToolDeclaration;
use crate::cli::chat::{
    ChatError,
    ChatSession,
    ChatState,
    EXTRA_HELP,
};

/// Commands available at the chat prompt, entered with a leading `/`.
#[derive(Debug, PartialEq, Parser)]
#[command(color = clap::ColorChoice::Always, after_long_help = EXTRA_HELP)]
pub enum SlashCommand {
    /// Quit the application
    #[command(aliases = ["q", "exit"])]
    Quit,
    /// Clear the conversation history
    Clear,
    /// Show the tools attached to each request
    Tools,
}

impl SlashCommand {
    /// Parses prompt input starting with `/`. Returns `None` for regular input.
    pub fn from_input(input: &str) -> Option<Result<Self, clap::Error>> {
        let mut args = input.strip_prefix('/').and_then(shlex::split)?;
        // Dummy binary name, replaced by a slash when errors are rendered.
        args.insert(0, "slash_command".to_owned());
        Some(Self::try_parse_from(args))
    }

    pub fn execute<R: MarkdownRenderer + Clone>(self, session: &mut ChatSession<R>) -> Result<ChatState, ChatError> {
        match self {
            Self::Quit => Ok(ChatState::Exit),
            Self::Clear => {
                session.conversation.clear();
                execute!(
                    session.stderr,
                    style::SetForegroundColor(Color::Green),
                    style::Print("\nConversation history cleared.\n\n"),
                    style::SetForegroundColor(Color::Reset),
                )?;
                Ok(ChatState::PromptUser)
            },
            Self::Tools => {
                let declarations = session.pipeline.declarations();
                print_tools(
                    &mut session.stderr,
                    session.pipeline.model_id(),
                    &session.pipeline.preference().to_string(),
                    &declarations,
                )?;
                Ok(ChatState::PromptUser)
            },
        }
    }
}

fn print_tools(
    output: &mut impl Write,
    model_id: &str,
    preference: &str,
    declarations: &[ToolDeclaration],
) -> Result<(), ChatError> {
    execute!(
        output,
        style::Print("\n"),
        style::SetAttribute(Attribute::Bold),
        style::Print(model_id),
        style::SetAttribute(Attribute::Reset),
        style::SetForegroundColor(Color::DarkGrey),
        style::Print(format!(" ({preference})\n")),
        style::SetForegroundColor(Color::Reset),
    )?;

    if declarations.is_empty() {
        execute!(
            output,
            style::SetForegroundColor(Color::DarkGrey),
            style::Print("No tools are attached to requests for this model.\n\n"),
            style::SetForegroundColor(Color::Reset),
        )?;
        return Ok(());
    }

    for declaration in declarations {
        let kind = match declaration {
            ToolDeclaration::External(_) => "external",
            ToolDeclaration::Builtin(_) => "built-in",
        };
        for name in declaration.names() {
            execute!(
                output,
                style::Print("- "),
                style::SetForegroundColor(Color::Green),
                style::Print(name),
                style::SetForegroundColor(Color::DarkGrey),
                style::Print(format!(" {kind}\n")),
                style::SetForegroundColor(Color::Reset),
            )?;
        }
    }
    writeln!(output)?;
    Ok(())
}
