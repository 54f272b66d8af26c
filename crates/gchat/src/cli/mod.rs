pub mod chat;

use std::fmt::Display;
use std::process::ExitCode;

use anstream::println;
use clap::{
    ArgAction,
    Args,
    Parser,
    Subcommand,
    ValueEnum,
};
use crossterm::style::Stylize;
use eyre::Result;
use serde::Serialize;
use tracing::debug;

use crate::cli::chat::ChatArgs;
use crate::cli::chat::model::{
    CATALOG_VERSION,
    MODEL_CAPABILITIES,
    ModelCapability,
};
use crate::logging::{
    LogArgs,
    initialize_logging,
    verbosity_to_level,
};
use crate::util::directories::logs_dir;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Outputs the results as plain text
    #[default]
    Plain,
    /// Outputs the results as JSON
    Json,
    /// Outputs the results as pretty print JSON
    JsonPretty,
}

impl OutputFormat {
    pub fn print<T, TFn, J, JFn>(&self, text_fn: TFn, json_fn: JFn) -> Result<(), serde_json::Error>
    where
        T: std::fmt::Display,
        TFn: FnOnce() -> T,
        J: Serialize,
        JFn: FnOnce() -> J,
    {
        match self {
            OutputFormat::Plain => println!("{}", text_fn()),
            OutputFormat::Json => println!("{}", serde_json::to_string(&json_fn())?),
            OutputFormat::JsonPretty => println!("{}", serde_json::to_string_pretty(&json_fn())?),
        }
        Ok(())
    }
}

/// A terminal chat client for Gemini models
#[deny(missing_docs)]
#[derive(Debug, PartialEq, Subcommand)]
pub enum RootSubcommand {
    /// AI assistant in your terminal
    Chat(ChatArgs),
    /// List the known models and the built-in tools they accept
    Models(ModelsArgs),
}

impl RootSubcommand {
    pub async fn execute(self) -> Result<ExitCode> {
        match self {
            Self::Chat(args) => args.execute().await,
            Self::Models(args) => args.execute(),
        }
    }
}

impl Default for RootSubcommand {
    fn default() -> Self {
        Self::Chat(ChatArgs::default())
    }
}

impl Display for RootSubcommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Chat(_) => "chat",
            Self::Models(_) => "models",
        };

        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Args)]
pub struct ModelsArgs {
    /// Output format
    #[arg(long, short, value_enum, default_value_t)]
    pub format: OutputFormat,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Catalog {
    version: u32,
    models: &'static [ModelCapability],
}

impl ModelsArgs {
    pub fn execute(self) -> Result<ExitCode> {
        self.format.print(catalog_text, || Catalog {
            version: CATALOG_VERSION,
            models: &MODEL_CAPABILITIES,
        })?;
        Ok(ExitCode::SUCCESS)
    }
}

fn catalog_text() -> String {
    let width = MODEL_CAPABILITIES
        .iter()
        .map(|model| model.model_id.len())
        .max()
        .unwrap_or_default();

    let mut text = format!("{}\n", format!("Model catalog v{CATALOG_VERSION}").bold());
    for model in &MODEL_CAPABILITIES {
        let tools = model.builtin_tools();
        let tools = match tools.is_empty() {
            true => "no built-in tools".dark_grey().to_string(),
            false => tools.iter().map(ToString::to_string).collect::<Vec<_>>().join(", "),
        };
        let combine = match model.supports_multiple_builtin_tools || model.builtin_tools().len() < 2 {
            true => String::new(),
            false => " (one at a time)".dark_grey().to_string(),
        };
        text.push_str(&format!("  {:width$}  {tools}{combine}\n", model.model_id));
    }
    text
}

#[derive(Debug, Parser, PartialEq, Default)]
#[command(version, about, name = crate::util::CHAT_BINARY_NAME)]
pub struct Cli {
    #[command(subcommand)]
    pub subcommand: Option<RootSubcommand>,
    /// Increase logging verbosity
    #[arg(long, short = 'v', action = ArgAction::Count, global = true)]
    pub verbose: u8,
}

impl Cli {
    pub async fn execute(self) -> Result<ExitCode> {
        let subcommand = self.subcommand.unwrap_or_default();

        // Initialize our logger and keep around the guard so logging can perform as expected.
        let _log_guard = initialize_logging(LogArgs {
            log_level: verbosity_to_level(self.verbose),
            log_to_stdout: false,
            log_file_path: match subcommand {
                RootSubcommand::Chat { .. } => logs_dir().ok().map(|dir| dir.join("gchat.log")),
                _ => None,
            },
            delete_old_log_file: false,
        })?;

        debug!(command =? std::env::args().collect::<Vec<_>>(), %subcommand, "Command being ran");

        subcommand.execute().await
    }
}

#[cfg(test)]
mod test {
    use clap::CommandFactory;

    use super::*;
    use crate::cli::chat::tool_resolver::ToolCategoryPreference;
    use crate::util::CHAT_BINARY_NAME;
    use crate::util::test::assert_parse;

    #[test]
    fn debug_assert() {
        Cli::command().debug_assert();
    }

    /// Test flag parsing for the top level [Cli]
    #[test]
    fn test_flags() {
        assert_eq!(Cli::parse_from([CHAT_BINARY_NAME, "-v"]), Cli {
            subcommand: None,
            verbose: 1,
        });

        assert_eq!(Cli::parse_from([CHAT_BINARY_NAME, "-vvv"]), Cli {
            subcommand: None,
            verbose: 3,
        });

        assert_eq!(Cli::parse_from([CHAT_BINARY_NAME, "chat", "-vv"]), Cli {
            subcommand: Some(RootSubcommand::Chat(ChatArgs::default())),
            verbose: 2,
        });
    }

    #[test]
    fn test_chat_with_options_and_input() {
        assert_parse!(
            [
                "chat",
                "--model",
                "gemini-2.5-pro",
                "--tools",
                "code-execution-only",
                "--system",
                "Be terse.",
                "Hello"
            ],
            RootSubcommand::Chat(ChatArgs {
                model: Some("gemini-2.5-pro".to_string()),
                tools: Some(ToolCategoryPreference::CodeExecutionOnly),
                system: Some("Be terse.".to_string()),
                no_interactive: false,
                input: Some("Hello".to_string()),
            })
        );
    }

    #[test]
    fn test_chat_non_interactive_alias() {
        for flag in ["--no-interactive", "--non-interactive"] {
            assert_parse!(
                ["chat", flag, "Hi"],
                RootSubcommand::Chat(ChatArgs {
                    no_interactive: true,
                    input: Some("Hi".to_string()),
                    ..Default::default()
                })
            );
        }
    }

    #[test]
    fn test_invalid_tools_flag() {
        assert!(Cli::try_parse_from([CHAT_BINARY_NAME, "chat", "--tools", "everything"]).is_err());
    }

    #[test]
    fn test_tools_help_names_tool_host() {
        let mut command = Cli::command();
        let chat = command.find_subcommand_mut("chat").unwrap();
        let help = chat.render_long_help().to_string();
        assert!(help.contains("ToolHost"));
        assert!(help.contains("embedding"));
    }

    #[test]
    fn test_models() {
        assert_parse!(["models"], RootSubcommand::Models(ModelsArgs::default()));
        assert_parse!(
            ["models", "--format", "json-pretty"],
            RootSubcommand::Models(ModelsArgs {
                format: OutputFormat::JsonPretty
            })
        );
    }

    #[test]
    fn test_catalog_output() {
        let text = catalog_text();
        for model in &MODEL_CAPABILITIES {
            assert!(text.contains(model.model_id));
        }

        let json = serde_json::to_value(Catalog {
            version: CATALOG_VERSION,
            models: &MODEL_CAPABILITIES,
        })
        .unwrap();
        assert_eq!(json["version"], CATALOG_VERSION);
        assert_eq!(json["models"][0]["modelId"], "gemini-2.5-pro");
        assert_eq!(json["models"][0]["supportsMultipleBuiltinTools"], true);
    }
}
