//! Command-line surface.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "gema",
    about = "Ask a hosted model from your terminal, revise text, write commit messages",
    version,
    args_conflicts_with_subcommands = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Question to ask. `gema <question>` is the same as `gema ask <question>`.
    #[arg(trailing_var_arg = true)]
    pub words: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Commands {
    /// Ask a question; the answer may suggest a shell command to run.
    #[command(visible_alias = "cli")]
    Ask {
        #[arg(required = true, trailing_var_arg = true)]
        words: Vec<String>,
    },

    /// Revise text to sound more professional.
    ///
    /// Add [length=X] for a target word count or [type=email] for an email.
    #[command(visible_aliases = ["revise", "edit", "improve", "refine", "w"])]
    Writer {
        #[arg(required = true, trailing_var_arg = true)]
        text: Vec<String>,
    },

    /// Generate a commit message for uncommitted changes and optionally commit.
    #[command(visible_alias = "c")]
    Commit {
        /// Repository directory (defaults to the current directory).
        path: Option<PathBuf>,

        /// Custom instruction for generating the commit message.
        #[arg(short, long)]
        prompt: Option<String>,
    },

    /// Help with anything on your screen; the answer is spoken aloud.
    #[command(visible_aliases = ["a", "copilot", "assistant"])]
    Assist {
        /// Question about the screen. Without one, questions are read from stdin.
        #[arg(trailing_var_arg = true)]
        words: Vec<String>,
    },

    /// Start the local chat UI and `POST /answer` API.
    Web {
        /// Do not open the browser.
        #[arg(long)]
        no_open: bool,
    },
}

impl Cli {
    /// The subcommand to run. Bare words become `ask`; `None` means print help.
    pub fn into_command(self) -> Option<Commands> {
        match self.command {
            Some(command) => Some(command),
            None if !self.words.is_empty() => Some(Commands::Ask { words: self.words }),
            None => None,
        }
    }
}
