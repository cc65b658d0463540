//! Agent Host - the interactive side of Gema
//!
//! This crate drives a single user interaction:
//! - Ask the backend once while a spinner runs
//! - Render the answer and any suggested shell command
//! - Execute the command only after explicit confirmation
//! - Speak screen-assistant answers until a key is pressed

pub mod assistant;
pub mod executor;
pub mod prompts;
pub mod session;
pub mod spinner;

pub use assistant::{race_speech, wait_for_keypress, Assistant, RaceOutcome, TurnReport};
pub use executor::{execute_command, redact, CommandOutput, CommandRunner, ShellRunner};
pub use session::{confirm, format_response, Outcome, Phase, Session, SessionState};
pub use spinner::Spinner;
