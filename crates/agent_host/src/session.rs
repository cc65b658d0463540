//! Interactive session: ask once, render, confirm, maybe execute.
//!
//! Waiting (spinner) → Rendered → [Executing] → Terminal. The backend is
//! called exactly once per session and nothing is rendered before it returns.

use crate::executor::{CommandOutput, CommandRunner};
use crate::spinner::Spinner;
use anyhow::{bail, Result};
use providers::Backend;
use shared::agent_api::{AiResponse, AskOptions, Query};
use std::io::{BufRead, Write};
use std::sync::Arc;

/// Words per rendered line.
pub const WORDS_PER_LINE: usize = 15;

pub const RUN_PROMPT: &str = "Run command (y for yes, n for no): ";

/// The only input that confirms a suggested command.
pub const ACCEPT_TOKEN: &str = "y";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Pending,
    Done,
}

/// Per-invocation state. Moves from `Pending` to `Done` exactly once.
#[derive(Debug, Clone)]
pub enum SessionState {
    Pending { query: Query },
    Done { query: Query, reply: AiResponse },
}

impl SessionState {
    pub fn new(query: Query) -> Self {
        SessionState::Pending { query }
    }

    pub fn phase(&self) -> Phase {
        match self {
            SessionState::Pending { .. } => Phase::Pending,
            SessionState::Done { .. } => Phase::Done,
        }
    }

    pub fn query(&self) -> &Query {
        match self {
            SessionState::Pending { query } | SessionState::Done { query, .. } => query,
        }
    }

    pub fn reply(&self) -> Option<&AiResponse> {
        match self {
            SessionState::Pending { .. } => None,
            SessionState::Done { reply, .. } => Some(reply),
        }
    }

    /// Record the backend reply. Fails if the session already completed.
    pub fn complete(self, reply: AiResponse) -> Result<Self> {
        match self {
            SessionState::Pending { query } => Ok(SessionState::Done { query, reply }),
            SessionState::Done { .. } => bail!("session already completed"),
        }
    }

    /// Rendered response block; `None` while the backend call is outstanding.
    pub fn view(&self) -> Option<String> {
        let reply = self.reply()?;
        let mut text = format!("\nResponse:\n{}\n", format_response(&reply.response, WORDS_PER_LINE));
        if reply.has_command() {
            text.push_str(&format!("\nSuggested Command to RUN: {}\n", reply.command.trim()));
        }
        Some(text)
    }
}

/// Wrap `text` at `words_per_line` words, collapsing whitespace runs.
pub fn format_response(text: &str, words_per_line: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    words
        .chunks(words_per_line.max(1))
        .map(|line| line.join(" "))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Print `prompt`, read one line and compare it (trimmed) to `accept`.
///
/// EOF or a read error counts as a decline.
pub fn confirm<R, W>(input: &mut R, out: &mut W, prompt: &str, accept: &str) -> bool
where
    R: BufRead + ?Sized,
    W: Write + ?Sized,
{
    let _ = write!(out, "{}", prompt);
    let _ = out.flush();

    let mut line = String::new();
    match input.read_line(&mut line) {
        Ok(0) => false,
        Ok(_) => line.trim() == accept,
        Err(e) => {
            tracing::warn!("Failed to read confirmation: {}", e);
            false
        }
    }
}

/// How a session ended.
#[derive(Debug)]
pub enum Outcome {
    /// No command was suggested.
    Answered(AiResponse),
    /// A command was suggested and the user did not confirm it.
    Declined(AiResponse),
    /// The command ran; `None` when it could not be started.
    Executed(AiResponse, Option<CommandOutput>),
}

impl Outcome {
    pub fn reply(&self) -> &AiResponse {
        match self {
            Outcome::Answered(reply) | Outcome::Declined(reply) | Outcome::Executed(reply, _) => {
                reply
            }
        }
    }
}

pub struct Session {
    backend: Arc<dyn Backend>,
    runner: Arc<dyn CommandRunner>,
    options: AskOptions,
}

impl Session {
    pub fn new(
        backend: Arc<dyn Backend>,
        runner: Arc<dyn CommandRunner>,
        options: AskOptions,
    ) -> Self {
        Self {
            backend,
            runner,
            options,
        }
    }

    /// Run one session. Backend errors are fatal and returned; command
    /// failures are reported on `out` and logged.
    pub async fn run<R, W>(&self, query: Query, input: &mut R, out: &mut W) -> Result<Outcome>
    where
        R: BufRead + ?Sized,
        W: Write + ?Sized,
    {
        let state = SessionState::new(query);

        let spinner = Spinner::start("Thinking...");
        let result = self.backend.ask(state.query(), &self.options).await;
        let elapsed = spinner.stop();
        let reply = result?;
        tracing::debug!("Backend answered in {:?}", elapsed);

        let state = state.complete(reply)?;
        if let Some(view) = state.view() {
            writeln!(out, "{}", view)?;
        }

        let reply = match state {
            SessionState::Done { reply, .. } => reply,
            SessionState::Pending { .. } => bail!("session did not complete"),
        };
        if !reply.has_command() {
            return Ok(Outcome::Answered(reply));
        }

        if !confirm(input, out, RUN_PROMPT, ACCEPT_TOKEN) {
            tracing::debug!("User declined command");
            return Ok(Outcome::Declined(reply));
        }

        let command = reply.command.trim().to_string();
        let output = match self.runner.run(&command).await {
            Ok(output) => output,
            Err(e) => {
                tracing::error!("Failed to run {:?}: {:#}", command, e);
                writeln!(out, "Error executing command: {:#}", e)?;
                return Ok(Outcome::Executed(reply, None));
            }
        };

        if let Some(error) = output.error() {
            tracing::warn!("Command {:?} failed: {}", command, error);
            writeln!(out, "Error executing command: {}", error)?;
        } else {
            writeln!(out, "Output:\n=> {}", output.display_stdout())?;
        }
        Ok(Outcome::Executed(reply, Some(output)))
    }
}
