//! Screen assistant: screenshot + question in, spoken answer out.
//!
//! Speech and the keystroke watcher race on one `CancellationToken`. Whichever
//! finishes first cancels it: a keypress kills the speech process, finished
//! speech stops the watcher's polling loop.

use crate::prompts::SCREEN_ASSISTANT_INSTRUCTION;
use crate::session::{format_response, WORDS_PER_LINE};
use crate::spinner::Spinner;
use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyEventKind};
use crossterm::terminal;
use owo_colors::OwoColorize;
use providers::Backend;
use services::{Platform, SpeechEnd, SpeechHandle};
use shared::agent_api::{AiResponse, AskOptions, Query};
use std::io::{self, IsTerminal, Write};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const KEY_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RaceOutcome {
    SpeechFinished,
    Interrupted,
}

/// Blocks until the watcher sees a key (true) or the token is cancelled (false).
pub type KeypressWatcher = Arc<dyn Fn(CancellationToken) -> bool + Send + Sync>;

/// Race `speech` against `keypress`, which runs on a blocking thread.
pub async fn race_speech<F>(speech: SpeechHandle, keypress: F) -> Result<RaceOutcome>
where
    F: FnOnce(CancellationToken) -> bool + Send + 'static,
{
    let token = CancellationToken::new();
    let watcher_token = token.clone();
    let watcher = tokio::task::spawn_blocking(move || {
        let pressed = keypress(watcher_token.clone());
        if pressed {
            watcher_token.cancel();
        }
        pressed
    });

    let end = speech.wait_or_cancel(&token).await;
    token.cancel();
    let pressed = watcher.await.context("keypress watcher panicked")?;

    match end? {
        SpeechEnd::Cancelled => Ok(RaceOutcome::Interrupted),
        SpeechEnd::Finished if pressed => Ok(RaceOutcome::Interrupted),
        SpeechEnd::Finished => Ok(RaceOutcome::SpeechFinished),
    }
}

/// Wait for any key press in raw mode, polling so `token` can stop the wait.
///
/// Returns false at once when stdin is not a terminal.
pub fn wait_for_keypress(token: &CancellationToken) -> bool {
    if !io::stdin().is_terminal() {
        return false;
    }
    if let Err(e) = terminal::enable_raw_mode() {
        tracing::warn!("Could not enable raw mode: {}", e);
        return false;
    }

    let pressed = loop {
        if token.is_cancelled() {
            break false;
        }
        match event::poll(KEY_POLL_INTERVAL) {
            Ok(true) => match event::read() {
                Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => break true,
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!("Failed to read key event: {}", e);
                    break false;
                }
            },
            Ok(false) => {}
            Err(e) => {
                tracing::warn!("Failed to poll for key events: {}", e);
                break false;
            }
        }
    };

    if let Err(e) = terminal::disable_raw_mode() {
        tracing::warn!("Could not restore terminal mode: {}", e);
    }
    pressed
}

/// What happened during one assistant turn.
#[derive(Debug)]
pub struct TurnReport {
    pub reply: AiResponse,
    pub screenshot_attached: bool,
    pub copied: bool,
    /// `None` when speech could not start.
    pub speech: Option<RaceOutcome>,
}

pub struct Assistant {
    backend: Arc<dyn Backend>,
    platform: Arc<dyn Platform>,
    options: AskOptions,
    keypress: KeypressWatcher,
}

impl Assistant {
    pub fn new(
        backend: Arc<dyn Backend>,
        platform: Arc<dyn Platform>,
        include_system_context: bool,
    ) -> Self {
        Self {
            backend,
            platform,
            options: AskOptions::new(SCREEN_ASSISTANT_INSTRUCTION)
                .with_system_context(include_system_context),
            keypress: Arc::new(|token| wait_for_keypress(&token)),
        }
    }

    pub fn with_keypress(mut self, keypress: KeypressWatcher) -> Self {
        self.keypress = keypress;
        self
    }

    /// Capture, ask, print, copy, speak. Only backend errors are fatal.
    pub async fn turn<W>(&self, query_text: &str, out: &mut W) -> Result<TurnReport>
    where
        W: Write + ?Sized,
    {
        writeln!(out, "{}", "-".repeat(50))?;
        writeln!(out, "[{}] Starting Gema Assistant", timestamp())?;

        let images = match self.platform.capture_screen() {
            Ok(bytes) => {
                tracing::info!("Screenshot captured ({} bytes)", bytes.len());
                vec![bytes]
            }
            Err(e) => {
                tracing::warn!("Failed to capture screenshot: {:#}", e);
                writeln!(out, "{} could not capture the screen, asking without it", "!".yellow())?;
                Vec::new()
            }
        };
        let screenshot_attached = !images.is_empty();
        let query = Query::with_images(query_text, images);

        let spinner = Spinner::start("Looking at your screen...");
        let result = self.backend.ask(&query, &self.options).await;
        spinner.stop();
        let reply = result?;

        writeln!(out, "{}", "=".repeat(36))?;
        writeln!(out, "[{}] QUERY: {}", timestamp(), query_text)?;
        writeln!(out, "{}", "=".repeat(36))?;
        writeln!(out, "{}", "[RESPONSE]".bold())?;
        writeln!(out, "{}", format_response(&reply.response, WORDS_PER_LINE))?;
        writeln!(out, "{}", "=".repeat(36))?;

        let copied = match self.platform.copy_to_clipboard(&reply.response) {
            Ok(()) => {
                writeln!(out, "{} Response copied to clipboard", "✓".green())?;
                true
            }
            Err(e) => {
                tracing::warn!("Failed to copy to clipboard: {:#}", e);
                false
            }
        };

        let speech = match self.platform.speak(&reply.response) {
            Ok(handle) => {
                writeln!(out, "Press any key to stop speech...")?;
                out.flush()?;
                let keypress = self.keypress.clone();
                match race_speech(handle, move |token| keypress(token)).await {
                    Ok(outcome) => {
                        if outcome == RaceOutcome::Interrupted {
                            writeln!(out, "Speech stopped by user input")?;
                        }
                        Some(outcome)
                    }
                    Err(e) => {
                        tracing::warn!("Speech failed: {:#}", e);
                        None
                    }
                }
            }
            Err(e) => {
                tracing::warn!("Could not start speech: {:#}", e);
                None
            }
        };

        writeln!(out, "[{}] Gema Assistant completed", timestamp())?;
        writeln!(out, "{}", "-".repeat(50))?;

        Ok(TurnReport {
            reply,
            screenshot_attached,
            copied,
            speech,
        })
    }
}

fn timestamp() -> String {
    chrono::Local::now().format("%H:%M:%S").to_string()
}
