//! Terminal spinner shown while the backend call is outstanding.
//!
//! The animation runs on its own thread and is stopped by signal + join, so
//! once [`Spinner::stop`] returns the spinner will never write again.

use owo_colors::OwoColorize;
use std::io::{self, IsTerminal, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Braille spinner frames
const SPINNER_FRAMES: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

const SPINNER_INTERVAL: Duration = Duration::from_millis(120);

pub struct Spinner {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    start_time: Instant,
}

impl Spinner {
    /// Spin on stdout. Without a TTY the message is printed once instead.
    pub fn start(message: &str) -> Self {
        if !io::stdout().is_terminal() {
            println!("{}", message);
            return Self {
                running: Arc::new(AtomicBool::new(false)),
                handle: None,
                start_time: Instant::now(),
            };
        }
        Self::with_writer(io::stdout(), message)
    }

    /// Spin on an arbitrary writer.
    pub fn with_writer<W>(mut writer: W, message: &str) -> Self
    where
        W: Write + Send + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let running_clone = running.clone();
        let message = message.to_string();

        let handle = std::thread::spawn(move || {
            let mut frame = 0;
            while running_clone.load(Ordering::Acquire) {
                let _ = write!(
                    writer,
                    "\r{} {}",
                    SPINNER_FRAMES[frame].bright_yellow(),
                    message.dimmed()
                );
                let _ = writer.flush();
                frame = (frame + 1) % SPINNER_FRAMES.len();
                std::thread::sleep(SPINNER_INTERVAL);
            }
            // Clear the spinner line
            let width = message.chars().count() + 2;
            let _ = write!(writer, "\r{}\r", " ".repeat(width));
            let _ = writer.flush();
        });

        Self {
            running,
            handle: Some(handle),
            start_time: Instant::now(),
        }
    }

    /// Stop the animation, wait for the thread, and return elapsed time.
    pub fn stop(mut self) -> Duration {
        self.halt();
        self.start_time.elapsed()
    }

    fn halt(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Spinner {
    fn drop(&mut self) {
        self.halt();
    }
}
