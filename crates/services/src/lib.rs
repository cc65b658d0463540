//! Host-facing services: history storage, system snapshot, git plumbing and
//! OS capabilities (speech, clipboard, browser, screen capture).

pub mod git;
pub mod history;
pub mod platform;
pub mod system_context;

pub use history::{HistoryStore, HistoryWriter};
pub use platform::{Platform, SpeechEnd, SpeechHandle};
pub use system_context::HostContext;
