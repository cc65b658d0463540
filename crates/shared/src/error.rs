//! Error taxonomy shared by every crate.
//!
//! Configuration and backend errors abort the invocation. Local I/O problems
//! (history, clipboard, speech) are logged where they happen and never
//! become one of these.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} environment variable is not set")]
    Missing(&'static str),
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend request failed: {0}")]
    Transport(String),

    #[error("backend error: {status}\n{body}")]
    Status { status: u16, body: String },

    #[error("invalid JSON response: {0}")]
    Malformed(String),

    #[error("response field is missing or empty")]
    EmptyResponse,

    #[error("failed to gather system information: {0}")]
    Context(String),
}
