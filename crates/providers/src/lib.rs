//! Backend client for the hosted model.
//!
//! One call per question, no retries. Every reply is schema-constrained JSON
//! of the form `{response, command?}`.

pub mod gemini;

use async_trait::async_trait;
use shared::agent_api::{AiResponse, AskOptions, Query};
use shared::BackendError;

pub use gemini::GeminiClient;

/// Anything that can answer a query with a structured reply.
///
/// Note: uses async_trait for object safety
#[async_trait]
pub trait Backend: Send + Sync {
    /// Returns a reply with a non-empty `response`, or an error. Never retries.
    async fn ask(&self, query: &Query, options: &AskOptions) -> Result<AiResponse, BackendError>;
}
