//! History records and the two collaborator seams used by the backend client.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One persisted (input, response) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: i64,
    pub input: String,
    pub response: String,
    pub timestamp: DateTime<Utc>,
}

/// Append-only destination for answered queries.
///
/// Implementations must not block the caller on storage and must swallow
/// their own failures; the answer has already been produced by then.
pub trait HistorySink: Send + Sync {
    fn record(&self, input: &str, response: &str);
}

/// Source of the host facts prefixed to the system instruction.
pub trait ContextSource: Send + Sync {
    fn snapshot(&self) -> anyhow::Result<String>;
}

/// Sink that drops everything. Used when the history database cannot be opened.
pub struct NullSink;

impl HistorySink for NullSink {
    fn record(&self, _input: &str, _response: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_record_serializes_timestamp() {
        let record = HistoryRecord {
            id: 1,
            input: "list files".into(),
            response: "Use ls".into(),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["input"], "list files");
        assert!(json["timestamp"].is_string());
    }
}
