pub mod error;
pub mod events;

pub use error::{BackendError, ConfigError};
pub use events::{ContextSource, HistoryRecord, HistorySink, NullSink};

pub mod settings {
    use crate::error::ConfigError;
    use std::path::PathBuf;

    pub const API_KEY_VAR: &str = "GENAI_API_KEY";
    pub const MODEL_VAR: &str = "GENAI_DEFAULT_MODEL";
    pub const PORT_VAR: &str = "GENAI_PORT";
    pub const SKIP_CONTEXT_VAR: &str = "SKIP_SYS_INFO";
    pub const BASE_URL_VAR: &str = "GENAI_BASE_URL";
    pub const HISTORY_DB_VAR: &str = "GEMA_HISTORY_DB";

    pub const DEFAULT_PORT: u16 = 8080;
    pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

    /// Process configuration, read once at startup.
    #[derive(Debug, Clone)]
    pub struct Settings {
        pub api_key: String,
        pub model: String,
        pub port: u16,
        /// Default for CLI asks; the web server always skips the context.
        pub skip_system_context: bool,
        pub base_url: String,
        pub temperature: f32,
        pub history_path: PathBuf,
    }

    impl Settings {
        pub fn from_env() -> Result<Self, ConfigError> {
            Self::from_lookup(|key| std::env::var(key).ok())
        }

        /// Build settings from any key lookup. Required values are checked
        /// first so a missing credential fails before anything else happens.
        pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
        where
            F: Fn(&str) -> Option<String>,
        {
            let required = |key: &'static str| -> Result<String, ConfigError> {
                lookup(key)
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty())
                    .ok_or(ConfigError::Missing(key))
            };

            let api_key = required(API_KEY_VAR)?;
            let model = required(MODEL_VAR)?;

            let port = match lookup(PORT_VAR) {
                None => {
                    tracing::info!("{} not set, defaulting to {}", PORT_VAR, DEFAULT_PORT);
                    DEFAULT_PORT
                }
                Some(raw) => match raw.trim().parse::<u16>() {
                    Ok(port) => port,
                    Err(e) => {
                        tracing::warn!(
                            "Invalid {} value {:?}: {}, defaulting to {}",
                            PORT_VAR,
                            raw,
                            e,
                            DEFAULT_PORT
                        );
                        DEFAULT_PORT
                    }
                },
            };

            let skip_system_context = lookup(SKIP_CONTEXT_VAR)
                .map(|v| is_truthy(&v))
                .unwrap_or(false);

            let base_url = lookup(BASE_URL_VAR)
                .map(|v| v.trim().trim_end_matches('/').to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

            let history_path = lookup(HISTORY_DB_VAR)
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(default_history_path);

            Ok(Self {
                api_key,
                model,
                port,
                skip_system_context,
                base_url,
                temperature: 1.0,
                history_path,
            })
        }
    }

    fn is_truthy(value: &str) -> bool {
        matches!(
            value.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes"
        )
    }

    /// `~/.gema/gema.db`, or a relative `.gema/gema.db` when there is no home.
    pub fn default_history_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_default()
            .join(".gema")
            .join("gema.db")
    }
}

pub mod agent_api {
    use serde::{Deserialize, Serialize};

    /// A user query plus any screenshots that go with it.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct Query {
        pub text: String,
        /// JPEG-encoded image buffers.
        pub images: Vec<Vec<u8>>,
    }

    impl Query {
        pub fn new(text: impl Into<String>) -> Self {
            Self {
                text: text.into(),
                images: Vec::new(),
            }
        }

        pub fn with_images(text: impl Into<String>, images: Vec<Vec<u8>>) -> Self {
            Self {
                text: text.into(),
                images,
            }
        }
    }

    /// Structured reply from the model. `command` is a suggestion only.
    #[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct AiResponse {
        pub response: String,
        #[serde(default)]
        pub command: String,
    }

    impl AiResponse {
        pub fn has_command(&self) -> bool {
            !self.command.trim().is_empty()
        }
    }

    /// Per-call knobs for the backend.
    #[derive(Debug, Clone)]
    pub struct AskOptions {
        pub system_instruction: String,
        pub include_system_context: bool,
    }

    impl AskOptions {
        pub fn new(system_instruction: impl Into<String>) -> Self {
            Self {
                system_instruction: system_instruction.into(),
                include_system_context: true,
            }
        }

        pub fn with_system_context(mut self, include: bool) -> Self {
            self.include_system_context = include;
            self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::agent_api::*;
    use super::settings::*;
    use super::ConfigError;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_missing_api_key_is_fatal() {
        let err = Settings::from_lookup(lookup(&[(MODEL_VAR, "gemini-2.0-flash")])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing(API_KEY_VAR)));
    }

    #[test]
    fn test_blank_model_is_missing() {
        let err =
            Settings::from_lookup(lookup(&[(API_KEY_VAR, "k"), (MODEL_VAR, "  ")])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing(MODEL_VAR)));
    }

    #[test]
    fn test_defaults() {
        let settings =
            Settings::from_lookup(lookup(&[(API_KEY_VAR, "k"), (MODEL_VAR, "m")])).unwrap();
        assert_eq!(settings.port, DEFAULT_PORT);
        assert!(!settings.skip_system_context);
        assert_eq!(settings.base_url, DEFAULT_BASE_URL);
        assert!(settings.history_path.ends_with(".gema/gema.db"));
    }

    #[test]
    fn test_overrides() {
        let settings = Settings::from_lookup(lookup(&[
            (API_KEY_VAR, "k"),
            (MODEL_VAR, "m"),
            (PORT_VAR, "9090"),
            (SKIP_CONTEXT_VAR, "true"),
            (BASE_URL_VAR, "http://127.0.0.1:9999/models/"),
            (HISTORY_DB_VAR, "/tmp/history.db"),
        ]))
        .unwrap();
        assert_eq!(settings.port, 9090);
        assert!(settings.skip_system_context);
        assert_eq!(settings.base_url, "http://127.0.0.1:9999/models");
        assert_eq!(settings.history_path.to_str(), Some("/tmp/history.db"));
    }

    #[test]
    fn test_bad_port_falls_back() {
        let settings = Settings::from_lookup(lookup(&[
            (API_KEY_VAR, "k"),
            (MODEL_VAR, "m"),
            (PORT_VAR, "eighty"),
        ]))
        .unwrap();
        assert_eq!(settings.port, DEFAULT_PORT);
    }

    #[test]
    fn test_ai_response_command_defaults_to_empty() {
        let reply: AiResponse = serde_json::from_str(r#"{"response":"hi"}"#).unwrap();
        assert_eq!(reply.command, "");
        assert!(!reply.has_command());

        let reply: AiResponse =
            serde_json::from_str(r#"{"response":"hi","command":"ls -la"}"#).unwrap();
        assert!(reply.has_command());
    }
}
