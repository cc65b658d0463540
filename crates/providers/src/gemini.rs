use crate::Backend;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use shared::agent_api::{AiResponse, AskOptions, Query};
use shared::settings::Settings;
use shared::{BackendError, ContextSource, HistorySink};
use std::sync::Arc;

const IMAGE_MIME_TYPE: &str = "image/jpeg";
const MAX_ERROR_BODY: usize = 800;

#[derive(Debug, Serialize)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum GeminiPart {
    Text { text: String },
    InlineData { inline_data: InlineData },
}

#[derive(Debug, Serialize)]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
    response_mime_type: &'static str,
    response_schema: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    system_instruction: GeminiContent,
    generation_config: GenerationConfig,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidatePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiCandidatePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiCandidateContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

/// Reply shape before validation; the model may send `null` for either field.
#[derive(Debug, Deserialize)]
struct RawReply {
    response: Option<String>,
    command: Option<String>,
}

/// JSON schema the model's reply must follow.
pub fn response_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "OBJECT",
        "properties": {
            "response": { "type": "STRING" },
            "command": { "type": "STRING" }
        },
        "required": ["response"]
    })
}

pub struct GeminiClient {
    http: Client,
    api_key: String,
    model: String,
    base_url: String,
    temperature: f32,
    context: Option<Arc<dyn ContextSource>>,
    history: Option<Arc<dyn HistorySink>>,
}

impl GeminiClient {
    pub fn new(settings: &Settings) -> Result<Self, BackendError> {
        let http = Client::builder()
            .build()
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            base_url: settings.base_url.clone(),
            temperature: settings.temperature,
            context: None,
            history: None,
        })
    }

    pub fn with_context(mut self, context: Arc<dyn ContextSource>) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_history(mut self, history: Arc<dyn HistorySink>) -> Self {
        self.history = Some(history);
        self
    }

    fn system_instruction(&self, options: &AskOptions) -> Result<String, BackendError> {
        if !options.include_system_context {
            return Ok(options.system_instruction.clone());
        }
        let Some(context) = &self.context else {
            return Ok(options.system_instruction.clone());
        };
        let snapshot = context
            .snapshot()
            .map_err(|e| BackendError::Context(format!("{:#}", e)))?;
        Ok(format!(
            "System information:\n{}\n\n{}",
            snapshot, options.system_instruction
        ))
    }

    fn build_request(&self, query: &Query, options: &AskOptions) -> Result<GeminiRequest, BackendError> {
        let mut parts = vec![GeminiPart::Text {
            text: query.text.clone(),
        }];
        for image in query.images.iter().filter(|img| !img.is_empty()) {
            parts.push(GeminiPart::InlineData {
                inline_data: InlineData {
                    mime_type: IMAGE_MIME_TYPE.to_string(),
                    data: BASE64_STANDARD.encode(image),
                },
            });
        }

        Ok(GeminiRequest {
            contents: vec![GeminiContent {
                role: Some("user".to_string()),
                parts,
            }],
            system_instruction: GeminiContent {
                role: None,
                parts: vec![GeminiPart::Text {
                    text: self.system_instruction(options)?,
                }],
            },
            generation_config: GenerationConfig {
                temperature: self.temperature,
                response_mime_type: "application/json",
                response_schema: response_schema(),
            },
        })
    }

    async fn generate(&self, req: &GeminiRequest) -> Result<String, BackendError> {
        let url = format!(
            "{}/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );
        let resp = self
            .http
            .post(url)
            .json(req)
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.without_url().to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            let body = body.trim();
            let body = if body.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !body.is_char_boundary(cut) {
                    cut -= 1;
                }
                format!("{}...", &body[..cut])
            } else {
                body.to_string()
            };
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: GeminiResponse = resp
            .json()
            .await
            .map_err(|e| BackendError::Malformed(e.without_url().to_string()))?;

        // Only the first candidate is read; the schema makes alternatives redundant.
        let text = body
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| {
                c.parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<String>()
            })
            .unwrap_or_default();
        Ok(text)
    }
}

/// Validate the model's JSON text against the reply contract.
pub fn parse_reply(text: &str) -> Result<AiResponse, BackendError> {
    let raw: RawReply =
        serde_json::from_str(text.trim()).map_err(|e| BackendError::Malformed(e.to_string()))?;
    let response = raw.response.unwrap_or_default();
    if response.trim().is_empty() {
        return Err(BackendError::EmptyResponse);
    }
    Ok(AiResponse {
        response,
        command: raw.command.unwrap_or_default(),
    })
}

#[async_trait]
impl Backend for GeminiClient {
    async fn ask(&self, query: &Query, options: &AskOptions) -> Result<AiResponse, BackendError> {
        let req = self.build_request(query, options)?;
        tracing::debug!(
            model = %self.model,
            images = query.images.len(),
            with_context = options.include_system_context,
            "sending query"
        );
        let text = self.generate(&req).await?;
        let reply = parse_reply(&text)?;

        if let Some(history) = &self.history {
            history.record(&query.text, &reply.response);
        }
        Ok(reply)
    }
}
