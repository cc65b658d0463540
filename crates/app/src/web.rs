//! Local web UI and `POST /answer` API on top of tiny_http.
//!
//! Requests are handled concurrently on the tokio runtime. Each ask runs
//! without system context, so requests share no mutable state.

use agent_host::prompts::{web_query, WEB_CHAT_INSTRUCTION};
use anyhow::{anyhow, Context, Result};
use providers::Backend;
use serde::Deserialize;
use serde_json::json;
use services::Platform;
use shared::agent_api::{AskOptions, Query};
use std::collections::BTreeMap;
use std::io::Read;
use std::sync::Arc;
use std::time::Duration;
use tiny_http::{Header, Method, Request, Response, Server};

const INDEX_HTML: &str = include_str!("../assets/index.html");

const BROWSER_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Deserialize)]
struct AnswerRequest {
    message: String,
    #[serde(default)]
    history: Option<BTreeMap<String, String>>,
}

/// A fully formed HTTP reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
}

impl Reply {
    fn json(status: u16, value: serde_json::Value) -> Self {
        Self {
            status,
            content_type: "application/json",
            body: value.to_string(),
        }
    }

    fn text(status: u16, body: &str) -> Self {
        Self {
            status,
            content_type: "text/plain; charset=utf-8",
            body: body.to_string(),
        }
    }
}

pub fn bind(port: u16) -> Result<Server> {
    Server::http(("0.0.0.0", port)).map_err(|e| anyhow!("failed to bind port {}: {}", port, e))
}

/// Serve until the listener fails. Opens the browser shortly after start
/// when a platform is given.
pub async fn serve(
    server: Server,
    backend: Arc<dyn Backend>,
    browser: Option<Arc<dyn Platform>>,
) -> Result<()> {
    let port = server
        .server_addr()
        .to_ip()
        .map(|addr| addr.port())
        .unwrap_or_default();
    tracing::info!("Starting web server on port {}", port);
    println!("Gema web UI running at http://localhost:{}", port);

    if let Some(platform) = browser {
        tokio::spawn(async move {
            tokio::time::sleep(BROWSER_DELAY).await;
            let url = format!("http://localhost:{}", port);
            tracing::info!("Opening {} in your browser", url);
            if let Err(e) = platform.open_url(&url) {
                tracing::warn!("Could not open browser: {:#}", e);
            }
        });
    }

    let runtime = tokio::runtime::Handle::current();
    tokio::task::spawn_blocking(move || {
        for request in server.incoming_requests() {
            let backend = backend.clone();
            runtime.spawn(async move {
                if let Err(e) = handle(request, backend.as_ref()).await {
                    tracing::warn!("Failed to answer request: {:#}", e);
                }
            });
        }
    })
    .await
    .context("web server stopped unexpectedly")?;
    Ok(())
}

async fn handle(mut request: Request, backend: &dyn Backend) -> Result<()> {
    let mut body = Vec::new();
    request
        .as_reader()
        .read_to_end(&mut body)
        .context("failed to read request body")?;

    let method = request.method().clone();
    let url = request.url().to_string();
    let reply = route(backend, &method, &url, &body).await;
    tracing::info!("{} {} -> {}", method, url, reply.status);

    let mut response = Response::from_string(reply.body).with_status_code(reply.status);
    if let Ok(header) = Header::from_bytes(&b"Content-Type"[..], reply.content_type.as_bytes()) {
        response = response.with_header(header);
    }
    request.respond(response).context("failed to send response")?;
    Ok(())
}

/// Map a request to its reply.
pub async fn route(backend: &dyn Backend, method: &Method, url: &str, body: &[u8]) -> Reply {
    let path = url.split('?').next().unwrap_or(url);
    match (path, method) {
        ("/" | "/index.html", Method::Get | Method::Head) => Reply {
            status: 200,
            content_type: "text/html; charset=utf-8",
            body: INDEX_HTML.to_string(),
        },
        ("/answer", Method::Post) => answer(backend, body).await,
        ("/answer", _) => Reply::text(405, "Method Not Allowed"),
        _ => Reply::text(404, "Not Found"),
    }
}

async fn answer(backend: &dyn Backend, body: &[u8]) -> Reply {
    let request: AnswerRequest = match serde_json::from_slice(body) {
        Ok(request) => request,
        Err(e) => {
            tracing::debug!("Rejected answer request: {}", e);
            return Reply::text(400, "Invalid request body");
        }
    };

    let history = request.history.unwrap_or_default();
    let query = Query::new(web_query(&request.message, &history));
    let options = AskOptions::new(WEB_CHAT_INSTRUCTION).with_system_context(false);
    match backend.ask(&query, &options).await {
        Ok(reply) => Reply::json(200, json!({ "message": reply.response })),
        Err(e) => {
            tracing::warn!("Backend request failed: {}", e);
            Reply::json(502, json!({ "error": e.to_string() }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use shared::agent_api::AiResponse;
    use shared::BackendError;

    #[derive(Default)]
    struct StubBackend {
        fail: bool,
        seen: Mutex<Vec<(String, bool)>>,
    }

    #[async_trait]
    impl Backend for StubBackend {
        async fn ask(&self, query: &Query, options: &AskOptions) -> Result<AiResponse, BackendError> {
            self.seen
                .lock()
                .push((query.text.clone(), options.include_system_context));
            if self.fail {
                return Err(BackendError::Status {
                    status: 500,
                    body: "boom".into(),
                });
            }
            Ok(AiResponse {
                response: "Hello there".into(),
                command: "rm -rf /".into(),
            })
        }
    }

    #[tokio::test]
    async fn test_answer_returns_message_only() {
        let backend = StubBackend::default();
        let reply = route(
            &backend,
            &Method::Post,
            "/answer",
            br#"{"message":"hi","history":{}}"#,
        )
        .await;

        assert_eq!(reply.status, 200);
        let body: serde_json::Value = serde_json::from_str(&reply.body).unwrap();
        assert_eq!(body, json!({ "message": "Hello there" }));
        assert!(!reply.body.contains("command"));

        let seen = backend.seen.lock();
        assert_eq!(seen[0].0, "You are an AI assistant. New question: hi");
        assert!(!seen[0].1, "web asks never include system context");
    }

    #[tokio::test]
    async fn test_answer_includes_history() {
        let backend = StubBackend::default();
        let reply = route(
            &backend,
            &Method::Post,
            "/answer?x=1",
            br#"{"message":"and France?","history":{"Capital of Spain?":"Madrid"}}"#,
        )
        .await;
        assert_eq!(reply.status, 200);
        assert!(backend.seen.lock()[0]
            .0
            .contains("Question: Capital of Spain?\nAnswer: Madrid\n\nNew question: and France?"));
    }

    #[tokio::test]
    async fn test_null_or_missing_history_is_empty() {
        let backend = StubBackend::default();
        for body in [
            &br#"{"message":"hi","history":null}"#[..],
            &br#"{"message":"hi"}"#[..],
        ] {
            let reply = route(&backend, &Method::Post, "/answer", body).await;
            assert_eq!(reply.status, 200);
        }
        let seen = backend.seen.lock();
        assert_eq!(seen.len(), 2);
        assert!(seen
            .iter()
            .all(|(text, _)| text == "You are an AI assistant. New question: hi"));
    }

    #[tokio::test]
    async fn test_invalid_body_is_400() {
        let backend = StubBackend::default();
        for body in [&b"not json"[..], &br#"{"history":{}}"#[..]] {
            let reply = route(&backend, &Method::Post, "/answer", body).await;
            assert_eq!(reply.status, 400);
            assert_eq!(reply.body, "Invalid request body");
        }
        assert!(backend.seen.lock().is_empty());
    }

    #[tokio::test]
    async fn test_backend_failure_is_502() {
        let backend = StubBackend {
            fail: true,
            ..Default::default()
        };
        let reply = route(&backend, &Method::Post, "/answer", br#"{"message":"hi"}"#).await;
        assert_eq!(reply.status, 502);
        let body: serde_json::Value = serde_json::from_str(&reply.body).unwrap();
        assert!(body["error"].as_str().unwrap().contains("500"));
    }

    #[tokio::test]
    async fn test_static_and_unknown_routes() {
        let backend = StubBackend::default();
        let index = route(&backend, &Method::Get, "/", b"").await;
        assert_eq!(index.status, 200);
        assert!(index.content_type.starts_with("text/html"));
        assert!(index.body.contains("/answer"));

        assert_eq!(route(&backend, &Method::Get, "/answer", b"").await.status, 405);
        assert_eq!(route(&backend, &Method::Get, "/missing", b"").await.status, 404);
        assert!(backend.seen.lock().is_empty());
    }
}
