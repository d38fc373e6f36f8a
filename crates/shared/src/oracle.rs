//! Chat backends behind a single `Oracle` capability.
//!
//! Two adapters speak the same shape: `OllamaOracle` talks to a local Ollama
//! daemon, `LmStudioOracle` posts to an OpenAI-compatible endpoint and
//! normalizes whatever JSON comes back.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::config::{Config, Engine};
use crate::error::OracleError;

/// Generous bound for a single chat round trip against a local model
pub const ORACLE_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[async_trait]
pub trait Oracle: Send + Sync {
    async fn chat(&self, model: &str, messages: &[ChatMessage]) -> Result<String, OracleError>;
}

/// Which stage of the pipeline an oracle serves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OracleRole {
    /// Short pairwise similarity prompts
    Classification,
    /// Summary and title prompts over whole articles
    Broadcast,
}

/// Build the adapter selected by the configuration.
///
/// Only broadcast calls ask Ollama for the enlarged context window; judge
/// calls run with the model's default.
pub fn build_oracle(config: &Config, role: OracleRole) -> Result<Box<dyn Oracle>> {
    let oracle: Box<dyn Oracle> = match config.engine {
        Engine::Ollama => {
            let num_ctx = match role {
                OracleRole::Classification => None,
                OracleRole::Broadcast => Some(config.context_window),
            };
            Box::new(OllamaOracle::new(config.ollama_host.clone(), num_ctx)?)
        }
        Engine::LmStudio => Box::new(LmStudioOracle::new(config.lmstudio_api_url.clone())?),
    };
    Ok(oracle)
}

fn http_client() -> Result<Client> {
    Client::builder()
        .timeout(ORACLE_TIMEOUT)
        .build()
        .context("Failed to create HTTP client")
}

async fn post_json<T: Serialize + ?Sized>(
    client: &Client,
    endpoint: &str,
    body: &T,
) -> Result<Value, OracleError> {
    let response = client
        .post(endpoint)
        .header("content-type", "application/json")
        .json(body)
        .send()
        .await
        .map_err(|source| OracleError::Transport {
            endpoint: endpoint.to_string(),
            source,
        })?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("unknown error"));
        return Err(OracleError::Status {
            endpoint: endpoint.to_string(),
            status,
            body,
        });
    }

    response
        .json::<Value>()
        .await
        .map_err(|e| OracleError::Malformed {
            endpoint: endpoint.to_string(),
            message: e.to_string(),
        })
}

#[derive(Serialize)]
struct OllamaOptions {
    num_ctx: u32,
}

#[derive(Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: ChatMessage,
}

pub struct OllamaOracle {
    client: Client,
    endpoint: String,
    num_ctx: Option<u32>,
}

impl OllamaOracle {
    pub fn new(host: String, num_ctx: Option<u32>) -> Result<Self> {
        let endpoint = format!("{}/api/chat", host.trim_end_matches('/'));
        Ok(Self {
            client: http_client()?,
            endpoint,
            num_ctx,
        })
    }
}

#[async_trait]
impl Oracle for OllamaOracle {
    async fn chat(&self, model: &str, messages: &[ChatMessage]) -> Result<String, OracleError> {
        let request = OllamaChatRequest {
            model,
            messages,
            stream: false,
            options: self.num_ctx.map(|num_ctx| OllamaOptions { num_ctx }),
        };

        debug!(model, endpoint = %self.endpoint, "Sending chat request to Ollama");
        let body = post_json(&self.client, &self.endpoint, &request).await?;

        let parsed: OllamaChatResponse =
            serde_json::from_value(body).map_err(|e| OracleError::Malformed {
                endpoint: self.endpoint.clone(),
                message: e.to_string(),
            })?;

        Ok(parsed.message.content)
    }
}

#[derive(Serialize)]
struct LmStudioChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

pub struct LmStudioOracle {
    client: Client,
    endpoint: String,
}

impl LmStudioOracle {
    pub fn new(endpoint: String) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            endpoint,
        })
    }
}

#[async_trait]
impl Oracle for LmStudioOracle {
    async fn chat(&self, model: &str, messages: &[ChatMessage]) -> Result<String, OracleError> {
        let request = LmStudioChatRequest { model, messages };

        debug!(model, endpoint = %self.endpoint, "Sending chat request to LM Studio");
        let body = post_json(&self.client, &self.endpoint, &request).await?;

        Ok(normalize_response(&body))
    }
}

/// Pull the reply text out of the response shapes OpenAI-compatible servers use.
///
/// Order: `choices[0].message.content`, `choices[0].text`, top-level
/// `message.content`, then the whole body as JSON text.
pub fn normalize_response(body: &Value) -> String {
    let Some(object) = body.as_object() else {
        return value_to_text(body);
    };

    if let Some(first) = object
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
    {
        return match first.get("message") {
            Some(Value::Object(message)) => message.get("content").map(value_to_text).unwrap_or_default(),
            Some(Value::Null) | None => first.get("text").map(value_to_text).unwrap_or_default(),
            Some(other) => value_to_text(other),
        };
    }

    if let Some(content) = object
        .get("message")
        .and_then(Value::as_object)
        .and_then(|message| message.get("content"))
    {
        return value_to_text(content);
    }

    body.to_string()
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays canned replies in order and records every prompt it was sent
    #[derive(Default)]
    pub struct ScriptedOracle {
        replies: Mutex<VecDeque<Result<String, String>>>,
        fallback: Option<String>,
        pub prompts: Mutex<Vec<(String, String)>>,
    }

    impl ScriptedOracle {
        pub fn always(reply: &str) -> Self {
            Self {
                fallback: Some(reply.to_string()),
                ..Default::default()
            }
        }

        pub fn with_replies<I, S>(replies: I) -> Self
        where
            I: IntoIterator<Item = S>,
            S: Into<String>,
        {
            Self {
                replies: Mutex::new(replies.into_iter().map(|r| Ok(r.into())).collect()),
                ..Default::default()
            }
        }

        pub fn push_failure(&self, message: &str) {
            self.replies.lock().unwrap().push_back(Err(message.to_string()));
        }

        pub fn call_count(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Oracle for ScriptedOracle {
        async fn chat(&self, model: &str, messages: &[ChatMessage]) -> Result<String, OracleError> {
            let prompt = messages.last().map(|m| m.content.clone()).unwrap_or_default();
            self.prompts.lock().unwrap().push((model.to_string(), prompt));

            let next = self.replies.lock().unwrap().pop_front();
            match next {
                Some(Ok(reply)) => Ok(reply),
                Some(Err(message)) => Err(OracleError::Malformed {
                    endpoint: "scripted".to_string(),
                    message,
                }),
                None => self.fallback.clone().ok_or_else(|| OracleError::Malformed {
                    endpoint: "scripted".to_string(),
                    message: "script exhausted".to_string(),
                }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_normalize_openai_shape() {
        let body = json!({"choices": [{"message": {"role": "assistant", "content": "9"}}]});
        assert_eq!(normalize_response(&body), "9");
    }

    #[test]
    fn test_normalize_completion_text_shape() {
        let body = json!({"choices": [{"text": "Βαθμός: 7"}]});
        assert_eq!(normalize_response(&body), "Βαθμός: 7");
    }

    #[test]
    fn test_normalize_flat_message_shape() {
        let body = json!({"message": {"content": "Περίληψη"}});
        assert_eq!(normalize_response(&body), "Περίληψη");
    }

    #[test]
    fn test_normalize_falls_back_to_json_text() {
        let body = json!({"result": "ok"});
        assert_eq!(normalize_response(&body), r#"{"result":"ok"}"#);

        let body = json!(["a", "b"]);
        assert_eq!(normalize_response(&body), r#"["a","b"]"#);
    }

    #[tokio::test]
    async fn test_lmstudio_posts_model_and_messages() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(body_partial_json(json!({
                "model": "google/gemma-3-4b",
                "messages": [{"role": "user", "content": "Βαθμός:"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": "9"}}]
            })))
            .mount(&server)
            .await;

        let oracle = LmStudioOracle::new(format!("{}/v1/chat/completions", server.uri())).unwrap();
        let reply = oracle
            .chat("google/gemma-3-4b", &[ChatMessage::user("Βαθμός:")])
            .await
            .unwrap();

        assert_eq!(reply, "9");
    }

    #[tokio::test]
    async fn test_lmstudio_http_error_is_reported() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("model not loaded"))
            .mount(&server)
            .await;

        let oracle = LmStudioOracle::new(server.uri()).unwrap();
        let err = oracle
            .chat("llama-krikri-8b-instruct", &[ChatMessage::user("hi")])
            .await
            .unwrap_err();

        match err {
            OracleError::Status { status, body, .. } => {
                assert_eq!(status.as_u16(), 500);
                assert_eq!(body, "model not loaded");
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_ollama_sends_context_window_and_reads_message() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(json!({
                "model": "gemma3:4b",
                "stream": false,
                "options": {"num_ctx": 40960}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "model": "gemma3:4b",
                "message": {"role": "assistant", "content": "Σύντομος τίτλος"},
                "done": true
            })))
            .mount(&server)
            .await;

        let oracle = OllamaOracle::new(format!("{}/", server.uri()), Some(40960)).unwrap();
        let reply = oracle
            .chat("gemma3:4b", &[ChatMessage::user("Δώσε τίτλο")])
            .await
            .unwrap();

        assert_eq!(reply, "Σύντομος τίτλος");
    }

    #[tokio::test]
    async fn test_ollama_malformed_body() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"error": "oops"})))
            .mount(&server)
            .await;

        let oracle = OllamaOracle::new(server.uri(), None).unwrap();
        let err = oracle
            .chat("gemma3:4b", &[ChatMessage::user("x")])
            .await
            .unwrap_err();

        assert!(matches!(err, OracleError::Malformed { .. }));
    }

    async fn ollama_reply_server() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "message": {"role": "assistant", "content": "9"}
            })))
            .mount(&server)
            .await;
        server
    }

    async fn first_request_body(server: &MockServer) -> Value {
        let requests = server.received_requests().await.unwrap();
        serde_json::from_slice(&requests[0].body).unwrap()
    }

    #[tokio::test]
    async fn test_judge_calls_leave_context_window_unset() {
        let server = ollama_reply_server().await;
        let config = Config {
            ollama_host: server.uri(),
            ..Config::default()
        };

        let oracle = build_oracle(&config, OracleRole::Classification).unwrap();
        let judge = crate::judge::SimilarityJudge::new(oracle.as_ref(), config.classification_model.clone());
        let grade = judge
            .judge("Σεισμός στην Κρήτη", "Σεισμική δόνηση στο Ηράκλειο")
            .await
            .unwrap();
        assert_eq!(grade.reply(), "9");

        let body = first_request_body(&server).await;
        assert_eq!(body["model"], "gemma3:4b");
        assert!(body.get("options").is_none());
    }

    #[tokio::test]
    async fn test_broadcast_calls_request_context_window() {
        let server = ollama_reply_server().await;
        let config = Config {
            ollama_host: server.uri(),
            context_window: 32_768,
            ..Config::default()
        };

        let oracle = build_oracle(&config, OracleRole::Broadcast).unwrap();
        oracle
            .chat(&config.broadcast_model, &[ChatMessage::user("Περίληψη")])
            .await
            .unwrap();

        let body = first_request_body(&server).await;
        assert_eq!(body["options"]["num_ctx"], 32_768);
    }
}
