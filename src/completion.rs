//! Completion provider abstraction.
//!
//! [`CompletionProvider`] takes an ordered list of chat messages and returns
//! the model's reply. Two implementations:
//!
//! - **[`DisabledProvider`]**: always fails with [`CompletionError::Disabled`].
//! - **[`OpenAIProvider`]**: one `POST {base_url}/chat/completions` per call,
//!   bounded by the configured timeout, never retried.
//!
//! Use [`create_provider`] to pick one from `[completion]`.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::CompletionConfig;
use crate::models::{ConversationMessage, Role};

#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error("completion provider is disabled")]
    Disabled,
    #[error("missing API key (set {0})")]
    MissingApiKey(String),
    #[error("request failed: {0}")]
    Transport(String),
    #[error("provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// One message of a chat-completions request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system",
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant",
            content: content.into(),
        }
    }
}

impl From<&ConversationMessage> for ChatMessage {
    fn from(m: &ConversationMessage) -> Self {
        match m.role {
            Role::User => Self::user(m.content.clone()),
            Role::Assistant => Self::assistant(m.content.clone()),
        }
    }
}

#[async_trait]
pub trait CompletionProvider: Send + Sync {
    fn model_name(&self) -> &str;

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, CompletionError>;
}

pub struct DisabledProvider;

#[async_trait]
impl CompletionProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn complete(&self, _messages: &[ChatMessage]) -> Result<String, CompletionError> {
        Err(CompletionError::Disabled)
    }
}

// ============ OpenAI ============

pub struct OpenAIProvider {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    api_key: Option<String>,
    api_key_env: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

impl OpenAIProvider {
    /// Reads the API key from `config.api_key_env`. A missing key is not an
    /// error here; every call then fails with [`CompletionError::MissingApiKey`].
    pub fn new(config: &CompletionConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty());
        Self::with_api_key(config, api_key)
    }

    pub fn with_api_key(config: &CompletionConfig, api_key: Option<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            api_key,
            api_key_env: config.api_key_env.clone(),
        })
    }
}

#[async_trait]
impl CompletionProvider for OpenAIProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, CompletionError> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| CompletionError::MissingApiKey(self.api_key_env.clone()))?;

        let body = ChatRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let started = std::time::Instant::now();
        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(key)
            .json(&body)
            .send()
            .await
            .map_err(|e| CompletionError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(CompletionError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = resp
            .json()
            .await
            .map_err(|e| CompletionError::Malformed(e.to_string()))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| CompletionError::Malformed("no message content".to_string()))?;

        tracing::debug!(
            model = %self.model,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "completion received"
        );
        Ok(content)
    }
}

/// | Config value | Provider |
/// |--------------|----------|
/// | `"disabled"` | [`DisabledProvider`] |
/// | `"openai"`   | [`OpenAIProvider`] |
pub fn create_provider(config: &CompletionConfig) -> Result<Box<dyn CompletionProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledProvider)),
        "openai" => Ok(Box::new(OpenAIProvider::new(config)?)),
        other => bail!("Unknown completion provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> CompletionConfig {
        CompletionConfig {
            base_url: format!("{}/v1/", server.uri()),
            timeout_secs: 1,
            ..CompletionConfig::default()
        }
    }

    fn provider(server: &MockServer) -> OpenAIProvider {
        OpenAIProvider::with_api_key(&config_for(server), Some("sk-test".into())).unwrap()
    }

    fn reply(content: &str) -> serde_json::Value {
        json!({ "choices": [{ "message": { "role": "assistant", "content": content } }] })
    }

    #[tokio::test]
    async fn sends_messages_in_order_with_fixed_sampling() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({
                "model": "gpt-4o-mini",
                "max_tokens": 1500,
                "messages": [
                    { "role": "system", "content": "S" },
                    { "role": "user", "content": "Q1" },
                    { "role": "assistant", "content": "R1" },
                    { "role": "user", "content": "Q2" }
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(reply("Bonjour")))
            .expect(1)
            .mount(&server)
            .await;

        let messages = vec![
            ChatMessage::system("S"),
            ChatMessage::user("Q1"),
            ChatMessage::assistant("R1"),
            ChatMessage::user("Q2"),
        ];
        let out = provider(&server).complete(&messages).await.unwrap();
        assert_eq!(out, "Bonjour");
    }

    #[tokio::test]
    async fn http_error_is_reported_with_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .expect(1)
            .mount(&server)
            .await;

        let err = provider(&server)
            .complete(&[ChatMessage::user("Q")])
            .await
            .unwrap_err();
        match err {
            CompletionError::Status { status, body } => {
                assert_eq!(status, 429);
                assert_eq!(body, "rate limited");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_choices_are_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
            .mount(&server)
            .await;

        let err = provider(&server)
            .complete(&[ChatMessage::user("Q")])
            .await
            .unwrap_err();
        assert!(matches!(err, CompletionError::Malformed(_)));
    }

    #[tokio::test]
    async fn slow_provider_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(reply("late"))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let err = provider(&server)
            .complete(&[ChatMessage::user("Q")])
            .await
            .unwrap_err();
        assert!(matches!(err, CompletionError::Transport(_)));
    }

    #[tokio::test]
    async fn missing_key_fails_without_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(reply("x")))
            .expect(0)
            .mount(&server)
            .await;

        let p = OpenAIProvider::with_api_key(&config_for(&server), None).unwrap();
        let err = p.complete(&[ChatMessage::user("Q")]).await.unwrap_err();
        assert_eq!(err.to_string(), "missing API key (set OPENAI_API_KEY)");
    }

    #[tokio::test]
    async fn disabled_provider_always_fails() {
        let err = DisabledProvider
            .complete(&[ChatMessage::user("Q")])
            .await
            .unwrap_err();
        assert!(matches!(err, CompletionError::Disabled));
    }

    #[test]
    fn create_provider_dispatches_on_name() {
        let mut config = CompletionConfig {
            provider: "disabled".into(),
            ..CompletionConfig::default()
        };
        assert_eq!(create_provider(&config).unwrap().model_name(), "disabled");

        config.provider = "openai".into();
        assert_eq!(create_provider(&config).unwrap().model_name(), "gpt-4o-mini");

        config.provider = "mistral".into();
        assert!(create_provider(&config).is_err());
    }

    #[test]
    fn conversation_roles_map_to_chat_roles() {
        let m = ConversationMessage::new(Role::Assistant, "ok");
        assert_eq!(ChatMessage::from(&m), ChatMessage::assistant("ok"));
    }
}
