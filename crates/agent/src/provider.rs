//! HTTP agent provider speaking the chat APIs of the supported LLM vendors.
//!
//! Every call is a single non-streaming request. Tools bound on the vendor side
//! (analytics queries, web search) are invisible here; the reply is decoded into
//! an [`AgentReply`] and handed back untouched.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tracing::debug;

use mercalytica_core::config::{LlmConfig, LlmProvider};

use crate::llm::{AgentError, AgentHandle, AgentMessage, AgentProvider, AgentReply, AgentRole};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const ANTHROPIC_MAX_TOKENS: u32 = 4096;
const ERROR_BODY_EXCERPT_CHARS: usize = 300;

pub struct HttpAgentProvider {
    config: LlmConfig,
}

impl HttpAgentProvider {
    pub fn new(config: LlmConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl AgentProvider for HttpAgentProvider {
    async fn load(&self) -> Result<Option<Arc<dyn AgentHandle>>, AgentError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .build()
            .map_err(|e| AgentError::Load(e.to_string()))?;

        let base_url = self
            .config
            .base_url
            .clone()
            .unwrap_or_else(|| self.config.provider.default_base_url().to_string())
            .trim_end_matches('/')
            .to_string();

        debug!(
            event_name = "chat.agent.loaded",
            provider = self.config.provider.as_str(),
            model = %self.config.model,
            "http agent handle ready"
        );

        Ok(Some(Arc::new(HttpAgent {
            client,
            provider: self.config.provider,
            base_url,
            model: self.config.model.clone(),
            temperature: self.config.temperature,
            timeout: Duration::from_secs(self.config.timeout_secs),
            api_key: self.config.api_key.clone(),
        })))
    }
}

struct HttpAgent {
    client: reqwest::Client,
    provider: LlmProvider,
    base_url: String,
    model: String,
    temperature: f32,
    timeout: Duration,
    api_key: Option<SecretString>,
}

impl HttpAgent {
    fn headers(&self) -> Result<HeaderMap, AgentError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let Some(api_key) = &self.api_key else {
            return Ok(headers);
        };
        let key = api_key.expose_secret();

        match self.provider {
            LlmProvider::OpenAi | LlmProvider::Ollama => {
                headers.insert(AUTHORIZATION, header_value(&format!("Bearer {key}"))?);
            }
            LlmProvider::Anthropic => {
                headers.insert(HeaderName::from_static("x-api-key"), header_value(key)?);
                headers.insert(
                    HeaderName::from_static("anthropic-version"),
                    HeaderValue::from_static(ANTHROPIC_VERSION),
                );
            }
            LlmProvider::Gemini => {
                headers.insert(HeaderName::from_static("x-goog-api-key"), header_value(key)?);
            }
        }

        Ok(headers)
    }
}

fn header_value(value: &str) -> Result<HeaderValue, AgentError> {
    HeaderValue::from_str(value).map_err(|e| AgentError::Invoke(format!("invalid header: {e}")))
}

#[async_trait]
impl AgentHandle for HttpAgent {
    async fn invoke(&self, messages: &[AgentMessage]) -> Result<AgentReply, AgentError> {
        let (path, body) = build_request(self.provider, &self.model, self.temperature, messages);
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .client
            .post(&url)
            .headers(self.headers()?)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AgentError::Timeout(self.timeout)
                } else {
                    AgentError::Invoke(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let excerpt: String = text.chars().take(ERROR_BODY_EXCERPT_CHARS).collect();
            return Err(AgentError::Invoke(format!("HTTP {status}: {excerpt}")));
        }

        let body: Value = response.json().await.map_err(|e| AgentError::Decode(e.to_string()))?;
        decode_reply(self.provider, body)
    }
}

/// Returns the endpoint path and JSON body for one chat call.
pub(crate) fn build_request(
    provider: LlmProvider,
    model: &str,
    temperature: f32,
    messages: &[AgentMessage],
) -> (String, Value) {
    match provider {
        LlmProvider::OpenAi => (
            "/v1/chat/completions".to_string(),
            json!({
                "model": model,
                "messages": role_content_messages(messages),
                "temperature": temperature,
                "stream": false,
            }),
        ),
        LlmProvider::Ollama => (
            "/api/chat".to_string(),
            json!({
                "model": model,
                "messages": role_content_messages(messages),
                "stream": false,
                "options": { "temperature": temperature },
            }),
        ),
        LlmProvider::Anthropic => {
            let conversation: Vec<Value> = messages
                .iter()
                .filter(|message| message.role != AgentRole::System)
                .map(|message| json!({ "role": message.role.as_str(), "content": message.content }))
                .collect();
            (
                "/v1/messages".to_string(),
                json!({
                    "model": model,
                    "system": system_text(messages),
                    "messages": conversation,
                    "max_tokens": ANTHROPIC_MAX_TOKENS,
                    "temperature": temperature,
                    "stream": false,
                }),
            )
        }
        LlmProvider::Gemini => {
            let contents: Vec<Value> = messages
                .iter()
                .filter(|message| message.role != AgentRole::System)
                .map(|message| {
                    let role = match message.role {
                        AgentRole::Assistant => "model",
                        _ => "user",
                    };
                    json!({ "role": role, "parts": [{ "text": message.content }] })
                })
                .collect();
            (
                format!("/v1beta/models/{model}:generateContent"),
                json!({
                    "contents": contents,
                    "systemInstruction": { "parts": [{ "text": system_text(messages) }] },
                    "generationConfig": { "temperature": temperature },
                }),
            )
        }
    }
}

fn role_content_messages(messages: &[AgentMessage]) -> Vec<Value> {
    messages
        .iter()
        .map(|message| json!({ "role": message.role.as_str(), "content": message.content }))
        .collect()
}

fn system_text(messages: &[AgentMessage]) -> String {
    messages
        .iter()
        .filter(|message| message.role == AgentRole::System)
        .map(|message| message.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub(crate) fn decode_reply(provider: LlmProvider, body: Value) -> Result<AgentReply, AgentError> {
    let missing = |field: &str| AgentError::Decode(format!("{} reply without {field}", provider.as_str()));

    match provider {
        LlmProvider::OpenAi => body
            .pointer("/choices/0/message")
            .cloned()
            .map(AgentReply::from)
            .ok_or_else(|| missing("choices[0].message")),
        LlmProvider::Ollama => {
            body.get("message").cloned().map(AgentReply::from).ok_or_else(|| missing("message"))
        }
        LlmProvider::Anthropic => {
            if body.get("content").is_none() {
                return Err(missing("content"));
            }
            Ok(AgentReply::from(body))
        }
        LlmProvider::Gemini => body
            .pointer("/candidates/0/content/parts")
            .cloned()
            .map(|content| AgentReply::Message { content })
            .ok_or_else(|| missing("candidates[0].content.parts")),
    }
}
