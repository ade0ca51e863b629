//! Chat completion client
//!
//! Any OpenAI-compatible `/chat/completions` endpoint works (OpenAI, GitHub
//! Models, Azure, local gateways). A mock client stands in when no API key is
//! configured.

use crate::config::LlmConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Trait for chat completion backends
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Send one system + user exchange and return the assistant's text
    async fn complete(&self, system: &str, user: &str) -> Result<String>;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// OpenAI-compatible chat completion client
pub struct OpenAiChatClient {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    model: String,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiChatClient {
    pub fn new(api_key: String, config: &LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            api_key,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl ChatClient for OpenAiChatClient {
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage { role: "system", content: system },
                ChatMessage { role: "user", content: user },
            ],
            temperature: self.temperature,
        };

        let response = self.client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::Llm {
                message: format!("Request failed: {}", e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Llm {
                message: format!("API error {}: {}", status, body),
            });
        }

        let result: ChatResponse = response.json().await.map_err(|e| AppError::Llm {
            message: format!("Failed to parse response: {}", e),
        })?;

        result
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| AppError::Llm {
                message: "Empty response".to_string(),
            })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Canned reply used by the mock client when none is given
pub const MOCK_RECEIPT_JSON: &str = r#"```json
{
  "storeName": "Corner Grocer",
  "purchaseDate": "2024-01-15",
  "totalAmount": 7.25,
  "items": [
    { "name": "Milk", "quantity": 2, "price": 1.50 },
    { "name": "Bread", "quantity": 1, "price": 4.25 }
  ]
}
```"#;

/// Mock chat client for testing and offline development
pub struct MockChatClient {
    reply: String,
}

impl MockChatClient {
    pub fn new(reply: impl Into<String>) -> Self {
        Self { reply: reply.into() }
    }
}

impl Default for MockChatClient {
    fn default() -> Self {
        Self::new(MOCK_RECEIPT_JSON)
    }
}

#[async_trait]
impl ChatClient for MockChatClient {
    async fn complete(&self, _system: &str, _user: &str) -> Result<String> {
        Ok(self.reply.clone())
    }

    fn model_name(&self) -> &str {
        "mock-chat"
    }
}

/// Create a chat client based on configuration
pub fn create_chat_client(config: &LlmConfig) -> Result<Arc<dyn ChatClient>> {
    match config.provider.as_str() {
        "openai" => match config.api_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => {
                Ok(Arc::new(OpenAiChatClient::new(key.to_string(), config)?))
            }
            _ => {
                tracing::warn!("No LLM API key configured, using mock chat client");
                Ok(Arc::new(MockChatClient::default()))
            }
        },
        "mock" => Ok(Arc::new(MockChatClient::default())),
        other => Err(AppError::Configuration {
            message: format!("Unknown LLM provider: {}", other),
        }),
    }
}
