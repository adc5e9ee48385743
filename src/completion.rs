//! Text completion over an OpenAI-compatible chat API.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::CompletionSettings;
use crate::error::CompletionError;

#[async_trait]
pub trait TextCompletion: Send + Sync {
    /// Completes `prompt`, giving up after `timeout`.
    async fn complete(&self, prompt: &str, timeout: Duration) -> Result<String, CompletionError>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: [ChatMessage<'a>; 1],
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    content: Option<String>,
}

pub struct OpenAiCompletion {
    client: reqwest::Client,
    settings: CompletionSettings,
}

impl OpenAiCompletion {
    pub fn new(settings: CompletionSettings) -> Result<Self, CompletionError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;
        Ok(Self { client, settings })
    }

    async fn send(&self, prompt: &str) -> Result<String, CompletionError> {
        let url = format!("{}/chat/completions", self.settings.base_url.trim_end_matches('/'));
        let body = ChatRequest {
            model: &self.settings.model,
            temperature: self.settings.temperature,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.settings.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(CompletionError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: ChatResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(CompletionError::EmptyResponse)
    }
}

#[async_trait]
impl TextCompletion for OpenAiCompletion {
    async fn complete(&self, prompt: &str, timeout: Duration) -> Result<String, CompletionError> {
        debug!(model = %self.settings.model, "Sending completion request");
        tokio::time::timeout(timeout, self.send(prompt))
            .await
            .map_err(|_| CompletionError::Timeout(timeout.as_secs()))?
    }
}
