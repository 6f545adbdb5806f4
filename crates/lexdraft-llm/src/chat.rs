use anyhow::{bail, Result};
use async_trait::async_trait;
use lexdraft_core::seams::ChatBackend;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// One-shot chat completions against the OpenAI-compatible API.
pub struct ChatClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    pub model: String,
    pub temperature: f64,
}

impl ChatClient {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            temperature: 0.7,
        }
    }
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f64,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[async_trait]
impl ChatBackend for ChatClient {
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let mut messages = Vec::new();
        if !system.is_empty() {
            messages.push(ChatMessage {
                role: "system".into(),
                content: system.to_string(),
            });
        }
        messages.push(ChatMessage {
            role: "user".into(),
            content: user.to_string(),
        });

        let request_body = ChatRequest {
            model: self.model.clone(),
            messages,
            temperature: self.temperature,
        };

        info!(model = %self.model, "calling chat completions API");

        let url = format!(
            "{}/v1/chat/completions",
            self.base_url.trim_end_matches('/')
        );
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, "chat completions returned non-200: {}", body);
            bail!("chat completion failed with status {status}");
        }

        let parsed: ChatResponse = response.json().await?;
        let Some(choice) = parsed.choices.into_iter().next() else {
            bail!("chat completion returned no choices");
        };
        Ok(choice.message.content.unwrap_or_default().trim().to_string())
    }
}
