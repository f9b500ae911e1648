//! Minimal OpenAI Chat Completions client.

use crate::{ChatMessage, Config, ExtractionRequest};
use anyhow::{anyhow, bail, Context as _, Result};
use serde::{Deserialize, Serialize};

/// Long-lived handle to the chat-completions endpoint.
///
/// A missing API key is tolerated here and reported by [`OpenAiClient::complete`].
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    api_key: Option<String>,
    model: String,
    temperature: f32,
    endpoint: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
    total_tokens: Option<u32>,
}

impl OpenAiClient {
    pub fn new(config: &Config) -> Self {
        if config.api_key.is_none() {
            tracing::warn!("no OpenAI API key configured; extraction requests will fail");
        }

        Self {
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            client: reqwest::Client::new(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Posts the request and returns the first choice's content exactly as received.
    pub async fn complete(&self, request: &ExtractionRequest) -> Result<String> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            anyhow!("missing API key: set OPENAI_API_KEY in secrets.toml or the environment")
        })?;

        let body = ChatRequest {
            model: &self.model,
            messages: &request.messages,
            temperature: self.temperature,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .context("chat completion request failed")?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("chat completion returned HTTP {status}: {text}");
        }

        let response: ChatResponse = response
            .json()
            .await
            .context("failed to parse chat completion response")?;

        if let Some(usage) = &response.usage {
            tracing::info!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                total_tokens = usage.total_tokens,
                "usage"
            );
        }

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| anyhow!("chat completion returned no content"))
    }
}
