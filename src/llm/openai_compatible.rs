use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{CompletionClient, CompletionError, CompletionResult, Message};
use crate::config::LlmConfig;

/// Client for an OpenAI-compatible `/chat/completions` endpoint
/// (Perplexity by default).
///
/// Every call sends exactly one request with the configured prompt and is
/// cut off after `timeout`, covering both the response head and the body.
pub struct ChatCompletionClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    prompt: String,
    temperature: f32,
    max_tokens: u32,
    timeout: Duration,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

impl ChatCompletionClient {
    pub fn new(config: &LlmConfig, api_key: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: config.model.clone(),
            prompt: config.prompt.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    fn request(&self) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: vec![Message::user(&self.prompt)],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }

    async fn call(&self) -> CompletionResult {
        let url = format!("{}/chat/completions", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&self.request())
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(CompletionError::Http(status.as_u16()));
        }

        let body = response.text().await.map_err(transport_error)?;
        extract_content(&body)
    }
}

fn transport_error(e: reqwest::Error) -> CompletionError {
    if e.is_timeout() {
        CompletionError::Timeout
    } else {
        CompletionError::Transport(e.to_string())
    }
}

/// Pull `choices[0].message.content` out of a response body.
fn extract_content(body: &str) -> CompletionResult {
    let parsed: ChatResponse = serde_json::from_str(body)
        .map_err(|e| CompletionError::MalformedResponse(e.to_string()))?;
    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| CompletionError::MalformedResponse("no choices".into()))?;
    match choice.message.content {
        Some(text) if !text.trim().is_empty() => Ok(text),
        Some(_) => Err(CompletionError::MalformedResponse("empty content".into())),
        None => Err(CompletionError::MalformedResponse("missing content".into())),
    }
}

#[async_trait::async_trait]
impl CompletionClient for ChatCompletionClient {
    async fn fetch_digest(&self) -> CompletionResult {
        match tokio::time::timeout(self.timeout, self.call()).await {
            Ok(result) => result,
            Err(_) => Err(CompletionError::Timeout),
        }
    }
}
