use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::document::Usage;

#[derive(Debug, Clone)]
pub struct LlmClient {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
}

/// Per-call sampling settings.
#[derive(Debug, Clone)]
pub struct CompletionSettings {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

// OpenAI-compatible chat completions format (used by OpenRouter)
#[derive(Debug, Clone, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Clone, Serialize)]
struct ChatCompletionRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    cost: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub text: String,
    pub usage: Usage,
}

impl LlmClient {
    /// `base_url` is the API root (`https://openrouter.ai/api/v1`); a URL
    /// that already names the completions endpoint is used as is.
    pub fn new(api_key: &str, base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_key: api_key.to_string(),
            endpoint: completions_endpoint(base_url),
        })
    }

    pub async fn complete(
        &self,
        settings: &CompletionSettings,
        system_prompt: Option<&str>,
        user_message: &str,
    ) -> Result<LlmResponse> {
        let request = build_request(settings, system_prompt, user_message);

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", &self.api_key))
            .header("content-type", "application/json")
            .header("HTTP-Referer", "https://github.com/rag-qa/rag-qa")
            .header("X-Title", "rag-qa")
            .json(&request)
            .send()
            .await
            .context("Failed to send request to LLM API")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("LLM API error ({}): {}", status, body);
        }

        let body = response
            .text()
            .await
            .context("Failed to read LLM API response")?;

        parse_response(&body)
    }
}

fn completions_endpoint(base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if base.ends_with("/chat/completions") {
        base.to_string()
    } else {
        format!("{}/chat/completions", base)
    }
}

fn build_request(
    settings: &CompletionSettings,
    system_prompt: Option<&str>,
    user_message: &str,
) -> ChatCompletionRequest {
    let mut messages = Vec::new();
    if let Some(system) = system_prompt {
        messages.push(ChatMessage {
            role: "system".to_string(),
            content: system.to_string(),
        });
    }
    messages.push(ChatMessage {
        role: "user".to_string(),
        content: user_message.to_string(),
    });

    ChatCompletionRequest {
        model: settings.model.clone(),
        max_tokens: settings.max_tokens,
        temperature: settings.temperature,
        messages,
    }
}

fn parse_response(body: &str) -> Result<LlmResponse> {
    let api_response: ChatCompletionResponse =
        serde_json::from_str(body).context("Failed to parse LLM API response")?;

    let text = api_response
        .choices
        .first()
        .and_then(|c| c.message.content.as_deref())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .context("LLM API returned no completion text")?
        .to_string();

    let usage = api_response
        .usage
        .map(|u| Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            cost: u.cost.unwrap_or(0.0),
        })
        .unwrap_or_default();

    Ok(LlmResponse { text, usage })
}
