pub mod client;

use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

use crate::config::Config;
pub use client::{CompletionSettings, LlmClient, LlmResponse};

/// Produces text for a prompt.
#[async_trait]
pub trait Generator: Send + Sync {
    fn model_name(&self) -> &str;

    async fn generate(&self, system_prompt: &str, user_message: &str) -> Result<LlmResponse>;
}

/// Chat completions through OpenRouter.
pub struct OpenRouterGenerator {
    llm: LlmClient,
    settings: CompletionSettings,
}

impl OpenRouterGenerator {
    pub fn new(llm: LlmClient, settings: CompletionSettings) -> Self {
        Self { llm, settings }
    }

    /// `None` when no API key is configured.
    pub fn from_config(config: &Config) -> Result<Option<Self>> {
        let Some(api_key) = config.llm_api_key.as_deref() else {
            return Ok(None);
        };
        let llm = LlmClient::new(
            api_key,
            &config.llm_base_url,
            Duration::from_secs(config.llm_timeout_secs),
        )?;
        Ok(Some(Self::new(
            llm,
            CompletionSettings {
                model: config.llm_model.clone(),
                max_tokens: config.llm_max_tokens,
                temperature: config.llm_temperature,
            },
        )))
    }
}

#[async_trait]
impl Generator for OpenRouterGenerator {
    fn model_name(&self) -> &str {
        &self.settings.model
    }

    async fn generate(&self, system_prompt: &str, user_message: &str) -> Result<LlmResponse> {
        self.llm
            .complete(&self.settings, Some(system_prompt), user_message)
            .await
    }
}
