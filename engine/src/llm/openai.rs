//! OpenAI-compatible LLM Provider
//!
//! Talks to any endpoint implementing `POST {base_url}/chat/completions`
//! (OpenAI itself, vLLM, LM Studio, llama.cpp server, ...). The API key is
//! read from the environment variable named in the config, never from the
//! config file itself.

use super::{status_error, transport_error, LLMError, LLMProvider, Message};
use crate::config::OpenAIConfig;
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

pub struct OpenAIProvider {
    base_url: String,
    model: String,
    api_key: Option<String>,
    timeout: Duration,
    client: reqwest::Client,
}

impl OpenAIProvider {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key,
            timeout: Duration::from_secs(300),
            client: reqwest::Client::new(),
        }
    }

    /// Build a provider from config, reading the key from `config.api_key_env`
    ///
    /// A missing variable is not an error here: local OpenAI-compatible
    /// servers often need no key. A remote endpoint will answer 401, which
    /// surfaces as `LLMError::AuthenticationFailed`.
    pub fn from_config(config: &OpenAIConfig) -> Self {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty());

        if api_key.is_none() {
            tracing::warn!(
                "{} is not set; requests to {} will be sent without an API key",
                config.api_key_env,
                config.base_url
            );
        }

        Self::new(&config.base_url, &config.model, api_key)
    }

    /// Override the per-request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl LLMProvider for OpenAIProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn check_health(&self) -> bool {
        let url = format!("{}/models", self.base_url);
        let mut request = self.client.get(&url).timeout(Duration::from_secs(5));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        match request.send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    async fn complete(&self, messages: &[Message]) -> super::Result<String> {
        let url = format!("{}/chat/completions", self.base_url);

        let api_messages: Vec<serde_json::Value> = messages
            .iter()
            .map(|msg| {
                json!({
                    "role": msg.role.as_str(),
                    "content": msg.content
                })
            })
            .collect();

        let payload = json!({
            "model": self.model,
            "messages": api_messages,
        });

        tracing::debug!(
            "OpenAI request: model={}, messages={}",
            self.model,
            api_messages.len()
        );

        let mut request = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .header("Content-Type", "application/json")
            .json(&payload);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| transport_error("OpenAI endpoint", &self.base_url, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(status_error("OpenAI", status, text));
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LLMError::ParseError(e.to_string()))?;

        let choice = data
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
            .ok_or_else(|| LLMError::ParseError("No choices in response".to_string()))?;

        let message = choice
            .get("message")
            .ok_or_else(|| LLMError::ParseError("No message in choice".to_string()))?;

        message
            .get("content")
            .and_then(|c| c.as_str())
            .map(str::to_string)
            .ok_or_else(|| LLMError::ParseError("Empty content".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_reads_named_env_var() {
        let config = OpenAIConfig {
            base_url: "http://localhost:8000/v1/".to_string(),
            model: "local-model".to_string(),
            api_key_env: "LLTM_TEST_OPENAI_KEY_UNSET_9F3A".to_string(),
        };

        let provider = OpenAIProvider::from_config(&config);
        assert_eq!(provider.name(), "openai");
        assert_eq!(provider.base_url, "http://localhost:8000/v1");
        assert!(provider.api_key.is_none());
    }
}
