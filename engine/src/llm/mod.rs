//! LLM Provider Abstraction Layer
//!
//! The engine only needs one thing from a model: given the conversation so
//! far, produce the next assistant message as text. The `LLMProvider` trait
//! captures that contract; the orchestrator parses the text itself.
//!
//! Two providers are included: Ollama (local) and any OpenAI-compatible
//! chat completions endpoint.

use async_trait::async_trait;
use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod ollama;
pub mod openai;

pub use ollama::OllamaProvider;
pub use openai::OpenAIProvider;

/// Result type for LLM operations
pub type Result<T> = std::result::Result<T, LLMError>;

/// Errors that can occur during LLM operations
#[derive(Debug, thiserror::Error)]
pub enum LLMError {
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Timeout")]
    Timeout,

    #[error("Parse error: {0}")]
    ParseError(String),
}

impl From<LLMError> for EngineError {
    fn from(err: LLMError) -> Self {
        match err {
            LLMError::Timeout => EngineError::LLMTimeout,
            other => EngineError::LLMProvider(other.to_string()),
        }
    }
}

/// Message in a conversation history
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    /// Role of the message sender (user, assistant, system)
    pub role: MessageRole,

    /// Content of the message
    pub content: String,
}

impl Message {
    /// Create a new user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    /// Create a new assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }

    /// Create a new system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }
}

/// Role of a message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// User message
    User,

    /// Assistant message
    Assistant,

    /// System message
    System,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::System => "system",
        }
    }
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// LLM Provider trait that all providers must implement
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Returns the name of the provider (e.g., "ollama", "openai")
    fn name(&self) -> &str;

    /// Produce the next assistant message for `messages`
    ///
    /// # Arguments
    /// * `messages` - Full conversation history, instructional prefix included
    ///
    /// # Returns
    /// * `Ok(String)` - The raw assistant text, unparsed
    /// * `Err(LLMError)` - If the request fails
    async fn complete(&self, messages: &[Message]) -> Result<String>;

    /// Check if the provider is currently healthy and available
    /// Default implementation returns true.
    async fn check_health(&self) -> bool {
        true
    }
}

/// Map a non-success HTTP status to an `LLMError`
pub(crate) fn status_error(provider: &str, status: reqwest::StatusCode, body: String) -> LLMError {
    match status.as_u16() {
        401 | 403 => LLMError::AuthenticationFailed(body),
        429 => LLMError::RateLimitExceeded,
        400..=499 => {
            LLMError::InvalidRequest(format!("{} API error ({}): {}", provider, status, body))
        }
        _ => LLMError::ProviderUnavailable(format!(
            "{} API error ({}): {}",
            provider, status, body
        )),
    }
}

/// Map a transport failure to an `LLMError`
pub(crate) fn transport_error(provider: &str, base_url: &str, err: reqwest::Error) -> LLMError {
    if err.is_timeout() {
        LLMError::Timeout
    } else if err.is_connect() {
        LLMError::ProviderUnavailable(format!(
            "Cannot connect to {} at {}",
            provider, base_url
        ))
    } else {
        LLMError::NetworkError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_creation() {
        let user_msg = Message::user("Hello");
        assert_eq!(user_msg.role, MessageRole::User);
        assert_eq!(user_msg.content, "Hello");

        let assistant_msg = Message::assistant("Hi there");
        assert_eq!(assistant_msg.role, MessageRole::Assistant);

        let system_msg = Message::system("You are a helpful assistant");
        assert_eq!(system_msg.role, MessageRole::System);
    }

    #[test]
    fn test_role_wire_names() {
        let json = serde_json::to_string(&Message::assistant("ok")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"ok"}"#);
        assert_eq!(MessageRole::System.to_string(), "system");
    }

    #[test]
    fn test_timeout_maps_to_llm_timeout() {
        let err: EngineError = LLMError::Timeout.into();
        assert!(matches!(err, EngineError::LLMTimeout));

        let err: EngineError = LLMError::RateLimitExceeded.into();
        assert!(matches!(err, EngineError::LLMProvider(_)));
    }

    #[test]
    fn test_status_error_mapping() {
        use reqwest::StatusCode;

        assert!(matches!(
            status_error("openai", StatusCode::UNAUTHORIZED, String::new()),
            LLMError::AuthenticationFailed(_)
        ));
        assert!(matches!(
            status_error("openai", StatusCode::TOO_MANY_REQUESTS, String::new()),
            LLMError::RateLimitExceeded
        ));
        assert!(matches!(
            status_error("ollama", StatusCode::NOT_FOUND, "model not found".into()),
            LLMError::InvalidRequest(_)
        ));
        assert!(matches!(
            status_error("ollama", StatusCode::BAD_GATEWAY, String::new()),
            LLMError::ProviderUnavailable(_)
        ));
    }
}
