//! Error types and handling
//!
//! This module provides the error types used throughout the LLTM engine.
//! All errors implement the `LltmErrorExt` trait which provides user-friendly
//! hints and indicates whether errors are recoverable.
//!
//! # Security
//!
//! Hints never echo the wrapped detail string, so document contents, owner
//! ids and index paths stay out of anything shown to an end user.

use thiserror::Error;

/// Trait for LLTM error extensions
///
/// This trait provides additional context for errors, including user-friendly
/// hints and recoverability information. All engine errors implement this trait.
pub trait LltmErrorExt {
    /// Returns a user-friendly hint for the error
    ///
    /// The hint is safe to display to end users and does not contain
    /// document contents, user identifiers or file paths.
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    ///
    /// Recoverable errors can be retried or worked around. Non-recoverable
    /// errors typically require manual intervention or a restart.
    fn is_recoverable(&self) -> bool;
}

/// Main engine error type
///
/// # Error Categories
///
/// - **Configuration**: Invalid or missing configuration
/// - **Store**: Memory index initialisation, write and read failures
/// - **Document**: Records rejected at the store boundary
/// - **LLM Provider**: Completion call failures
/// - **Turn loop**: Iteration and timeout bounds
///
/// # Examples
///
/// ```
/// use sdk::errors::{EngineError, LltmErrorExt};
///
/// let error = EngineError::StoreRead("disk I/O error".to_string());
/// println!("Hint: {}", error.user_hint());
/// assert!(error.is_recoverable());
///
/// let fatal_error = EngineError::StoreInit("schema mismatch".to_string());
/// assert!(!fatal_error.is_recoverable());
/// ```
#[derive(Debug, Error)]
pub enum EngineError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Memory store errors
    #[error("Memory index could not be opened: {0}")]
    StoreInit(String),

    #[error("Memory write failed: {0}")]
    StoreWrite(String),

    #[error("Memory search failed: {0}")]
    StoreRead(String),

    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    // LLM provider errors
    #[error("LLM provider error: {0}")]
    LLMProvider(String),

    // Turn loop errors
    #[error("Max iterations exceeded ({0} model calls in one turn)")]
    MaxIterationsExceeded(usize),

    #[error("LLM call timed out")]
    LLMTimeout,

    // Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LltmErrorExt for EngineError {
    fn user_hint(&self) -> &str {
        match self {
            Self::Config(_) => "Check your config.toml file for errors",

            Self::StoreInit(_) => {
                "Memory index is unreadable or from an incompatible version. Move it aside and restart"
            }
            Self::StoreWrite(_) => "Could not save to memory. Check disk space and permissions",
            Self::StoreRead(_) => "Could not search memory. Try again",
            Self::InvalidDocument(_) => "A memory needs content, an owner and a privacy level",

            Self::LLMProvider(_) => "LLM provider unavailable. Check your API keys and network",

            Self::MaxIterationsExceeded(_) => {
                "The model kept searching memory without answering. Try rephrasing"
            }
            Self::LLMTimeout => "LLM provider took too long to respond. Try again",

            Self::Io(_) => "File system operation failed",
        }
    }

    fn is_recoverable(&self) -> bool {
        !matches!(self, Self::StoreInit(_) | Self::Config(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_init_is_fatal() {
        assert!(!EngineError::StoreInit("bad".into()).is_recoverable());
        assert!(!EngineError::Config("bad".into()).is_recoverable());
        assert!(EngineError::StoreWrite("busy".into()).is_recoverable());
        assert!(EngineError::LLMTimeout.is_recoverable());
    }

    #[test]
    fn test_hint_does_not_echo_detail() {
        let err = EngineError::InvalidDocument("secret diary entry".into());
        assert!(!err.user_hint().contains("secret diary entry"));
        assert!(err.to_string().contains("secret diary entry"));
    }

    #[test]
    fn test_max_iterations_message() {
        let err = EngineError::MaxIterationsExceeded(10);
        assert_eq!(
            err.to_string(),
            "Max iterations exceeded (10 model calls in one turn)"
        );
    }
}
