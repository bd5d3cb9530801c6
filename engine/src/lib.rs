//! LLTM Engine Library
//!
//! This library provides long-term memory for conversational models: a
//! privacy-aware document store, the tagged response protocol, and the turn
//! loop that connects them to a model provider. It is used by both the
//! `lltm` binary and integration tests.

/// Configuration management module
pub mod config;

/// Memory index persistence module
pub mod db;

/// Response protocol parsing
pub mod protocol;

/// LLM provider abstraction layer
pub mod llm;

/// Memory agent turn loop
pub mod agent;

/// Telemetry and Observability
pub mod telemetry;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;
