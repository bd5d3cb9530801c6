//! Memory Agent
//!
//! This module implements the conversational turn loop that lets a model
//! search and extend its long-term memory about the user. Conversation state
//! lives in `Session`, owned by the caller; `MemoryAgent` is stateless
//! between turns.

pub mod core;
pub mod prompts;
pub mod session;

pub use self::core::{AgentSettings, MemoryAgent, TurnOutcome, TurnStep};
pub use session::Session;
