//! Conversation Session
//!
//! A session is the message history of one conversation with one user.
//! It is owned by the caller and handed to `MemoryAgent::run_turn` by
//! mutable reference, so any number of independent sessions can share one
//! agent and one memory index. The history always starts with the
//! instructional prefix describing the response protocol; `reset` drops
//! everything after it.

use crate::llm::Message;
use crate::protocol::ProtocolMarkers;

use super::prompts;

/// Rough estimate used for log output only (1 token ≈ 4 characters)
const CHARS_PER_TOKEN: usize = 4;

/// Message history for one user's conversation
#[derive(Debug, Clone)]
pub struct Session {
    /// Owner of notes saved from this conversation and requester for its searches
    user_id: String,

    /// Instructional prefix, restored on reset
    preamble: Vec<Message>,

    /// Full history sent to the model, preamble included
    messages: Vec<Message>,
}

impl Session {
    /// Start a session for `user_id` using the default protocol markers
    pub fn new(user_id: impl Into<String>) -> Self {
        Self::with_markers(user_id, &ProtocolMarkers::default())
    }

    /// Start a session whose instructions describe `markers`
    pub fn with_markers(user_id: impl Into<String>, markers: &ProtocolMarkers) -> Self {
        let preamble = prompts::instructional_history(markers);
        Self {
            user_id: user_id.into(),
            messages: preamble.clone(),
            preamble,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Get all messages in the conversation history
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Number of messages exchanged since the instructional prefix
    pub fn turn_messages(&self) -> usize {
        self.messages.len() - self.preamble.len()
    }

    /// Append a message to the history
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Append user input, framed the way the instructions describe
    pub fn push_user_input(&mut self, input: &str) {
        self.push(Message::user(prompts::frame_user_input(input)));
    }

    /// Drop the conversation and restore the instructional prefix
    pub fn reset(&mut self) {
        self.messages.clone_from(&self.preamble);
    }

    /// Estimate the size of the history in tokens
    pub fn estimated_tokens(&self) -> usize {
        self.messages
            .iter()
            .map(|m| m.content.len().div_ceil(CHARS_PER_TOKEN))
            .sum()
    }
}
