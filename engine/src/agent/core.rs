//! Agent Core
//!
//! This module implements the memory-augmented turn loop. One user turn runs
//! through an iterative ask-parse-act cycle:
//!
//! 1. Append the framed user input to the session
//! 2. Ask the model for a completion (with a timeout)
//! 3. Parse the query, summary and reply sections
//! 4. Save a summary as a private note owned by the session's user
//! 5. Collect a reply as turn output
//! 6. If there was a query: search memory, feed the results back, go to 2
//! 7. Otherwise the turn is over
//!
//! # Limits
//!
//! - `max_iterations` model calls per turn (default 10)
//! - `llm_timeout` per model call (default 300s)
//!
//! # Degraded store operations
//!
//! A failed summary write is logged and the turn continues. A failed search
//! is logged and reported to the model as an empty result with a note.
//! Model failures end the turn with an error.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::db::DocumentStore;
use crate::llm::{LLMProvider, Message};
use crate::protocol::{ParsedResponse, ProtocolMarkers, ResponseParser};
use sdk::errors::EngineError;
use sdk::MemoryRecord;

use super::prompts;
use super::Session;

/// Default maximum number of model calls per turn
pub const DEFAULT_MAX_ITERATIONS: usize = 10;

/// Default timeout for each model call in seconds
pub const DEFAULT_LLM_TIMEOUT_SECS: u64 = 300;

/// Tunables for the turn loop
#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub max_iterations: usize,
    pub llm_timeout: Duration,
    pub search_limit: usize,
    pub markers: ProtocolMarkers,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            llm_timeout: Duration::from_secs(DEFAULT_LLM_TIMEOUT_SECS),
            search_limit: crate::db::documents::DEFAULT_SEARCH_LIMIT,
            markers: ProtocolMarkers::default(),
        }
    }
}

impl AgentSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_iterations: config.session.max_iterations,
            llm_timeout: Duration::from_secs(config.session.llm_timeout_secs),
            search_limit: config.memory.search_limit,
            markers: config.protocol.clone(),
        }
    }
}

/// One model round-trip within a turn
#[derive(Debug, Clone)]
pub struct TurnStep {
    /// 1-based position within the turn
    pub iteration: usize,

    /// Raw model output, shown to operators as the model's "thinking"
    pub raw: String,

    /// Sections parsed from `raw`
    pub sections: ParsedResponse,

    /// Id of the note saved from the summary, if one was written
    pub saved_note: Option<String>,

    /// Results fed back for the query; `None` when there was no query
    pub recalled: Option<Vec<MemoryRecord>>,
}

impl TurnStep {
    /// The trimmed reply of this step, if the model gave a non-blank one
    pub fn reply(&self) -> Option<&str> {
        non_blank(self.sections.reply.as_deref())
    }
}

/// Everything that happened during one user turn
#[derive(Debug, Clone, Default)]
pub struct TurnOutcome {
    /// Replies in the order the model produced them
    pub replies: Vec<String>,

    pub steps: Vec<TurnStep>,

    /// Number of memory searches performed
    pub searches: usize,

    /// Number of model calls made
    pub iterations: usize,
}

impl TurnOutcome {
    /// The last reply of the turn, if the model gave one
    pub fn reply(&self) -> Option<&str> {
        self.replies.last().map(String::as_str)
    }
}

/// Memory-augmented conversational agent
///
/// Holds no conversation state of its own; every turn operates on the
/// `Session` passed in.
pub struct MemoryAgent {
    provider: Arc<dyn LLMProvider>,
    store: DocumentStore,
    parser: ResponseParser,
    settings: AgentSettings,
}

impl MemoryAgent {
    pub fn new(
        provider: Arc<dyn LLMProvider>,
        store: DocumentStore,
        settings: AgentSettings,
    ) -> Self {
        Self {
            provider,
            store,
            parser: ResponseParser::new(settings.markers.clone()),
            settings,
        }
    }

    /// Start a session whose instructions match this agent's markers
    pub fn new_session(&self, user_id: impl Into<String>) -> Session {
        Session::with_markers(user_id, &self.settings.markers)
    }

    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Run one user turn to completion
    ///
    /// Steps are only visible through the returned outcome; use
    /// `run_turn_with` to observe them as they happen.
    pub async fn run_turn(
        &self,
        session: &mut Session,
        input: &str,
    ) -> Result<TurnOutcome, EngineError> {
        self.run_turn_with(session, input, |_| {}).await
    }

    /// Run one user turn, handing every step to `on_step` as soon as it completes
    ///
    /// A reply reaches `on_step` before the next model call, so it is
    /// delivered even when a later call in the same turn fails.
    ///
    /// # Errors
    ///
    /// - `EngineError::LLMProvider` / `EngineError::LLMTimeout` when a model call fails
    /// - `EngineError::MaxIterationsExceeded` when the model keeps querying
    ///
    /// The session keeps every message appended before the error.
    pub async fn run_turn_with<F>(
        &self,
        session: &mut Session,
        input: &str,
        mut on_step: F,
    ) -> Result<TurnOutcome, EngineError>
    where
        F: FnMut(&TurnStep),
    {
        let start_time = Instant::now();
        let mut outcome = TurnOutcome::default();

        session.push_user_input(input);

        info!(
            "Starting turn for {} ({} history messages)",
            session.user_id(),
            session.messages().len()
        );

        loop {
            if outcome.iterations >= self.settings.max_iterations {
                error!(
                    "Turn for {} exceeded max iterations ({})",
                    session.user_id(),
                    self.settings.max_iterations
                );
                return Err(EngineError::MaxIterationsExceeded(
                    self.settings.max_iterations,
                ));
            }
            outcome.iterations += 1;

            debug!(
                "Turn iteration {}/{}, ~{} tokens of history",
                outcome.iterations,
                self.settings.max_iterations,
                session.estimated_tokens()
            );

            let raw = self.complete(session.messages()).await?;
            session.push(Message::assistant(raw.clone()));

            let sections = self.parser.parse(&raw);
            let mut step = TurnStep {
                iteration: outcome.iterations,
                raw,
                sections,
                saved_note: None,
                recalled: None,
            };

            if let Some(summary) = non_blank(step.sections.summary.as_deref()) {
                step.saved_note = self.remember(session.user_id(), summary).await;
            }

            if let Some(reply) = step.reply() {
                outcome.replies.push(reply.to_string());
            }

            let query = non_blank(step.sections.query.as_deref()).map(str::to_string);

            match query {
                Some(query) => {
                    let (records, failed) = self.recall(session.user_id(), &query).await;
                    outcome.searches += 1;
                    session.push(Message::user(prompts::frame_memory_output(
                        &records, failed,
                    )));
                    step.recalled = Some(records);
                    on_step(&step);
                    outcome.steps.push(step);
                }
                None => {
                    on_step(&step);
                    outcome.steps.push(step);
                    break;
                }
            }
        }

        info!(
            "Turn for {} completed in {}ms after {} iterations ({} searches)",
            session.user_id(),
            start_time.elapsed().as_millis(),
            outcome.iterations,
            outcome.searches
        );

        Ok(outcome)
    }

    /// Call the model with the configured timeout
    async fn complete(&self, messages: &[Message]) -> Result<String, EngineError> {
        match timeout(self.settings.llm_timeout, self.provider.complete(messages)).await {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(e)) => {
                error!("LLM call to {} failed: {}", self.provider.name(), e);
                Err(e.into())
            }
            Err(_) => {
                error!(
                    "LLM call timed out after {}s",
                    self.settings.llm_timeout.as_secs()
                );
                Err(EngineError::LLMTimeout)
            }
        }
    }

    /// Save a summary as a private note; failures are logged, not raised
    async fn remember(&self, user_id: &str, summary: &str) -> Option<String> {
        match self.store.add_private_note(user_id, summary).await {
            Ok(id) => {
                debug!("Saved note {} for {}", id, user_id);
                Some(id)
            }
            Err(e) => {
                warn!("Dropping summary for {}: {}", user_id, e);
                None
            }
        }
    }

    /// Search memory on behalf of `user_id`; returns the records and whether the search failed
    async fn recall(&self, user_id: &str, query: &str) -> (Vec<MemoryRecord>, bool) {
        match self
            .store
            .content_search(user_id, query, self.settings.search_limit)
            .await
        {
            Ok(records) => {
                debug!("Memory query {:?} recalled {} records", query, records.len());
                (records, false)
            }
            Err(e) => {
                warn!("Memory search for {} failed: {}", user_id, e);
                (Vec::new(), true)
            }
        }
    }
}

/// Trimmed section text, or `None` when absent or blank
fn non_blank(section: Option<&str>) -> Option<&str> {
    section.map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_blank() {
        assert_eq!(non_blank(None), None);
        assert_eq!(non_blank(Some("  \n")), None);
        assert_eq!(non_blank(Some(" John's OS ")), Some("John's OS"));
    }

    #[test]
    fn test_outcome_reply_is_last() {
        let outcome = TurnOutcome {
            replies: vec!["One moment.".to_string(), "You use Arch.".to_string()],
            ..TurnOutcome::default()
        };
        assert_eq!(outcome.reply(), Some("You use Arch."));
        assert_eq!(TurnOutcome::default().reply(), None);
    }

    #[test]
    fn test_settings_from_config() {
        let mut config = Config::default();
        config.session.max_iterations = 3;
        config.memory.search_limit = 7;

        let settings = AgentSettings::from_config(&config);
        assert_eq!(settings.max_iterations, 3);
        assert_eq!(settings.search_limit, 7);
        assert_eq!(settings.llm_timeout, Duration::from_secs(300));
    }
}
