//! Command handlers for CLI operations
//!
//! This module implements the handlers for all CLI commands:
//! - chat: Interactive conversation with memory
//! - remember / revise / forget: Manual memory maintenance
//! - search / show: Inspect what is remembered
//! - status: Index and provider health

use anyhow::{Context, Result};
use serde_json::json;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::agent::{AgentSettings, MemoryAgent, Session, TurnOutcome, TurnStep};
use crate::config::Config;
use crate::db::{Database, DocumentStore, SearchField};
use crate::llm::{LLMProvider, OllamaProvider, OpenAIProvider};
use sdk::errors::{EngineError, LltmErrorExt};
use sdk::{DocumentRevision, NewDocument, Privacy};

/// Output format for command results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

/// Build the configured default provider
pub fn build_provider(config: &Config) -> Result<Arc<dyn LLMProvider>> {
    let timeout = std::time::Duration::from_secs(config.session.llm_timeout_secs);
    match config.llm.default_provider.as_str() {
        "ollama" => Ok(Arc::new(
            OllamaProvider::from_config(&config.llm.ollama).with_timeout(timeout),
        )),
        "openai" => Ok(Arc::new(
            OpenAIProvider::from_config(&config.llm.openai).with_timeout(timeout),
        )),
        other => Err(anyhow::anyhow!("Unknown LLM provider: {}", other)),
    }
}

/// Open the memory index and a store over it
async fn open_store(config: &Config) -> Result<(Database, DocumentStore)> {
    let database = Database::open(&config.memory.index_dir)
        .await
        .map_err(EngineError::from)
        .context("Failed to open memory index")?;
    let store = database.documents().with_match_mode(config.memory.match_mode);
    Ok((database, store))
}

fn user_or_default(user: Option<String>, config: &Config) -> String {
    user.unwrap_or_else(|| config.core.user_id.clone())
}

/// Run an interactive chat session on stdin/stdout
pub async fn handle_chat(
    user: Option<String>,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let user_id = user_or_default(user, config);
    let (database, store) = open_store(config).await?;
    let provider = build_provider(config)?;

    if !provider.check_health().await {
        tracing::warn!(
            "Provider {} did not answer its health check; continuing anyway",
            provider.name()
        );
    }

    let agent = MemoryAgent::new(provider, store, AgentSettings::from_config(config));
    let mut session = agent.new_session(&user_id);

    if format == OutputFormat::Text {
        println!(
            "Chatting as {} via {}. Type /reset to start over, /quit to leave.",
            user_id,
            agent.provider_name()
        );
    }

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut stdout = std::io::stdout();
    let result = chat_loop(&agent, &mut session, stdin, &mut stdout, format).await;

    database
        .close()
        .await
        .map_err(EngineError::from)
        .context("Failed to close memory index")?;

    result
}

/// Read lines from `input` and run a turn for each until EOF or `/quit`
///
/// Each step is written as soon as the model produces it, so replies given
/// before a failed call are still shown. Recoverable turn errors are
/// reported and the loop continues with the next line; anything else ends
/// the session.
pub async fn chat_loop<R, W>(
    agent: &MemoryAgent,
    session: &mut Session,
    input: R,
    out: &mut W,
    format: OutputFormat,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut lines = input.lines();

    loop {
        if format == OutputFormat::Text {
            write!(out, "You: ")?;
            out.flush()?;
        }

        let Some(line) = lines.next_line().await.context("Failed to read input")? else {
            break;
        };
        let line = line.trim();

        match line {
            "" => continue,
            "/quit" | "/exit" => break,
            "/reset" => {
                session.reset();
                write_event(out, format, "Session reset.", json!({"event": "reset"}))?;
                continue;
            }
            _ => {}
        }

        let mut step_written: Result<()> = Ok(());
        let turn = agent
            .run_turn_with(session, line, |step| {
                if step_written.is_ok() {
                    step_written = write_step(out, format, step);
                }
            })
            .await;
        step_written?;

        match turn {
            Ok(outcome) => write_outcome(out, format, &outcome)?,
            Err(e) if e.is_recoverable() => {
                tracing::warn!("Turn failed: {}", e);
                write_event(
                    out,
                    format,
                    &format!("[error] {}", e.user_hint()),
                    json!({"event": "error", "error": e.to_string(), "hint": e.user_hint()}),
                )?;
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(())
}

fn write_event<W: Write>(
    out: &mut W,
    format: OutputFormat,
    text: &str,
    value: serde_json::Value,
) -> Result<()> {
    match format {
        OutputFormat::Text => writeln!(out, "{}", text)?,
        OutputFormat::Json => writeln!(out, "{}", value)?,
    }
    Ok(())
}

fn write_step<W: Write>(out: &mut W, format: OutputFormat, step: &TurnStep) -> Result<()> {
    match format {
        OutputFormat::Text => {
            for line in step.raw.lines() {
                writeln!(out, "  | {}", line)?;
            }
            if let Some(records) = &step.recalled {
                writeln!(out, "  [recalled {} memories]", records.len())?;
            }
            if let Some(reply) = step.reply() {
                writeln!(out, "Bot: {}", reply)?;
            }
        }
        OutputFormat::Json => {
            let value = json!({
                "event": "step",
                "iteration": step.iteration,
                "raw": step.raw,
                "query": step.sections.query,
                "summary": step.sections.summary,
                "reply": step.reply(),
                "saved_note": step.saved_note,
                "recalled": step.recalled,
            });
            writeln!(out, "{}", value)?;
        }
    }
    out.flush()?;
    Ok(())
}

/// Close a turn; text output already carries every step
fn write_outcome<W: Write>(out: &mut W, format: OutputFormat, outcome: &TurnOutcome) -> Result<()> {
    if format == OutputFormat::Json {
        let value = json!({
            "event": "turn",
            "replies": outcome.replies,
            "searches": outcome.searches,
            "iterations": outcome.iterations,
        });
        writeln!(out, "{}", value)?;
    }
    Ok(())
}

/// Store a memory
pub async fn handle_remember(
    user: Option<String>,
    privacy: Privacy,
    share: Vec<String>,
    text: String,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let user_id = user_or_default(user, config);
    let (database, store) = open_store(config).await?;

    let document = NewDocument::new(&user_id, text, privacy).with_access_list(share);
    let id = store
        .add(document)
        .await
        .map_err(EngineError::from)
        .context("Failed to store memory")?;

    match format {
        OutputFormat::Text => println!("Remembered {} ({}, owner {})", id, privacy, user_id),
        OutputFormat::Json => {
            let output = json!({"id": id, "user_id": user_id, "privacy": privacy});
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    database.close().await.map_err(EngineError::from)?;
    Ok(())
}

/// Search memories visible to a user
pub async fn handle_search(
    user: Option<String>,
    limit: Option<usize>,
    fields: Vec<SearchField>,
    query: String,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let user_id = user_or_default(user, config);
    let limit = limit.unwrap_or(config.memory.search_limit);
    let (database, store) = open_store(config).await?;

    let records = store
        .search(&user_id, &fields, &query, limit)
        .await
        .map_err(EngineError::from)
        .context("Failed to search memory")?;

    match format {
        OutputFormat::Text => {
            if records.is_empty() {
                println!("Nothing remembered for {:?}", query);
            }
            for record in &records {
                println!("[{}] {}", record.time, record.content);
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
    }

    database.close().await.map_err(EngineError::from)?;
    Ok(())
}

/// Show one memory with all its fields
pub async fn handle_show(id: String, config: &Config, format: OutputFormat) -> Result<()> {
    let (database, store) = open_store(config).await?;

    let document = store
        .get(&id)
        .await
        .map_err(EngineError::from)
        .context("Failed to read memory")?
        .ok_or_else(|| anyhow::anyhow!("No memory with id {}", id))?;

    match format {
        OutputFormat::Text => {
            println!("Memory {}", document.id);
            println!("  Owner:   {}", document.user_id);
            println!("  Privacy: {}", document.privacy);
            if !document.access_list.is_empty() {
                println!("  Shared:  {}", document.access_list.to_csv());
            }
            println!("  Created: {}", document.to_record().time);
            println!("  Content: {}", document.content);
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&document)?);
        }
    }

    database.close().await.map_err(EngineError::from)?;
    Ok(())
}

/// Replace the mutable fields of a memory
pub async fn handle_revise(
    id: String,
    privacy: Privacy,
    share: Vec<String>,
    text: String,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let (database, store) = open_store(config).await?;

    let revision = DocumentRevision::new(text, privacy).with_access_list(share);
    let updated = store
        .update_fields(&id, revision)
        .await
        .map_err(EngineError::from)
        .context("Failed to revise memory")?;

    database.close().await.map_err(EngineError::from)?;

    if !updated {
        anyhow::bail!("No memory with id {}", id);
    }

    match format {
        OutputFormat::Text => println!("Revised {}", id),
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&json!({"id": id, "updated": true}))?);
        }
    }
    Ok(())
}

/// Delete a memory; deleting an unknown id is not an error
pub async fn handle_forget(id: String, config: &Config, format: OutputFormat) -> Result<()> {
    let (database, store) = open_store(config).await?;

    let removed = store
        .remove(&id)
        .await
        .map_err(EngineError::from)
        .context("Failed to delete memory")?;

    match format {
        OutputFormat::Text => {
            if removed {
                println!("Forgot {}", id);
            } else {
                println!("Nothing to forget for {}", id);
            }
        }
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({"id": id, "removed": removed}))?
            );
        }
    }

    database.close().await.map_err(EngineError::from)?;
    Ok(())
}

/// Report index location, memory count and provider health
pub async fn handle_status(config: &Config, format: OutputFormat) -> Result<()> {
    let (database, store) = open_store(config).await?;
    let count = store
        .count()
        .await
        .map_err(EngineError::from)
        .context("Failed to count memories")?;

    let provider = build_provider(config)?;
    let healthy = provider.check_health().await;

    match format {
        OutputFormat::Text => {
            println!("Index:    {}", database.path().display());
            println!("Memories: {}", count);
            println!(
                "Provider: {} ({})",
                provider.name(),
                if healthy { "available" } else { "unavailable" }
            );
        }
        OutputFormat::Json => {
            let output = json!({
                "index": database.path(),
                "memories": count,
                "provider": provider.name(),
                "provider_available": healthy,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    database.close().await.map_err(EngineError::from)?;
    Ok(())
}
