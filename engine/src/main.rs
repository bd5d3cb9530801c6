// LLTM - long-term memory for conversational models
// Main entry point for the lltm binary

use clap::Parser;
use lltm_engine::cli::{Cli, Command};
use lltm_engine::config::Config;
use lltm_engine::handlers::{
    handle_chat, handle_forget, handle_remember, handle_revise, handle_search, handle_show,
    handle_status, OutputFormat,
};
use lltm_engine::telemetry::{init_telemetry, init_telemetry_with_level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration (or use custom path if provided)
    let config = match &cli.config {
        Some(config_path) => Config::load_from_path(config_path),
        None => Config::load_or_create(),
    };

    // --log wins over the config file; RUST_LOG wins over both
    match (&cli.log, &config) {
        (Some(level), _) => init_telemetry_with_level(level),
        (None, Ok(config)) => init_telemetry_with_level(&config.core.log_level),
        (None, Err(_)) => init_telemetry(),
    }

    let config = config?;

    let version = env!("CARGO_PKG_VERSION");
    let commit = env!("GIT_COMMIT_HASH");
    let timestamp = env!("BUILD_TIMESTAMP");

    tracing::info!("LLTM v{} ({} - {})", version, commit, timestamp);

    // Determine output format
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    // Handle commands
    match cli.command {
        Command::Chat { user } => handle_chat(user, &config, format).await,

        Command::Remember {
            user,
            privacy,
            share,
            text,
        } => handle_remember(user, privacy, share, text, &config, format).await,

        Command::Search {
            user,
            limit,
            fields,
            query,
        } => {
            tracing::debug!("Searching {:?} for {:?}", fields, query);
            handle_search(user, limit, fields, query, &config, format).await
        }

        Command::Show { id } => handle_show(id, &config, format).await,

        Command::Revise {
            id,
            privacy,
            share,
            text,
        } => handle_revise(id, privacy, share, text, &config, format).await,

        Command::Forget { id } => handle_forget(id, &config, format).await,

        Command::Status => handle_status(&config, format).await,
    }
}
