//! CLI interface for LLTM
//!
//! This module provides the command-line interface using clap's derive API.
//! It defines all commands and global flags for chatting with the model and
//! managing the memory index directly.

use crate::db::SearchField;
use clap::{Parser, Subcommand};
use sdk::Privacy;
use std::path::PathBuf;

/// Long-term memory for conversational models
///
/// Chat with a model that can search and extend what it remembers about you,
/// or manage those memories by hand.
#[derive(Parser, Debug)]
#[command(name = "lltm")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start an interactive chat session
    Chat {
        /// User id (defaults to core.user_id)
        #[arg(short, long)]
        user: Option<String>,
    },

    /// Store a memory
    Remember {
        /// Owner of the memory (defaults to core.user_id)
        #[arg(short, long)]
        user: Option<String>,

        /// Privacy level: public, private or shared
        #[arg(short, long, default_value = "private")]
        privacy: Privacy,

        /// Users allowed to read a shared memory (comma-separated)
        #[arg(short, long, value_delimiter = ',')]
        share: Vec<String>,

        /// Memory text
        text: String,
    },

    /// Search memories visible to a user
    Search {
        /// Requesting user (defaults to core.user_id)
        #[arg(short, long)]
        user: Option<String>,

        /// Maximum number of ranked candidates (defaults to memory.search_limit)
        #[arg(short, long)]
        limit: Option<usize>,

        /// Fields to search: content, privacy, access_list
        #[arg(short, long = "field", default_value = "content")]
        fields: Vec<SearchField>,

        /// Search text
        query: String,
    },

    /// Show one memory with all its fields
    Show {
        /// Memory id
        id: String,
    },

    /// Replace the text and privacy of a memory
    Revise {
        /// Memory id
        id: String,

        /// Privacy level: public, private or shared
        #[arg(short, long, default_value = "private")]
        privacy: Privacy,

        /// Users allowed to read a shared memory (comma-separated)
        #[arg(short, long, value_delimiter = ',')]
        share: Vec<String>,

        /// New memory text
        text: String,
    },

    /// Delete a memory
    Forget {
        /// Memory id
        id: String,
    },

    /// Show index location, memory count and provider availability
    Status,
}
