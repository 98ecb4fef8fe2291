//! Command-line interface definition for threadkeep
//!
//! This module defines the operator CLI using clap's derive API. It
//! inspects and maintains the session store; it is not a chat front end.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// threadkeep - session and response store for chat assistants
#[derive(Parser, Debug, Clone)]
#[command(name = "threadkeep")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Owner whose sessions to operate on (all owners when omitted)
    #[arg(short, long, env = "THREADKEEP_OWNER")]
    pub owner: Option<String>,

    /// Override the SQLite database path
    #[arg(long)]
    pub database: Option<PathBuf>,

    /// Skip the database and use the JSON file backend
    #[arg(long)]
    pub no_database: bool,

    /// Override the JSON file path
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for threadkeep
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// List sessions, most recently updated first
    List,

    /// Search session titles and messages
    Search {
        /// Text to look for (case-insensitive)
        query: String,
    },

    /// Show session and message totals
    Stats,

    /// Delete a session
    Delete {
        /// Session id
        id: String,
    },

    /// Rename a session
    Rename {
        /// Session id
        id: String,

        /// New title
        title: String,
    },

    /// Show which storage backend would be selected
    Backend,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            config: None,
            verbose: false,
            owner: None,
            database: None,
            no_database: false,
            file: None,
            command: Commands::List,
        }
    }
}
