//! Command-line argument parsing for lexflow
//!
//! Provides clap-based CLI with subcommands and verbosity control.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use uuid::Uuid;

/// lexflow - legal AI agents, workflows and knowledge retrieval
#[derive(Parser, Debug)]
#[command(name = "lexflow")]
#[command(version)]
#[command(about = "Run legal AI agents and workflows against an Ollama-compatible server", long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// User the conversations belong to
    #[arg(short, long, global = true, env = "LEXFLOW_USER", default_value = "local")]
    pub user: String,

    /// Use a scripted provider, hashed embeddings and in-memory storage
    #[arg(long, global = true)]
    pub offline: bool,

    /// Verbosity level: -q (quiet), default (normal), -v (verbose), -vv (very verbose)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (suppress everything except the answer)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Send a message to an agent
    Chat {
        /// Message text
        message: String,

        /// Agent slug
        #[arg(short, long, default_value = "legal-research")]
        agent: String,

        /// Continue an existing conversation
        #[arg(long)]
        conversation: Option<Uuid>,

        #[arg(long)]
        folder: Option<String>,
    },

    /// Run a workflow
    Workflow {
        /// Workflow slug
        slug: String,

        /// Case description handed to the first step
        input: String,

        /// Run inside an existing conversation
        #[arg(long)]
        conversation: Option<Uuid>,

        #[arg(long)]
        folder: Option<String>,
    },

    /// List agents
    Agents,

    /// List workflows
    Workflows,

    /// List the user's conversations
    Conversations,

    /// Print a conversation transcript
    Show { id: Uuid },

    /// Delete a conversation (executions are kept)
    Delete { id: Uuid },

    /// Execution statistics
    Stats {
        #[arg(short, long)]
        agent: Option<String>,
    },

    /// Failed executions, most recent first
    Failed {
        #[arg(short, long)]
        agent: Option<String>,

        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },

    /// Add a document to the knowledge base
    Ingest {
        /// Text file to ingest; omit with --backfill
        path: Option<PathBuf>,

        /// legislation, jurisprudence, doctrine, ...
        #[arg(short, long, default_value = "legislation")]
        source_type: String,

        #[arg(long)]
        title: Option<String>,

        #[arg(long)]
        url: Option<String>,

        /// Comma-separated tags
        #[arg(long, value_delimiter = ',')]
        tags: Vec<String>,

        /// Embed stored entries that have no embedding yet
        #[arg(long)]
        backfill: bool,
    },

    /// Display the effective configuration
    Config {
        /// Write the defaults to the config file
        #[arg(long)]
        init: bool,
    },
}

/// Verbosity level enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Verbose,
    VeryVerbose,
}

impl Args {
    pub fn verbosity(&self) -> Verbosity {
        if self.quiet {
            Verbosity::Quiet
        } else {
            match self.verbose {
                0 => Verbosity::Normal,
                1 => Verbosity::Verbose,
                _ => Verbosity::VeryVerbose,
            }
        }
    }
}

impl Verbosity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verbosity::Quiet => "quiet",
            Verbosity::Normal => "normal",
            Verbosity::Verbose => "verbose",
            Verbosity::VeryVerbose => "very_verbose",
        }
    }

    /// Default tracing filter for this level
    pub fn log_level(&self) -> &'static str {
        match self {
            Verbosity::Quiet => "error",
            Verbosity::Normal => "info",
            Verbosity::Verbose => "debug",
            Verbosity::VeryVerbose => "trace",
        }
    }

    pub fn show_progress(&self) -> bool {
        !matches!(self, Verbosity::Quiet)
    }

    pub fn show_events(&self) -> bool {
        matches!(self, Verbosity::Verbose | Verbosity::VeryVerbose)
    }
}
