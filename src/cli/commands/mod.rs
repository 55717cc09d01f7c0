//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod query_ids;
mod status;
mod sync;
mod thread;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::{load_settings, LoadOptions};
use crate::models::{CollectionKind, ThreadMode};

pub use sync::SyncArgs;

#[derive(Parser)]
#[command(name = "hoard")]
#[command(about = "Incremental archiver for bookmarks, likes and timelines")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

fn parse_kind(s: &str) -> Result<CollectionKind, String> {
    CollectionKind::from_str(s).ok_or_else(|| {
        let known: Vec<&str> = CollectionKind::ALL.iter().map(|k| k.as_str()).collect();
        format!("unknown collection '{}' (expected one of: {})", s, known.join(", "))
    })
}

fn parse_mode(s: &str) -> Result<ThreadMode, String> {
    ThreadMode::from_str(s)
        .ok_or_else(|| format!("unknown mode '{}' (expected thread or conversation)", s))
}

#[derive(Subcommand)]
enum Commands {
    /// Sync a collection (likes, bookmarks, authored, reposts, replies, feed)
    Sync {
        /// Collection to sync
        #[arg(value_parser = parse_kind)]
        kind: CollectionKind,
        #[command(flatten)]
        args: SyncArgs,
    },

    /// Reconstruct the thread or conversation around a record
    Thread {
        /// Record ID
        id: String,
        /// thread (same-author chain) or conversation (everyone)
        #[arg(short, long, value_parser = parse_mode, default_value = "thread")]
        mode: ThreadMode,
        /// Maximum records in conversation mode
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Fetch missing parents of your own stored threads
    RepairThreads,

    /// Manage operation identifiers
    QueryIds {
        #[command(subcommand)]
        command: QueryIdCommands,
    },

    /// Show archive statistics and sync checkpoints
    Status,
}

#[derive(Subcommand)]
enum QueryIdCommands {
    /// Rediscover identifiers from the web client bundles
    Refresh,
    /// Show the identifier in use for each operation
    Show,
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let options = LoadOptions {
        config_path: cli.config,
    };
    let (settings, config) = load_settings(&options)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;

    match cli.command {
        Commands::Sync { kind, args } => sync::cmd_sync(&settings, &config, kind, args).await,
        Commands::Thread { id, mode, limit } => {
            thread::cmd_thread(&settings, &config, &id, mode, limit).await
        }
        Commands::RepairThreads => thread::cmd_repair_threads(&settings, &config).await,
        Commands::QueryIds { command } => match command {
            QueryIdCommands::Refresh => query_ids::cmd_refresh(&settings, &config).await,
            QueryIdCommands::Show => query_ids::cmd_show(&settings, &config).await,
        },
        Commands::Status => status::cmd_status(&settings, &config).await,
    }
}
