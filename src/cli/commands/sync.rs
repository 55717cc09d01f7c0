//! Collection sync command.

use chrono::{Duration, Utc};
use clap::Args;
use console::style;

use crate::cli::helpers::{open_archiver, report_failure};
use crate::config::{Config, Settings};
use crate::models::{BookmarkFolder, CollectionKind, ThreadMode};
use crate::sync::SyncOptions;

use super::parse_mode;

#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Records to sync this run (defaults to the configured count)
    #[arg(short = 'n', long, conflicts_with = "all")]
    pub count: Option<u64>,
    /// Sync the whole collection
    #[arg(short, long)]
    pub all: bool,
    /// Walk from the head even if the last run completed
    #[arg(long)]
    pub full: bool,
    /// Bookmark folder ID
    #[arg(long)]
    pub folder: Option<String>,
    /// Bookmark folder name, recorded on memberships
    #[arg(long, requires = "folder")]
    pub folder_name: Option<String>,
    /// Only records from the last N hours
    #[arg(long)]
    pub hours: Option<i64>,
    /// Reconstruct the thread of every synced record
    #[arg(long)]
    pub with_threads: bool,
    /// Mode used by --with-threads
    #[arg(long, value_parser = parse_mode, default_value = "thread")]
    pub thread_mode: ThreadMode,
}

impl SyncArgs {
    fn options(self, default_count: u64) -> anyhow::Result<SyncOptions> {
        if let Some(hours) = self.hours {
            if hours <= 0 {
                anyhow::bail!("--hours must be positive");
            }
        }

        Ok(SyncOptions {
            limit: if self.all {
                None
            } else {
                Some(self.count.unwrap_or(default_count))
            },
            full_resync: self.full,
            folder: self.folder.map(|id| BookmarkFolder {
                id,
                name: self.folder_name,
            }),
            since: self.hours.map(|h| Utc::now() - Duration::hours(h)),
            expand_threads: self.with_threads,
            thread_mode: self.thread_mode,
            ..Default::default()
        })
    }
}

/// Sync one collection and print a summary.
pub async fn cmd_sync(
    settings: &Settings,
    config: &Config,
    kind: CollectionKind,
    args: SyncArgs,
) -> anyhow::Result<()> {
    if args.folder.is_some() && kind != CollectionKind::Bookmarks {
        anyhow::bail!("--folder only applies to bookmarks");
    }

    let options = args.options(settings.default_count)?;
    let archiver = open_archiver(settings, config)?;

    let label = match &options.folder {
        Some(folder) => format!(
            "{} ({})",
            kind,
            folder.name.as_deref().unwrap_or(folder.id.as_str())
        ),
        None => kind.to_string(),
    };
    println!("{} Syncing {}", style("→").cyan(), style(&label).bold());

    let report = match archiver.sync_collection(kind, &options).await {
        Ok(report) => report,
        Err(e) => {
            report_failure(&e);
            return Err(e.into());
        }
    };

    let outcome = &report.outcome;
    println!(
        "{} Synced {} records ({} new) over {} pages",
        style("✓").green(),
        outcome.synced,
        outcome.added,
        outcome.pages
    );
    println!(
        "  {} Stopped: {} (total {})",
        style("→").dim(),
        outcome.stop.as_str(),
        outcome.checkpoint.total_synced
    );

    if options.expand_threads {
        println!(
            "{} Reconstructed {} threads",
            style("✓").green(),
            report.threads.reconstructed
        );
        if report.threads.failed > 0 {
            println!(
                "{} {} threads could not be reconstructed",
                style("!").yellow(),
                report.threads.failed
            );
        }
    }

    Ok(())
}
