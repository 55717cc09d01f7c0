//! Archive status command.

use console::style;

use crate::cli::helpers::open_archiver;
use crate::config::{Config, Settings};
use crate::models::SyncStatus;

pub async fn cmd_status(settings: &Settings, config: &Config) -> anyhow::Result<()> {
    let archiver = open_archiver(settings, config)?;
    let stats = archiver.stats()?;

    println!("\n{}", style("Archive").bold());
    println!("{}", "-".repeat(40));
    println!("{:<20} {}", "Database:", settings.database_path().display());
    println!("{:<20} {}", "Records:", stats.records);
    println!("{:<20} {}", "Tombstones:", stats.tombstones);
    println!("{:<20} {}", "Threads:", stats.thread_records);

    if !stats.memberships.is_empty() {
        println!("\n{}", style("Collections").bold());
        println!("{}", "-".repeat(40));
        for (kind, count) in &stats.memberships {
            println!("{:<20} {}", format!("{}:", kind), count);
        }
    }

    if stats.checkpoints.is_empty() {
        println!("\n{} Nothing synced yet", style("!").yellow());
        return Ok(());
    }

    println!("\n{}", style("Sync State").bold());
    println!("{}", "-".repeat(40));
    for checkpoint in &stats.checkpoints {
        let status = match checkpoint.status {
            SyncStatus::Completed => style("Complete").green().to_string(),
            SyncStatus::Failed if checkpoint.is_resumable() => {
                style("Failed (resumable)").red().to_string()
            }
            SyncStatus::Failed => style("Failed").red().to_string(),
            SyncStatus::InProgress => style("In Progress").yellow().to_string(),
            SyncStatus::Pending => style("Not Started").dim().to_string(),
        };
        println!(
            "{:<20} {} ({} synced)",
            format!("{}:", checkpoint.kind),
            status,
            checkpoint.total_synced
        );
        if let Some(completed) = checkpoint.completed_at {
            println!(
                "{:<20} {}",
                "  Last Completed:",
                completed.format("%Y-%m-%d %H:%M")
            );
        }
    }

    Ok(())
}
