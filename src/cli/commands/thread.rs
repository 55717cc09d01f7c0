//! Thread reconstruction commands.

use console::style;

use crate::cli::helpers::{open_archiver, report_failure, truncate};
use crate::config::{Config, Settings};
use crate::models::{ReconstructedRecord, ThreadMode};

/// Reconstruct one thread and print it as an indented tree.
pub async fn cmd_thread(
    settings: &Settings,
    config: &Config,
    id: &str,
    mode: ThreadMode,
    limit: Option<usize>,
) -> anyhow::Result<()> {
    let archiver = open_archiver(settings, config)?;

    println!(
        "{} Reconstructing {} around {}",
        style("→").cyan(),
        mode.as_str(),
        style(id).bold()
    );

    let reconstruction = match archiver.reconstruct(id, mode, limit).await {
        Ok(r) => r,
        Err(e) => {
            report_failure(&e);
            return Err(e.into());
        }
    };

    println!();
    for entry in &reconstruction.records {
        println!("{}", render_line(entry, id));
    }
    println!();

    let thread = &reconstruction.thread;
    if reconstruction.is_complete() {
        println!(
            "{} {} records in conversation {}",
            style("✓").green(),
            thread.record_count,
            thread.conversation_id
        );
    } else {
        println!(
            "{} {} records in conversation {} (incomplete, {} missing)",
            style("!").yellow(),
            thread.record_count,
            thread.conversation_id,
            reconstruction.tombstones()
        );
    }

    Ok(())
}

fn render_line(entry: &ReconstructedRecord, focal_id: &str) -> String {
    let indent = "  ".repeat(entry.depth as usize);
    let record = &entry.record;

    if let Some(reason) = record.tombstone {
        return format!(
            "{}{}",
            indent,
            style(format!("[{} {}]", reason.as_str(), record.id)).dim()
        );
    }

    let marker = if record.id == focal_id {
        style("●").cyan().to_string()
    } else {
        style("○").dim().to_string()
    };
    format!(
        "{}{} @{} {}",
        indent,
        marker,
        record.author_username,
        truncate(&record.text, 80)
    )
}

/// Repair your own threads whose parents are missing from the archive.
pub async fn cmd_repair_threads(settings: &Settings, config: &Config) -> anyhow::Result<()> {
    let archiver = open_archiver(settings, config)?;

    let report = match archiver.sync_incomplete_threads().await {
        Ok(r) => r,
        Err(e) => {
            report_failure(&e);
            return Err(e.into());
        }
    };

    if report.found == 0 {
        println!("{} No incomplete threads", style("✓").green());
        return Ok(());
    }

    println!(
        "{} Repaired {} threads ({} replies with missing parents)",
        style("✓").green(),
        report.reconstructed,
        report.found
    );
    if report.failed > 0 {
        println!(
            "{} {} threads could not be fetched",
            style("!").yellow(),
            report.failed
        );
    }
    Ok(())
}
