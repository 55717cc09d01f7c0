//! Operation identifier commands.

use console::style;

use crate::cli::helpers::open_archiver;
use crate::config::{Config, Settings};
use crate::query_ids::QueryIdSource;

pub async fn cmd_refresh(settings: &Settings, config: &Config) -> anyhow::Result<()> {
    let archiver = open_archiver(settings, config)?;

    println!("{} Scanning web client bundles", style("↻").cyan());
    let found = archiver.refresh_query_ids().await;

    if found == 0 {
        println!(
            "{} No identifiers discovered; built-in values stay in use",
            style("!").yellow()
        );
    } else {
        println!(
            "{} Discovered {} identifiers ({})",
            style("✓").green(),
            found,
            settings.query_id_cache.display()
        );
    }
    Ok(())
}

pub async fn cmd_show(settings: &Settings, config: &Config) -> anyhow::Result<()> {
    let archiver = open_archiver(settings, config)?;
    let status = archiver.query_id_status();

    println!("{:<28} {:<26} {}", "Operation", "Identifier", "Source");
    println!("{}", "-".repeat(66));
    for entry in status {
        let source = match entry.source {
            QueryIdSource::FreshCache => style(entry.source.as_str()).green(),
            QueryIdSource::StaleCache => style(entry.source.as_str()).yellow(),
            QueryIdSource::Fallback => style(entry.source.as_str()).dim(),
        };
        println!("{:<28} {:<26} {}", entry.operation, entry.id, source);
    }
    Ok(())
}
