//! Shared helper functions for CLI commands.

use std::sync::Arc;

use console::style;

use crate::auth::{AuthProvider, EnvCredentials, StaticCredentials};
use crate::config::{Config, Settings};
use crate::engine::Archiver;
use crate::sync::SyncError;

/// Open the archive with credentials from the config file, falling back to
/// the environment.
pub fn open_archiver(settings: &Settings, config: &Config) -> anyhow::Result<Archiver> {
    let auth: Arc<dyn AuthProvider> = match config.credentials() {
        Some(credentials) => Arc::new(StaticCredentials::new(credentials)),
        None => Arc::new(EnvCredentials),
    };
    Ok(Archiver::from_settings(settings, auth)?)
}

/// Print a sync or reconstruction failure and whether state was kept.
pub fn report_failure(err: &SyncError) {
    println!("{} {}", style("✗").red(), err);
    if err.resumable() {
        println!(
            "  {} Progress saved; run the same command again to resume",
            style("→").dim()
        );
    } else if err.is_fatal() {
        println!(
            "  {} Check your session cookies before retrying",
            style("→").dim()
        );
    }
}

/// Truncate text to fit one line.
pub fn truncate(s: &str, max_chars: usize) -> String {
    let line = s.lines().next().unwrap_or("");
    if line.chars().count() <= max_chars {
        line.to_string()
    } else {
        let cut: String = line.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}
