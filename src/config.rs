//! Configuration management for posthoard using the prefer crate.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::auth::Credentials;
use crate::transport::RetryPolicy;

/// Default database filename inside the data directory.
pub const DEFAULT_DATABASE_FILENAME: &str = "posthoard.db";
/// Identifier cache filename inside the config directory.
pub const QUERY_ID_CACHE_FILENAME: &str = "query-ids-cache.json";
/// Overrides the data directory from the environment.
pub const DATA_DIR_ENV: &str = "POSTHOARD_DATA_DIR";

/// Resolved runtime settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base data directory.
    pub data_dir: PathBuf,
    /// Database filename.
    pub database_filename: String,
    /// Where discovered operation identifiers are cached.
    pub query_id_cache: PathBuf,
    /// User agent override (`impersonate` picks a real browser string).
    pub user_agent: Option<String>,
    /// Request timeout in seconds.
    pub request_timeout: u64,
    /// Retry budget for rate-limit and network failures, each.
    pub max_retries: u32,
    /// Base of the exponential retry schedule, in milliseconds.
    pub base_delay_ms: u64,
    /// Concurrent bundle downloads during identifier discovery.
    pub bundle_concurrency: usize,
    /// Records per sync when no count is given.
    pub default_count: u64,
}

impl Default for Settings {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("posthoard");
        let query_id_cache = dirs::config_dir()
            .unwrap_or_else(|| data_dir.clone())
            .join("posthoard")
            .join(QUERY_ID_CACHE_FILENAME);

        Self {
            data_dir,
            database_filename: DEFAULT_DATABASE_FILENAME.to_string(),
            query_id_cache,
            user_agent: None,
            request_timeout: 30,
            max_retries: 5,
            base_delay_ms: 1000,
            bundle_concurrency: crate::query_ids::DEFAULT_BUNDLE_CONCURRENCY,
            default_count: 100,
        }
    }
}

impl Settings {
    /// Create settings with a custom data directory.
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            query_id_cache: data_dir.join(QUERY_ID_CACHE_FILENAME),
            data_dir,
            ..Default::default()
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_filename)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.base_delay_ms),
        }
    }
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize, prefer::FromValue)]
pub struct Config {
    /// Data directory path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,
    /// Database filename.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    /// Identifier cache file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_id_cache: Option<String>,
    /// User agent string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// Request timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_delay_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundle_concurrency: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_count: Option<u64>,
    /// Session cookie `auth_token`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    /// Session cookie `ct0` (CSRF token).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ct0: Option<String>,
    /// Account id (or the raw `twid` cookie).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    #[prefer(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration using prefer for file discovery.
    /// Searches standard locations for posthoard.json, posthoard.toml, etc.
    pub async fn load() -> Self {
        match prefer::load("posthoard").await {
            Ok(pref_config) => match pref_config.source_path() {
                Some(path) => Self::load_from_path(path).await.unwrap_or_else(|e| {
                    tracing::warn!("Ignoring config file {}: {}", path.display(), e);
                    Self::default()
                }),
                None => Self::default(),
            },
            Err(_) => Self::default(),
        }
    }

    /// Load configuration from a specific file path.
    /// Supports JSON, TOML and YAML based on file extension.
    pub async fn load_from_path(path: &Path) -> Result<Self, String> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| format!("Failed to read config file: {}", e))?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

        let mut config: Config = match ext {
            "toml" => toml::from_str(&contents)
                .map_err(|e| format!("Failed to parse TOML config: {}", e))?,
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .map_err(|e| format!("Failed to parse YAML config: {}", e))?,
            _ => serde_json::from_str(&contents)
                .map_err(|e| format!("Failed to parse JSON config: {}", e))?,
        };

        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Directory of the config file, used for relative paths.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    /// Resolve a path that may be relative to the config file.
    /// Expands `~` to the home directory.
    pub fn resolve_path(&self, path_str: &str, base_dir: &Path) -> PathBuf {
        let expanded = shellexpand::tilde(path_str);
        let path = Path::new(expanded.as_ref());

        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }

    /// Apply configuration to settings.
    pub fn apply_to_settings(&self, settings: &mut Settings, base_dir: &Path) {
        if let Some(ref data_dir) = self.data_dir {
            settings.data_dir = self.resolve_path(data_dir, base_dir);
        }
        if let Some(ref database) = self.database {
            settings.database_filename = database.clone();
        }
        if let Some(ref cache) = self.query_id_cache {
            settings.query_id_cache = self.resolve_path(cache, base_dir);
        }
        if let Some(ref user_agent) = self.user_agent {
            settings.user_agent = Some(user_agent.clone());
        }
        if let Some(timeout) = self.request_timeout {
            settings.request_timeout = timeout;
        }
        if let Some(retries) = self.max_retries {
            settings.max_retries = u32::try_from(retries).unwrap_or(u32::MAX);
        }
        if let Some(delay) = self.base_delay_ms {
            settings.base_delay_ms = delay;
        }
        if let Some(concurrency) = self.bundle_concurrency {
            settings.bundle_concurrency = usize::try_from(concurrency).unwrap_or(1).max(1);
        }
        if let Some(count) = self.default_count {
            settings.default_count = count;
        }
    }

    /// Credentials from the config file, if all three values are present.
    pub fn credentials(&self) -> Option<Credentials> {
        match (&self.auth_token, &self.ct0, &self.user_id) {
            (Some(token), Some(ct0), Some(user)) => {
                Some(Credentials::from_cookies(token, ct0, user))
            }
            _ => None,
        }
    }
}

/// Options for loading settings.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Explicit config file path (overrides auto-discovery).
    pub config_path: Option<PathBuf>,
}

/// Load config and resolve settings.
///
/// Precedence: defaults, then the config file, then `POSTHOARD_DATA_DIR`.
pub async fn load_settings(options: &LoadOptions) -> Result<(Settings, Config), String> {
    let config = match &options.config_path {
        Some(path) => Config::load_from_path(path).await?,
        None => Config::load().await,
    };

    let mut settings = Settings::default();
    let base_dir = config
        .base_dir()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
    config.apply_to_settings(&mut settings, &base_dir);

    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        if !dir.trim().is_empty() {
            settings.data_dir = config.resolve_path(&dir, &base_dir);
        }
    }

    Ok((settings, config))
}
