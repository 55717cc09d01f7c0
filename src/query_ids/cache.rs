//! Persisted operation identifier cache.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// One cached identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryIdCacheEntry {
    pub id: String,
    pub fetched_at: DateTime<Utc>,
}

impl QueryIdCacheEntry {
    pub fn is_fresh(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        match chrono::Duration::from_std(ttl) {
            Ok(ttl) => now.signed_duration_since(self.fetched_at) < ttl,
            Err(_) => true,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheFile {
    #[serde(default)]
    entries: BTreeMap<String, QueryIdCacheEntry>,
}

/// Operation name to identifier map, optionally backed by a JSON file.
#[derive(Debug, Default)]
pub struct QueryIdCache {
    path: Option<PathBuf>,
    entries: BTreeMap<String, QueryIdCacheEntry>,
}

impl QueryIdCache {
    /// A cache that is never written to disk.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load the cache file. A missing or corrupt file yields an empty cache.
    pub fn load(path: &Path) -> Self {
        let entries = match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<CacheFile>(&contents) {
                Ok(file) => file.entries,
                Err(e) => {
                    warn!("Ignoring unreadable query id cache {}: {}", path.display(), e);
                    BTreeMap::new()
                }
            },
            Err(_) => BTreeMap::new(),
        };
        debug!("Loaded {} cached query ids", entries.len());
        Self {
            path: Some(path.to_path_buf()),
            entries,
        }
    }

    pub fn get(&self, operation: &str) -> Option<&QueryIdCacheEntry> {
        self.entries.get(operation)
    }

    /// Identifier for an operation if it was fetched within `ttl`.
    pub fn fresh(&self, operation: &str, ttl: Duration) -> Option<&str> {
        let now = Utc::now();
        self.entries
            .get(operation)
            .filter(|e| e.is_fresh(ttl, now))
            .map(|e| e.id.as_str())
    }

    pub fn entries(&self) -> impl Iterator<Item = (&String, &QueryIdCacheEntry)> {
        self.entries.iter()
    }

    pub fn insert(&mut self, operation: &str, entry: QueryIdCacheEntry) {
        self.entries.insert(operation.to_string(), entry);
    }

    /// Merge discovered identifiers, stamping them with `fetched_at`.
    pub fn merge<'a>(
        &mut self,
        discovered: impl IntoIterator<Item = (&'a String, &'a String)>,
        fetched_at: DateTime<Utc>,
    ) {
        for (operation, id) in discovered {
            self.insert(
                operation,
                QueryIdCacheEntry {
                    id: id.clone(),
                    fetched_at,
                },
            );
        }
    }

    /// Write the cache to disk. Errors are logged, not returned.
    pub fn persist(&self) {
        let Some(path) = &self.path else {
            return;
        };
        let file = CacheFile {
            entries: self.entries.clone(),
        };
        let result = serde_json::to_string_pretty(&file)
            .map_err(std::io::Error::other)
            .and_then(|json| {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(path, json)
            });
        if let Err(e) = result {
            warn!("Failed to write query id cache {}: {}", path.display(), e);
        }
    }
}
