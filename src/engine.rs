//! The archiver facade: everything the command line needs in one place.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{info, warn};

use crate::auth::AuthProvider;
use crate::config::Settings;
use crate::http_client::{FetchError, HttpClient, HttpFetch};
use crate::models::{CollectionKind, ThreadMode};
use crate::query_ids::{BundleScraper, QueryIdCache, QueryIdResolver, QueryIdStatus};
use crate::rate_limit::RateLimitConfig;
use crate::repository::{ArchiveStats, RepositoryError, SqliteArchive};
use crate::sync::{CollectionSyncer, SyncError, SyncOptions, SyncOutcome};
use crate::thread::{ConversationReconstructor, Reconstruction};
use crate::transport::RateLimitedTransport;

/// Failures while wiring up an [`Archiver`].
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("failed to create HTTP client: {0}")]
    Http(#[from] FetchError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Thread reconstructions run after a sync.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThreadExpansion {
    pub reconstructed: u32,
    pub failed: u32,
}

#[derive(Debug, Clone)]
pub struct SyncReport {
    pub outcome: SyncOutcome,
    pub threads: ThreadExpansion,
}

/// Result of repairing self-reply chains with missing parents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepairReport {
    pub found: usize,
    pub reconstructed: u32,
    pub failed: u32,
}

/// Sync and reconstruction over one archive.
pub struct Archiver {
    archive: Arc<SqliteArchive>,
    transport: Arc<RateLimitedTransport>,
    syncer: CollectionSyncer,
    reconstructor: ConversationReconstructor,
}

impl Archiver {
    pub fn new(archive: Arc<SqliteArchive>, transport: Arc<RateLimitedTransport>) -> Self {
        let syncer = CollectionSyncer::new(transport.clone(), archive.clone(), archive.clone());
        let reconstructor = ConversationReconstructor::new(transport.clone(), archive.clone());
        Self {
            archive,
            transport,
            syncer,
            reconstructor,
        }
    }

    /// Build the full stack from resolved settings.
    pub fn from_settings(
        settings: &Settings,
        auth: Arc<dyn AuthProvider>,
    ) -> Result<Self, SetupError> {
        let http: Arc<dyn HttpFetch> = Arc::new(HttpClient::new(
            settings.request_timeout(),
            settings.user_agent.as_deref(),
        )?);

        let scraper =
            BundleScraper::new(http.clone()).with_concurrency(settings.bundle_concurrency);
        let cache = QueryIdCache::load(&settings.query_id_cache);
        let resolver = Arc::new(QueryIdResolver::new(cache, Arc::new(scraper)));

        let transport = Arc::new(
            RateLimitedTransport::new(http, auth, resolver)
                .with_policy(settings.retry_policy()),
        );
        let archive = Arc::new(SqliteArchive::new(&settings.database_path())?);

        Ok(Self::new(archive, transport))
    }

    /// Replace the pacing used by reconstructions.
    pub fn with_limiter_config(mut self, config: RateLimitConfig) -> Self {
        self.reconstructor =
            ConversationReconstructor::new(self.transport.clone(), self.archive.clone())
                .with_limiter_config(config);
        self
    }

    pub fn archive(&self) -> &SqliteArchive {
        &self.archive
    }

    /// Sync one collection, then optionally reconstruct each synced record's
    /// thread.
    pub async fn sync_collection(
        &self,
        kind: CollectionKind,
        options: &SyncOptions,
    ) -> Result<SyncReport, SyncError> {
        let outcome = self.syncer.sync(kind, options).await?;

        let mut threads = ThreadExpansion::default();
        if options.expand_threads {
            for id in &outcome.record_ids {
                match self
                    .reconstructor
                    .reconstruct(id, options.thread_mode, None)
                    .await
                {
                    Ok(_) => threads.reconstructed += 1,
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => {
                        warn!("Could not reconstruct thread for {}: {}", id, e);
                        threads.failed += 1;
                    }
                }
            }
            info!(
                "Expanded {} threads ({} failed)",
                threads.reconstructed, threads.failed
            );
        }

        Ok(SyncReport { outcome, threads })
    }

    pub async fn reconstruct(
        &self,
        focal_id: &str,
        mode: ThreadMode,
        limit: Option<usize>,
    ) -> Result<Reconstruction, SyncError> {
        self.reconstructor.reconstruct(focal_id, mode, limit).await
    }

    /// Force identifier rediscovery. Returns the number of operations found.
    pub async fn refresh_query_ids(&self) -> usize {
        self.transport.resolver().refresh().await
    }

    /// Reconstruct the account's own threads whose stored replies point at
    /// parents missing from the archive.
    pub async fn sync_incomplete_threads(&self) -> Result<RepairReport, SyncError> {
        let user_id = self
            .transport
            .auth()
            .credentials()
            .await
            .map_err(|e| SyncError::Api(e.into()))?
            .user_id;

        let incomplete = self.archive.find_incomplete_threads(&user_id)?;
        let mut report = RepairReport {
            found: incomplete.len(),
            ..Default::default()
        };

        let mut seen_conversations = HashSet::new();
        for thread in incomplete {
            let conversation = thread
                .conversation_id
                .clone()
                .unwrap_or_else(|| thread.record_id.clone());
            if !seen_conversations.insert(conversation) {
                continue;
            }

            match self
                .reconstructor
                .reconstruct(&thread.record_id, ThreadMode::Thread, None)
                .await
            {
                Ok(_) => report.reconstructed += 1,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(
                        "Could not repair thread at {} (missing {}): {}",
                        thread.record_id, thread.missing_parent_id, e
                    );
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    pub fn stats(&self) -> Result<ArchiveStats, RepositoryError> {
        self.archive.stats()
    }

    pub fn query_id_status(&self) -> Vec<QueryIdStatus> {
        self.transport.resolver().status()
    }
}
