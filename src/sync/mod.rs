//! Incremental, resumable pagination of one collection kind.
//!
//! Each page is fully upserted before the checkpoint moves past it, so an
//! interrupted walk re-fetches at most one page on the next run.

mod error;

pub use error::SyncError;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::api::{
    classify_result, extract_quoted, extract_record, parse_timeline, timeline_request, PostResult,
};
use crate::models::{
    BookmarkFolder, Checkpoint, CollectionKind, CollectionMembership, Record, SyncStatus,
    ThreadMode,
};
use crate::repository::{ArchiveStore, CheckpointStore, RepositoryError};
use crate::transport::RateLimitedTransport;

/// Options for one sync run.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Maximum records to process; `None` walks the whole collection.
    pub limit: Option<u64>,
    /// Clear the checkpoint and disable the incremental short-circuit.
    pub full_resync: bool,
    /// Bookmark folder to walk instead of the main bookmarks timeline.
    pub folder: Option<BookmarkFolder>,
    /// Stop at the first record created before this instant.
    pub since: Option<DateTime<Utc>>,
    /// Reconstruct the thread of every synced record afterwards.
    pub expand_threads: bool,
    pub thread_mode: ThreadMode,
    /// Keep the raw upstream payload on stored records.
    pub store_raw: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            limit: None,
            full_resync: false,
            folder: None,
            since: None,
            expand_threads: false,
            thread_mode: ThreadMode::Thread,
            store_raw: true,
        }
    }
}

/// Why a walk ended cleanly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Upstream returned no further cursor.
    EndOfCollection,
    /// Upstream returned the cursor that was just requested.
    RepeatedCursor,
    /// A page came back without items.
    EmptyPage,
    LimitReached,
    /// Reached a record already archived by an earlier completed walk.
    CaughtUp,
    /// Reached a record older than the `since` bound.
    OlderThanSince,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EndOfCollection => "end of collection",
            Self::RepeatedCursor => "repeated cursor",
            Self::EmptyPage => "empty page",
            Self::LimitReached => "limit reached",
            Self::CaughtUp => "caught up",
            Self::OlderThanSince => "older than window",
        }
    }
}

/// Result of a completed walk.
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    pub checkpoint: Checkpoint,
    pub stop: StopReason,
    /// Records persisted by this run.
    pub synced: u64,
    /// Memberships created by this run (records new to the collection).
    pub added: u64,
    pub pages: u32,
    /// Ids persisted by this run, in server order.
    pub record_ids: Vec<String>,
}

/// Whether a record belongs in a collection kind's view of its timeline.
pub fn kind_accepts(kind: CollectionKind, record: &Record) -> bool {
    match kind {
        CollectionKind::Authored => !record.is_repost,
        CollectionKind::Reposts => record.is_repost,
        CollectionKind::Replies => record.is_reply(),
        CollectionKind::Likes | CollectionKind::Bookmarks | CollectionKind::Feed => true,
    }
}

/// Drives pagination for collection kinds.
pub struct CollectionSyncer {
    transport: Arc<RateLimitedTransport>,
    store: Arc<dyn ArchiveStore>,
    checkpoints: Arc<dyn CheckpointStore>,
}

/// Per-page outcome of [`CollectionSyncer::persist_page`].
struct PageResult {
    persisted: u64,
    added: u64,
    last_id: Option<String>,
    stop: Option<StopReason>,
}

impl CollectionSyncer {
    pub fn new(
        transport: Arc<RateLimitedTransport>,
        store: Arc<dyn ArchiveStore>,
        checkpoints: Arc<dyn CheckpointStore>,
    ) -> Self {
        Self {
            transport,
            store,
            checkpoints,
        }
    }

    /// Load a checkpoint, treating an unreadable one as absent.
    fn load_checkpoint(&self, key: &str) -> Result<Option<Checkpoint>, SyncError> {
        match self.checkpoints.load(key) {
            Ok(checkpoint) => Ok(checkpoint),
            Err(RepositoryError::CheckpointUnreadable { kind, reason }) => {
                warn!(
                    "Checkpoint for {} is unreadable ({}), starting from scratch",
                    kind, reason
                );
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Walk one collection kind until a stop condition or a fatal error.
    pub async fn sync(
        &self,
        kind: CollectionKind,
        options: &SyncOptions,
    ) -> Result<SyncOutcome, SyncError> {
        let folder = options.folder.as_ref();
        let key = kind.checkpoint_key(folder);

        let loaded = self.load_checkpoint(&key)?;
        // Survives failed head attempts so a later run can still stop early.
        let last_completed = loaded.as_ref().and_then(|c| c.completed_at);

        let prior = if options.full_resync {
            info!("Full resync of {} requested, clearing checkpoint", key);
            self.checkpoints.clear(&key)?;
            None
        } else {
            loaded
        };

        let resuming = prior.as_ref().is_some_and(Checkpoint::is_resumable);
        let short_circuit = !options.full_resync && !resuming && last_completed.is_some();

        let mut checkpoint = match prior {
            Some(mut checkpoint) if resuming => {
                info!(
                    "Resuming {} at cursor after {} records",
                    key, checkpoint.total_synced
                );
                checkpoint.status = SyncStatus::InProgress;
                checkpoint
            }
            _ => Checkpoint {
                status: SyncStatus::InProgress,
                started_at: Some(Utc::now()),
                completed_at: last_completed,
                ..Checkpoint::pending(key.as_str())
            },
        };
        self.checkpoints.save(&checkpoint)?;

        let user_id = match self.transport.auth().credentials().await {
            Ok(credentials) => credentials.user_id,
            Err(e) => return Err(self.interrupt(checkpoint, 0, SyncError::Api(e.into()))),
        };

        let mut cursor = checkpoint.cursor.clone();
        let mut synced = 0u64;
        let mut added = 0u64;
        let mut pages = 0u32;
        let mut record_ids = Vec::new();

        let stop = loop {
            let request = timeline_request(kind, &user_id, cursor.as_deref(), folder);
            let response = match self.transport.execute(&request).await {
                Ok(response) => response,
                Err(e) => return Err(self.interrupt(checkpoint, synced, e.into())),
            };
            pages += 1;

            let page = parse_timeline(&response.body, request.operation);
            if page.items.is_empty() {
                debug!("{}: empty page, stopping", key);
                break StopReason::EmptyPage;
            }

            let remaining = options.limit.map(|limit| limit.saturating_sub(synced));
            let result = match self.persist_page(
                kind,
                &page.items,
                options,
                short_circuit,
                remaining,
                &mut record_ids,
            ) {
                Ok(result) => result,
                Err(e) => return Err(self.interrupt(checkpoint, synced, e)),
            };

            synced += result.persisted;
            added += result.added;
            checkpoint.total_synced += result.persisted;
            if result.last_id.is_some() {
                checkpoint.last_record_id = result.last_id;
            }

            if let Some(stop) = result.stop {
                // Stopped inside this page: keep its request cursor.
                break stop;
            }
            if options.limit.is_some_and(|limit| synced >= limit) {
                break StopReason::LimitReached;
            }

            match page.cursor {
                None => {
                    checkpoint.cursor = None;
                    break StopReason::EndOfCollection;
                }
                Some(next) if cursor.as_deref() == Some(next.as_str()) => {
                    debug!("{}: upstream repeated cursor, stopping", key);
                    break StopReason::RepeatedCursor;
                }
                Some(next) => {
                    checkpoint.cursor = Some(next.clone());
                    if let Err(e) = self.checkpoints.save(&checkpoint) {
                        return Err(self.interrupt(checkpoint, synced, e.into()));
                    }
                    debug!(
                        "{}: page {} persisted ({} records so far)",
                        key, pages, checkpoint.total_synced
                    );
                    cursor = Some(next);
                }
            }
        };

        checkpoint.status = SyncStatus::Completed;
        checkpoint.completed_at = Some(Utc::now());
        self.checkpoints.save(&checkpoint)?;

        info!(
            "Synced {}: {} records ({} new) over {} pages, stopped: {}",
            key,
            synced,
            added,
            pages,
            stop.as_str()
        );

        Ok(SyncOutcome {
            checkpoint,
            stop,
            synced,
            added,
            pages,
            record_ids,
        })
    }

    /// Upsert one page in server order. Returns early on a stop condition.
    fn persist_page(
        &self,
        kind: CollectionKind,
        items: &[Value],
        options: &SyncOptions,
        short_circuit: bool,
        remaining: Option<u64>,
        record_ids: &mut Vec<String>,
    ) -> Result<PageResult, SyncError> {
        let mut result = PageResult {
            persisted: 0,
            added: 0,
            last_id: None,
            stop: None,
        };

        for item in items {
            if remaining.is_some_and(|r| result.persisted >= r) {
                result.stop = Some(StopReason::LimitReached);
                break;
            }

            let post = match classify_result(item) {
                Some(PostResult::Post(post)) => post,
                Some(PostResult::Tombstone(reason)) => {
                    debug!("Skipping {} entry in {}", reason.as_str(), kind);
                    continue;
                }
                None => continue,
            };
            let Some(mut record) = extract_record(&post) else {
                debug!("Skipping unparseable entry in {}", kind);
                continue;
            };
            if !kind_accepts(kind, &record) {
                continue;
            }
            if let Some(since) = options.since {
                if record.created_at < since {
                    result.stop = Some(StopReason::OlderThanSince);
                    break;
                }
            }

            let known = self.store.collection_contains(kind, &record.id)?;
            if known && short_circuit {
                info!("{}: reached known record {}, caught up", kind, record.id);
                result.stop = Some(StopReason::CaughtUp);
                break;
            }

            if let Some(mut quoted) = extract_quoted(&post) {
                if !options.store_raw {
                    quoted.raw = None;
                }
                self.store.upsert_record(&quoted)?;
            }
            if !options.store_raw {
                record.raw = None;
            }
            self.store.upsert_record(&record)?;

            // An existing membership keeps its sort index on upsert.
            let sort_index = if known {
                0
            } else {
                self.store.next_sort_index(kind)?
            };
            let membership = CollectionMembership::new(record.id.as_str(), kind, sort_index)
                .with_folder(options.folder.as_ref());
            self.store.upsert_membership(&membership)?;

            if !known {
                result.added += 1;
            }
            result.persisted += 1;
            result.last_id = Some(record.id.clone());
            record_ids.push(record.id);
        }

        Ok(result)
    }

    /// Mark the walk failed at its last persisted page and wrap the error.
    fn interrupt(&self, mut checkpoint: Checkpoint, synced: u64, err: SyncError) -> SyncError {
        checkpoint.status = SyncStatus::Failed;
        if let Err(e) = self.checkpoints.save(&checkpoint) {
            warn!("Could not mark {} as failed: {}", checkpoint.kind, e);
        }
        warn!("Sync of {} failed: {}", checkpoint.kind, err);
        SyncError::Interrupted {
            kind: checkpoint.kind,
            synced,
            cursor: checkpoint.cursor,
            source: Box::new(err),
        }
    }
}
