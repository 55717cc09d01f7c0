//! Repository layer for SQLite persistence.
//!
//! The sync and reconstruction loops depend on the narrow [`ArchiveStore`] and
//! [`CheckpointStore`] contracts; [`SqliteArchive`] implements both.

mod archive;
mod checkpoint;
mod helpers;

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::Connection;

use crate::models::{
    Checkpoint, CollectionKind, CollectionMembership, Record, ThreadRecord,
};

pub use archive::{ArchiveStats, IncompleteThread, SqliteArchive, ThreadEdge};

/// Errors from the persistence layer.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("checkpoint for {kind} is unreadable: {reason}")]
    CheckpointUnreadable { kind: String, reason: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RepositoryError>;

/// Record and collection persistence used by the sync engine.
///
/// Every method is individually atomic. Callers never rely on transactions
/// spanning several calls.
pub trait ArchiveStore: Send + Sync {
    /// Insert or refresh a record. A tombstone never replaces real content.
    fn upsert_record(&self, record: &Record) -> Result<()>;

    /// Insert a membership, or refresh `synced_at` if it already exists.
    fn upsert_membership(&self, membership: &CollectionMembership) -> Result<()>;

    fn record_exists(&self, id: &str) -> Result<bool>;

    /// Whether a record is already a member of the given collection.
    fn collection_contains(&self, kind: CollectionKind, record_id: &str) -> Result<bool>;

    /// Persist a reconstruction summary.
    fn upsert_thread_record(&self, thread: &ThreadRecord) -> Result<()>;

    /// Persist parent edges of a reconstructed tree.
    fn save_thread_edges(&self, edges: &[ThreadEdge]) -> Result<()>;

    /// Allocate the next sort index for a kind. Values are never reused.
    fn next_sort_index(&self, kind: CollectionKind) -> Result<i64>;
}

/// Durable pagination position per collection kind.
///
/// A checkpoint is only saved after the page it describes has been upserted.
pub trait CheckpointStore: Send + Sync {
    /// Load the checkpoint for a kind. Corrupt rows surface as
    /// [`RepositoryError::CheckpointUnreadable`].
    fn load(&self, kind: &str) -> Result<Option<Checkpoint>>;

    fn save(&self, checkpoint: &Checkpoint) -> Result<()>;

    /// Reset a kind to `pending` with no cursor.
    fn clear(&self, kind: &str) -> Result<()>;
}

/// Open a database connection with proper concurrency settings.
pub(crate) fn connect(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        PRAGMA busy_timeout = 30000;
    "#,
    )?;
    Ok(conn)
}

/// Parse a datetime string from the database, defaulting to Unix epoch on error.
pub fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::UNIX_EPOCH)
}

/// Parse an optional datetime string from the database.
pub fn parse_datetime_opt(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
    })
}
