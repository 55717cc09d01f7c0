//! Durable pagination state per collection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of a collection walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Resume state for one collection kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Collection kind key (see `CollectionKind::checkpoint_key`).
    pub kind: String,
    pub cursor: Option<String>,
    /// Last record persisted, in server order. Timelines are newest first,
    /// so this is the oldest record of the last page, not the newest.
    pub last_record_id: Option<String>,
    pub total_synced: u64,
    pub status: SyncStatus,
    pub started_at: Option<DateTime<Utc>>,
    /// When a walk of this kind last completed. Kept while later walks are
    /// in progress or failed.
    pub completed_at: Option<DateTime<Utc>>,
}

impl Checkpoint {
    pub fn pending(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            cursor: None,
            last_record_id: None,
            total_synced: 0,
            status: SyncStatus::Pending,
            started_at: None,
            completed_at: None,
        }
    }

    /// Whether a walk left off mid-collection and can continue from its cursor.
    pub fn is_resumable(&self) -> bool {
        matches!(self.status, SyncStatus::InProgress | SyncStatus::Failed)
            && self.cursor.as_deref().is_some_and(|c| !c.is_empty())
    }
}
