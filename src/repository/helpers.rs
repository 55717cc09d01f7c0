//! Row parsing helpers for the archive repository.

use super::{parse_datetime, parse_datetime_opt, RepositoryError};
use crate::models::{
    Checkpoint, CollectionKind, CollectionMembership, Record, SyncStatus, ThreadMode,
    ThreadRecord, TombstoneReason,
};

pub const RECORD_COLUMNS: &str = "id, text, author_id, author_username, author_display_name, \
    author_avatar_url, created_at, conversation_id, in_reply_to_id, in_reply_to_user_id, \
    quoted_id, reposted_id, is_repost, reply_count, repost_count, like_count, quote_count, \
    tombstone_reason, raw_json, first_seen_at, last_updated_at";

/// Parse a database row into a Record.
pub fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<Record> {
    let raw: Option<String> = row.get("raw_json")?;
    Ok(Record {
        id: row.get("id")?,
        text: row.get("text")?,
        author_id: row.get("author_id")?,
        author_username: row.get("author_username")?,
        author_display_name: row.get("author_display_name")?,
        author_avatar_url: row.get("author_avatar_url")?,
        created_at: parse_datetime(&row.get::<_, String>("created_at")?),
        conversation_id: row.get("conversation_id")?,
        in_reply_to_id: row.get("in_reply_to_id")?,
        in_reply_to_user_id: row.get("in_reply_to_user_id")?,
        quoted_id: row.get("quoted_id")?,
        reposted_id: row.get("reposted_id")?,
        is_repost: row.get::<_, i32>("is_repost")? != 0,
        reply_count: row.get("reply_count")?,
        repost_count: row.get("repost_count")?,
        like_count: row.get("like_count")?,
        quote_count: row.get("quote_count")?,
        tombstone: row
            .get::<_, Option<String>>("tombstone_reason")?
            .and_then(|s| TombstoneReason::from_str(&s)),
        raw: raw.and_then(|s| serde_json::from_str(&s).ok()),
        first_seen_at: parse_datetime(&row.get::<_, String>("first_seen_at")?),
        last_updated_at: parse_datetime(&row.get::<_, String>("last_updated_at")?),
    })
}

/// Parse a database row into a CollectionMembership.
pub fn row_to_membership(row: &rusqlite::Row) -> rusqlite::Result<CollectionMembership> {
    let kind: String = row.get("kind")?;
    let kind = CollectionKind::from_str(&kind).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            1,
            rusqlite::types::Type::Text,
            format!("unknown collection kind: {}", kind).into(),
        )
    })?;

    Ok(CollectionMembership {
        record_id: row.get("record_id")?,
        kind,
        folder_id: row.get("folder_id")?,
        folder_name: row.get("folder_name")?,
        added_at: parse_datetime(&row.get::<_, String>("added_at")?),
        synced_at: parse_datetime(&row.get::<_, String>("synced_at")?),
        sort_index: row.get("sort_index")?,
    })
}

/// Raw checkpoint columns, validated separately so corruption is reportable.
pub struct CheckpointRow {
    pub kind: String,
    pub cursor: Option<String>,
    pub last_record_id: Option<String>,
    pub total_synced: i64,
    pub status: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
}

pub fn row_to_checkpoint_row(row: &rusqlite::Row) -> rusqlite::Result<CheckpointRow> {
    Ok(CheckpointRow {
        kind: row.get("kind")?,
        cursor: row.get("cursor")?,
        last_record_id: row.get("last_record_id")?,
        total_synced: row.get("total_synced")?,
        status: row.get("status")?,
        started_at: row.get("started_at")?,
        completed_at: row.get("completed_at")?,
    })
}

impl TryFrom<CheckpointRow> for Checkpoint {
    type Error = RepositoryError;

    fn try_from(row: CheckpointRow) -> Result<Self, Self::Error> {
        let unreadable = |reason: String| RepositoryError::CheckpointUnreadable {
            kind: row.kind.clone(),
            reason,
        };

        let status = SyncStatus::from_str(&row.status)
            .ok_or_else(|| unreadable(format!("unknown status '{}'", row.status)))?;
        let total_synced = u64::try_from(row.total_synced)
            .map_err(|_| unreadable(format!("negative total {}", row.total_synced)))?;

        Ok(Checkpoint {
            kind: row.kind.clone(),
            cursor: row.cursor.filter(|c| !c.is_empty()),
            last_record_id: row.last_record_id,
            total_synced,
            status,
            started_at: parse_datetime_opt(row.started_at),
            completed_at: parse_datetime_opt(row.completed_at),
        })
    }
}

/// Parse a database row into a ThreadRecord.
pub fn row_to_thread_record(row: &rusqlite::Row) -> rusqlite::Result<ThreadRecord> {
    Ok(ThreadRecord {
        id: row.get("id")?,
        conversation_id: row.get("conversation_id")?,
        root_record_id: row.get("root_record_id")?,
        focal_record_id: row.get("focal_record_id")?,
        author_id: row.get("author_id")?,
        mode: ThreadMode::from_str(&row.get::<_, String>("mode")?)
            .unwrap_or(ThreadMode::Thread),
        record_count: row.get::<_, i64>("record_count")? as u32,
        is_complete: row.get::<_, i32>("is_complete")? != 0,
        fetched_at: parse_datetime(&row.get::<_, String>("fetched_at")?),
    })
}
