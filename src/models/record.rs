//! Archived post records and tombstones.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Author id and username used for tombstones.
pub const UNKNOWN_AUTHOR: &str = "unknown";

/// Why a record has no content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TombstoneReason {
    Deleted,
    Suspended,
    Unavailable,
}

impl TombstoneReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deleted => "deleted",
            Self::Suspended => "suspended",
            Self::Unavailable => "unavailable",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "deleted" => Some(Self::Deleted),
            "suspended" => Some(Self::Suspended),
            "unavailable" => Some(Self::Unavailable),
            _ => None,
        }
    }

    /// Guess the reason from the upstream tombstone notice.
    pub fn from_notice(text: &str) -> Self {
        let text = text.to_lowercase();
        if text.contains("suspended") {
            Self::Suspended
        } else if text.contains("deleted") {
            Self::Deleted
        } else {
            Self::Unavailable
        }
    }
}

/// A single archived post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub text: String,
    pub author_id: String,
    pub author_username: String,
    pub author_display_name: Option<String>,
    pub author_avatar_url: Option<String>,
    /// Creation time on the platform. Tombstones carry the epoch.
    pub created_at: DateTime<Utc>,
    pub conversation_id: Option<String>,
    pub in_reply_to_id: Option<String>,
    pub in_reply_to_user_id: Option<String>,
    pub quoted_id: Option<String>,
    /// Id of the reposted record when this is a repost.
    pub reposted_id: Option<String>,
    pub is_repost: bool,
    pub reply_count: i64,
    pub repost_count: i64,
    pub like_count: i64,
    pub quote_count: i64,
    /// Set when the record is a placeholder for missing content.
    pub tombstone: Option<TombstoneReason>,
    /// Raw upstream payload from the latest fetch.
    pub raw: Option<serde_json::Value>,
    pub first_seen_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
}

impl Record {
    /// Create a record with empty counters, seen now.
    pub fn new(
        id: impl Into<String>,
        author_id: impl Into<String>,
        author_username: impl Into<String>,
        text: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            text: text.into(),
            author_id: author_id.into(),
            author_username: author_username.into(),
            author_display_name: None,
            author_avatar_url: None,
            created_at,
            conversation_id: None,
            in_reply_to_id: None,
            in_reply_to_user_id: None,
            quoted_id: None,
            reposted_id: None,
            is_repost: false,
            reply_count: 0,
            repost_count: 0,
            like_count: 0,
            quote_count: 0,
            tombstone: None,
            raw: None,
            first_seen_at: now,
            last_updated_at: now,
        }
    }

    /// Create a placeholder for a record that could not be fetched.
    pub fn tombstone(
        id: impl Into<String>,
        conversation_id: Option<String>,
        reason: TombstoneReason,
    ) -> Self {
        let mut record = Self::new(
            id,
            UNKNOWN_AUTHOR,
            UNKNOWN_AUTHOR,
            String::new(),
            placeholder_timestamp(),
        );
        record.conversation_id = conversation_id;
        record.tombstone = Some(reason);
        record
    }

    pub fn is_tombstone(&self) -> bool {
        self.tombstone.is_some()
    }

    /// A reply to another record (reposts of replies are not replies).
    pub fn is_reply(&self) -> bool {
        !self.is_repost && self.in_reply_to_id.as_deref().is_some_and(|id| !id.is_empty())
    }

    /// Combined engagement used to rank conversation replies.
    pub fn engagement(&self) -> i64 {
        self.like_count + self.repost_count
    }
}

/// Timestamp given to tombstones, which have no creation time.
pub fn placeholder_timestamp() -> DateTime<Utc> {
    DateTime::UNIX_EPOCH
}
