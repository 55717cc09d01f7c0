//! Collection kinds and membership rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A user collection that can be synced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionKind {
    Likes,
    Bookmarks,
    Authored,
    Reposts,
    Replies,
    Feed,
}

impl CollectionKind {
    pub const ALL: [CollectionKind; 6] = [
        Self::Likes,
        Self::Bookmarks,
        Self::Authored,
        Self::Reposts,
        Self::Replies,
        Self::Feed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Likes => "likes",
            Self::Bookmarks => "bookmarks",
            Self::Authored => "authored",
            Self::Reposts => "reposts",
            Self::Replies => "replies",
            Self::Feed => "feed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "likes" => Some(Self::Likes),
            "bookmarks" => Some(Self::Bookmarks),
            "authored" => Some(Self::Authored),
            "reposts" => Some(Self::Reposts),
            "replies" => Some(Self::Replies),
            "feed" => Some(Self::Feed),
            _ => None,
        }
    }

    /// Checkpoint key for this kind, scoped to a bookmark folder if given.
    pub fn checkpoint_key(&self, folder: Option<&BookmarkFolder>) -> String {
        match folder {
            Some(folder) => format!("{}:{}", self.as_str(), folder.id),
            None => self.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named bookmark folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookmarkFolder {
    pub id: String,
    pub name: Option<String>,
}

/// Links a record to a collection kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionMembership {
    pub record_id: String,
    pub kind: CollectionKind,
    pub folder_id: Option<String>,
    pub folder_name: Option<String>,
    pub added_at: DateTime<Utc>,
    pub synced_at: DateTime<Utc>,
    /// Position in server order, increasing per kind across runs.
    pub sort_index: i64,
}

impl CollectionMembership {
    pub fn new(record_id: impl Into<String>, kind: CollectionKind, sort_index: i64) -> Self {
        let now = Utc::now();
        Self {
            record_id: record_id.into(),
            kind,
            folder_id: None,
            folder_name: None,
            added_at: now,
            synced_at: now,
            sort_index,
        }
    }

    pub fn with_folder(mut self, folder: Option<&BookmarkFolder>) -> Self {
        if let Some(folder) = folder {
            self.folder_id = Some(folder.id.clone());
            self.folder_name = folder.name.clone();
        }
        self
    }
}
