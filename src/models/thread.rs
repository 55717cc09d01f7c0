//! Reconstructed reply trees.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Record;

/// Which records belong to a reconstruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadMode {
    /// Same-author self-reply chain.
    Thread,
    /// Every record in the conversation.
    Conversation,
}

impl ThreadMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Thread => "thread",
            Self::Conversation => "conversation",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "thread" => Some(Self::Thread),
            "conversation" => Some(Self::Conversation),
            _ => None,
        }
    }
}

/// Summary of one reconstruction run. Never updated after it is written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadRecord {
    pub id: String,
    pub conversation_id: String,
    pub root_record_id: String,
    pub focal_record_id: String,
    pub author_id: String,
    pub mode: ThreadMode,
    pub record_count: u32,
    pub is_complete: bool,
    pub fetched_at: DateTime<Utc>,
}

/// A record placed in a reconstructed tree.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconstructedRecord {
    pub record: Record,
    /// Distance from the conversation root (root = 0).
    pub depth: u32,
}
