//! Data models for the archive.

mod checkpoint;
mod collection;
mod record;
mod thread;

pub use checkpoint::{Checkpoint, SyncStatus};
pub use collection::{BookmarkFolder, CollectionKind, CollectionMembership};
pub use record::{placeholder_timestamp, Record, TombstoneReason, UNKNOWN_AUTHOR};
pub use thread::{ReconstructedRecord, ThreadMode, ThreadRecord};
