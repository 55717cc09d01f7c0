//! posthoard - incremental archiver for a user's bookmarks, likes and
//! timelines.
//!
//! Collections are walked page by page with a persisted cursor so that an
//! interrupted run resumes where it stopped. Reply threads around archived
//! records can be reconstructed into ordered trees, with placeholders for
//! records that no longer exist upstream.

pub mod api;
pub mod auth;
pub mod cli;
pub mod config;
pub mod engine;
pub mod http_client;
pub mod models;
pub mod query_ids;
pub mod rate_limit;
pub mod repository;
pub mod sync;
pub mod thread;
pub mod transport;

pub use engine::{Archiver, RepairReport, SyncReport, ThreadExpansion};
