//! Bounded reconstruction of reply trees around a focal record.

pub mod tree;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::api::{extract_record, parse_conversation, tweet_detail_request, ConversationEntry};
use crate::models::{ReconstructedRecord, Record, ThreadMode, ThreadRecord, TombstoneReason};
use crate::rate_limit::{AdaptiveRateLimiter, LimiterSignal, RateLimitConfig};
use crate::repository::{ArchiveStore, ThreadEdge};
use crate::sync::SyncError;
use crate::transport::{ApiError, RateLimitedTransport};

/// Conversation-mode cap when the caller gives none.
pub const DEFAULT_LIMIT: usize = 200;
/// Conversation-mode cap regardless of what the caller asks for.
pub const HARD_LIMIT: usize = 500;
/// Conversation pages fetched per run at most.
pub const MAX_PAGES: u32 = 10;

/// A finished reconstruction: its summary plus the records in order.
#[derive(Debug, Clone)]
pub struct Reconstruction {
    pub thread: ThreadRecord,
    pub records: Vec<ReconstructedRecord>,
}

impl Reconstruction {
    pub fn is_complete(&self) -> bool {
        self.thread.is_complete
    }

    pub fn tombstones(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.record.is_tombstone())
            .count()
    }
}

/// Everything gathered from the conversation pages of one run.
#[derive(Default)]
struct Gathered {
    records: HashMap<String, Record>,
    upstream_tombstones: HashMap<String, TombstoneReason>,
    /// Pagination ended early (limiter stop or a failed later page).
    cut_short: bool,
}

pub struct ConversationReconstructor {
    transport: Arc<RateLimitedTransport>,
    store: Arc<dyn ArchiveStore>,
    limiter_config: RateLimitConfig,
    max_pages: u32,
}

impl ConversationReconstructor {
    pub fn new(transport: Arc<RateLimitedTransport>, store: Arc<dyn ArchiveStore>) -> Self {
        Self {
            transport,
            store,
            limiter_config: RateLimitConfig::default(),
            max_pages: MAX_PAGES,
        }
    }

    pub fn with_limiter_config(mut self, config: RateLimitConfig) -> Self {
        self.limiter_config = config;
        self
    }

    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    /// Fetch, assemble and persist the tree around `focal_id`.
    ///
    /// `limit` only caps conversation mode; thread mode keeps every
    /// self-reply.
    pub async fn reconstruct(
        &self,
        focal_id: &str,
        mode: ThreadMode,
        limit: Option<usize>,
    ) -> Result<Reconstruction, SyncError> {
        let limit = match mode {
            ThreadMode::Thread => usize::MAX,
            ThreadMode::Conversation => limit.unwrap_or(DEFAULT_LIMIT).clamp(1, HARD_LIMIT),
        };

        let gathered = self.gather(focal_id, mode, limit).await?;

        let focal = gathered
            .records
            .get(focal_id)
            .ok_or_else(|| SyncError::FocalRecordMissing(focal_id.to_string()))?;
        let conversation_id = focal
            .conversation_id
            .clone()
            .unwrap_or_else(|| focal.id.clone());
        let author_id = gathered
            .records
            .get(&conversation_id)
            .unwrap_or(focal)
            .author_id
            .clone();

        let candidates: Vec<Record> = gathered
            .records
            .values()
            .filter(|r| tree::belongs(r, mode, &author_id, &conversation_id))
            .cloned()
            .collect();
        let over_limit = candidates.len() > limit;
        if over_limit {
            info!(
                "Conversation {} has {} records, keeping {}",
                conversation_id,
                candidates.len(),
                limit
            );
        }
        let selected = tree::prioritize(candidates, &author_id, limit);

        // Parents referenced by the selection but absent upstream.
        let mut tombstones: BTreeMap<String, Record> = BTreeMap::new();
        for record in &selected {
            let Some(parent) = record.in_reply_to_id.as_deref() else {
                continue;
            };
            if gathered.records.contains_key(parent) || tombstones.contains_key(parent) {
                continue;
            }
            let reason = gathered
                .upstream_tombstones
                .get(parent)
                .copied()
                .unwrap_or(TombstoneReason::Unavailable);
            debug!("Tombstoning missing parent {} ({})", parent, reason.as_str());
            tombstones.insert(
                parent.to_string(),
                Record::tombstone(parent, Some(conversation_id.clone()), reason),
            );
        }

        let parent_of = parent_map(&gathered.records, &tombstones, &conversation_id);
        let depth = tree::depths(&parent_of);

        let is_complete = !over_limit && tombstones.is_empty() && !gathered.cut_short;

        let mut ordered: Vec<Record> = selected;
        ordered.extend(tombstones.values().cloned());
        tree::sort_chronologically(&mut ordered, &depth);

        let thread = ThreadRecord {
            id: uuid::Uuid::new_v4().to_string(),
            conversation_id: conversation_id.clone(),
            root_record_id: conversation_id.clone(),
            focal_record_id: focal_id.to_string(),
            author_id,
            mode,
            record_count: ordered.len() as u32,
            is_complete,
            fetched_at: Utc::now(),
        };

        self.persist(&thread, &ordered, &parent_of, &depth)?;

        info!(
            "Reconstructed {} of {}: {} records, {} tombstones, complete={}",
            mode.as_str(),
            focal_id,
            ordered.len(),
            tombstones.len(),
            is_complete
        );

        let records = ordered
            .into_iter()
            .map(|record| ReconstructedRecord {
                depth: depth.get(&record.id).copied().unwrap_or(0),
                record,
            })
            .collect();

        Ok(Reconstruction { thread, records })
    }

    /// Page through the conversation under the adaptive limiter.
    async fn gather(
        &self,
        focal_id: &str,
        mode: ThreadMode,
        limit: usize,
    ) -> Result<Gathered, SyncError> {
        let mut limiter = AdaptiveRateLimiter::with_config(self.limiter_config.clone());
        let mut gathered = Gathered::default();
        let mut cursor: Option<String> = None;
        // Upstream offered another page that this run did not fetch.
        let mut unfetched = false;

        for page_number in 0..self.max_pages {
            unfetched = false;
            if page_number > 0 {
                limiter.wait().await;
            }

            let request = tweet_detail_request(focal_id, cursor.as_deref());
            let response = match self.transport.execute(&request).await {
                Ok(response) => response,
                Err(e) if page_number == 0 || e.halts_run() => return Err(e.into()),
                Err(e) => {
                    if matches!(e, ApiError::RateLimitExceeded { .. }) {
                        limiter.report_rate_limit();
                    }
                    warn!(
                        "Conversation page {} for {} failed, keeping partial result: {}",
                        page_number + 1,
                        focal_id,
                        e
                    );
                    gathered.cut_short = true;
                    break;
                }
            };

            let mut stop = false;
            for _ in 0..response.rate_limit_hits {
                if limiter.report_rate_limit() == LimiterSignal::Stop {
                    stop = true;
                }
            }
            if !stop {
                limiter.report_success();
            }

            let page = parse_conversation(&response.body);
            for entry in page.entries {
                match entry {
                    ConversationEntry::Post(post) => {
                        if let Some(record) = extract_record(&post) {
                            gathered.records.insert(record.id.clone(), record);
                        }
                    }
                    ConversationEntry::Tombstone { id, reason } => {
                        gathered.upstream_tombstones.insert(id, reason);
                    }
                }
            }

            if stop || limiter.should_stop() {
                gathered.cut_short = true;
                break;
            }

            let next = match page.cursor {
                Some(next) if cursor.as_deref() != Some(next.as_str()) => next,
                _ => break,
            };
            if mode == ThreadMode::Conversation && gathered.records.len() > limit {
                debug!("Gathered enough replies for {}", focal_id);
                unfetched = true;
                break;
            }
            cursor = Some(next);
            unfetched = true;
        }

        if unfetched {
            debug!("Stopped paging {} with replies left upstream", focal_id);
            gathered.cut_short = true;
        }

        Ok(gathered)
    }

    fn persist(
        &self,
        thread: &ThreadRecord,
        ordered: &[Record],
        parent_of: &HashMap<String, Option<String>>,
        depth: &HashMap<String, u32>,
    ) -> Result<(), SyncError> {
        for record in ordered {
            // Never write a placeholder over a record stored by another run.
            if record.is_tombstone() && self.store.record_exists(&record.id)? {
                continue;
            }
            self.store.upsert_record(record)?;
        }

        self.store.upsert_thread_record(thread)?;

        let edges: Vec<ThreadEdge> = ordered
            .iter()
            .map(|record| ThreadEdge {
                thread_id: thread.id.clone(),
                record_id: record.id.clone(),
                parent_id: parent_of.get(&record.id).cloned().flatten(),
                depth: depth.get(&record.id).copied().unwrap_or(0),
                fetched_at: thread.fetched_at,
            })
            .collect();
        self.store.save_thread_edges(&edges)?;
        Ok(())
    }
}

/// Parent of every fetched record and synthesized tombstone.
///
/// A tombstone's own parent is unknown; it is attached to the conversation
/// root so its depth sits one below the root.
fn parent_map(
    records: &HashMap<String, Record>,
    tombstones: &BTreeMap<String, Record>,
    conversation_id: &str,
) -> HashMap<String, Option<String>> {
    let present = |id: &str| records.contains_key(id) || tombstones.contains_key(id);

    let mut parent_of: HashMap<String, Option<String>> = records
        .values()
        .map(|r| {
            let parent = r
                .in_reply_to_id
                .clone()
                .filter(|p| p != &r.id && present(p));
            (r.id.clone(), parent)
        })
        .collect();

    for id in tombstones.keys() {
        let parent = (id != conversation_id && present(conversation_id))
            .then(|| conversation_id.to_string());
        parent_of.insert(id.clone(), parent);
    }

    parent_of
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::fixtures::{detail_page, post, reply, set};
    use crate::http_client::mock::ScriptedFetch;
    use crate::query_ids::tests::FixedDiscovery;
    use crate::repository::SqliteArchive;
    use crate::transport::tests::transport_with;
    use serde_json::{json, Value};
    use std::time::Duration;
    use tempfile::TempDir;

    fn no_pacing() -> RateLimitConfig {
        RateLimitConfig {
            initial_delay: Duration::ZERO,
            min_delay: Duration::ZERO,
            ..Default::default()
        }
    }

    fn setup(
        http: Arc<ScriptedFetch>,
    ) -> (TempDir, Arc<SqliteArchive>, ConversationReconstructor) {
        let dir = TempDir::new().unwrap();
        let archive = Arc::new(SqliteArchive::new(&dir.path().join("test.db")).unwrap());
        let transport = Arc::new(transport_with(http, Arc::new(FixedDiscovery::new(&[]))));
        let reconstructor =
            ConversationReconstructor::new(transport, archive.clone()).with_limiter_config(no_pacing());
        (dir, archive, reconstructor)
    }

    fn root(id: &str, author: &str) -> Value {
        post(id, author, &format!("user{}", author), "root post")
    }

    fn ids(reconstruction: &Reconstruction) -> Vec<(&str, u32)> {
        reconstruction
            .records
            .iter()
            .map(|r| (r.record.id.as_str(), r.depth))
            .collect()
    }

    #[tokio::test]
    async fn test_thread_mode_keeps_author_chain() {
        let http = Arc::new(ScriptedFetch::new());
        http.on_json(
            "/TweetDetail",
            200,
            detail_page(
                vec![
                    root("1", "a"),
                    reply("2", "a", "1", "1", "a", 1),
                    reply("3", "b", "1", "2", "a", 2),
                    reply("4", "a", "1", "2", "a", 3),
                ],
                None,
            ),
        );
        let (_dir, archive, reconstructor) = setup(http);

        let result = reconstructor
            .reconstruct("4", ThreadMode::Thread, None)
            .await
            .unwrap();
        assert_eq!(ids(&result), [("1", 0), ("2", 1), ("4", 2)]);
        assert!(result.is_complete());
        assert_eq!(result.thread.author_id, "a");
        assert_eq!(result.thread.conversation_id, "1");
        assert_eq!(result.thread.focal_record_id, "4");

        let stored = archive.thread_records_for("4").unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].record_count, 3);
        let edges = archive.thread_edges(&result.thread.id).unwrap();
        assert_eq!(edges.len(), 3);
        assert!(edges
            .iter()
            .any(|e| e.record_id == "4" && e.parent_id.as_deref() == Some("2") && e.depth == 2));
    }

    #[tokio::test]
    async fn test_missing_ancestor_becomes_tombstone() {
        let http = Arc::new(ScriptedFetch::new());
        http.on_json(
            "/TweetDetail",
            200,
            detail_page(
                vec![
                    root("1", "a"),
                    reply("3", "a", "1", "2", "a", 2),
                    reply("4", "a", "1", "3", "a", 3),
                ],
                None,
            ),
        );
        let (_dir, archive, reconstructor) = setup(http);

        let result = reconstructor
            .reconstruct("4", ThreadMode::Thread, None)
            .await
            .unwrap();
        assert_eq!(ids(&result), [("1", 0), ("2", 1), ("3", 2), ("4", 3)]);
        assert!(!result.is_complete());
        assert_eq!(result.tombstones(), 1);

        let tombstone = archive.get_record("2").unwrap().unwrap();
        assert_eq!(tombstone.tombstone, Some(TombstoneReason::Unavailable));
        assert_eq!(tombstone.conversation_id.as_deref(), Some("1"));
        assert_eq!(tombstone.author_id, crate::models::UNKNOWN_AUTHOR);
    }

    #[tokio::test]
    async fn test_upstream_tombstone_reason_kept() {
        let mut body = detail_page(
            vec![root("1", "a"), reply("3", "a", "1", "2", "a", 2)],
            None,
        );
        let entries = body
            .pointer_mut("/data/threaded_conversation_with_injections_v2/instructions/0/entries")
            .and_then(Value::as_array_mut)
            .unwrap();
        entries.push(json!({
            "entryId": "tweet-2",
            "content": {"itemContent": {"tweet_results": {"result": {
                "__typename": "TweetTombstone",
                "tombstone": {"text": {"text": "This Post was deleted by the Post author."}}
            }}}}
        }));
        let http = Arc::new(ScriptedFetch::new());
        http.on_json("/TweetDetail", 200, body);
        let (_dir, _archive, reconstructor) = setup(http);

        let result = reconstructor
            .reconstruct("3", ThreadMode::Thread, None)
            .await
            .unwrap();
        let tombstone = &result.records[1].record;
        assert_eq!(tombstone.id, "2");
        assert_eq!(tombstone.tombstone, Some(TombstoneReason::Deleted));
    }

    #[tokio::test]
    async fn test_tombstone_does_not_overwrite_stored_record() {
        let http = Arc::new(ScriptedFetch::new());
        http.on_json(
            "/TweetDetail",
            200,
            detail_page(vec![root("1", "a"), reply("3", "a", "1", "2", "a", 2)], None),
        );
        let (_dir, archive, reconstructor) = setup(http);

        let mut known = Record::new("2", "a", "usera", "still here", Utc::now());
        known.conversation_id = Some("1".to_string());
        archive.upsert_record(&known).unwrap();

        reconstructor
            .reconstruct("3", ThreadMode::Thread, None)
            .await
            .unwrap();
        let stored = archive.get_record("2").unwrap().unwrap();
        assert!(!stored.is_tombstone());
        assert_eq!(stored.text, "still here");
    }

    #[tokio::test]
    async fn test_conversation_mode_caps_and_keeps_author() {
        let mut posts = vec![root("1", "a")];
        for i in 0..8u32 {
            let mut p = reply(&format!("{}", 100 + i), "crowd", "1", "1", "a", i);
            set(&mut p, "/legacy/favorite_count", json!(i));
            posts.push(p);
        }
        posts.push(reply("50", "a", "1", "100", "crowd", 30));
        let http = Arc::new(ScriptedFetch::new());
        http.on_json("/TweetDetail", 200, detail_page(posts, None));
        let (_dir, _archive, reconstructor) = setup(http);

        let result = reconstructor
            .reconstruct("1", ThreadMode::Conversation, Some(5))
            .await
            .unwrap();
        let got: Vec<&str> = result.records.iter().map(|r| r.record.id.as_str()).collect();
        // root, the author's reply and its parent, then the two most liked.
        assert_eq!(got.len(), 5);
        for id in ["1", "50", "100", "107", "106"] {
            assert!(got.contains(&id), "missing {}", id);
        }
        assert!(!result.is_complete());
    }

    #[tokio::test]
    async fn test_paginates_until_cursor_ends() {
        let http = Arc::new(ScriptedFetch::new());
        http.on_json(
            "CURSOR_MORE",
            200,
            detail_page(vec![reply("3", "a", "1", "2", "a", 2)], None),
        );
        http.on_json(
            "/TweetDetail",
            200,
            detail_page(vec![root("1", "a"), reply("2", "a", "1", "1", "a", 1)], Some("CURSOR_MORE")),
        );
        let (_dir, _archive, reconstructor) = setup(http.clone());

        let result = reconstructor
            .reconstruct("1", ThreadMode::Thread, None)
            .await
            .unwrap();
        assert_eq!(ids(&result), [("1", 0), ("2", 1), ("3", 2)]);
        assert!(result.is_complete());
        assert_eq!(http.count("/TweetDetail"), 2);
    }

    #[tokio::test]
    async fn test_page_cap_with_cursor_left_is_incomplete() {
        let http = Arc::new(ScriptedFetch::new());
        http.on_json(
            "CURSOR_MORE",
            200,
            detail_page(vec![reply("3", "a", "1", "2", "a", 2)], None),
        );
        http.on_json(
            "/TweetDetail",
            200,
            detail_page(vec![root("1", "a"), reply("2", "a", "1", "1", "a", 1)], Some("CURSOR_MORE")),
        );
        let (_dir, archive, reconstructor) = setup(http.clone());
        let reconstructor = reconstructor.with_max_pages(1);

        let result = reconstructor
            .reconstruct("1", ThreadMode::Thread, None)
            .await
            .unwrap();
        assert_eq!(ids(&result), [("1", 0), ("2", 1)]);
        assert!(!result.is_complete());
        assert_eq!(http.count("CURSOR_MORE"), 0);
        assert!(!archive.thread_records_for("1").unwrap()[0].is_complete);
    }

    #[tokio::test]
    async fn test_page_cap_on_last_page_is_complete() {
        let http = Arc::new(ScriptedFetch::new());
        http.on_json(
            "/TweetDetail",
            200,
            detail_page(vec![root("1", "a"), reply("2", "a", "1", "1", "a", 1)], None),
        );
        let (_dir, _archive, reconstructor) = setup(http);
        let reconstructor = reconstructor.with_max_pages(1);

        let result = reconstructor
            .reconstruct("1", ThreadMode::Thread, None)
            .await
            .unwrap();
        assert!(result.is_complete());
    }

    #[tokio::test]
    async fn test_limiter_stop_returns_partial() {
        let http = Arc::new(ScriptedFetch::new());
        http.on_status("CURSOR_P2", 429)
            .on_status("CURSOR_P2", 429)
            .on_status("CURSOR_P2", 429)
            .on_json(
                "CURSOR_P2",
                200,
                detail_page(vec![reply("3", "a", "1", "2", "a", 2)], Some("CURSOR_P3")),
            );
        http.on_json(
            "/TweetDetail",
            200,
            detail_page(vec![root("1", "a"), reply("2", "a", "1", "1", "a", 1)], Some("CURSOR_P2")),
        );
        let (_dir, _archive, reconstructor) = setup(http.clone());

        let result = reconstructor
            .reconstruct("1", ThreadMode::Thread, None)
            .await
            .unwrap();
        assert!(!result.is_complete());
        assert_eq!(result.records.len(), 3);
        assert_eq!(http.count("CURSOR_P3"), 0);
    }

    #[tokio::test]
    async fn test_later_page_failure_keeps_gathered_records() {
        let http = Arc::new(ScriptedFetch::new());
        http.on_status("CURSOR_P2", 500);
        http.on_json(
            "/TweetDetail",
            200,
            detail_page(vec![root("1", "a"), reply("2", "a", "1", "1", "a", 1)], Some("CURSOR_P2")),
        );
        let (_dir, _archive, reconstructor) = setup(http);

        let result = reconstructor
            .reconstruct("1", ThreadMode::Thread, None)
            .await
            .unwrap();
        assert_eq!(result.records.len(), 2);
        assert!(!result.is_complete());
    }

    #[tokio::test]
    async fn test_first_page_forbidden_propagates() {
        let http = Arc::new(ScriptedFetch::new());
        http.on_status("/TweetDetail", 403);
        let (_dir, archive, reconstructor) = setup(http);

        let err = reconstructor
            .reconstruct("1", ThreadMode::Thread, None)
            .await
            .unwrap_err();
        assert!(matches!(err.api_error(), Some(ApiError::Forbidden { .. })));
        assert_eq!(archive.stats().unwrap().thread_records, 0);
    }

    #[tokio::test]
    async fn test_missing_focal_record() {
        let http = Arc::new(ScriptedFetch::new());
        http.on_json("/TweetDetail", 200, detail_page(vec![root("1", "a")], None));
        let (_dir, _archive, reconstructor) = setup(http);

        let err = reconstructor
            .reconstruct("999", ThreadMode::Thread, None)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::FocalRecordMissing(id) if id == "999"));
    }

    #[tokio::test]
    async fn test_rerun_creates_new_thread_record() {
        let http = Arc::new(ScriptedFetch::new());
        http.on_json("/TweetDetail", 200, detail_page(vec![root("1", "a")], None));
        let (_dir, archive, reconstructor) = setup(http);

        let first = reconstructor.reconstruct("1", ThreadMode::Thread, None).await.unwrap();
        let second = reconstructor.reconstruct("1", ThreadMode::Thread, None).await.unwrap();
        assert_ne!(first.thread.id, second.thread.id);
        assert_eq!(archive.thread_records_for("1").unwrap().len(), 2);
    }
}
