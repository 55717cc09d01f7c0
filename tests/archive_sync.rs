//! End-to-end sync and reconstruction against a fake upstream.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tempfile::TempDir;

use posthoard::auth::{Credentials, StaticCredentials};
use posthoard::http_client::{FetchError, HttpFetch, HttpResponse};
use posthoard::models::{CollectionKind, SyncStatus, ThreadMode};
use posthoard::query_ids::{OperationDiscovery, QueryIdCache, QueryIdResolver};
use posthoard::rate_limit::RateLimitConfig;
use posthoard::repository::{CheckpointStore, SqliteArchive};
use posthoard::sync::SyncOptions;
use posthoard::transport::{RateLimitedTransport, RetryPolicy};
use posthoard::Archiver;

fn post(id: &str, author: &str, parent: Option<&str>, minute: u32) -> Value {
    let mut legacy = json!({
        "full_text": format!("post {}", id),
        "created_at": format!("Wed Jan 01 12:{:02}:00 +0000 2025", minute),
        "conversation_id_str": "1",
        "favorite_count": 0,
        "retweet_count": 0,
        "reply_count": 0,
        "quote_count": 0
    });
    if let Some(parent) = parent {
        legacy["in_reply_to_status_id_str"] = json!(parent);
        legacy["in_reply_to_user_id_str"] = json!(author);
    }
    json!({
        "__typename": "Tweet",
        "rest_id": id,
        "core": {"user_results": {"result": {
            "rest_id": author,
            "legacy": {"screen_name": format!("user{}", author), "name": "User"}
        }}},
        "legacy": legacy
    })
}

fn likes_page(posts: Vec<Value>, cursor: Option<&str>) -> Value {
    let mut entries: Vec<Value> = posts
        .into_iter()
        .map(|p| {
            json!({
                "entryId": format!("tweet-{}", p["rest_id"].as_str().unwrap()),
                "content": {"itemContent": {"tweet_results": {"result": p}}}
            })
        })
        .collect();
    if let Some(cursor) = cursor {
        entries.push(json!({"entryId": "cursor-bottom-0", "content": {"value": cursor}}));
    }
    json!({"data": {"user": {"result": {"timeline": {"timeline": {
        "instructions": [{"type": "TimelineAddEntries", "entries": entries}]
    }}}}}})
}

fn detail_page(posts: Vec<Value>) -> Value {
    let entries: Vec<Value> = posts
        .into_iter()
        .map(|p| {
            json!({
                "entryId": format!("tweet-{}", p["rest_id"].as_str().unwrap()),
                "content": {"itemContent": {"tweet_results": {"result": p}}}
            })
        })
        .collect();
    json!({"data": {"threaded_conversation_with_injections_v2": {
        "instructions": [{"type": "TimelineAddEntries", "entries": entries}]
    }}})
}

/// Two pages of likes plus a three-post self-thread. The second likes page
/// can be made to fail once with 403.
#[derive(Default)]
struct FakeUpstream {
    fail_second_page: AtomicBool,
}

#[async_trait]
impl HttpFetch for FakeUpstream {
    async fn get(
        &self,
        url: &str,
        _headers: &[(String, String)],
    ) -> Result<HttpResponse, FetchError> {
        let body = if url.contains("/Likes") && url.contains("page-two") {
            if self.fail_second_page.swap(false, Ordering::SeqCst) {
                return Ok(HttpResponse::new(403, ""));
            }
            likes_page(vec![post("3", "8", Some("2"), 3)], None)
        } else if url.contains("/Likes") {
            likes_page(
                vec![post("1", "8", None, 1), post("2", "8", Some("1"), 2)],
                Some("page-two"),
            )
        } else if url.contains("/TweetDetail") {
            detail_page(vec![
                post("1", "8", None, 1),
                post("2", "8", Some("1"), 2),
                post("3", "8", Some("2"), 3),
            ])
        } else {
            return Ok(HttpResponse::new(404, ""));
        };
        Ok(HttpResponse::json(200, &body))
    }
}

struct NoDiscovery;

#[async_trait]
impl OperationDiscovery for NoDiscovery {
    async fn discover(&self) -> HashMap<String, String> {
        HashMap::new()
    }
}

fn open(dir: &TempDir, upstream: Arc<FakeUpstream>) -> Archiver {
    let archive = Arc::new(SqliteArchive::new(&dir.path().join("hoard.db")).unwrap());
    let resolver = Arc::new(QueryIdResolver::new(
        QueryIdCache::in_memory(),
        Arc::new(NoDiscovery),
    ));
    let auth = Arc::new(StaticCredentials::new(Credentials::new("tok", "csrf", "42")));
    let transport = Arc::new(
        RateLimitedTransport::new(upstream, auth, resolver).with_policy(RetryPolicy {
            max_retries: 2,
            base_delay: Duration::ZERO,
        }),
    );
    Archiver::new(archive, transport).with_limiter_config(RateLimitConfig {
        initial_delay: Duration::ZERO,
        min_delay: Duration::ZERO,
        ..Default::default()
    })
}

#[tokio::test]
async fn interrupted_sync_resumes_from_saved_cursor() {
    let dir = TempDir::new().unwrap();
    let upstream = Arc::new(FakeUpstream::default());
    upstream.fail_second_page.store(true, Ordering::SeqCst);
    let archiver = open(&dir, upstream.clone());

    let err = archiver
        .sync_collection(CollectionKind::Likes, &SyncOptions::default())
        .await
        .unwrap_err();
    assert!(err.is_fatal());
    assert!(err.resumable());

    let checkpoint = archiver.archive().load("likes").unwrap().unwrap();
    assert_eq!(checkpoint.status, SyncStatus::Failed);
    assert_eq!(checkpoint.cursor.as_deref(), Some("page-two"));
    assert_eq!(checkpoint.total_synced, 2);

    let report = archiver
        .sync_collection(CollectionKind::Likes, &SyncOptions::default())
        .await
        .unwrap();
    assert_eq!(report.outcome.synced, 1);
    assert_eq!(report.outcome.checkpoint.total_synced, 3);
    assert_eq!(report.outcome.checkpoint.status, SyncStatus::Completed);

    let stats = archiver.stats().unwrap();
    assert_eq!(stats.records, 3);
    assert_eq!(stats.memberships.get("likes"), Some(&3));
}

#[tokio::test]
async fn reconstructs_self_thread_in_order() {
    let dir = TempDir::new().unwrap();
    let archiver = open(&dir, Arc::new(FakeUpstream::default()));

    let reconstruction = archiver
        .reconstruct("3", ThreadMode::Thread, None)
        .await
        .unwrap();

    assert!(reconstruction.is_complete());
    let order: Vec<(&str, u32)> = reconstruction
        .records
        .iter()
        .map(|r| (r.record.id.as_str(), r.depth))
        .collect();
    assert_eq!(order, [("1", 0), ("2", 1), ("3", 2)]);
    assert_eq!(reconstruction.thread.root_record_id, "1");
    assert_eq!(archiver.stats().unwrap().thread_records, 1);
}
