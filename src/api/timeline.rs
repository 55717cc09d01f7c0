//! Collection timelines: request variables and page parsing.

use serde_json::{json, Value};

use super::features::{bookmarks_features, timeline_features, user_field_toggles};
use super::{timeline_entries, GraphqlRequest, Operation};
use crate::models::{BookmarkFolder, CollectionKind};

/// Items requested per page.
pub const PAGE_SIZE: u32 = 20;

/// One parsed page of a collection timeline.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimelinePage {
    /// Raw post results in server order.
    pub items: Vec<Value>,
    /// Bottom cursor, absent on the last page.
    pub cursor: Option<String>,
}

/// Operation used to walk a collection kind.
pub fn operation_for(kind: CollectionKind, folder: Option<&BookmarkFolder>) -> Operation {
    match kind {
        CollectionKind::Likes => Operation::Likes,
        CollectionKind::Bookmarks if folder.is_some() => Operation::BookmarkFolderTimeline,
        CollectionKind::Bookmarks => Operation::Bookmarks,
        CollectionKind::Authored | CollectionKind::Reposts => Operation::UserTweets,
        CollectionKind::Replies => Operation::UserTweetsAndReplies,
        CollectionKind::Feed => Operation::HomeLatestTimeline,
    }
}

/// Build the request for one page of a collection.
pub fn timeline_request(
    kind: CollectionKind,
    user_id: &str,
    cursor: Option<&str>,
    folder: Option<&BookmarkFolder>,
) -> GraphqlRequest {
    let operation = operation_for(kind, folder);
    let mut field_toggles = None;
    let mut features = timeline_features();

    let mut variables = match operation {
        Operation::Likes => json!({
            "userId": user_id,
            "count": PAGE_SIZE,
            "includePromotedContent": false,
            "withClientEventToken": false,
            "withBirdwatchNotes": false,
            "withVoice": true,
        }),
        Operation::Bookmarks => {
            features = bookmarks_features();
            json!({
                "count": PAGE_SIZE,
                "includePromotedContent": false,
                "withDownvotePerspective": false,
                "withReactionsMetadata": false,
                "withReactionsPerspective": false,
            })
        }
        Operation::BookmarkFolderTimeline => {
            features = bookmarks_features();
            json!({
                "bookmark_collection_id": folder.map(|f| f.id.as_str()).unwrap_or_default(),
                "includePromotedContent": true,
            })
        }
        Operation::UserTweets => {
            field_toggles = Some(user_field_toggles());
            json!({
                "userId": user_id,
                "count": PAGE_SIZE,
                "includePromotedContent": true,
                "withQuickPromoteEligibilityTweetFields": true,
                "withVoice": true,
                "withV2Timeline": true,
            })
        }
        Operation::UserTweetsAndReplies => {
            field_toggles = Some(user_field_toggles());
            json!({
                "userId": user_id,
                "count": PAGE_SIZE,
                "includePromotedContent": true,
                "withCommunity": false,
                "withVoice": true,
                "withV2Timeline": true,
            })
        }
        Operation::HomeLatestTimeline | Operation::TweetDetail => json!({
            "count": PAGE_SIZE,
            "seenTweetIds": [],
            "includePromotedContent": false,
        }),
    };

    if let (Some(cursor), Some(map)) = (cursor, variables.as_object_mut()) {
        map.insert("cursor".to_string(), Value::String(cursor.to_string()));
    }

    GraphqlRequest {
        operation,
        variables,
        features,
        field_toggles,
    }
}

fn instructions<'a>(body: &'a Value, operation: Operation) -> Option<&'a Value> {
    match operation {
        Operation::Likes => body.pointer("/data/user/result/timeline/timeline/instructions"),
        Operation::Bookmarks => body.pointer("/data/bookmark_timeline_v2/timeline/instructions"),
        Operation::BookmarkFolderTimeline => {
            body.pointer("/data/bookmark_collection_timeline/timeline/instructions")
        }
        Operation::UserTweets | Operation::UserTweetsAndReplies => body
            .pointer("/data/user/result/timeline_v2/timeline/instructions")
            .or_else(|| body.pointer("/data/user/result/timeline/timeline/instructions")),
        Operation::HomeLatestTimeline => {
            body.pointer("/data/home/home_timeline_urt/instructions")
        }
        Operation::TweetDetail => {
            body.pointer("/data/threaded_conversation_with_injections_v2/instructions")
        }
    }
}

/// Parse a collection page: post results in order plus the bottom cursor.
pub fn parse_timeline(body: &Value, operation: Operation) -> TimelinePage {
    let mut page = TimelinePage::default();

    for entry in timeline_entries(instructions(body, operation)) {
        let entry_id = entry.get("entryId").and_then(Value::as_str).unwrap_or("");
        let content = entry.get("content").unwrap_or(&Value::Null);

        if entry_id.starts_with("tweet-") {
            if let Some(result) = content.pointer("/itemContent/tweet_results/result") {
                page.items.push(result.clone());
            }
        } else if entry_id.starts_with("cursor-bottom-") {
            page.cursor = content
                .get("value")
                .and_then(Value::as_str)
                .filter(|c| !c.is_empty())
                .map(str::to_string);
        }
    }

    page
}
