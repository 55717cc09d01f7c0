//! `TweetDetail` requests and conversation page parsing.

use serde_json::{json, Value};

use super::features::timeline_features;
use super::tweet::{classify_result, PostResult};
use super::{timeline_entries, GraphqlRequest, Operation};
use crate::models::TombstoneReason;

/// One item of a conversation page.
#[derive(Debug, Clone, PartialEq)]
pub enum ConversationEntry {
    Post(Value),
    Tombstone { id: String, reason: TombstoneReason },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationPage {
    pub entries: Vec<ConversationEntry>,
    pub cursor: Option<String>,
}

pub fn tweet_detail_request(focal_id: &str, cursor: Option<&str>) -> GraphqlRequest {
    let mut variables = json!({
        "focalTweetId": focal_id,
        "withCommunity": true,
        "withVoice": true,
        "withBirdwatchNotes": true,
        "includePromotedContent": true,
        "referrer": "tweet",
    });
    if let (Some(cursor), Some(map)) = (cursor, variables.as_object_mut()) {
        map.insert("cursor".to_string(), Value::String(cursor.to_string()));
    }

    GraphqlRequest {
        operation: Operation::TweetDetail,
        variables,
        features: timeline_features(),
        field_toggles: None,
    }
}

/// Record id carried by an entry id such as `tweet-123` or
/// `conversationthread-1-tweet-123`.
fn id_from_entry_id(entry_id: &str) -> Option<String> {
    let idx = entry_id.rfind("tweet-")?;
    let id = &entry_id[idx + "tweet-".len()..];
    (!id.is_empty() && id.bytes().all(|b| b.is_ascii_digit())).then(|| id.to_string())
}

fn push_result(page: &mut ConversationPage, entry_id: &str, result: &Value) {
    match classify_result(result) {
        Some(PostResult::Post(post)) => page.entries.push(ConversationEntry::Post(post)),
        Some(PostResult::Tombstone(reason)) => {
            if let Some(id) = id_from_entry_id(entry_id) {
                page.entries.push(ConversationEntry::Tombstone { id, reason });
            }
        }
        None => {}
    }
}

/// Parse a `TweetDetail` response into posts, tombstones and the next cursor.
pub fn parse_conversation(body: &Value) -> ConversationPage {
    let mut page = ConversationPage::default();
    let instructions =
        body.pointer("/data/threaded_conversation_with_injections_v2/instructions");

    for entry in timeline_entries(instructions) {
        let entry_id = entry.get("entryId").and_then(Value::as_str).unwrap_or("");
        let content = entry.get("content").unwrap_or(&Value::Null);

        if entry_id.starts_with("tweet-") {
            if let Some(result) = content.pointer("/itemContent/tweet_results/result") {
                push_result(&mut page, entry_id, result);
            }
        } else if entry_id.starts_with("conversationthread-") {
            let items = content.get("items").and_then(Value::as_array);
            for item in items.into_iter().flatten() {
                let item_id = item.get("entryId").and_then(Value::as_str).unwrap_or("");
                if let Some(result) = item.pointer("/item/itemContent/tweet_results/result") {
                    push_result(&mut page, item_id, result);
                }
            }
        } else if entry_id.starts_with("cursor-bottom-") {
            page.cursor = content
                .get("value")
                .or_else(|| content.pointer("/itemContent/value"))
                .and_then(Value::as_str)
                .filter(|c| !c.is_empty())
                .map(str::to_string);
        }
    }

    page
}


#[cfg(test)]
mod tests {
    use super::fixtures::detail_page;
    use super::*;
    use crate::api::fixtures::{post, reply};

    #[test]
    fn test_parse_posts_and_cursor() {
        let body = detail_page(
            vec![post("1", "a", "alice", "root"), reply("2", "b", "1", "1", "a", 1)],
            Some("more"),
        );
        let page = parse_conversation(&body);
        assert_eq!(page.entries.len(), 2);
        assert_eq!(page.cursor.as_deref(), Some("more"));
    }

    #[test]
    fn test_tombstone_takes_entry_id() {
        let body = json!({"data": {"threaded_conversation_with_injections_v2": {"instructions": [
            {"type": "TimelineAddEntries", "entries": [{
                "entryId": "tweet-77",
                "content": {"itemContent": {"tweet_results": {"result": {
                    "__typename": "TweetTombstone",
                    "tombstone": {"text": {"text": "This account is suspended."}}
                }}}}
            }]}
        ]}}});
        let page = parse_conversation(&body);
        assert_eq!(
            page.entries,
            vec![ConversationEntry::Tombstone {
                id: "77".to_string(),
                reason: TombstoneReason::Suspended
            }]
        );
    }

    #[test]
    fn test_entry_id_parsing() {
        assert_eq!(id_from_entry_id("tweet-5").as_deref(), Some("5"));
        assert_eq!(
            id_from_entry_id("conversationthread-1-tweet-99").as_deref(),
            Some("99")
        );
        assert_eq!(id_from_entry_id("cursor-bottom-1"), None);
    }

    #[test]
    fn test_request_cursor() {
        let request = tweet_detail_request("10", Some("c"));
        assert_eq!(request.variables["focalTweetId"], "10");
        assert_eq!(request.variables["cursor"], "c");
    }
}
