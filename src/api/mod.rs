//! Request builders and response parsers for the upstream GraphQL API.

mod conversation;
mod features;
mod timeline;
mod tweet;

use serde_json::Value;
use url::Url;

use crate::query_ids::API_BASE;

pub use conversation::{parse_conversation, tweet_detail_request, ConversationEntry, ConversationPage};
pub use features::{bookmarks_features, timeline_features, user_field_toggles};
pub use timeline::{operation_for, parse_timeline, timeline_request, TimelinePage, PAGE_SIZE};
pub use tweet::{
    classify_result, decode_html_entities, extract_quoted, extract_record, is_reply, is_repost,
    parse_created_at, PostResult, CREATED_AT_FORMAT,
};

#[cfg(test)]
pub(crate) mod fixtures {
    pub use super::conversation::fixtures::detail_page;
    pub use super::timeline::fixtures::likes_page;
    pub use super::tweet::fixtures::{post, reply, set};
}

/// Upstream GraphQL operations used by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Likes,
    Bookmarks,
    BookmarkFolderTimeline,
    UserTweets,
    UserTweetsAndReplies,
    HomeLatestTimeline,
    TweetDetail,
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Likes => "Likes",
            Self::Bookmarks => "Bookmarks",
            Self::BookmarkFolderTimeline => "BookmarkFolderTimeline",
            Self::UserTweets => "UserTweets",
            Self::UserTweetsAndReplies => "UserTweetsAndReplies",
            Self::HomeLatestTimeline => "HomeLatestTimeline",
            Self::TweetDetail => "TweetDetail",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One GraphQL GET request, independent of the identifier in use.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphqlRequest {
    pub operation: Operation,
    pub variables: Value,
    pub features: Value,
    pub field_toggles: Option<Value>,
}

impl GraphqlRequest {
    /// Build the request URL for a resolved identifier.
    pub fn url(&self, query_id: &str) -> Result<Url, url::ParseError> {
        let base = format!("{}/{}/{}", API_BASE, query_id, self.operation.name());
        let mut params = vec![
            ("variables", self.variables.to_string()),
            ("features", self.features.to_string()),
        ];
        if let Some(toggles) = &self.field_toggles {
            params.push(("fieldToggles", toggles.to_string()));
        }
        Url::parse_with_params(&base, &params)
    }
}

/// `TimelineAddEntries` entries under an instructions array.
pub(crate) fn timeline_entries(instructions: Option<&Value>) -> impl Iterator<Item = &Value> {
    instructions
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter(|i| i.get("type").and_then(Value::as_str) == Some("TimelineAddEntries"))
        .filter_map(|i| i.get("entries").and_then(Value::as_array))
        .flatten()
}
