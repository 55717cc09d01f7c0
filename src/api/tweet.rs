//! Conversion of upstream post payloads into [`Record`]s.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::models::{Record, TombstoneReason};

/// Upstream `created_at` format, e.g. `Wed Jan 01 12:00:00 +0000 2025`.
pub const CREATED_AT_FORMAT: &str = "%a %b %d %H:%M:%S %z %Y";

/// A post result as returned inside timeline entries.
#[derive(Debug, Clone, PartialEq)]
pub enum PostResult {
    Post(Value),
    /// Deleted, suspended or otherwise withheld content.
    Tombstone(TombstoneReason),
}

/// Classify a `tweet_results.result` object, unwrapping visibility wrappers.
pub fn classify_result(result: &Value) -> Option<PostResult> {
    match result.get("__typename").and_then(Value::as_str) {
        Some("TweetWithVisibilityResults") => result.get("tweet").and_then(classify_result),
        Some("TweetTombstone") => {
            let notice = result
                .pointer("/tombstone/text/text")
                .and_then(Value::as_str)
                .unwrap_or_default();
            Some(PostResult::Tombstone(TombstoneReason::from_notice(notice)))
        }
        Some("TweetUnavailable") => Some(PostResult::Tombstone(TombstoneReason::Unavailable)),
        _ if result.get("rest_id").is_some() => Some(PostResult::Post(result.clone())),
        _ => None,
    }
}

pub fn parse_created_at(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(value, CREATED_AT_FORMAT)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Decode the HTML entities the upstream escapes in post text.
pub fn decode_html_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        let decoded = tail.find(';').filter(|&end| end <= 10).and_then(|end| {
            let entity = &tail[1..end];
            let ch = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some('\u{a0}'),
                _ => entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                    .or_else(|| entity.strip_prefix('#').and_then(|d| d.parse().ok()))
                    .and_then(char::from_u32),
            };
            ch.map(|c| (c, end))
        });
        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &tail[end + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn str_at<'a>(value: &'a Value, pointer: &str) -> Option<&'a str> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

fn count_at(value: &Value, pointer: &str) -> i64 {
    value.pointer(pointer).and_then(Value::as_i64).unwrap_or(0)
}

struct Author {
    id: Option<String>,
    username: Option<String>,
    display_name: Option<String>,
    avatar_url: Option<String>,
}

fn author_of(post: &Value) -> Author {
    let user = post
        .pointer("/core/user_results/result")
        .cloned()
        .unwrap_or(Value::Null);
    let pick = |legacy: &str, core: &str| {
        str_at(&user, legacy)
            .or_else(|| str_at(&user, core))
            .map(str::to_string)
    };
    Author {
        id: str_at(&user, "/rest_id").map(str::to_string),
        username: pick("/legacy/screen_name", "/core/screen_name"),
        display_name: pick("/legacy/name", "/core/name"),
        avatar_url: pick("/avatar/image_url", "/legacy/profile_image_url_https"),
    }
}

fn text_of(post: &Value) -> Option<&str> {
    str_at(post, "/note_tweet/note_tweet_results/result/text")
        .or_else(|| str_at(post, "/legacy/full_text"))
}

fn quoted_id_of(post: &Value) -> Option<String> {
    str_at(post, "/quoted_status_result/result/rest_id")
        .or_else(|| str_at(post, "/legacy/quoted_status_id_str"))
        .map(str::to_string)
}

/// Extract a record from a post payload.
///
/// Reposts carry the original author, text and counters. Returns `None` when
/// id, text, author or creation time is missing.
pub fn extract_record(raw: &Value) -> Option<Record> {
    let post = match classify_result(raw)? {
        PostResult::Post(post) => post,
        PostResult::Tombstone(_) => return None,
    };

    let id = str_at(&post, "/rest_id")?.to_string();
    let legacy = post.get("legacy").cloned().unwrap_or(Value::Null);
    let created_at = str_at(&legacy, "/created_at").and_then(parse_created_at)?;

    let reposted = legacy
        .pointer("/retweeted_status_result/result")
        .and_then(classify_result)
        .and_then(|r| match r {
            PostResult::Post(p) => Some(p),
            PostResult::Tombstone(_) => None,
        });
    let is_repost = legacy.get("retweeted_status_result").is_some();

    let own_author = author_of(&post);
    let (content, author) = match &reposted {
        Some(original) => {
            let orig = author_of(original);
            let merged = Author {
                id: orig.id.or(own_author.id),
                username: orig.username.or(own_author.username),
                display_name: orig.display_name.or(own_author.display_name),
                avatar_url: orig.avatar_url.or(own_author.avatar_url),
            };
            (original, merged)
        }
        None => (&post, own_author),
    };

    let text = text_of(content).or_else(|| text_of(&post))?;
    let text = decode_html_entities(text);
    let author_id = author.id?;
    let author_username = author.username?;

    let mut record = Record::new(id, author_id, author_username, text, created_at);
    record.author_display_name = author.display_name;
    record.author_avatar_url = author.avatar_url;
    record.conversation_id = str_at(&legacy, "/conversation_id_str").map(str::to_string);
    record.in_reply_to_id = str_at(&legacy, "/in_reply_to_status_id_str").map(str::to_string);
    record.in_reply_to_user_id =
        str_at(&legacy, "/in_reply_to_user_id_str").map(str::to_string);
    record.quoted_id = quoted_id_of(&post).or_else(|| reposted.as_ref().and_then(quoted_id_of));
    record.is_repost = is_repost;
    record.reposted_id = reposted
        .as_ref()
        .and_then(|r| str_at(r, "/rest_id"))
        .map(str::to_string);

    let counters = content.get("legacy").unwrap_or(&legacy);
    record.reply_count = count_at(counters, "/reply_count");
    record.repost_count = count_at(counters, "/retweet_count");
    record.like_count = count_at(counters, "/favorite_count");
    record.quote_count = count_at(counters, "/quote_count");
    record.raw = Some(raw.clone());

    Some(record)
}

/// Extract the record a post quotes, directly or through a repost.
pub fn extract_quoted(raw: &Value) -> Option<Record> {
    let post = match classify_result(raw)? {
        PostResult::Post(post) => post,
        PostResult::Tombstone(_) => return None,
    };
    post.pointer("/quoted_status_result/result")
        .filter(|q| q.get("rest_id").is_some() || q.get("tweet").is_some())
        .or_else(|| {
            post.pointer("/legacy/retweeted_status_result/result/quoted_status_result/result")
        })
        .and_then(extract_record)
}

/// Whether a post payload is a repost.
pub fn is_repost(raw: &Value) -> bool {
    match classify_result(raw) {
        Some(PostResult::Post(post)) => post.pointer("/legacy/retweeted_status_result").is_some(),
        _ => false,
    }
}

/// Whether a post payload replies to another post.
pub fn is_reply(raw: &Value) -> bool {
    match classify_result(raw) {
        Some(PostResult::Post(post)) => {
            str_at(&post, "/legacy/in_reply_to_status_id_str").is_some()
        }
        _ => false,
    }
}
