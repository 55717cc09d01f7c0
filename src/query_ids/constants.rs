//! Upstream endpoints and the shipped identifier table.

use std::time::Duration;

/// GraphQL endpoint prefix; requests go to `{API_BASE}/{queryId}/{operation}`.
pub const API_BASE: &str = "https://x.com/i/api/graphql";

/// Cache entries older than this are treated as absent.
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Public pages whose HTML references the client bundles.
pub const DISCOVERY_PAGES: &[&str] = &[
    "https://x.com/?lang=en",
    "https://x.com/explore",
    "https://x.com/notifications",
    "https://x.com/settings/profile",
];

/// Matches client bundle script URLs.
pub const BUNDLE_URL_PATTERN: &str =
    r"https://abs\.twimg\.com/responsive-web/client-web(?:-legacy)?/[A-Za-z0-9.-]+\.js";

/// Allowed shape of an operation identifier.
pub const QUERY_ID_PATTERN: &str = r"^[a-zA-Z0-9_-]+$";

/// Identifiers known at build time. Used when the cache has nothing fresh.
pub const FALLBACK_QUERY_IDS: &[(&str, &str)] = &[
    ("Bookmarks", "RV1g3b8n_SGOHwkqKYSCFw"),
    ("BookmarkFolderTimeline", "KJIQpsvxrTfRIlbaRIySHQ"),
    ("Likes", "JR2gceKucIKcVNB_9JkhsA"),
    ("TweetDetail", "97JF30KziU00483E_8elBA"),
    ("SearchTimeline", "M1jEez78PEfVfbQLvlWMvQ"),
    ("UserArticlesTweets", "8zBy9h4L90aDL02RsBcCFg"),
    ("UserTweets", "Wms1GvIiHXAPBaCr9KblaA"),
    ("UserTweetsAndReplies", "_P1zJA2kS9W1PLHKdThsrg"),
    ("Following", "BEkNpEt5pNETESoqMsTEGA"),
    ("Followers", "kuFUYP9eV1FPoEy4N-pi7w"),
];

/// Operations only discoverable from bundles.
pub const DISCOVERY_ONLY_OPERATIONS: &[&str] = &["HomeLatestTimeline"];

/// Look up the shipped identifier for an operation.
pub fn fallback_query_id(operation: &str) -> Option<&'static str> {
    FALLBACK_QUERY_IDS
        .iter()
        .find(|(name, _)| *name == operation)
        .map(|(_, id)| *id)
}

/// Every operation the scraper looks for.
pub fn target_operations() -> Vec<&'static str> {
    FALLBACK_QUERY_IDS
        .iter()
        .map(|(name, _)| *name)
        .chain(DISCOVERY_ONLY_OPERATIONS.iter().copied())
        .collect()
}
