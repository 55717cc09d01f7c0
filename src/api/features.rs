//! GraphQL feature flags sent with every request.
//!
//! The upstream answers 404 or 400 when expected flags are missing, so the
//! sets mirror what the web client sends.

use serde_json::{json, Map, Value};

const TIMELINE_FEATURES: &[(&str, bool)] = &[
    ("rweb_video_screen_enabled", true),
    ("profile_label_improvements_pcf_label_in_post_enabled", true),
    ("responsive_web_profile_redirect_enabled", true),
    ("rweb_tipjar_consumption_enabled", true),
    ("verified_phone_label_enabled", false),
    ("creator_subscriptions_tweet_preview_api_enabled", true),
    ("responsive_web_graphql_timeline_navigation_enabled", true),
    ("responsive_web_graphql_skip_user_profile_image_extensions_enabled", false),
    ("premium_content_api_read_enabled", false),
    ("communities_web_enable_tweet_community_results_fetch", true),
    ("c9s_tweet_anatomy_moderator_badge_enabled", true),
    ("responsive_web_grok_analyze_button_fetch_trends_enabled", false),
    ("responsive_web_grok_analyze_post_followups_enabled", false),
    ("responsive_web_jetfuel_frame", true),
    ("responsive_web_grok_share_attachment_enabled", true),
    ("responsive_web_grok_annotations_enabled", true),
    ("articles_preview_enabled", true),
    ("responsive_web_edit_tweet_api_enabled", true),
    ("graphql_is_translatable_rweb_tweet_is_translatable_enabled", true),
    ("view_counts_everywhere_api_enabled", true),
    ("longform_notetweets_consumption_enabled", true),
    ("responsive_web_twitter_article_tweet_consumption_enabled", true),
    ("tweet_awards_web_tipping_enabled", false),
    ("responsive_web_grok_show_grok_translated_post", false),
    ("responsive_web_grok_analysis_button_from_backend", true),
    ("creator_subscriptions_quote_tweet_preview_enabled", false),
    ("freedom_of_speech_not_reach_fetch_enabled", true),
    ("standardized_nudges_misinfo", true),
    ("tweet_with_visibility_results_prefer_gql_limited_actions_policy_enabled", true),
    ("longform_notetweets_rich_text_read_enabled", true),
    ("longform_notetweets_inline_media_enabled", true),
    ("responsive_web_grok_image_annotation_enabled", true),
    ("responsive_web_grok_imagine_annotation_enabled", true),
    ("responsive_web_grok_community_note_auto_translation_is_enabled", false),
    ("responsive_web_enhance_cards_enabled", false),
    ("responsive_web_graphql_exclude_directive_enabled", true),
    ("rweb_video_timestamps_enabled", true),
    ("blue_business_profile_image_shape_enabled", true),
    ("responsive_web_text_conversations_enabled", false),
    ("tweetypie_unmention_optimization_enabled", true),
    ("vibe_api_enabled", true),
    ("responsive_web_twitter_blue_verified_badge_is_enabled", true),
    ("interactive_text_enabled", true),
    ("longform_notetweets_richtext_consumption_enabled", true),
    ("responsive_web_media_download_video_enabled", false),
];

/// Flags for timeline, conversation and user-post requests.
pub fn timeline_features() -> Value {
    let map: Map<String, Value> = TIMELINE_FEATURES
        .iter()
        .map(|(name, enabled)| (name.to_string(), Value::Bool(*enabled)))
        .collect();
    Value::Object(map)
}

/// Timeline flags plus the bookmark timeline switch.
pub fn bookmarks_features() -> Value {
    let mut features = timeline_features();
    if let Some(map) = features.as_object_mut() {
        map.insert(
            "graphql_timeline_v2_bookmark_timeline".to_string(),
            Value::Bool(true),
        );
    }
    features
}

/// Field toggles for user-post timelines.
pub fn user_field_toggles() -> Value {
    json!({
        "withArticlePlainText": false,
        "withArticleRichContentState": true,
        "withAuxiliaryUserLabels": false,
        "withPayments": false,
        "withGrokAnalyze": false,
        "withDisallowedReplyControls": false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bookmarks_extend_timeline() {
        let timeline = timeline_features();
        let bookmarks = bookmarks_features();
        assert_eq!(
            bookmarks.as_object().unwrap().len(),
            timeline.as_object().unwrap().len() + 1
        );
        assert_eq!(bookmarks["graphql_timeline_v2_bookmark_timeline"], true);
    }
}
