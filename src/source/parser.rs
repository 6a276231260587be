use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use tracing::{debug, warn};

use crate::source::{
    errors::SourceError,
    types::{
        ArticleCard, Author, ContentBlock, MediaKind, MediaRef, PostMetrics, RawPost, TimelinePage,
    },
    wire::{
        Count, EntryContent, TimelineEnvelope, TweetResult, WireArticle, WireBlock, WireMedia,
        WireTweet,
    },
};

const CREATED_AT_FORMAT: &str = "%a %b %d %H:%M:%S %z %Y";
const BOTTOM_CURSOR: &str = "Bottom";

/// Parse one timeline response body into validated posts.
///
/// A body that does not match the envelope is `Malformed`. Tweets inside a
/// well-formed envelope that fail validation are counted in `rejected`.
pub fn parse_timeline(body: &[u8]) -> Result<TimelinePage, SourceError> {
    let envelope: TimelineEnvelope =
        serde_json::from_slice(body).map_err(|e| SourceError::Malformed(e.to_string()))?;

    let mut page = TimelinePage::default();

    for instruction in envelope.result.timeline.instructions {
        for entry in instruction.entries {
            match entry.content {
                EntryContent::TimelineTimelineItem { item_content } => {
                    let Some(result) = item_content
                        .and_then(|c| c.tweet_results)
                        .and_then(|r| r.result)
                    else {
                        continue;
                    };
                    match validate_tweet(result) {
                        Ok(Some(post)) => page.posts.push(post),
                        Ok(None) => debug!(entry_id = %entry.entry_id, "skipping unavailable tweet"),
                        Err(reason) => {
                            warn!(entry_id = %entry.entry_id, %reason, "dropping invalid tweet");
                            page.rejected += 1;
                        }
                    }
                }
                EntryContent::TimelineTimelineCursor { value, cursor_type } => {
                    if cursor_type == BOTTOM_CURSOR && page.next_cursor.is_none() {
                        page.next_cursor = Some(value);
                    }
                }
                EntryContent::Unsupported => {}
            }
        }
    }

    Ok(page)
}

/// Validate a single `tweet_results.result` value.
///
/// `Ok(None)` means the entry is a tombstone or an unknown variant.
pub fn validate_tweet(value: Value) -> Result<Option<RawPost>, String> {
    let tweet = if value.get("__typename").is_some() {
        match serde_json::from_value::<TweetResult>(value).map_err(|e| e.to_string())? {
            TweetResult::Tweet(tweet) => tweet,
            TweetResult::TweetWithVisibilityResults { tweet } => tweet,
            TweetResult::TweetTombstone {} | TweetResult::Unsupported => return Ok(None),
        }
    } else {
        serde_json::from_value::<WireTweet>(value).map_err(|e| e.to_string())?
    };

    into_raw_post(tweet).map(Some)
}

fn into_raw_post(tweet: WireTweet) -> Result<RawPost, String> {
    let legacy = tweet.legacy;
    let post_id = non_empty(Some(legacy.id_str))
        .or_else(|| non_empty(tweet.rest_id))
        .ok_or("missing post id")?;

    let created_at = parse_created_at(&legacy.created_at)
        .ok_or_else(|| format!("unparseable created_at '{}'", legacy.created_at))?;

    let author = tweet
        .core
        .and_then(|core| {
            let user = core.user_results.result;
            let (legacy_handle, legacy_name, avatar) = match user.legacy {
                Some(l) => (l.screen_name, l.name, l.profile_image_url_https),
                None => (None, None, None),
            };
            let (core_handle, core_name) = match user.core {
                Some(c) => (c.screen_name, c.name),
                None => (None, None),
            };
            let handle = non_empty(legacy_handle).or_else(|| non_empty(core_handle));
            let name = non_empty(legacy_name).or_else(|| non_empty(core_name));
            let avatar_url = non_empty(avatar).or_else(|| user.avatar.and_then(|a| a.image_url));
            handle.map(|handle| Author {
                name: name.unwrap_or_else(|| handle.clone()),
                handle,
                avatar_url,
            })
        })
        .ok_or("missing author handle")?;

    let metrics = PostMetrics {
        views: tweet
            .views
            .and_then(|v| v.count)
            .as_ref()
            .map_or(0, Count::value),
        likes: legacy.favorite_count.as_ref().map_or(0, Count::value),
        replies: legacy.reply_count.as_ref().map_or(0, Count::value),
        reposts: legacy.retweet_count.as_ref().map_or(0, Count::value),
        bookmarks: legacy.bookmark_count.as_ref().map_or(0, Count::value),
    };

    let text = legacy.full_text.or(legacy.text).unwrap_or_default();
    let links = legacy
        .entities
        .map(|e| {
            e.urls
                .into_iter()
                .filter_map(|u| non_empty(u.expanded_url).or_else(|| non_empty(u.url)))
                .collect()
        })
        .unwrap_or_default();

    let is_repost = legacy.retweeted_status_result.is_some() || text.starts_with("RT @");
    let is_reply = legacy.in_reply_to_status_id_str.is_some();

    let article = tweet
        .article_results
        .and_then(|r| r.result)
        .or_else(|| tweet.article.and_then(|a| a.article_results.result))
        .map(into_card);

    Ok(RawPost {
        post_id,
        text,
        created_at,
        author,
        metrics,
        links,
        is_repost,
        is_reply,
        article,
    })
}

fn into_card(article: WireArticle) -> ArticleCard {
    let blocks = article
        .content_state
        .map(|state| state.blocks.into_iter().map(into_block).collect())
        .unwrap_or_default();

    ArticleCard {
        id: article.rest_id,
        title: non_empty(article.title),
        preview_text: non_empty(article.preview_text),
        description: non_empty(article.description),
        url: non_empty(article.url),
        cover_image: article
            .cover_media
            .and_then(|c| c.media_info)
            .and_then(|m| non_empty(m.original_img_url)),
        blocks,
        published_at: article
            .metadata
            .and_then(|m| m.first_published_at_secs)
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single()),
    }
}

fn into_block(block: WireBlock) -> ContentBlock {
    let entities = block.entities.unwrap_or_default();
    let mut media: Vec<MediaRef> = Vec::new();
    for item in block.media.iter().chain(entities.media.iter()) {
        if let Some(media_ref) = into_media(item)
            && !media.iter().any(|m| m.url == media_ref.url)
        {
            media.push(media_ref);
        }
    }

    ContentBlock {
        text: block.text.unwrap_or_default(),
        media,
        links: entities
            .urls
            .into_iter()
            .filter_map(|u| non_empty(u.expanded_url).or_else(|| non_empty(u.url)))
            .collect(),
    }
}

fn into_media(media: &WireMedia) -> Option<MediaRef> {
    let url = media.best_url()?.to_string();
    let is_video = media
        .kind
        .as_deref()
        .is_some_and(|k| k.contains("video") || k.contains("gif"))
        || url.contains("video");
    Some(MediaRef {
        url,
        kind: if is_video {
            MediaKind::Video
        } else {
            MediaKind::Image
        },
    })
}

/// Parse the `"Wed Oct 05 21:25:35 +0000 2022"` timestamp format.
pub fn parse_created_at(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(raw.trim(), CREATED_AT_FORMAT)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|| {
            DateTime::parse_from_rfc3339(raw.trim())
                .ok()
                .map(|dt| dt.with_timezone(&Utc))
        })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tweet_json(id: &str, with_article: bool) -> Value {
        let mut tweet = json!({
            "__typename": "Tweet",
            "rest_id": id,
            "core": {
                "user_results": {
                    "result": {
                        "__typename": "User",
                        "legacy": {
                            "screen_name": "writer",
                            "name": "A Writer",
                            "profile_image_url_https": "https://pbs.twimg.com/profile.jpg"
                        }
                    }
                }
            },
            "views": { "count": "1.5k" },
            "legacy": {
                "id_str": id,
                "full_text": "New essay https://t.co/abc",
                "created_at": "Wed Oct 05 21:25:35 +0000 2022",
                "reply_count": 4,
                "retweet_count": 2,
                "favorite_count": 31,
                "bookmark_count": 5,
                "entities": {
                    "urls": [
                        { "url": "https://t.co/abc", "expanded_url": "https://x.com/i/article/99" }
                    ]
                }
            }
        });
        if with_article {
            tweet["article"] = json!({
                "article_results": {
                    "result": {
                        "rest_id": "99",
                        "title": "On Compilers",
                        "preview_text": "Why compilers matter",
                        "cover_media": { "media_info": { "original_img_url": "https://pbs.twimg.com/cover.jpg" } },
                        "content_state": {
                            "blocks": [
                                { "text": "First paragraph." },
                                { "text": "", "media": [ { "type": "photo", "media_url_https": "https://pbs.twimg.com/1.jpg" } ] }
                            ]
                        }
                    }
                }
            });
        }
        tweet
    }

    fn page_json(tweets: Vec<Value>, cursor: Option<&str>) -> Vec<u8> {
        let mut entries: Vec<Value> = tweets
            .into_iter()
            .enumerate()
            .map(|(i, t)| {
                json!({
                    "entryId": format!("tweet-{i}"),
                    "content": {
                        "entryType": "TimelineTimelineItem",
                        "itemContent": { "itemType": "TimelineTweet", "tweet_results": { "result": t } }
                    }
                })
            })
            .collect();
        if let Some(cursor) = cursor {
            entries.push(json!({
                "entryId": "cursor-top",
                "content": { "entryType": "TimelineTimelineCursor", "value": "top-cursor", "cursorType": "Top" }
            }));
            entries.push(json!({
                "entryId": "cursor-bottom",
                "content": { "entryType": "TimelineTimelineCursor", "value": cursor, "cursorType": "Bottom" }
            }));
        }
        serde_json::to_vec(&json!({
            "result": { "timeline": { "instructions": [
                { "type": "TimelineClearCache" },
                { "type": "TimelineAddEntries", "entries": entries }
            ] } }
        }))
        .unwrap()
    }

    #[test]
    fn parses_posts_and_bottom_cursor() {
        let body = page_json(vec![tweet_json("1", true), tweet_json("2", false)], Some("next-1"));
        let page = parse_timeline(&body).unwrap();

        assert_eq!(page.posts.len(), 2);
        assert_eq!(page.rejected, 0);
        assert_eq!(page.next_cursor.as_deref(), Some("next-1"));

        let post = &page.posts[0];
        assert_eq!(post.post_id, "1");
        assert_eq!(post.author.handle, "writer");
        assert_eq!(post.metrics.views, 1500);
        assert_eq!(post.metrics.likes, 31);
        assert_eq!(post.links, vec!["https://x.com/i/article/99".to_string()]);
        assert_eq!(
            post.created_at.to_rfc3339(),
            "2022-10-05T21:25:35+00:00"
        );

        let card = post.article.as_ref().unwrap();
        assert_eq!(card.title.as_deref(), Some("On Compilers"));
        assert_eq!(card.blocks.len(), 2);
        assert_eq!(card.blocks[1].media[0].kind, MediaKind::Image);
        assert!(page.posts[1].article.is_none());
    }

    #[test]
    fn invalid_tweets_are_counted_not_fatal() {
        let mut broken = tweet_json("3", false);
        broken["legacy"]["created_at"] = json!("yesterday-ish");
        let mut missing_legacy = tweet_json("4", false);
        missing_legacy.as_object_mut().unwrap().remove("legacy");

        let body = page_json(vec![tweet_json("1", false), broken, missing_legacy], None);
        let page = parse_timeline(&body).unwrap();

        assert_eq!(page.posts.len(), 1);
        assert_eq!(page.rejected, 2);
        assert!(page.next_cursor.is_none());
    }

    #[test]
    fn unwraps_visibility_results_and_skips_tombstones() {
        let wrapped = json!({
            "__typename": "TweetWithVisibilityResults",
            "tweet": tweet_json("5", false)
        });
        assert_eq!(validate_tweet(wrapped).unwrap().unwrap().post_id, "5");

        let tombstone = json!({ "__typename": "TweetTombstone" });
        assert!(validate_tweet(tombstone).unwrap().is_none());
    }

    #[test]
    fn marks_reposts_and_replies() {
        let mut repost = tweet_json("6", false);
        repost["legacy"]["full_text"] = json!("RT @someone: hello");
        assert!(validate_tweet(repost).unwrap().unwrap().is_repost);

        let mut reply = tweet_json("7", false);
        reply["legacy"]["in_reply_to_status_id_str"] = json!("6");
        assert!(validate_tweet(reply).unwrap().unwrap().is_reply);
    }

    #[test]
    fn envelope_shape_errors_are_malformed() {
        let result = parse_timeline(br#"{"result": {"timeline": {}}}"#);
        assert!(matches!(result, Err(SourceError::Malformed(_))));

        let result = parse_timeline(b"<html>oops</html>");
        assert!(matches!(result, Err(SourceError::Malformed(_))));
    }
}
