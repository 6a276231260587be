//! Serde schema for the list-timeline payload.
//!
//! The page envelope is parsed strictly: if `result.timeline.instructions`
//! is missing the whole page is rejected. Individual tweet results are kept
//! as raw JSON at this level and validated one by one in `parser`, so one
//! odd tweet never poisons the rest of the page.

use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
pub struct TimelineEnvelope {
    pub result: TimelineResult,
}

#[derive(Debug, Deserialize)]
pub struct TimelineResult {
    pub timeline: Timeline,
}

#[derive(Debug, Deserialize)]
pub struct Timeline {
    pub instructions: Vec<Instruction>,
}

#[derive(Debug, Deserialize)]
pub struct Instruction {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub entries: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
pub struct Entry {
    #[serde(rename = "entryId", default)]
    pub entry_id: String,
    pub content: EntryContent,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "entryType")]
pub enum EntryContent {
    TimelineTimelineItem {
        #[serde(rename = "itemContent", default)]
        item_content: Option<ItemContent>,
    },
    TimelineTimelineCursor {
        value: String,
        #[serde(rename = "cursorType")]
        cursor_type: String,
    },
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Deserialize)]
pub struct ItemContent {
    #[serde(default)]
    pub tweet_results: Option<TweetResults>,
}

#[derive(Debug, Deserialize)]
pub struct TweetResults {
    #[serde(default)]
    pub result: Option<Value>,
}

/// A single `tweet_results.result` value.
#[derive(Debug, Deserialize)]
#[serde(tag = "__typename")]
pub enum TweetResult {
    Tweet(WireTweet),
    TweetWithVisibilityResults { tweet: WireTweet },
    TweetTombstone {},
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Deserialize)]
pub struct WireTweet {
    #[serde(default)]
    pub rest_id: Option<String>,
    #[serde(default)]
    pub core: Option<WireCore>,
    pub legacy: WireLegacy,
    #[serde(default)]
    pub views: Option<WireViews>,
    #[serde(default)]
    pub article: Option<WireArticleWrapper>,
    #[serde(default)]
    pub article_results: Option<WireArticleResults>,
}

#[derive(Debug, Deserialize)]
pub struct WireCore {
    pub user_results: WireUserResults,
}

#[derive(Debug, Deserialize)]
pub struct WireUserResults {
    pub result: WireUser,
}

#[derive(Debug, Deserialize)]
pub struct WireUser {
    #[serde(default)]
    pub legacy: Option<WireUserLegacy>,
    #[serde(default)]
    pub core: Option<WireUserCore>,
    #[serde(default)]
    pub avatar: Option<WireAvatar>,
}

#[derive(Debug, Deserialize)]
pub struct WireUserLegacy {
    #[serde(default)]
    pub screen_name: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub profile_image_url_https: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WireUserCore {
    #[serde(default)]
    pub screen_name: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WireAvatar {
    #[serde(default)]
    pub image_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WireLegacy {
    pub id_str: String,
    #[serde(default)]
    pub full_text: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    pub created_at: String,
    #[serde(default)]
    pub reply_count: Option<Count>,
    #[serde(default)]
    pub retweet_count: Option<Count>,
    #[serde(default)]
    pub favorite_count: Option<Count>,
    #[serde(default)]
    pub bookmark_count: Option<Count>,
    #[serde(default)]
    pub in_reply_to_status_id_str: Option<String>,
    #[serde(default)]
    pub retweeted_status_result: Option<Value>,
    #[serde(default)]
    pub entities: Option<WireEntities>,
}

#[derive(Debug, Default, Deserialize)]
pub struct WireEntities {
    #[serde(default)]
    pub urls: Vec<WireUrl>,
    #[serde(default)]
    pub media: Vec<WireMedia>,
}

#[derive(Debug, Deserialize)]
pub struct WireUrl {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub expanded_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WireMedia {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub media_url_https: Option<String>,
    #[serde(default)]
    pub media_url: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub expanded_url: Option<String>,
}

impl WireMedia {
    pub fn best_url(&self) -> Option<&str> {
        [
            &self.media_url_https,
            &self.media_url,
            &self.url,
            &self.expanded_url,
        ]
        .into_iter()
        .flatten()
        .map(String::as_str)
        .find(|u| !u.trim().is_empty())
    }
}

#[derive(Debug, Deserialize)]
pub struct WireViews {
    #[serde(default)]
    pub count: Option<Count>,
}

/// Engagement counters arrive as numbers or as strings such as `"1.2k"`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Count {
    Number(u64),
    Text(String),
}

impl Count {
    pub fn value(&self) -> u64 {
        match self {
            Count::Number(n) => *n,
            Count::Text(raw) => parse_abbreviated(raw).unwrap_or(0),
        }
    }
}

fn parse_abbreviated(raw: &str) -> Option<u64> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| *c != ',' && *c != '_')
        .collect();
    let lower = cleaned.to_ascii_lowercase();
    let (number, multiplier) = match lower.chars().last()? {
        'k' => (&lower[..lower.len() - 1], 1_000f64),
        'm' => (&lower[..lower.len() - 1], 1_000_000f64),
        'b' => (&lower[..lower.len() - 1], 1_000_000_000f64),
        _ => (lower.as_str(), 1f64),
    };
    let value: f64 = number.trim().parse().ok()?;
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    Some((value * multiplier).round() as u64)
}

#[derive(Debug, Deserialize)]
pub struct WireArticleWrapper {
    pub article_results: WireArticleResults,
}

#[derive(Debug, Deserialize)]
pub struct WireArticleResults {
    #[serde(default)]
    pub result: Option<WireArticle>,
}

#[derive(Debug, Deserialize)]
pub struct WireArticle {
    pub rest_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub preview_text: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub content_state: Option<WireContentState>,
    #[serde(default)]
    pub cover_media: Option<WireCoverMedia>,
    #[serde(default)]
    pub metadata: Option<WireArticleMetadata>,
}

#[derive(Debug, Deserialize)]
pub struct WireContentState {
    #[serde(default)]
    pub blocks: Vec<WireBlock>,
}

#[derive(Debug, Deserialize)]
pub struct WireBlock {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub media: Vec<WireMedia>,
    #[serde(default)]
    pub entities: Option<WireEntities>,
}

#[derive(Debug, Deserialize)]
pub struct WireCoverMedia {
    #[serde(default)]
    pub media_info: Option<WireMediaInfo>,
}

#[derive(Debug, Deserialize)]
pub struct WireMediaInfo {
    #[serde(default)]
    pub original_img_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WireArticleMetadata {
    #[serde(default)]
    pub first_published_at_secs: Option<i64>,
}
