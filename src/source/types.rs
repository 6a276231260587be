use chrono::{DateTime, Utc};
use serde::Serialize;

/// A post that passed schema validation at the source boundary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawPost {
    pub post_id: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub author: Author,
    pub metrics: PostMetrics,
    /// Expanded URLs from the post's link entities, in order of appearance.
    pub links: Vec<String>,
    pub is_repost: bool,
    pub is_reply: bool,
    pub article: Option<ArticleCard>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Author {
    pub handle: String,
    pub name: String,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PostMetrics {
    pub views: u64,
    pub likes: u64,
    pub replies: u64,
    pub reposts: u64,
    pub bookmarks: u64,
}

/// Long-form article attached to a post.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArticleCard {
    pub id: String,
    pub title: Option<String>,
    pub preview_text: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub cover_image: Option<String>,
    pub blocks: Vec<ContentBlock>,
    pub published_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContentBlock {
    pub text: String,
    pub media: Vec<MediaRef>,
    pub links: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaRef {
    pub url: String,
    pub kind: MediaKind,
}

/// One page of a list timeline.
#[derive(Debug, Clone, Default)]
pub struct TimelinePage {
    pub posts: Vec<RawPost>,
    pub next_cursor: Option<String>,
    /// Tweet results dropped because they failed validation.
    pub rejected: usize,
}
