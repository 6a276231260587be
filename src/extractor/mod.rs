//! Raw post to candidate article mapping.
//!
//! Everything here is pure and deterministic: the same `RawPost` always
//! yields the same `CandidateArticle` (including its checksum), which is
//! what makes re-harvesting a list idempotent.

pub mod content;
pub mod slug;
pub mod urls;

use chrono::{DateTime, Utc};
use md5::Context;
use serde::Serialize;

use crate::{
    analysis::{count_words, detect_language},
    source::types::{Author, PostMetrics, RawPost},
};
pub use urls::{UrlConfidence, UrlResolution, resolve_source_url};

/// Insert/update payload produced from one post.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateArticle {
    pub source_post_id: String,
    pub article_id: String,
    pub title: String,
    pub content: String,
    pub post_text: String,
    pub content_checksum: String,
    pub word_count: usize,
    pub language: Option<String>,
    pub author: Author,
    pub permalink: String,
    pub source_url: Option<String>,
    pub url_confidence: UrlConfidence,
    pub cover_image: Option<String>,
    pub media: Vec<String>,
    pub metrics: PostMetrics,
    pub published_at: DateTime<Utc>,
}

/// Why a post is not an article.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotAnArticle {
    Repost,
    Reply,
    NoArticleCard,
    EmptyContent,
}

/// Map a post to an article, or explain why it isn't one.
pub fn extract(post: &RawPost) -> Result<CandidateArticle, NotAnArticle> {
    if post.is_repost {
        return Err(NotAnArticle::Repost);
    }
    if post.is_reply {
        return Err(NotAnArticle::Reply);
    }
    let card = post.article.as_ref().ok_or(NotAnArticle::NoArticleCard)?;

    let body = content::render_content(card);
    if body.trim().is_empty() {
        return Err(NotAnArticle::EmptyContent);
    }

    let title = content::pick_title(card, &post.text);
    let resolution = resolve_source_url(card.url.as_deref(), &post.links, &post.text);
    let checksum = checksum(&title, &body);

    Ok(CandidateArticle {
        source_post_id: post.post_id.clone(),
        article_id: card.id.clone(),
        word_count: count_words(&body),
        language: detect_language(&body),
        title,
        content: body,
        post_text: post.text.clone(),
        content_checksum: checksum,
        author: post.author.clone(),
        permalink: permalink(&post.author.handle, &post.post_id),
        source_url: resolution.url,
        url_confidence: resolution.confidence,
        cover_image: card.cover_image.clone(),
        media: content::collect_media(card),
        metrics: post.metrics,
        published_at: card.published_at.unwrap_or(post.created_at),
    })
}

pub fn permalink(handle: &str, post_id: &str) -> String {
    format!("https://x.com/{handle}/status/{post_id}")
}

fn checksum(title: &str, body: &str) -> String {
    let mut hasher = Context::new();
    hasher.consume(title.as_bytes());
    hasher.consume([0u8]);
    hasher.consume(body.as_bytes());
    format!("{:x}", hasher.compute())
}

#[cfg(test)]
mod tests;
