use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// --- PostgreSQL Enums ---

/// Recency bucket derived from `published_at`. Recomputed on every pass.
#[derive(sqlx::Type, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[sqlx(type_name = "article_tag", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ArticleTag {
    Day,
    Week,
    History,
}

#[derive(sqlx::Type, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[sqlx(type_name = "article_source", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Harvested,
    Manual,
}

/// --- Tables ---

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Article {
    pub id: Uuid,
    pub source_post_id: String,
    pub article_id: Option<String>,
    pub slug: Option<String>,
    /// Slug this row will ask for; follows the English title once known.
    pub slug_base: String,
    pub title: String,
    pub title_english: Option<String>,
    pub content: String,
    pub post_text: String,
    pub content_checksum: String,
    pub word_count: i32,
    pub summary_english: Option<String>,
    pub summary_secondary: Option<String>,
    pub language: Option<String>,
    pub category: Option<String>,
    pub author_handle: String,
    pub author_name: String,
    pub author_avatar: Option<String>,
    pub permalink: String,
    pub source_url: Option<String>,
    pub cover_image: Option<String>,
    pub media: Vec<String>,
    pub views: i64,
    pub likes: i64,
    pub replies: i64,
    pub reposts: i64,
    pub bookmarks: i64,
    pub score: i32,
    pub indexed: bool,
    pub tag: Option<ArticleTag>,
    pub summary_generated_at: Option<DateTime<Utc>>,
    pub analysis_attempts: i32,
    pub last_analysis_error_at: Option<DateTime<Utc>>,
    /// Set once the low-score sweep dropped the body and enrichment.
    pub stripped_at: Option<DateTime<Utc>>,
    pub source_type: SourceType,
    pub published_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Article {
    /// Enrichment has run to completion for this row.
    pub fn is_enriched(&self) -> bool {
        self.summary_generated_at.is_some()
    }

    /// Title used for slugs and notifications; prefers the English rendering.
    pub fn display_title(&self) -> &str {
        self.title_english
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(&self.title)
    }
}

#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
pub struct SourceList {
    pub list_id: String,
    pub name: String,
    pub is_active: bool,
    pub last_scanned_at: Option<DateTime<Utc>>,
    pub last_post_count: i32,
    pub created_at: DateTime<Utc>,
}
