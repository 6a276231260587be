use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::{
    curation::{quota::DayWindow, score::calculate_score},
    entities::{Article, ArticleTag},
    extractor::{
        CandidateArticle,
        slug::{base_slug, with_suffix},
    },
    repositories::errors::{StoreError, is_unique_violation},
};

/// Upper bound on `-N` suffixes tried before giving up on a base slug.
pub const MAX_SLUG_ATTEMPTS: u32 = 1000;

const ARTICLE_COLUMNS: &str = "id, source_post_id, article_id, slug, slug_base, title, title_english, \
     content, post_text, content_checksum, word_count, summary_english, summary_secondary, \
     language, category, author_handle, author_name, author_avatar, permalink, source_url, \
     cover_image, media, views, likes, replies, reposts, bookmarks, score, indexed, tag, \
     summary_generated_at, analysis_attempts, last_analysis_error_at, stripped_at, source_type, \
     published_at, created_at, updated_at";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UpsertOutcome {
    pub inserted: usize,
    pub updated: usize,
    /// Rows the store refused (constraint or data errors), one per candidate.
    pub rejected: usize,
    /// Ids of every inserted or updated row, in batch order.
    pub ids: Vec<Uuid>,
}

/// First half of enrichment: English analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimaryAnalysis {
    pub title_english: Option<String>,
    pub summary_english: String,
    pub category: String,
    /// Base slug recomputed with the English title.
    pub slug_base: String,
}

/// Which unenriched rows are still worth an analysis call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backlog {
    pub min_words: i32,
    /// Rows that failed this many times are left alone.
    pub max_attempts: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOutcome {
    /// The row was flipped to indexed; `used` counts it.
    Indexed { used: i64 },
    QuotaExhausted { used: i64 },
    /// Already indexed, not enriched, or gone.
    NotEligible,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRow)]
pub struct TagTarget {
    pub id: Uuid,
    pub published_at: DateTime<Utc>,
    pub tag: Option<ArticleTag>,
}

/// Every article read and write the pipeline performs.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ArticleStore: Send + Sync {
    /// Insert or update by `source_post_id`. Enrichment, slug, indexing and
    /// tag columns are never touched by this call.
    async fn upsert_articles(
        &self,
        batch: &[CandidateArticle],
    ) -> Result<UpsertOutcome, StoreError>;

    async fn find_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Article>, StoreError>;

    /// Rows still missing enrichment that are long enough to analyze and
    /// have attempts left. Never-failed rows come first, oldest first; rows
    /// that failed follow in order of their last failure.
    async fn pending_enrichment(
        &self,
        backlog: Backlog,
        limit: i64,
    ) -> Result<Vec<Article>, StoreError>;

    /// Count a failed analysis against the row. Returns the attempts so far.
    async fn record_analysis_failure(
        &self,
        id: Uuid,
        failed_at: DateTime<Utc>,
    ) -> Result<i32, StoreError>;

    async fn save_primary_analysis(
        &self,
        id: Uuid,
        analysis: &PrimaryAnalysis,
    ) -> Result<(), StoreError>;

    /// Store the secondary-language summary and mark enrichment complete.
    async fn complete_enrichment(
        &self,
        id: Uuid,
        summary_secondary: &str,
        generated_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Give row `exclude_id` the first free slug among `candidate`,
    /// `candidate-1`, `candidate-2`, ... and return it. A row that already
    /// has a slug keeps it.
    async fn assign_unique_slug(
        &self,
        candidate: &str,
        exclude_id: Uuid,
    ) -> Result<String, StoreError>;

    /// Enriched rows still without a slug, oldest first.
    async fn awaiting_slug(&self, limit: i64) -> Result<Vec<Article>, StoreError>;

    /// True while a row inserted before `id` wants the same `base` and may
    /// still claim it: already enriched, or still in `backlog`.
    async fn has_older_slug_claim(
        &self,
        id: Uuid,
        base: &str,
        backlog: Backlog,
    ) -> Result<bool, StoreError>;

    /// Enriched, slugged, not yet indexed rows at or above `min_score`,
    /// best first.
    async fn publish_candidates(
        &self,
        ids: &[Uuid],
        min_score: i32,
    ) -> Result<Vec<Article>, StoreError>;

    async fn count_indexed_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<i64, StoreError>;

    /// Atomically re-count the day's indexed rows and flip `indexed` on
    /// `id` only while the count is below `ceiling`.
    async fn index_within_quota(
        &self,
        id: Uuid,
        window: &DayWindow,
        ceiling: i64,
    ) -> Result<IndexOutcome, StoreError>;

    async fn tag_targets(&self, ids: &[Uuid]) -> Result<Vec<TagTarget>, StoreError>;

    /// All rows whose tag can still change (missing or not yet `History`).
    async fn tags_needing_refresh(&self) -> Result<Vec<TagTarget>, StoreError>;

    /// Write tags without bumping `updated_at`. Returns rows changed.
    async fn update_tags(&self, updates: &[(Uuid, ArticleTag)]) -> Result<u64, StoreError>;

    /// Delete harvested, never-indexed rows created before `older_than`
    /// that turned out not to be articles. Stripped rows are kept.
    async fn cleanup_non_articles(&self, older_than: DateTime<Utc>) -> Result<u64, StoreError>;

    /// Drop body, summaries, cover image and language from harvested,
    /// unindexed rows scoring below `below` and created before `older_than`.
    /// The row itself stays. Returns rows stripped.
    async fn strip_low_score(
        &self,
        below: i32,
        older_than: DateTime<Utc>,
        stripped_at: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    /// Enriched, slugged, unindexed rows published inside `window` at or
    /// above `min_score`, best first.
    async fn promotion_candidates(
        &self,
        window: &DayWindow,
        min_score: i32,
        limit: i64,
    ) -> Result<Vec<Article>, StoreError>;
}

#[derive(Clone)]
pub struct PgArticleRepository {
    pool: PgPool,
}

impl PgArticleRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn to_i32(value: usize) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

#[async_trait]
impl ArticleStore for PgArticleRepository {
    #[instrument(skip_all, fields(batch = batch.len()))]
    async fn upsert_articles(
        &self,
        batch: &[CandidateArticle],
    ) -> Result<UpsertOutcome, StoreError> {
        let mut outcome = UpsertOutcome::default();

        for candidate in batch {
            let score = calculate_score(&candidate.metrics, candidate.word_count);
            let result: Result<Option<(Uuid, bool)>, sqlx::Error> = sqlx::query_as(
                r#"
                INSERT INTO articles
                      (id, source_post_id, article_id, title, content, post_text,
                       content_checksum, word_count, language, author_handle, author_name,
                       author_avatar, permalink, source_url, cover_image, media,
                       views, likes, replies, reposts, bookmarks, score,
                       source_type, published_at, slug_base)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                        $17, $18, $19, $20, $21, $22, 'harvested', $23, $24)
                ON CONFLICT (source_post_id) DO UPDATE
                  SET article_id       = EXCLUDED.article_id,
                      title            = EXCLUDED.title,
                      slug_base        = CASE
                          WHEN articles.title_english IS NULL THEN EXCLUDED.slug_base
                          ELSE articles.slug_base
                      END,
                      content          = CASE
                          WHEN articles.stripped_at IS NULL THEN EXCLUDED.content
                          ELSE articles.content
                      END,
                      post_text        = EXCLUDED.post_text,
                      content_checksum = CASE
                          WHEN articles.stripped_at IS NULL THEN EXCLUDED.content_checksum
                          ELSE articles.content_checksum
                      END,
                      word_count       = CASE
                          WHEN articles.stripped_at IS NULL THEN EXCLUDED.word_count
                          ELSE articles.word_count
                      END,
                      language         = CASE
                          WHEN articles.stripped_at IS NULL
                          THEN COALESCE(EXCLUDED.language, articles.language)
                      END,
                      author_handle    = EXCLUDED.author_handle,
                      author_name      = EXCLUDED.author_name,
                      author_avatar    = COALESCE(EXCLUDED.author_avatar, articles.author_avatar),
                      permalink        = EXCLUDED.permalink,
                      source_url       = COALESCE(EXCLUDED.source_url, articles.source_url),
                      cover_image      = CASE
                          WHEN articles.stripped_at IS NULL
                          THEN COALESCE(EXCLUDED.cover_image, articles.cover_image)
                      END,
                      media            = EXCLUDED.media,
                      views            = EXCLUDED.views,
                      likes            = EXCLUDED.likes,
                      replies          = EXCLUDED.replies,
                      reposts          = EXCLUDED.reposts,
                      bookmarks        = EXCLUDED.bookmarks,
                      score            = EXCLUDED.score,
                      -- an indexed row stays in the quota day it was counted in
                      published_at     = CASE
                          WHEN articles.indexed THEN articles.published_at
                          ELSE EXCLUDED.published_at
                      END,
                      updated_at       = CASE
                          WHEN articles.content_checksum IS DISTINCT FROM EXCLUDED.content_checksum
                          THEN now()
                          ELSE articles.updated_at
                      END
                  WHERE articles.source_type = 'harvested'
                RETURNING id, (xmax = 0) AS inserted
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(&candidate.source_post_id)
            .bind(&candidate.article_id)
            .bind(&candidate.title)
            .bind(&candidate.content)
            .bind(&candidate.post_text)
            .bind(&candidate.content_checksum)
            .bind(to_i32(candidate.word_count))
            .bind(&candidate.language)
            .bind(&candidate.author.handle)
            .bind(&candidate.author.name)
            .bind(&candidate.author.avatar_url)
            .bind(&candidate.permalink)
            .bind(&candidate.source_url)
            .bind(&candidate.cover_image)
            .bind(&candidate.media)
            .bind(to_i64(candidate.metrics.views))
            .bind(to_i64(candidate.metrics.likes))
            .bind(to_i64(candidate.metrics.replies))
            .bind(to_i64(candidate.metrics.reposts))
            .bind(to_i64(candidate.metrics.bookmarks))
            .bind(score)
            .bind(candidate.published_at)
            .bind(base_slug(None, &candidate.title, &candidate.source_post_id))
            .fetch_optional(&self.pool)
            .await;

            match result {
                Ok(Some((id, true))) => {
                    outcome.inserted += 1;
                    outcome.ids.push(id);
                }
                Ok(Some((id, false))) => {
                    outcome.updated += 1;
                    outcome.ids.push(id);
                }
                Ok(None) => {
                    debug!(source_post_id = %candidate.source_post_id, "manual row left untouched");
                }
                Err(err) => match StoreError::from(err) {
                    StoreError::Rejected(reason) => {
                        warn!(source_post_id = %candidate.source_post_id, %reason, "upsert rejected");
                        outcome.rejected += 1;
                    }
                    other => return Err(other),
                },
            }
        }

        Ok(outcome)
    }

    async fn find_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Article>, StoreError> {
        let sql = format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles WHERE id = ANY($1) ORDER BY created_at, id"
        );
        let rows = sqlx::query_as::<_, Article>(&sql)
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn pending_enrichment(
        &self,
        backlog: Backlog,
        limit: i64,
    ) -> Result<Vec<Article>, StoreError> {
        let sql = format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles
             WHERE summary_generated_at IS NULL
               AND stripped_at IS NULL
               AND word_count >= $1
               AND analysis_attempts < $2
             ORDER BY last_analysis_error_at NULLS FIRST, created_at, id
             LIMIT $3"
        );
        let rows = sqlx::query_as::<_, Article>(&sql)
            .bind(backlog.min_words)
            .bind(backlog.max_attempts)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn record_analysis_failure(
        &self,
        id: Uuid,
        failed_at: DateTime<Utc>,
    ) -> Result<i32, StoreError> {
        let attempts: Option<i32> = sqlx::query_scalar(
            r#"
            UPDATE articles
            SET analysis_attempts      = analysis_attempts + 1,
                last_analysis_error_at = $2
            WHERE id = $1
            RETURNING analysis_attempts
            "#,
        )
        .bind(id)
        .bind(failed_at)
        .fetch_optional(&self.pool)
        .await?;
        attempts.ok_or(StoreError::NotFound)
    }

    async fn save_primary_analysis(
        &self,
        id: Uuid,
        analysis: &PrimaryAnalysis,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE articles
            SET title_english   = COALESCE($2, title_english),
                summary_english = $3,
                category        = $4,
                slug_base       = $5,
                updated_at      = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&analysis.title_english)
        .bind(&analysis.summary_english)
        .bind(&analysis.category)
        .bind(&analysis.slug_base)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn complete_enrichment(
        &self,
        id: Uuid,
        summary_secondary: &str,
        generated_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE articles
            SET summary_secondary    = $2,
                summary_generated_at = $3,
                updated_at           = now()
            WHERE id = $1 AND summary_english IS NOT NULL
            "#,
        )
        .bind(id)
        .bind(summary_secondary)
        .bind(generated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn assign_unique_slug(
        &self,
        candidate: &str,
        exclude_id: Uuid,
    ) -> Result<String, StoreError> {
        let existing: Option<Option<String>> =
            sqlx::query_scalar("SELECT slug FROM articles WHERE id = $1")
                .bind(exclude_id)
                .fetch_optional(&self.pool)
                .await?;
        match existing {
            None => return Err(StoreError::NotFound),
            Some(Some(slug)) => return Ok(slug),
            Some(None) => {}
        }

        for attempt in 0..MAX_SLUG_ATTEMPTS {
            let slug = with_suffix(candidate, attempt);

            let taken: bool = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM articles WHERE slug = $1 AND id <> $2)",
            )
            .bind(&slug)
            .bind(exclude_id)
            .fetch_one(&self.pool)
            .await?;
            if taken {
                continue;
            }

            let claimed = sqlx::query_scalar::<_, String>(
                "UPDATE articles SET slug = $1 WHERE id = $2 AND slug IS NULL RETURNING slug",
            )
            .bind(&slug)
            .bind(exclude_id)
            .fetch_optional(&self.pool)
            .await;

            match claimed {
                Ok(Some(slug)) => return Ok(slug),
                // Another run slugged this row in the meantime.
                Ok(None) => {
                    let current: Option<String> =
                        sqlx::query_scalar("SELECT slug FROM articles WHERE id = $1")
                            .bind(exclude_id)
                            .fetch_one(&self.pool)
                            .await?;
                    return current.ok_or(StoreError::NotFound);
                }
                Err(err) if is_unique_violation(&err) => {
                    debug!(%slug, "slug claimed concurrently, trying next suffix");
                    continue;
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(StoreError::SlugExhausted(candidate.to_string()))
    }

    async fn awaiting_slug(&self, limit: i64) -> Result<Vec<Article>, StoreError> {
        let sql = format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles
             WHERE slug IS NULL AND summary_generated_at IS NOT NULL
             ORDER BY created_at, id
             LIMIT $1"
        );
        let rows = sqlx::query_as::<_, Article>(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn has_older_slug_claim(
        &self,
        id: Uuid,
        base: &str,
        backlog: Backlog,
    ) -> Result<bool, StoreError> {
        let held: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1
                FROM articles older
                JOIN articles target ON target.id = $1
                WHERE older.slug_base = $2
                  AND older.slug IS NULL
                  AND older.id <> target.id
                  AND older.stripped_at IS NULL
                  AND (older.created_at, older.id) < (target.created_at, target.id)
                  AND (older.summary_generated_at IS NOT NULL
                       OR (older.word_count >= $3 AND older.analysis_attempts < $4))
            )
            "#,
        )
        .bind(id)
        .bind(base)
        .bind(backlog.min_words)
        .bind(backlog.max_attempts)
        .fetch_one(&self.pool)
        .await?;
        Ok(held)
    }

    async fn publish_candidates(
        &self,
        ids: &[Uuid],
        min_score: i32,
    ) -> Result<Vec<Article>, StoreError> {
        let sql = format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles
             WHERE id = ANY($1)
               AND summary_generated_at IS NOT NULL
               AND slug IS NOT NULL
               AND NOT indexed
               AND score >= $2
             ORDER BY score DESC, published_at DESC, id"
        );
        let rows = sqlx::query_as::<_, Article>(&sql)
            .bind(ids)
            .bind(min_score)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn count_indexed_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM articles WHERE indexed AND published_at >= $1 AND published_at < $2",
        )
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    #[instrument(skip(self, window), fields(day = %window.date))]
    async fn index_within_quota(
        &self,
        id: Uuid,
        window: &DayWindow,
        ceiling: i64,
    ) -> Result<IndexOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;

        // Serializes concurrent runs publishing into the same day.
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(window.lock_key())
            .execute(&mut *tx)
            .await?;

        let used: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM articles WHERE indexed AND published_at >= $1 AND published_at < $2",
        )
        .bind(window.start)
        .bind(window.end)
        .fetch_one(&mut *tx)
        .await?;

        if used >= ceiling {
            tx.rollback().await?;
            return Ok(IndexOutcome::QuotaExhausted { used });
        }

        let flipped = sqlx::query(
            r#"
            UPDATE articles
            SET indexed = TRUE, updated_at = now()
            WHERE id = $1 AND NOT indexed AND summary_generated_at IS NOT NULL
            "#,
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        if flipped.rows_affected() == 0 {
            Ok(IndexOutcome::NotEligible)
        } else {
            Ok(IndexOutcome::Indexed { used: used + 1 })
        }
    }

    async fn tag_targets(&self, ids: &[Uuid]) -> Result<Vec<TagTarget>, StoreError> {
        let rows = sqlx::query_as::<_, TagTarget>(
            "SELECT id, published_at, tag FROM articles WHERE id = ANY($1) ORDER BY published_at, id",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn tags_needing_refresh(&self) -> Result<Vec<TagTarget>, StoreError> {
        let rows = sqlx::query_as::<_, TagTarget>(
            r#"
            SELECT id, published_at, tag FROM articles
            WHERE tag IS NULL OR tag <> 'history'
            ORDER BY published_at, id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn update_tags(&self, updates: &[(Uuid, ArticleTag)]) -> Result<u64, StoreError> {
        if updates.is_empty() {
            return Ok(0);
        }
        let mut tx = self.pool.begin().await?;
        let mut changed = 0;
        for (id, tag) in updates {
            let result =
                sqlx::query("UPDATE articles SET tag = $2 WHERE id = $1 AND tag IS DISTINCT FROM $2")
                    .bind(id)
                    .bind(tag)
                    .execute(&mut *tx)
                    .await?;
            changed += result.rows_affected();
        }
        tx.commit().await?;
        Ok(changed)
    }

    async fn cleanup_non_articles(&self, older_than: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            DELETE FROM articles
            WHERE source_type = 'harvested'
              AND NOT indexed
              AND stripped_at IS NULL
              AND created_at < $1
              AND (post_text LIKE 'RT @%' OR article_id IS NULL OR btrim(content) = '')
            "#,
        )
        .bind(older_than)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    #[instrument(skip(self))]
    async fn strip_low_score(
        &self,
        below: i32,
        older_than: DateTime<Utc>,
        stripped_at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE articles
            SET content              = '',
                word_count           = 0,
                summary_english      = NULL,
                summary_secondary    = NULL,
                summary_generated_at = NULL,
                cover_image          = NULL,
                language             = NULL,
                stripped_at          = $3,
                updated_at           = now()
            WHERE source_type = 'harvested'
              AND NOT indexed
              AND stripped_at IS NULL
              AND score < $1
              AND created_at < $2
            "#,
        )
        .bind(below)
        .bind(older_than)
        .bind(stripped_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn promotion_candidates(
        &self,
        window: &DayWindow,
        min_score: i32,
        limit: i64,
    ) -> Result<Vec<Article>, StoreError> {
        let sql = format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles
             WHERE NOT indexed
               AND summary_generated_at IS NOT NULL
               AND slug IS NOT NULL
               AND score >= $3
               AND published_at >= $1 AND published_at < $2
             ORDER BY score DESC, published_at DESC, id
             LIMIT $4"
        );
        let rows = sqlx::query_as::<_, Article>(&sql)
            .bind(window.start)
            .bind(window.end)
            .bind(min_score)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }
}
