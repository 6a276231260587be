//! In-process stores used by unit tests. Mirrors the Postgres semantics the
//! pipeline relies on (conflict key, slug uniqueness, quota re-count).

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    curation::{quota::DayWindow, score::calculate_score},
    entities::{Article, ArticleTag, SourceList, SourceType},
    extractor::{
        CandidateArticle,
        slug::{base_slug, with_suffix},
    },
    repositories::{
        articles::{
            ArticleStore, Backlog, IndexOutcome, MAX_SLUG_ATTEMPTS, PrimaryAnalysis, TagTarget,
            UpsertOutcome,
        },
        errors::StoreError,
        lists::ListStore,
    },
};

#[derive(Default)]
struct State {
    articles: Vec<Article>,
    lists: Vec<SourceList>,
    unavailable: bool,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, State>, StoreError> {
        let guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if guard.unavailable {
            return Err(StoreError::Unavailable("connection refused".into()));
        }
        Ok(guard)
    }

    /// Make every subsequent call fail as if the database were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).unavailable = unavailable;
    }

    pub fn add_list(&self, list_id: &str, active: bool) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.lists.push(SourceList {
            list_id: list_id.to_string(),
            name: list_id.to_string(),
            is_active: active,
            last_scanned_at: None,
            last_post_count: 0,
            created_at: Utc::now(),
        });
    }

    pub fn lists(&self) -> Vec<SourceList> {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .lists
            .clone()
    }

    pub fn articles(&self) -> Vec<Article> {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .articles
            .clone()
    }

    pub fn article_by_post(&self, source_post_id: &str) -> Option<Article> {
        self.articles()
            .into_iter()
            .find(|a| a.source_post_id == source_post_id)
    }

    /// Insert a fully-formed row, bypassing harvest.
    pub fn insert(&self, article: Article) {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .articles
            .push(article);
    }

    pub fn update<F: FnOnce(&mut Article)>(&self, id: Uuid, f: F) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(article) = state.articles.iter_mut().find(|a| a.id == id) {
            f(article);
        }
    }
}

fn blank_row(source_post_id: &str, published_at: DateTime<Utc>, now: DateTime<Utc>) -> Article {
    Article {
        id: Uuid::new_v4(),
        source_post_id: source_post_id.to_string(),
        article_id: None,
        slug: None,
        slug_base: String::new(),
        title: String::new(),
        title_english: None,
        content: String::new(),
        post_text: String::new(),
        content_checksum: String::new(),
        word_count: 0,
        summary_english: None,
        summary_secondary: None,
        language: None,
        category: None,
        author_handle: String::new(),
        author_name: String::new(),
        author_avatar: None,
        permalink: String::new(),
        source_url: None,
        cover_image: None,
        media: Vec::new(),
        views: 0,
        likes: 0,
        replies: 0,
        reposts: 0,
        bookmarks: 0,
        score: 0,
        indexed: false,
        tag: None,
        summary_generated_at: None,
        analysis_attempts: 0,
        last_analysis_error_at: None,
        stripped_at: None,
        source_type: SourceType::Harvested,
        published_at,
        created_at: now,
        updated_at: now,
    }
}

fn new_row(candidate: &CandidateArticle, score: i32, now: DateTime<Utc>) -> Article {
    let mut article = blank_row(&candidate.source_post_id, candidate.published_at, now);
    apply_candidate(&mut article, candidate, score, now);
    article
}

/// An enriched, slugged, unindexed row for tests that bypass harvest.
pub fn enriched_row(id: Uuid, slug: &str, published_at: DateTime<Utc>) -> Article {
    let now = Utc::now();
    let mut row = blank_row(slug, published_at, now);
    row.id = id;
    row.article_id = Some(format!("card-{slug}"));
    row.slug = Some(slug.to_string());
    row.slug_base = slug.to_string();
    row.title = slug.replace('-', " ");
    row.content = "body".to_string();
    row.post_text = format!("New essay: {slug}");
    row.word_count = 300;
    row.summary_english = Some(format!("Summary of {slug}"));
    row.summary_secondary = Some(format!("[zh] Summary of {slug}"));
    row.summary_generated_at = Some(now);
    row
}

fn apply_candidate(
    article: &mut Article,
    candidate: &CandidateArticle,
    score: i32,
    now: DateTime<Utc>,
) {
    let stripped = article.stripped_at.is_some();
    if !stripped && article.content_checksum != candidate.content_checksum {
        article.updated_at = now;
    }
    article.article_id = Some(candidate.article_id.clone());
    article.title = candidate.title.clone();
    if article.title_english.is_none() {
        article.slug_base = base_slug(None, &candidate.title, &candidate.source_post_id);
    }
    article.post_text = candidate.post_text.clone();
    if !stripped {
        article.content = candidate.content.clone();
        article.content_checksum = candidate.content_checksum.clone();
        article.word_count = i32::try_from(candidate.word_count).unwrap_or(i32::MAX);
        article.language = candidate.language.clone().or(article.language.take());
        article.cover_image = candidate.cover_image.clone().or(article.cover_image.take());
    }
    article.author_handle = candidate.author.handle.clone();
    article.author_name = candidate.author.name.clone();
    article.author_avatar = candidate
        .author
        .avatar_url
        .clone()
        .or(article.author_avatar.take());
    article.permalink = candidate.permalink.clone();
    article.source_url = candidate.source_url.clone().or(article.source_url.take());
    article.media = candidate.media.clone();
    article.views = candidate.metrics.views as i64;
    article.likes = candidate.metrics.likes as i64;
    article.replies = candidate.metrics.replies as i64;
    article.reposts = candidate.metrics.reposts as i64;
    article.bookmarks = candidate.metrics.bookmarks as i64;
    article.score = score;
    if !article.indexed {
        article.published_at = candidate.published_at;
    }
}

fn in_backlog(a: &Article, backlog: Backlog) -> bool {
    a.summary_generated_at.is_none()
        && a.stripped_at.is_none()
        && a.word_count >= backlog.min_words
        && a.analysis_attempts < backlog.max_attempts
}

fn count_indexed(articles: &[Article], start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    articles
        .iter()
        .filter(|a| a.indexed && a.published_at >= start && a.published_at < end)
        .count() as i64
}

fn tag_target(a: &Article) -> TagTarget {
    TagTarget {
        id: a.id,
        published_at: a.published_at,
        tag: a.tag,
    }
}

#[async_trait]
impl ArticleStore for MemoryStore {
    async fn upsert_articles(
        &self,
        batch: &[CandidateArticle],
    ) -> Result<UpsertOutcome, StoreError> {
        let mut state = self.lock()?;
        let now = Utc::now();
        let mut outcome = UpsertOutcome::default();

        for candidate in batch {
            let score = calculate_score(&candidate.metrics, candidate.word_count);
            match state
                .articles
                .iter_mut()
                .find(|a| a.source_post_id == candidate.source_post_id)
            {
                Some(existing) if existing.source_type == SourceType::Manual => {}
                Some(existing) => {
                    apply_candidate(existing, candidate, score, now);
                    outcome.updated += 1;
                    outcome.ids.push(existing.id);
                }
                None => {
                    let row = new_row(candidate, score, now);
                    outcome.inserted += 1;
                    outcome.ids.push(row.id);
                    state.articles.push(row);
                }
            }
        }
        Ok(outcome)
    }

    async fn find_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Article>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .articles
            .iter()
            .filter(|a| ids.contains(&a.id))
            .cloned()
            .collect())
    }

    async fn pending_enrichment(
        &self,
        backlog: Backlog,
        limit: i64,
    ) -> Result<Vec<Article>, StoreError> {
        let state = self.lock()?;
        let mut rows: Vec<Article> = state
            .articles
            .iter()
            .filter(|a| in_backlog(a, backlog))
            .cloned()
            .collect();
        // Stable: ties keep insertion order. `None` sorts first.
        rows.sort_by_key(|a| a.last_analysis_error_at);
        rows.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(rows)
    }

    async fn record_analysis_failure(
        &self,
        id: Uuid,
        failed_at: DateTime<Utc>,
    ) -> Result<i32, StoreError> {
        let mut state = self.lock()?;
        let article = state
            .articles
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or(StoreError::NotFound)?;
        article.analysis_attempts += 1;
        article.last_analysis_error_at = Some(failed_at);
        Ok(article.analysis_attempts)
    }

    async fn save_primary_analysis(
        &self,
        id: Uuid,
        analysis: &PrimaryAnalysis,
    ) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        let article = state
            .articles
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or(StoreError::NotFound)?;
        if analysis.title_english.is_some() {
            article.title_english = analysis.title_english.clone();
        }
        article.summary_english = Some(analysis.summary_english.clone());
        article.category = Some(analysis.category.clone());
        article.slug_base = analysis.slug_base.clone();
        Ok(())
    }

    async fn complete_enrichment(
        &self,
        id: Uuid,
        summary_secondary: &str,
        generated_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        let article = state
            .articles
            .iter_mut()
            .find(|a| a.id == id && a.summary_english.is_some())
            .ok_or(StoreError::NotFound)?;
        article.summary_secondary = Some(summary_secondary.to_string());
        article.summary_generated_at = Some(generated_at);
        Ok(())
    }

    async fn assign_unique_slug(
        &self,
        candidate: &str,
        exclude_id: Uuid,
    ) -> Result<String, StoreError> {
        let mut state = self.lock()?;
        let index = state
            .articles
            .iter()
            .position(|a| a.id == exclude_id)
            .ok_or(StoreError::NotFound)?;
        if let Some(slug) = &state.articles[index].slug {
            return Ok(slug.clone());
        }

        for attempt in 0..MAX_SLUG_ATTEMPTS {
            let slug = with_suffix(candidate, attempt);
            let taken = state
                .articles
                .iter()
                .any(|a| a.id != exclude_id && a.slug.as_deref() == Some(slug.as_str()));
            if !taken {
                state.articles[index].slug = Some(slug.clone());
                return Ok(slug);
            }
        }
        Err(StoreError::SlugExhausted(candidate.to_string()))
    }

    async fn awaiting_slug(&self, limit: i64) -> Result<Vec<Article>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .articles
            .iter()
            .filter(|a| a.slug.is_none() && a.is_enriched())
            .take(usize::try_from(limit).unwrap_or(0))
            .cloned()
            .collect())
    }

    async fn has_older_slug_claim(
        &self,
        id: Uuid,
        base: &str,
        backlog: Backlog,
    ) -> Result<bool, StoreError> {
        let state = self.lock()?;
        // Rows are kept in insertion order.
        let Some(position) = state.articles.iter().position(|a| a.id == id) else {
            return Ok(false);
        };
        Ok(state.articles[..position].iter().any(|older| {
            older.slug_base == base
                && older.slug.is_none()
                && older.stripped_at.is_none()
                && (older.is_enriched() || in_backlog(older, backlog))
        }))
    }

    async fn publish_candidates(
        &self,
        ids: &[Uuid],
        min_score: i32,
    ) -> Result<Vec<Article>, StoreError> {
        let state = self.lock()?;
        let mut rows: Vec<Article> = state
            .articles
            .iter()
            .filter(|a| {
                ids.contains(&a.id)
                    && a.is_enriched()
                    && a.slug.is_some()
                    && !a.indexed
                    && a.score >= min_score
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then(b.published_at.cmp(&a.published_at))
        });
        Ok(rows)
    }

    async fn count_indexed_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        let state = self.lock()?;
        Ok(count_indexed(&state.articles, start, end))
    }

    async fn index_within_quota(
        &self,
        id: Uuid,
        window: &DayWindow,
        ceiling: i64,
    ) -> Result<IndexOutcome, StoreError> {
        let mut state = self.lock()?;
        let used = count_indexed(&state.articles, window.start, window.end);
        if used >= ceiling {
            return Ok(IndexOutcome::QuotaExhausted { used });
        }
        match state
            .articles
            .iter_mut()
            .find(|a| a.id == id && !a.indexed && a.summary_generated_at.is_some())
        {
            Some(article) => {
                article.indexed = true;
                Ok(IndexOutcome::Indexed { used: used + 1 })
            }
            None => Ok(IndexOutcome::NotEligible),
        }
    }

    async fn tag_targets(&self, ids: &[Uuid]) -> Result<Vec<TagTarget>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .articles
            .iter()
            .filter(|a| ids.contains(&a.id))
            .map(tag_target)
            .collect())
    }

    async fn tags_needing_refresh(&self) -> Result<Vec<TagTarget>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .articles
            .iter()
            .filter(|a| a.tag != Some(ArticleTag::History))
            .map(tag_target)
            .collect())
    }

    async fn update_tags(&self, updates: &[(Uuid, ArticleTag)]) -> Result<u64, StoreError> {
        let mut state = self.lock()?;
        let mut changed = 0;
        for (id, tag) in updates {
            if let Some(article) = state.articles.iter_mut().find(|a| a.id == *id)
                && article.tag != Some(*tag)
            {
                article.tag = Some(*tag);
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn cleanup_non_articles(&self, older_than: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut state = self.lock()?;
        let before = state.articles.len();
        state.articles.retain(|a| {
            let junk = a.post_text.starts_with("RT @")
                || a.article_id.is_none()
                || a.content.trim().is_empty();
            !(a.source_type == SourceType::Harvested
                && !a.indexed
                && a.stripped_at.is_none()
                && a.created_at < older_than
                && junk)
        });
        Ok((before - state.articles.len()) as u64)
    }

    async fn strip_low_score(
        &self,
        below: i32,
        older_than: DateTime<Utc>,
        stripped_at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let mut state = self.lock()?;
        let mut stripped = 0;
        for a in state.articles.iter_mut().filter(|a| {
            a.source_type == SourceType::Harvested
                && !a.indexed
                && a.stripped_at.is_none()
                && a.score < below
                && a.created_at < older_than
        }) {
            a.content.clear();
            a.word_count = 0;
            a.summary_english = None;
            a.summary_secondary = None;
            a.summary_generated_at = None;
            a.cover_image = None;
            a.language = None;
            a.stripped_at = Some(stripped_at);
            stripped += 1;
        }
        Ok(stripped)
    }

    async fn promotion_candidates(
        &self,
        window: &DayWindow,
        min_score: i32,
        limit: i64,
    ) -> Result<Vec<Article>, StoreError> {
        let state = self.lock()?;
        let mut rows: Vec<Article> = state
            .articles
            .iter()
            .filter(|a| {
                !a.indexed
                    && a.is_enriched()
                    && a.slug.is_some()
                    && a.score >= min_score
                    && a.published_at >= window.start
                    && a.published_at < window.end
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then(b.published_at.cmp(&a.published_at))
        });
        rows.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(rows)
    }
}

#[async_trait]
impl ListStore for MemoryStore {
    async fn active_lists(&self) -> Result<Vec<SourceList>, StoreError> {
        let state = self.lock()?;
        Ok(state.lists.iter().filter(|l| l.is_active).cloned().collect())
    }

    async fn set_active(&self, list_id: &str, active: bool) -> Result<bool, StoreError> {
        let mut state = self.lock()?;
        match state.lists.iter_mut().find(|l| l.list_id == list_id) {
            Some(list) => {
                list.is_active = active;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn mark_scanned(
        &self,
        list_id: &str,
        post_count: i32,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        if let Some(list) = state.lists.iter_mut().find(|l| l.list_id == list_id) {
            list.last_scanned_at = Some(at);
            list.last_post_count = post_count;
        }
        Ok(())
    }
}
