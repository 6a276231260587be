use std::{collections::HashSet, sync::Arc};

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::{Instrument, debug, info_span};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    analysis::{
        AnalysisError, AnalysisGateway, AnalysisRequest, SummaryPolicy, needs_title_translation,
    },
    clock::Clock,
    config::Config,
    curation::{QuotaGate, quota::DayWindow, tags::plan_tag_updates},
    entities::Article,
    extractor::{self, CandidateArticle, UrlConfidence, slug::base_slug},
    notify::{MAX_BATCH, SearchNotifier},
    pipeline::{
        retry::RetryPolicy,
        run::{LogLevel, PipelineRun, RunStatus, Step},
    },
    repositories::{
        ArticleStore, Backlog, IndexOutcome, ListStore, StoreError, articles::PrimaryAnalysis,
    },
    scheduler::{ScheduledTask, TaskOutcome},
    source::{ContentSource, SourceError},
};

const MAX_REQUESTED_LISTS: usize = 100;
const MAX_LIST_ID_LEN: usize = 64;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Optional trigger input. Without `list_ids` every active list is harvested.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct RunRequest {
    pub list_ids: Option<Vec<String>>,
}

impl RunRequest {
    pub fn validate(&self) -> Result<(), PipelineError> {
        let Some(ids) = &self.list_ids else {
            return Ok(());
        };
        if ids.is_empty() {
            return Err(PipelineError::Validation(
                "list_ids must not be empty when provided".into(),
            ));
        }
        if ids.len() > MAX_REQUESTED_LISTS {
            return Err(PipelineError::Validation(format!(
                "at most {MAX_REQUESTED_LISTS} list_ids per run"
            )));
        }
        for id in ids {
            let well_formed = !id.is_empty()
                && id.len() <= MAX_LIST_ID_LEN
                && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
            if !well_formed {
                return Err(PipelineError::Validation(format!("invalid list id '{id}'")));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub max_pages: u32,
    pub min_index_score: i32,
    pub secondary_language: String,
    pub site_base_url: String,
    /// Rows pulled from the enrichment backlog per run.
    pub enrichment_batch: i64,
    /// Failed analyses after which a row is no longer retried.
    pub max_analysis_attempts: i32,
    /// Enriched, unslugged rows considered per run.
    pub slug_batch: i64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_pages: 3,
            min_index_score: 65,
            secondary_language: "zh".into(),
            site_base_url: "https://www.example.com".into(),
            enrichment_batch: 20,
            max_analysis_attempts: 5,
            slug_batch: 100,
        }
    }
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_pages: config.source().max_pages,
            min_index_score: config.curation().min_index_score,
            secondary_language: config.analysis().secondary_language.clone(),
            site_base_url: config.site_base_url().trim_end_matches('/').to_string(),
            max_analysis_attempts: config.analysis().max_row_attempts,
            ..Self::default()
        }
    }
}

/// Public URL of an article page.
pub fn article_url(site_base_url: &str, slug: &str) -> String {
    format!("{}/articles/{slug}", site_base_url.trim_end_matches('/'))
}

/// Everything the pipeline talks to.
#[derive(Clone)]
pub struct PipelineDeps {
    pub lists: Arc<dyn ListStore>,
    pub articles: Arc<dyn ArticleStore>,
    pub source: Arc<dyn ContentSource>,
    pub analysis: Arc<dyn AnalysisGateway>,
    pub notifier: Option<Arc<dyn SearchNotifier>>,
    pub clock: Arc<dyn Clock>,
}

/// Failures scoped to one list, row or engine.
#[derive(Error, Debug)]
enum ItemError {
    #[error(transparent)]
    Analysis(#[from] AnalysisError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ItemError {
    /// Escalate store outages, keep everything else local.
    fn escalate(self) -> Result<String, StoreError> {
        match self {
            ItemError::Store(err) if err.is_fatal() => Err(err),
            other => Ok(other.to_string()),
        }
    }
}

fn local(err: StoreError) -> Result<String, StoreError> {
    ItemError::Store(err).escalate()
}

#[derive(Debug, Default)]
struct ListHarvest {
    posts: usize,
    pages: u32,
    rejected_payloads: usize,
    candidates: Vec<CandidateArticle>,
    filtered: usize,
    page_error: Option<SourceError>,
}

#[derive(Debug, Default)]
struct RunSummary {
    lists_ok: usize,
    lists_total: usize,
    inserted: usize,
    updated: usize,
    enriched: usize,
    published: usize,
}

/// Harvest → extract → upsert → enrich → gate → tag → notify.
///
/// Safe to run concurrently with itself: dedup and quota are enforced by
/// the store, not by run-level exclusion.
pub struct ArticlePipeline {
    deps: PipelineDeps,
    quota: QuotaGate,
    policy: SummaryPolicy,
    retry: RetryPolicy,
    settings: PipelineSettings,
}

impl ArticlePipeline {
    pub fn new(
        deps: PipelineDeps,
        quota: QuotaGate,
        policy: SummaryPolicy,
        retry: RetryPolicy,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            deps,
            quota,
            policy,
            retry,
            settings,
        }
    }

    pub fn quota(&self) -> &QuotaGate {
        &self.quota
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    fn backlog(&self) -> Backlog {
        Backlog {
            min_words: i32::try_from(self.policy.min_words()).unwrap_or(i32::MAX),
            max_attempts: self.settings.max_analysis_attempts,
        }
    }

    fn log(&self, run: &mut PipelineRun, level: LogLevel, step: Step, message: impl Into<String>) {
        run.log(self.deps.clock.now(), level, step, message);
    }

    /// Execute one run. Only malformed input is an `Err`; every other
    /// outcome, including total failure, is reported in the returned run.
    pub async fn run(&self, request: &RunRequest) -> Result<PipelineRun, PipelineError> {
        request.validate()?;

        let mut run = PipelineRun::start(self.deps.clock.now());
        self.log(&mut run, LogLevel::Info, Step::Started, "pipeline run started");

        match self.run_stages(request, &mut run).await {
            Ok(summary) => {
                self.log(
                    &mut run,
                    LogLevel::Info,
                    Step::Completed,
                    format!(
                        "run completed: {}/{} lists harvested, {} inserted, {} updated, {} enriched, {} published",
                        summary.lists_ok,
                        summary.lists_total,
                        summary.inserted,
                        summary.updated,
                        summary.enriched,
                        summary.published
                    ),
                );
                run.finish(RunStatus::Completed);
            }
            Err(err) => {
                self.log(&mut run, LogLevel::Error, Step::Failed, format!("run failed: {err}"));
                run.finish(RunStatus::Failed);
            }
        }
        Ok(run)
    }

    async fn run_stages(
        &self,
        request: &RunRequest,
        run: &mut PipelineRun,
    ) -> Result<RunSummary, StoreError> {
        let mut summary = RunSummary::default();

        let touched = self.harvest(request, run, &mut summary).await?;
        let enriched = self.enrich(&touched, run).await?;
        summary.enriched = enriched.len();

        let mut relevant = touched;
        for id in enriched {
            if !relevant.contains(&id) {
                relevant.push(id);
            }
        }

        for id in self.assign_slugs(run).await? {
            if !relevant.contains(&id) {
                relevant.push(id);
            }
        }
        let published = self.gate(&relevant, run).await?;
        summary.published = published.len();
        self.tag(&relevant, run).await?;
        self.notify(&published, run).await;

        Ok(summary)
    }

    async fn harvest(
        &self,
        request: &RunRequest,
        run: &mut PipelineRun,
        summary: &mut RunSummary,
    ) -> Result<Vec<Uuid>, StoreError> {
        let mut lists = self.deps.lists.active_lists().await?;

        if let Some(wanted) = &request.list_ids {
            for id in wanted {
                if !lists.iter().any(|l| &l.list_id == id) {
                    self.log(
                        run,
                        LogLevel::Warning,
                        Step::Harvesting,
                        format!("list {id} is unknown or inactive, skipping"),
                    );
                }
            }
            lists.retain(|l| wanted.contains(&l.list_id));
        }

        summary.lists_total = lists.len();
        if lists.is_empty() {
            self.log(run, LogLevel::Warning, Step::Harvesting, "no active lists to harvest");
            return Ok(Vec::new());
        }

        let mut touched = Vec::new();
        for list in &lists {
            let span = info_span!("harvest_list", list_id = %list.list_id);
            let harvest = match self.fetch_list(&list.list_id).instrument(span).await {
                Ok(harvest) => harvest,
                Err(err) => {
                    self.log(
                        run,
                        LogLevel::Warning,
                        Step::Harvesting,
                        format!("list {} failed: {err}", list.list_id),
                    );
                    continue;
                }
            };

            if let Some(err) = &harvest.page_error {
                self.log(
                    run,
                    LogLevel::Warning,
                    Step::Harvesting,
                    format!(
                        "list {}: stopped after page {}: {err}",
                        list.list_id, harvest.pages
                    ),
                );
            }

            let outcome = match self.deps.articles.upsert_articles(&harvest.candidates).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    let reason = local(err)?;
                    self.log(
                        run,
                        LogLevel::Warning,
                        Step::Harvesting,
                        format!("list {}: upsert failed: {reason}", list.list_id),
                    );
                    continue;
                }
            };

            let post_count = i32::try_from(harvest.posts).unwrap_or(i32::MAX);
            if let Err(err) = self
                .deps
                .lists
                .mark_scanned(&list.list_id, post_count, self.deps.clock.now())
                .await
            {
                let reason = local(err)?;
                self.log(
                    run,
                    LogLevel::Warning,
                    Step::Harvesting,
                    format!("list {}: could not record scan: {reason}", list.list_id),
                );
            }

            let level = if outcome.rejected > 0 {
                LogLevel::Warning
            } else {
                LogLevel::Info
            };
            self.log(
                run,
                level,
                Step::Harvesting,
                format!(
                    "list {}: {} posts over {} pages, {} articles ({} new, {} updated, {} rejected), {} not articles, {} malformed",
                    list.list_id,
                    harvest.posts,
                    harvest.pages,
                    harvest.candidates.len(),
                    outcome.inserted,
                    outcome.updated,
                    outcome.rejected,
                    harvest.filtered,
                    harvest.rejected_payloads
                ),
            );

            summary.lists_ok += 1;
            summary.inserted += outcome.inserted;
            summary.updated += outcome.updated;
            for id in outcome.ids {
                if !touched.contains(&id) {
                    touched.push(id);
                }
            }
        }

        Ok(touched)
    }

    /// Follow cursors until exhausted, repeated or `max_pages`. A failure on
    /// the first page fails the list; later failures keep what was fetched.
    async fn fetch_list(&self, list_id: &str) -> Result<ListHarvest, SourceError> {
        let mut harvest = ListHarvest::default();
        let mut seen_cursors = HashSet::new();
        let mut seen_posts = HashSet::new();
        let mut cursor: Option<String> = None;

        while harvest.pages < self.settings.max_pages {
            let page = self
                .retry
                .run("fetch_list_posts", || {
                    self.deps.source.fetch_list_posts(list_id, cursor.as_deref())
                })
                .await;

            let page = match page {
                Ok(page) => page,
                Err(err) if harvest.pages == 0 => return Err(err),
                Err(err) => {
                    harvest.page_error = Some(err);
                    break;
                }
            };
            harvest.pages += 1;
            harvest.posts += page.posts.len();
            harvest.rejected_payloads += page.rejected;

            for post in &page.posts {
                match extractor::extract(post) {
                    Ok(candidate) => {
                        if matches!(
                            candidate.url_confidence,
                            UrlConfidence::TextScan | UrlConfidence::Unresolved
                        ) {
                            debug!(
                                post_id = %candidate.source_post_id,
                                confidence = ?candidate.url_confidence,
                                source_url = ?candidate.source_url,
                                "weak source url resolution"
                            );
                        }
                        if seen_posts.insert(candidate.source_post_id.clone()) {
                            harvest.candidates.push(candidate);
                        }
                    }
                    Err(reason) => {
                        debug!(post_id = %post.post_id, ?reason, "post filtered");
                        harvest.filtered += 1;
                    }
                }
            }

            match page.next_cursor {
                Some(next) if seen_cursors.insert(next.clone()) => cursor = Some(next),
                _ => break,
            }
        }

        Ok(harvest)
    }

    async fn enrich(&self, touched: &[Uuid], run: &mut PipelineRun) -> Result<Vec<Uuid>, StoreError> {
        if !touched.is_empty() {
            let rows = self.deps.articles.find_by_ids(touched).await?;
            for row in rows.iter().filter(|a| !a.is_enriched()) {
                let words = usize::try_from(row.word_count).unwrap_or(0);
                if self.policy.requirement(words).should_skip {
                    self.log(
                        run,
                        LogLevel::Info,
                        Step::Enriching,
                        format!(
                            "skipping analysis for {}: {words} words is below the {} word minimum",
                            row.source_post_id,
                            self.policy.min_words()
                        ),
                    );
                }
            }
        }

        let pending = self
            .deps
            .articles
            .pending_enrichment(self.backlog(), self.settings.enrichment_batch)
            .await?;

        let mut enriched = Vec::new();
        let mut deferred = 0;
        for article in &pending {
            match self.enrich_one(article).await {
                Ok(()) => enriched.push(article.id),
                Err(err) => {
                    let reason = err.escalate()?;
                    deferred += 1;
                    self.log(
                        run,
                        LogLevel::Warning,
                        Step::Enriching,
                        format!(
                            "analysis deferred for {}: {reason}",
                            article.source_post_id
                        ),
                    );
                    self.record_failure(article, run).await?;
                }
            }
        }

        self.log(
            run,
            LogLevel::Info,
            Step::Enriching,
            format!(
                "enriched {} of {} pending articles, {deferred} deferred",
                enriched.len(),
                pending.len()
            ),
        );
        Ok(enriched)
    }

    /// Push the row behind untried ones; past the limit it stops being retried.
    async fn record_failure(
        &self,
        article: &Article,
        run: &mut PipelineRun,
    ) -> Result<(), StoreError> {
        let attempts = match self
            .deps
            .articles
            .record_analysis_failure(article.id, self.deps.clock.now())
            .await
        {
            Ok(attempts) => attempts,
            Err(err) => {
                let reason = local(err)?;
                self.log(
                    run,
                    LogLevel::Warning,
                    Step::Enriching,
                    format!("could not record failure for {}: {reason}", article.source_post_id),
                );
                return Ok(());
            }
        };
        if attempts >= self.settings.max_analysis_attempts {
            self.log(
                run,
                LogLevel::Warning,
                Step::Enriching,
                format!(
                    "giving up on analysis for {} after {attempts} attempts",
                    article.source_post_id
                ),
            );
        }
        Ok(())
    }

    async fn enrich_one(&self, article: &Article) -> Result<(), ItemError> {
        let words = usize::try_from(article.word_count).unwrap_or(0);
        let requirement = self.policy.requirement(words);
        let Some(target_length) = requirement.target_length else {
            return Ok(());
        };

        // A previous run may have stored the English half already.
        let summary_english = match &article.summary_english {
            Some(summary) => summary.clone(),
            None => {
                let request = AnalysisRequest {
                    title: article.title.clone(),
                    content: article.content.clone(),
                    needs_title_translation: needs_title_translation(&article.title),
                    target_length,
                };
                let analysis = self
                    .retry
                    .run("analyze", || self.deps.analysis.analyze(request.clone()))
                    .await?;
                let slug_base = base_slug(
                    analysis.translated_title.as_deref(),
                    &article.title,
                    &article.source_post_id,
                );
                self.deps
                    .articles
                    .save_primary_analysis(
                        article.id,
                        &PrimaryAnalysis {
                            title_english: analysis.translated_title,
                            summary_english: analysis.summary.clone(),
                            category: analysis.category.as_str().to_string(),
                            slug_base,
                        },
                    )
                    .await?;
                analysis.summary
            }
        };

        let language = self.settings.secondary_language.as_str();
        let secondary = self
            .retry
            .run("translate", || {
                self.deps.analysis.translate(&summary_english, language)
            })
            .await?;
        self.deps
            .articles
            .complete_enrichment(article.id, &secondary, self.deps.clock.now())
            .await?;
        Ok(())
    }

    /// Slugs are assigned in `created_at` order so suffixes follow insertion.
    /// A row waits while an older row wanting the same base can still get
    /// enriched. Returns the rows slugged by this call.
    async fn assign_slugs(&self, run: &mut PipelineRun) -> Result<Vec<Uuid>, StoreError> {
        let rows = self
            .deps
            .articles
            .awaiting_slug(self.settings.slug_batch)
            .await?;
        let backlog = self.backlog();
        let mut assigned = Vec::new();
        for row in &rows {
            let base = base_slug(row.title_english.as_deref(), &row.title, &row.source_post_id);
            let held = match self
                .deps
                .articles
                .has_older_slug_claim(row.id, &base, backlog)
                .await
            {
                Ok(held) => held,
                Err(err) => {
                    let reason = local(err)?;
                    self.log(
                        run,
                        LogLevel::Warning,
                        Step::Enriching,
                        format!("no slug for {}: {reason}", row.source_post_id),
                    );
                    continue;
                }
            };
            if held {
                self.log(
                    run,
                    LogLevel::Info,
                    Step::Enriching,
                    format!(
                        "slug for {} waits on an older article wanting '{base}'",
                        row.source_post_id
                    ),
                );
                continue;
            }
            match self.deps.articles.assign_unique_slug(&base, row.id).await {
                Ok(_) => assigned.push(row.id),
                Err(err) => {
                    let reason = local(err)?;
                    self.log(
                        run,
                        LogLevel::Warning,
                        Step::Enriching,
                        format!("no slug for {}: {reason}", row.source_post_id),
                    );
                }
            }
        }
        if !assigned.is_empty() {
            self.log(
                run,
                LogLevel::Info,
                Step::Enriching,
                format!("assigned {} slugs", assigned.len()),
            );
        }
        Ok(assigned)
    }

    /// Re-checks the quota immediately before every flip.
    async fn gate(&self, ids: &[Uuid], run: &mut PipelineRun) -> Result<Vec<Article>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let candidates = self
            .deps
            .articles
            .publish_candidates(ids, self.settings.min_index_score)
            .await?;

        let mut published = Vec::new();
        for article in candidates {
            let window = DayWindow::containing(article.published_at);
            let decision = match self.quota.can_publish(window.date).await {
                Ok(decision) => decision,
                Err(err) => {
                    let reason = local(err)?;
                    self.log(
                        run,
                        LogLevel::Warning,
                        Step::Gating,
                        format!("quota check failed for {}: {reason}", window.date),
                    );
                    continue;
                }
            };
            let slug = article.slug.as_deref().unwrap_or_default();
            if !decision.allowed {
                self.log(
                    run,
                    LogLevel::Info,
                    Step::Gating,
                    format!("quota exceeded for {}, withholding {slug}", window.date),
                );
                continue;
            }

            match self.quota.publish(article.id, &window).await {
                Ok(IndexOutcome::Indexed { used }) => {
                    self.log(
                        run,
                        LogLevel::Info,
                        Step::Gating,
                        format!(
                            "published {slug} (score {}, {used}/{} for {})",
                            article.score,
                            self.quota.ceiling(),
                            window.date
                        ),
                    );
                    published.push(article);
                }
                Ok(IndexOutcome::QuotaExhausted { .. }) => {
                    self.log(
                        run,
                        LogLevel::Info,
                        Step::Gating,
                        format!("quota exceeded for {}, withholding {slug}", window.date),
                    );
                }
                Ok(IndexOutcome::NotEligible) => {
                    debug!(%slug, "no longer eligible for publishing");
                }
                Err(err) => {
                    let reason = local(err)?;
                    self.log(
                        run,
                        LogLevel::Warning,
                        Step::Gating,
                        format!("could not publish {slug}: {reason}"),
                    );
                }
            }
        }
        Ok(published)
    }

    async fn tag(&self, ids: &[Uuid], run: &mut PipelineRun) -> Result<(), StoreError> {
        if ids.is_empty() {
            return Ok(());
        }
        let targets = self.deps.articles.tag_targets(ids).await?;
        let updates = plan_tag_updates(&targets, self.deps.clock.now());
        let changed = match self.deps.articles.update_tags(&updates).await {
            Ok(changed) => changed,
            Err(err) => {
                let reason = local(err)?;
                self.log(run, LogLevel::Warning, Step::Tagging, format!("tag update failed: {reason}"));
                return Ok(());
            }
        };
        self.log(
            run,
            LogLevel::Info,
            Step::Tagging,
            format!("tagged {} articles, {changed} changed", targets.len()),
        );
        Ok(())
    }

    async fn notify(&self, published: &[Article], run: &mut PipelineRun) {
        let urls: Vec<String> = published
            .iter()
            .filter_map(|a| a.slug.as_deref())
            .map(|slug| article_url(&self.settings.site_base_url, slug))
            .collect();
        if urls.is_empty() {
            self.log(run, LogLevel::Info, Step::Notifying, "nothing new to announce");
            return;
        }
        let Some(notifier) = &self.deps.notifier else {
            self.log(
                run,
                LogLevel::Info,
                Step::Notifying,
                format!("notifier disabled, {} urls not announced", urls.len()),
            );
            return;
        };

        for chunk in urls.chunks(MAX_BATCH) {
            let report = match notifier.notify_batch(chunk).await {
                Ok(report) => report,
                Err(err) => {
                    self.log(run, LogLevel::Warning, Step::Notifying, err.to_string());
                    continue;
                }
            };
            for result in &report.results {
                if result.success {
                    self.log(
                        run,
                        LogLevel::Info,
                        Step::Notifying,
                        format!("{} accepted {} urls", result.engine, chunk.len()),
                    );
                } else {
                    self.log(
                        run,
                        LogLevel::Warning,
                        Step::Notifying,
                        format!(
                            "{} failed: {}",
                            result.engine,
                            result.error.as_deref().unwrap_or("unknown error")
                        ),
                    );
                }
            }
            if report.all_succeeded() {
                self.log(run, LogLevel::Info, Step::Notifying, "all engines notified");
            } else {
                self.log(
                    run,
                    LogLevel::Warning,
                    Step::Notifying,
                    format!(
                        "partial success: {}/{} engines notified",
                        report.succeeded(),
                        report.results.len()
                    ),
                );
            }
        }
    }
}

#[async_trait]
impl ScheduledTask for ArticlePipeline {
    fn name(&self) -> &'static str {
        "article-pipeline"
    }

    async fn execute(&self) -> TaskOutcome {
        match self.run(&RunRequest::default()).await {
            Ok(run) if run.status == RunStatus::Completed => TaskOutcome::Succeeded,
            Ok(run) => TaskOutcome::Failed(
                run.logs
                    .last()
                    .map(|entry| entry.message.clone())
                    .unwrap_or_else(|| "run failed".into()),
            ),
            Err(err) => TaskOutcome::Failed(err.to_string()),
        }
    }
}
