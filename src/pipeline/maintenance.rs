use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;

use crate::{
    clock::Clock,
    config::Config,
    curation::{
        quota::DayWindow,
        tags::{TagRefresh, refresh_tags},
    },
    repositories::{ArticleStore, IndexOutcome, StoreError},
    scheduler::{ScheduledTask, TaskOutcome},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct CleanupReport {
    pub deleted: u64,
    pub grace_hours: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct StripReport {
    pub stripped: u64,
    pub below_score: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct PromotionReport {
    pub date: NaiveDate,
    /// Indexed rows in the day before and after the sweep.
    pub before: i64,
    pub after: i64,
    pub promoted: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaintenanceSettings {
    pub grace_hours: i64,
    pub min_index_score: i32,
    pub daily_minimum: i64,
}

impl Default for MaintenanceSettings {
    fn default() -> Self {
        Self {
            grace_hours: 48,
            min_index_score: 65,
            daily_minimum: 5,
        }
    }
}

impl MaintenanceSettings {
    pub fn from_config(config: &Config) -> Self {
        let curation = config.curation();
        Self {
            grace_hours: curation.cleanup_grace_hours,
            min_index_score: curation.min_index_score,
            daily_minimum: curation.daily_publish_minimum,
        }
    }
}

/// Work that runs on its own cadence: re-aging tags, dropping rows that
/// turned out not to be articles, thinning low scorers and topping up a
/// thin day from the archive.
pub struct MaintenanceTask {
    articles: Arc<dyn ArticleStore>,
    clock: Arc<dyn Clock>,
    settings: MaintenanceSettings,
}

impl MaintenanceTask {
    pub fn new(
        articles: Arc<dyn ArticleStore>,
        clock: Arc<dyn Clock>,
        settings: MaintenanceSettings,
    ) -> Self {
        Self {
            articles,
            clock,
            settings: MaintenanceSettings {
                grace_hours: settings.grace_hours.max(0),
                daily_minimum: settings.daily_minimum.max(0),
                ..settings
            },
        }
    }

    #[instrument(skip(self))]
    pub async fn refresh_tags(&self) -> Result<TagRefresh, StoreError> {
        let report = refresh_tags(self.articles.as_ref(), self.clock.now()).await?;
        info!(examined = report.examined, changed = report.changed, "tags refreshed");
        Ok(report)
    }

    fn cutoff(&self) -> DateTime<Utc> {
        self.clock.now() - Duration::hours(self.settings.grace_hours)
    }

    #[instrument(skip(self))]
    pub async fn cleanup(&self) -> Result<CleanupReport, StoreError> {
        let cutoff = self.cutoff();
        let deleted = self.articles.cleanup_non_articles(cutoff).await?;
        info!(deleted, %cutoff, "non-article rows removed");
        Ok(CleanupReport {
            deleted,
            grace_hours: self.settings.grace_hours,
        })
    }

    /// Rows below the index threshold keep title, author, link and metrics
    /// only. Rows younger than the grace window are left for their metrics
    /// to grow.
    #[instrument(skip(self))]
    pub async fn strip_low_score(&self) -> Result<StripReport, StoreError> {
        let below = self.settings.min_index_score;
        let stripped = self
            .articles
            .strip_low_score(below, self.cutoff(), self.clock.now())
            .await?;
        info!(stripped, below, "low-score rows stripped");
        Ok(StripReport {
            stripped,
            below_score: below,
        })
    }

    /// Index archived rows of today until the day holds the daily minimum.
    /// Every flip goes through the store's quota re-count, capped at the
    /// minimum.
    #[instrument(skip(self))]
    pub async fn promote(&self) -> Result<PromotionReport, StoreError> {
        let window = DayWindow::containing(self.clock.now());
        let minimum = self.settings.daily_minimum;
        let before = self
            .articles
            .count_indexed_between(window.start, window.end)
            .await?;

        let mut report = PromotionReport {
            date: window.date,
            before,
            after: before,
            promoted: Vec::new(),
        };
        if before >= minimum {
            return Ok(report);
        }

        let candidates = self
            .articles
            .promotion_candidates(&window, self.settings.min_index_score, minimum - before)
            .await?;
        for article in candidates {
            match self
                .articles
                .index_within_quota(article.id, &window, minimum)
                .await?
            {
                IndexOutcome::Indexed { used } => {
                    report.after = used;
                    report.promoted.push(article.slug.unwrap_or(article.source_post_id));
                }
                IndexOutcome::QuotaExhausted { used } => {
                    report.after = used;
                    break;
                }
                IndexOutcome::NotEligible => {
                    warn!(id = %article.id, "promotion candidate no longer eligible");
                }
            }
        }

        info!(
            day = %window.date,
            before = report.before,
            after = report.after,
            promoted = report.promoted.len(),
            "daily minimum sweep finished"
        );
        Ok(report)
    }
}

#[async_trait]
impl ScheduledTask for MaintenanceTask {
    fn name(&self) -> &'static str {
        "maintenance"
    }

    async fn execute(&self) -> TaskOutcome {
        let failures: Vec<String> = [
            self.refresh_tags().await.err(),
            self.cleanup().await.err(),
            self.strip_low_score().await.err(),
            self.promote().await.err(),
        ]
        .into_iter()
        .flatten()
        .map(|err| err.to_string())
        .collect();

        if failures.is_empty() {
            TaskOutcome::Succeeded
        } else {
            TaskOutcome::Failed(failures.join("; "))
        }
    }
}
