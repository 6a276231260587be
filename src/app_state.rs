use std::sync::Arc;

use sqlx::PgPool;
use thiserror::Error;
use tracing::warn;

use crate::{
    analysis::{AnalysisError, ChatCompletionsGateway, SummaryPolicy},
    clock::{Clock, SystemClock},
    config::Config,
    curation::QuotaGate,
    notify::{IndexNowDispatcher, NotifyError, SearchNotifier},
    pipeline::{
        ArticlePipeline, MaintenanceSettings, MaintenanceTask, PipelineDeps, PipelineSettings,
        RetryPolicy,
    },
    repositories::{ArticleStore, ListStore, PgArticleRepository, PgListRepository},
    scheduler::Scheduler,
    source::{RapidApiClient, SourceError},
};

#[derive(Error, Debug)]
pub enum StartupError {
    #[error("content source: {0}")]
    Source(#[from] SourceError),

    #[error("analysis gateway: {0}")]
    Analysis(#[from] AnalysisError),

    #[error("notifier: {0}")]
    Notify(#[from] NotifyError),
}

/// Long-lived collaborators shared by the HTTP server and the worker.
#[derive(Clone)]
pub struct Services {
    pub pipeline: Arc<ArticlePipeline>,
    pub maintenance: Arc<MaintenanceTask>,
    pub lists: Arc<dyn ListStore>,
    pub notifier: Option<Arc<dyn SearchNotifier>>,
    pub clock: Arc<dyn Clock>,
}

impl Services {
    pub fn from_config(config: &Config, pool: PgPool) -> Result<Self, StartupError> {
        let articles: Arc<dyn ArticleStore> = Arc::new(PgArticleRepository::new(pool.clone()));
        let lists: Arc<dyn ListStore> = Arc::new(PgListRepository::new(pool));
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let notifier: Option<Arc<dyn SearchNotifier>> = if config.indexnow().endpoints.is_empty() {
            warn!("no IndexNow endpoints configured, search notification disabled");
            None
        } else {
            Some(Arc::new(IndexNowDispatcher::new(
                config.indexnow(),
                config.site_base_url(),
            )?))
        };

        let deps = PipelineDeps {
            lists: lists.clone(),
            articles: articles.clone(),
            source: Arc::new(RapidApiClient::new(config.source())?),
            analysis: Arc::new(ChatCompletionsGateway::new(config.analysis())?),
            notifier: notifier.clone(),
            clock: clock.clone(),
        };
        let analysis = config.analysis();
        let pipeline = ArticlePipeline::new(
            deps,
            QuotaGate::new(articles.clone(), config.curation().daily_publish_limit),
            SummaryPolicy::new(analysis.min_words, analysis.long_form_words),
            RetryPolicy::from(config.retry()),
            PipelineSettings::from_config(config),
        );
        let maintenance = MaintenanceTask::new(
            articles,
            clock.clone(),
            MaintenanceSettings::from_config(config),
        );

        Ok(Self {
            pipeline: Arc::new(pipeline),
            maintenance: Arc::new(maintenance),
            lists,
            notifier,
            clock,
        })
    }
}

#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub cron_secret: Arc<str>,
    pub services: Services,
    pub pipeline_scheduler: Scheduler,
    pub maintenance_scheduler: Scheduler,
}

impl AppState {
    pub fn new(config: &Config, pool: PgPool, services: Services) -> Self {
        let scheduling = config.scheduler();
        let pipeline_scheduler = Scheduler::new(
            services.pipeline.clone(),
            scheduling.interval,
            services.clock.clone(),
        );
        let maintenance_scheduler = Scheduler::new(
            services.maintenance.clone(),
            scheduling.maintenance_interval,
            services.clock.clone(),
        );
        Self {
            db_pool: pool,
            cron_secret: Arc::from(config.cron_secret()),
            services,
            pipeline_scheduler,
            maintenance_scheduler,
        }
    }
}
