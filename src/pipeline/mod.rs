pub mod maintenance;
pub mod orchestrator;
pub mod retry;
pub mod run;


pub use maintenance::{
    CleanupReport, MaintenanceSettings, MaintenanceTask, PromotionReport, StripReport,
};
pub use orchestrator::{
    ArticlePipeline, PipelineDeps, PipelineError, PipelineSettings, RunRequest, article_url,
};
pub use retry::{RetryPolicy, Retryable};
pub use run::{LogEntry, LogLevel, PipelineRun, RunStatus, Step};
