pub mod indexnow;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

pub use indexnow::IndexNowDispatcher;

/// Most URLs a single notification may carry.
pub const MAX_BATCH: usize = 10_000;

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("notifier misconfigured: {0}")]
    Config(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct EngineResult {
    pub engine: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct NotifyReport {
    pub results: Vec<EngineResult>,
}

impl NotifyReport {
    pub fn all_succeeded(&self) -> bool {
        !self.results.is_empty() && self.results.iter().all(|r| r.success)
    }

    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }
}

/// Pushes freshly published URLs to search engines.
#[async_trait]
pub trait SearchNotifier: Send + Sync {
    /// One result per engine; an engine failing never hides the others.
    async fn notify_batch(&self, urls: &[String]) -> Result<NotifyReport, NotifyError>;
}

pub fn validate_batch(urls: &[String]) -> Result<(), NotifyError> {
    if urls.is_empty() {
        return Err(NotifyError::Validation("no urls to submit".into()));
    }
    if urls.len() > MAX_BATCH {
        return Err(NotifyError::Validation(format!(
            "{} urls exceeds the batch limit of {MAX_BATCH}",
            urls.len()
        )));
    }
    Ok(())
}
