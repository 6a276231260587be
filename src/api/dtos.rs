use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{notify::EngineResult, scheduler::SchedulerStats};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SchedulerStatusResponse {
    pub pipeline: SchedulerStats,
    pub maintenance: SchedulerStats,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SchedulerToggleResponse {
    /// False when the scheduler was already in the requested state.
    pub changed: bool,
    pub status: SchedulerStatusResponse,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct QuotaResponse {
    pub date: NaiveDate,
    pub allowed: bool,
    pub used: i64,
    pub remaining: i64,
    pub limit: i64,
}

/// Either full URLs or article slugs; slugs are expanded against the site URL.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct NotifyRequest {
    #[serde(default)]
    pub urls: Vec<String>,
    #[serde(default)]
    pub slugs: Vec<String>,
}

impl NotifyRequest {
    pub fn into_urls(self, site_base_url: &str) -> Result<Vec<String>, String> {
        for url in &self.urls {
            let parsed = url::Url::parse(url).map_err(|_| format!("invalid url '{url}'"))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(format!("invalid url '{url}'"));
            }
        }
        let mut urls = self.urls;
        urls.extend(
            self.slugs
                .iter()
                .map(|slug| crate::pipeline::article_url(site_base_url, slug)),
        );
        Ok(urls)
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct NotifyResponse {
    pub submitted: usize,
    pub all_succeeded: bool,
    pub results: Vec<EngineResult>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SetListActiveRequest {
    pub is_active: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SetListActiveResponse {
    pub list_id: String,
    pub is_active: bool,
}
