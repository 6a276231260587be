use async_trait::async_trait;
use reqwest::{Client, ClientBuilder, header::RETRY_AFTER};
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

use crate::{
    config::SourceConfig,
    source::{errors::SourceError, parser::parse_timeline, types::TimelinePage},
};

const USER_AGENT: &str = "HarvesterBot/0.1";
const PAGE_SIZE: &str = "20";
const MAX_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Anything that can hand out pages of posts for a list.
///
/// Implementations apply their own timeout and never retry; the pipeline
/// owns the retry policy.
#[async_trait]
pub trait ContentSource: Send + Sync {
    async fn fetch_list_posts(
        &self,
        list_id: &str,
        cursor: Option<&str>,
    ) -> Result<TimelinePage, SourceError>;
}

/// List-timeline client for the RapidAPI hosted twitter API.
#[derive(Clone)]
pub struct RapidApiClient {
    http: Client,
    base_url: Url,
    api_key: String,
    api_host: String,
}

impl RapidApiClient {
    pub fn new(config: &SourceConfig) -> Result<Self, SourceError> {
        let base_url = Url::parse(&format!("https://{}/", config.api_host))?;
        Self::with_base_url(config, base_url)
    }

    /// Point the client at a different origin (used against mock servers).
    pub fn with_base_url(config: &SourceConfig, base_url: Url) -> Result<Self, SourceError> {
        let http = ClientBuilder::new()
            .connect_timeout(config.timeout.min(MAX_CONNECT_TIMEOUT))
            .timeout(config.timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| SourceError::Unavailable(e.to_string()))?;

        Ok(Self {
            http,
            base_url,
            api_key: config.api_key.clone(),
            api_host: config.api_host.clone(),
        })
    }
}

#[async_trait]
impl ContentSource for RapidApiClient {
    #[instrument(skip(self), fields(list_id = %list_id))]
    async fn fetch_list_posts(
        &self,
        list_id: &str,
        cursor: Option<&str>,
    ) -> Result<TimelinePage, SourceError> {
        let mut url = self.base_url.join("list-timeline")?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("listId", list_id);
            query.append_pair("count", PAGE_SIZE);
            if let Some(cursor) = cursor {
                query.append_pair("cursor", cursor);
            }
        }

        let response = self
            .http
            .get(url)
            .header("X-RapidAPI-Key", &self.api_key)
            .header("X-RapidAPI-Host", &self.api_host)
            .send()
            .await
            .map_err(SourceError::from_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(match SourceError::from_status(status, retry_after) {
                SourceError::NotFound(_) => SourceError::NotFound(list_id.to_string()),
                other => other,
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(SourceError::from_reqwest_error)?;
        let page = parse_timeline(&body)?;

        debug!(
            posts = page.posts.len(),
            rejected = page.rejected,
            has_next = page.next_cursor.is_some(),
            "fetched list page"
        );
        Ok(page)
    }
}
