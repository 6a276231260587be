use async_trait::async_trait;
use reqwest::{Client, ClientBuilder};
use serde::Serialize;
use std::time::Duration;
use tracing::{info, instrument, warn};
use url::Url;

use crate::{
    config::IndexNowConfig,
    notify::{EngineResult, NotifyError, NotifyReport, SearchNotifier, validate_batch},
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Submission<'a> {
    host: &'a str,
    key: &'a str,
    key_location: String,
    url_list: &'a [String],
}

struct Engine {
    name: String,
    endpoint: Url,
}

/// IndexNow protocol client: one JSON POST per configured engine.
pub struct IndexNowDispatcher {
    http: Client,
    host: String,
    site_base_url: String,
    key: String,
    engines: Vec<Engine>,
}

impl IndexNowDispatcher {
    pub fn new(config: &IndexNowConfig, site_base_url: &str) -> Result<Self, NotifyError> {
        let site = Url::parse(site_base_url).map_err(|e| NotifyError::Config(e.to_string()))?;
        let host = site
            .host_str()
            .ok_or_else(|| NotifyError::Config(format!("{site_base_url} has no host")))?
            .to_string();

        let engines = config
            .endpoints
            .iter()
            .map(|raw| {
                let endpoint = Url::parse(raw).map_err(|e| NotifyError::Config(e.to_string()))?;
                let name = endpoint.host_str().unwrap_or(raw.as_str()).to_string();
                Ok(Engine { name, endpoint })
            })
            .collect::<Result<Vec<_>, NotifyError>>()?;
        if engines.is_empty() {
            return Err(NotifyError::Config("no IndexNow endpoints configured".into()));
        }

        let http = ClientBuilder::new()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| NotifyError::Config(e.to_string()))?;

        Ok(Self {
            http,
            host,
            site_base_url: site_base_url.trim_end_matches('/').to_string(),
            key: config.key.clone(),
            engines,
        })
    }

    async fn submit(&self, engine: &Engine, urls: &[String]) -> EngineResult {
        let body = Submission {
            host: &self.host,
            key: &self.key,
            key_location: format!("{}/{}.txt", self.site_base_url, self.key),
            url_list: urls,
        };

        let response = self
            .http
            .post(engine.endpoint.clone())
            .json(&body)
            .send()
            .await;

        match response {
            // IndexNow answers 200 OK or 202 Accepted.
            Ok(resp) if resp.status().is_success() => EngineResult {
                engine: engine.name.clone(),
                success: true,
                status: Some(resp.status().as_u16()),
                error: None,
            },
            Ok(resp) => {
                let status = resp.status();
                let detail = resp.text().await.unwrap_or_default();
                EngineResult {
                    engine: engine.name.clone(),
                    success: false,
                    status: Some(status.as_u16()),
                    error: Some(format!("http {status}: {}", detail.trim())),
                }
            }
            Err(err) => EngineResult {
                engine: engine.name.clone(),
                success: false,
                status: None,
                error: Some(err.to_string()),
            },
        }
    }
}

#[async_trait]
impl SearchNotifier for IndexNowDispatcher {
    #[instrument(skip_all, fields(urls = urls.len()))]
    async fn notify_batch(&self, urls: &[String]) -> Result<NotifyReport, NotifyError> {
        validate_batch(urls)?;

        let mut report = NotifyReport::default();
        for engine in &self.engines {
            let result = self.submit(engine, urls).await;
            if result.success {
                info!(engine = %result.engine, "urls submitted");
            } else {
                warn!(engine = %result.engine, error = ?result.error, "submission failed");
            }
            report.results.push(result);
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_site_url() {
        let config = IndexNowConfig {
            key: "k".into(),
            endpoints: vec!["https://www.bing.com/IndexNow".into()],
        };
        assert!(matches!(
            IndexNowDispatcher::new(&config, "not a url"),
            Err(NotifyError::Config(_))
        ));
    }

    #[test]
    fn requires_an_endpoint() {
        let config = IndexNowConfig {
            key: "k".into(),
            endpoints: vec![],
        };
        assert!(IndexNowDispatcher::new(&config, "https://site.test").is_err());
    }
}
