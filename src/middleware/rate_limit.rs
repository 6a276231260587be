use axum::{
    Json,
    extract::{ConnectInfo, Request, State},
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::{net::SocketAddr, sync::Arc};
use tracing::warn;

use crate::api::dtos::ErrorResponse;

/// Client key used when the connection address is unknown.
const UNKNOWN_CLIENT: &str = "local";

/// Fixed-window request counter per client IP, shared by every `/api` route.
#[derive(Clone)]
pub struct RateLimit {
    buckets: Arc<DashMap<String, Bucket>>,
    max_requests: u32,
    window: Duration,
}

#[derive(Debug, Clone, Copy)]
struct Bucket {
    count: u32,
    window_start: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    /// Over the limit until the current window closes.
    Limited { retry_after_secs: i64 },
}

impl RateLimit {
    pub fn new(max_requests: u32, window_seconds: i64) -> Self {
        Self {
            buckets: Arc::new(DashMap::new()),
            max_requests,
            window: Duration::seconds(window_seconds),
        }
    }

    /// Count one request from `client` at `now`.
    pub fn check(&self, client: &str, now: DateTime<Utc>) -> Admission {
        let mut entry = self
            .buckets
            .entry(client.to_string())
            .or_insert(Bucket {
                count: 0,
                window_start: now,
            });
        let bucket = entry.value_mut();

        if now.signed_duration_since(bucket.window_start) >= self.window {
            *bucket = Bucket {
                count: 0,
                window_start: now,
            };
        }

        bucket.count = bucket.count.saturating_add(1);
        if bucket.count <= self.max_requests {
            return Admission::Allowed;
        }
        let closes = bucket.window_start + self.window;
        Admission::Limited {
            retry_after_secs: closes.signed_duration_since(now).num_seconds().max(1),
        }
    }

    /// Drop buckets whose window ended before `now`.
    pub fn prune(&self, now: DateTime<Utc>) {
        self.buckets
            .retain(|_, bucket| now.signed_duration_since(bucket.window_start) < self.window);
    }
}

pub async fn rate_limit_middleware(
    State(rate_limit): State<RateLimit>,
    req: Request,
    next: Next,
) -> Response {
    let client = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string());

    let now = Utc::now();
    match rate_limit.check(&client, now) {
        Admission::Allowed => next.run(req).await,
        Admission::Limited { retry_after_secs } => {
            warn!(%client, retry_after_secs, "rate limit exceeded");
            rate_limit.prune(now);
            let mut response = (
                StatusCode::TOO_MANY_REQUESTS,
                Json(ErrorResponse {
                    error: "Rate limit exceeded".to_string(),
                }),
            )
                .into_response();
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(retry_after_secs));
            response
        }
    }
}
