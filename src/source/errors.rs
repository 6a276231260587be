use std::time::Duration;
use thiserror::Error;

use crate::pipeline::retry::Retryable;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("source unavailable: {0}")]
    Unavailable(String),

    #[error("rate limited by source")]
    RateLimited { retry_after: Option<Duration> },

    #[error("list not found: {0}")]
    NotFound(String),

    #[error("request timeout")]
    Timeout,

    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("http error {status}")]
    Http { status: reqwest::StatusCode },
}

impl SourceError {
    pub fn should_retry(&self) -> bool {
        match self {
            // Fatal for this list - don't retry
            Self::InvalidUrl(_) => false,
            Self::NotFound(_) => false,
            Self::Malformed(_) => false,
            Self::Http { .. } => false,

            // Temporary errors - retry
            Self::Unavailable(_) => true,
            Self::RateLimited { .. } => true,
            Self::Timeout => true,
        }
    }

    pub fn from_reqwest_error(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::Malformed(err.to_string())
        } else if let Some(status) = err.status() {
            Self::from_status(status, None)
        } else {
            // DNS, connect, body read failures
            Self::Unavailable(err.to_string())
        }
    }

    pub fn from_status(status: reqwest::StatusCode, retry_after: Option<Duration>) -> Self {
        match status.as_u16() {
            429 => Self::RateLimited { retry_after },
            404 => Self::NotFound(status.to_string()),
            s if s >= 500 => Self::Unavailable(format!("upstream returned {status}")),
            _ => Self::Http { status },
        }
    }
}

impl Retryable for SourceError {
    fn should_retry(&self) -> bool {
        SourceError::should_retry(self)
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}
