use std::time::Duration;
use thiserror::Error;

use crate::pipeline::retry::Retryable;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("analysis provider unavailable: {0}")]
    Unavailable(String),

    #[error("analysis provider rate limited")]
    RateLimited { retry_after: Option<Duration> },

    #[error("analysis request timeout")]
    Timeout,

    #[error("analysis request rejected with status {status}")]
    Rejected { status: reqwest::StatusCode },

    #[error("invalid analysis response: {0}")]
    InvalidResponse(String),
}

impl AnalysisError {
    pub fn should_retry(&self) -> bool {
        match self {
            Self::Unavailable(_) | Self::RateLimited { .. } | Self::Timeout => true,
            Self::Rejected { .. } | Self::InvalidResponse(_) => false,
        }
    }

    pub fn from_reqwest_error(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::InvalidResponse(err.to_string())
        } else if let Some(status) = err.status() {
            Self::from_status(status, None)
        } else {
            Self::Unavailable(err.to_string())
        }
    }

    pub fn from_status(status: reqwest::StatusCode, retry_after: Option<Duration>) -> Self {
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            Self::RateLimited { retry_after }
        } else if status.is_server_error() {
            Self::Unavailable(format!("provider returned {status}"))
        } else {
            Self::Rejected { status }
        }
    }
}

impl Retryable for AnalysisError {
    fn should_retry(&self) -> bool {
        AnalysisError::should_retry(self)
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}
