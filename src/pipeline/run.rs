use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

/// Stage of a run a log entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Step {
    Started,
    Harvesting,
    Enriching,
    Gating,
    Tagging,
    Notifying,
    Completed,
    Failed,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::Started => "started",
            Step::Harvesting => "harvesting",
            Step::Enriching => "enriching",
            Step::Gating => "gating",
            Step::Tagging => "tagging",
            Step::Notifying => "notifying",
            Step::Completed => "completed",
            Step::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub step: Step,
    pub message: String,
}

/// Transient report of one pipeline run. Never persisted.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PipelineRun {
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub logs: Vec<LogEntry>,
}

impl PipelineRun {
    pub fn start(started_at: DateTime<Utc>) -> Self {
        Self {
            status: RunStatus::Running,
            started_at,
            logs: Vec::new(),
        }
    }

    /// Append an entry and mirror it to tracing.
    pub fn log(
        &mut self,
        at: DateTime<Utc>,
        level: LogLevel,
        step: Step,
        message: impl Into<String>,
    ) {
        let message = message.into();
        match level {
            LogLevel::Debug => debug!(step = step.as_str(), "{message}"),
            LogLevel::Info => info!(step = step.as_str(), "{message}"),
            LogLevel::Warning => warn!(step = step.as_str(), "{message}"),
            LogLevel::Error => error!(step = step.as_str(), "{message}"),
        }
        self.logs.push(LogEntry {
            timestamp: at,
            level,
            step,
            message,
        });
    }

    /// Set the terminal status. Later calls are ignored.
    pub fn finish(&mut self, status: RunStatus) {
        if self.status == RunStatus::Running {
            self.status = status;
        }
    }

    pub fn warnings(&self) -> impl Iterator<Item = &LogEntry> {
        self.logs.iter().filter(|e| e.level == LogLevel::Warning)
    }
}
