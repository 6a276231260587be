use axum::{Json, extract::State, http::StatusCode};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tracing::warn;
use utoipa::ToSchema;

use crate::{app_state::AppState, scheduler::SchedulerStats};

#[derive(Debug, Serialize, ToSchema)]
pub struct TaskHealth {
    pub running: bool,
    pub last_run_time: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl From<SchedulerStats> for TaskHealth {
    fn from(stats: SchedulerStats) -> Self {
        Self {
            running: stats.is_running,
            last_run_time: stats.last_run_time,
            last_error: stats.last_error,
        }
    }
}

/// Liveness plus a glance at both background tasks. Only the database
/// decides the status code; stopped schedulers are reported, not fatal.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: &'static str,
    pub pipeline: TaskHealth,
    pub maintenance: TaskHealth,
}

#[utoipa::path(
    get,
    path = "/healthz",
    tag = "health",
    responses(
        (status = 200, description = "Database reachable", body = HealthResponse),
        (status = 503, description = "Database unreachable", body = HealthResponse)
    )
)]
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let database_ok = match ping(&state.db_pool).await {
        Ok(()) => true,
        Err(err) => {
            warn!(error = %err, "database ping failed");
            false
        }
    };

    let body = HealthResponse {
        status: if database_ok { "ok" } else { "degraded" },
        database: if database_ok { "reachable" } else { "unreachable" },
        pipeline: state.pipeline_scheduler.stats().into(),
        maintenance: state.maintenance_scheduler.stats().into(),
    };
    let code = if database_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(body))
}

async fn ping(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query_scalar::<_, i32>("SELECT 1").fetch_one(pool).await?;
    Ok(())
}
