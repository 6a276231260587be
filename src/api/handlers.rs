use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::{error, info};

use crate::{
    api::dtos::{
        ErrorResponse, NotifyRequest, NotifyResponse, QuotaResponse, SchedulerStatusResponse,
        SchedulerToggleResponse, SetListActiveRequest, SetListActiveResponse,
    },
    app_state::AppState,
    auth::CronAuth,
    curation::TagRefresh,
    notify::NotifyError,
    pipeline::{
        CleanupReport, PipelineError, PipelineRun, PromotionReport, RunRequest, RunStatus,
        StripReport,
    },
    repositories::StoreError,
};

fn error_response(status: StatusCode, error: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
        .into_response()
}

fn store_error_response(err: StoreError) -> Response {
    error!(error = %err, "store error");
    let status = if err.is_fatal() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    error_response(status, err.to_string())
}

fn scheduler_status(state: &AppState) -> SchedulerStatusResponse {
    SchedulerStatusResponse {
        pipeline: state.pipeline_scheduler.stats(),
        maintenance: state.maintenance_scheduler.stats(),
    }
}

#[utoipa::path(
    post,
    path = "/api/pipeline/run",
    tag = "pipeline",
    request_body(content = RunRequest, description = "Optional; restricts the run to these lists"),
    responses(
        (status = 200, description = "Run completed", body = PipelineRun),
        (status = 400, description = "Invalid trigger input", body = ErrorResponse),
        (status = 401, description = "Missing or wrong secret", body = ErrorResponse),
        (status = 500, description = "Run failed; the log explains why", body = PipelineRun)
    ),
    security(("cron_secret" = []))
)]
pub async fn run_pipeline(
    _auth: CronAuth,
    State(state): State<AppState>,
    body: Option<Json<RunRequest>>,
) -> Response {
    let request = body.map(|Json(r)| r).unwrap_or_default();

    match state.services.pipeline.run(&request).await {
        Ok(run) => {
            let status = match run.status {
                RunStatus::Failed => StatusCode::INTERNAL_SERVER_ERROR,
                _ => StatusCode::OK,
            };
            info!(status = ?run.status, entries = run.logs.len(), "triggered run finished");
            (status, Json(run)).into_response()
        }
        Err(PipelineError::Validation(reason)) => error_response(StatusCode::BAD_REQUEST, reason),
        Err(PipelineError::Store(err)) => store_error_response(err),
    }
}

#[utoipa::path(
    get,
    path = "/api/scheduler",
    tag = "scheduler",
    responses((status = 200, body = SchedulerStatusResponse)),
    security(("cron_secret" = []))
)]
pub async fn scheduler_stats(_auth: CronAuth, State(state): State<AppState>) -> Response {
    Json(scheduler_status(&state)).into_response()
}

#[utoipa::path(
    post,
    path = "/api/scheduler/start",
    tag = "scheduler",
    responses((status = 200, body = SchedulerToggleResponse)),
    security(("cron_secret" = []))
)]
pub async fn start_scheduler(_auth: CronAuth, State(state): State<AppState>) -> Response {
    let pipeline = state.pipeline_scheduler.start();
    let maintenance = state.maintenance_scheduler.start();
    Json(SchedulerToggleResponse {
        changed: pipeline || maintenance,
        status: scheduler_status(&state),
    })
    .into_response()
}

#[utoipa::path(
    post,
    path = "/api/scheduler/stop",
    tag = "scheduler",
    responses((status = 200, body = SchedulerToggleResponse)),
    security(("cron_secret" = []))
)]
pub async fn stop_scheduler(_auth: CronAuth, State(state): State<AppState>) -> Response {
    let pipeline = state.pipeline_scheduler.stop();
    let maintenance = state.maintenance_scheduler.stop();
    Json(SchedulerToggleResponse {
        changed: pipeline || maintenance,
        status: scheduler_status(&state),
    })
    .into_response()
}

#[utoipa::path(
    post,
    path = "/api/maintenance/tags",
    tag = "maintenance",
    responses(
        (status = 200, body = TagRefresh),
        (status = 503, body = ErrorResponse)
    ),
    security(("cron_secret" = []))
)]
pub async fn refresh_tags(_auth: CronAuth, State(state): State<AppState>) -> Response {
    match state.services.maintenance.refresh_tags().await {
        Ok(report) => Json(report).into_response(),
        Err(err) => store_error_response(err),
    }
}

#[utoipa::path(
    post,
    path = "/api/maintenance/cleanup",
    tag = "maintenance",
    responses(
        (status = 200, body = CleanupReport),
        (status = 503, body = ErrorResponse)
    ),
    security(("cron_secret" = []))
)]
pub async fn cleanup(_auth: CronAuth, State(state): State<AppState>) -> Response {
    match state.services.maintenance.cleanup().await {
        Ok(report) => Json(report).into_response(),
        Err(err) => store_error_response(err),
    }
}

#[utoipa::path(
    post,
    path = "/api/maintenance/strip",
    tag = "maintenance",
    responses(
        (status = 200, description = "Low-score rows reduced to metadata", body = StripReport),
        (status = 503, body = ErrorResponse)
    ),
    security(("cron_secret" = []))
)]
pub async fn strip_low_score(_auth: CronAuth, State(state): State<AppState>) -> Response {
    match state.services.maintenance.strip_low_score().await {
        Ok(report) => Json(report).into_response(),
        Err(err) => store_error_response(err),
    }
}

#[utoipa::path(
    post,
    path = "/api/maintenance/promote",
    tag = "maintenance",
    responses(
        (status = 200, description = "Archived rows indexed up to the daily minimum", body = PromotionReport),
        (status = 503, body = ErrorResponse)
    ),
    security(("cron_secret" = []))
)]
pub async fn promote(_auth: CronAuth, State(state): State<AppState>) -> Response {
    match state.services.maintenance.promote().await {
        Ok(report) => Json(report).into_response(),
        Err(err) => store_error_response(err),
    }
}

#[utoipa::path(
    get,
    path = "/api/quota",
    tag = "pipeline",
    responses(
        (status = 200, description = "Publish quota for today (UTC)", body = QuotaResponse),
        (status = 503, body = ErrorResponse)
    ),
    security(("cron_secret" = []))
)]
pub async fn quota(_auth: CronAuth, State(state): State<AppState>) -> Response {
    let gate = state.services.pipeline.quota();
    let today = state.services.clock.now().date_naive();
    match gate.can_publish(today).await {
        Ok(decision) => Json(QuotaResponse {
            date: today,
            allowed: decision.allowed,
            used: decision.used,
            remaining: decision.remaining,
            limit: gate.ceiling(),
        })
        .into_response(),
        Err(err) => store_error_response(err),
    }
}

#[utoipa::path(
    post,
    path = "/api/indexnow/notify",
    tag = "notify",
    request_body = NotifyRequest,
    responses(
        (status = 200, description = "Per-engine results, possibly partial", body = NotifyResponse),
        (status = 400, body = ErrorResponse),
        (status = 503, description = "Notifier disabled", body = ErrorResponse)
    ),
    security(("cron_secret" = []))
)]
pub async fn notify(
    _auth: CronAuth,
    State(state): State<AppState>,
    Json(payload): Json<NotifyRequest>,
) -> Response {
    let Some(notifier) = &state.services.notifier else {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, "Notifier disabled");
    };

    let site = &state.services.pipeline.settings().site_base_url;
    let urls = match payload.into_urls(site) {
        Ok(urls) => urls,
        Err(reason) => return error_response(StatusCode::BAD_REQUEST, reason),
    };

    match notifier.notify_batch(&urls).await {
        Ok(report) => Json(NotifyResponse {
            submitted: urls.len(),
            all_succeeded: report.all_succeeded(),
            results: report.results,
        })
        .into_response(),
        Err(NotifyError::Validation(reason)) => error_response(StatusCode::BAD_REQUEST, reason),
        Err(err @ NotifyError::Config(_)) => {
            error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

#[utoipa::path(
    put,
    path = "/api/lists/{list_id}/active",
    tag = "lists",
    params(("list_id" = String, Path, description = "Source list id")),
    request_body = SetListActiveRequest,
    responses(
        (status = 200, body = SetListActiveResponse),
        (status = 404, body = ErrorResponse)
    ),
    security(("cron_secret" = []))
)]
pub async fn set_list_active(
    _auth: CronAuth,
    State(state): State<AppState>,
    Path(list_id): Path<String>,
    Json(payload): Json<SetListActiveRequest>,
) -> Response {
    match state
        .services
        .lists
        .set_active(&list_id, payload.is_active)
        .await
    {
        Ok(true) => {
            info!(%list_id, is_active = payload.is_active, "list toggled");
            Json(SetListActiveResponse {
                list_id,
                is_active: payload.is_active,
            })
            .into_response()
        }
        Ok(false) => error_response(StatusCode::NOT_FOUND, format!("List {list_id} not found")),
        Err(err) => store_error_response(err),
    }
}
