//! HTTP trigger surface. Every `/api` route requires the cron secret and is
//! rate limited per client IP.

pub mod dtos;
pub mod handlers;

use axum::{
    Json, Router, middleware,
    routing::{get, post, put},
};
use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};

use crate::{
    app_state::AppState,
    health,
    middleware::{RateLimit, rate_limit_middleware},
};

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        handlers::run_pipeline,
        handlers::scheduler_stats,
        handlers::start_scheduler,
        handlers::stop_scheduler,
        handlers::refresh_tags,
        handlers::cleanup,
        handlers::strip_low_score,
        handlers::promote,
        handlers::quota,
        handlers::notify,
        handlers::set_list_active,
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "pipeline", description = "Harvest and publish runs"),
        (name = "scheduler", description = "Background timers"),
        (name = "maintenance", description = "Tag refresh, cleanup and daily top-up"),
        (name = "notify", description = "Search engine notification"),
        (name = "lists", description = "Harvest sources"),
        (name = "health", description = "Liveness")
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "cron_secret",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
            );
        }
    }
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

pub fn router(state: AppState, rate_limit: RateLimit) -> Router {
    let api = Router::new()
        .route("/pipeline/run", post(handlers::run_pipeline))
        .route("/scheduler", get(handlers::scheduler_stats))
        .route("/scheduler/start", post(handlers::start_scheduler))
        .route("/scheduler/stop", post(handlers::stop_scheduler))
        .route("/maintenance/tags", post(handlers::refresh_tags))
        .route("/maintenance/cleanup", post(handlers::cleanup))
        .route("/maintenance/strip", post(handlers::strip_low_score))
        .route("/maintenance/promote", post(handlers::promote))
        .route("/quota", get(handlers::quota))
        .route("/indexnow/notify", post(handlers::notify))
        .route("/lists/{list_id}/active", put(handlers::set_list_active))
        .route_layer(middleware::from_fn_with_state(
            rate_limit,
            rate_limit_middleware,
        ));

    Router::new()
        .nest("/api", api)
        .route("/healthz", get(health::health_check))
        .route("/api-docs/openapi.json", get(openapi_json))
        .with_state(state)
}
