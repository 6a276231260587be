use std::net::SocketAddr;

use anyhow::Result;
use harvester::{
    api,
    app_state::{AppState, Services},
    config::Config,
    middleware::RateLimit,
    telemetry,
};
use sqlx::postgres::PgPoolOptions;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::info;

const TRIGGER_REQUESTS_PER_MINUTE: u32 = 30;

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init_tracing();

    let config = Config::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(config.database_url())
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let services = Services::from_config(&config, pool.clone())?;
    let state = AppState::new(&config, pool, services);

    if config.scheduler().enabled {
        state.pipeline_scheduler.start();
        state.maintenance_scheduler.start();
    }

    let app = api::router(state.clone(), RateLimit::new(TRIGGER_REQUESTS_PER_MINUTE, 60))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid));

    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
    info!(addr = %config.bind_addr(), "api listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown signal received");
    })
    .await?;

    state.pipeline_scheduler.shutdown().await;
    state.maintenance_scheduler.shutdown().await;
    Ok(())
}
