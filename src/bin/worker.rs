use anyhow::Result;
use harvester::{app_state::Services, config::Config, scheduler::Scheduler, telemetry};
use sqlx::postgres::PgPoolOptions;
use tracing::{error, info};

/// Runs the pipeline and maintenance schedulers without the HTTP surface.
#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init_tracing();

    let config = Config::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(config.database_url())
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let services = Services::from_config(&config, pool)?;
    let scheduling = config.scheduler();
    let pipeline = Scheduler::new(
        services.pipeline.clone(),
        scheduling.interval,
        services.clock.clone(),
    );
    let maintenance = Scheduler::new(
        services.maintenance.clone(),
        scheduling.maintenance_interval,
        services.clock.clone(),
    );

    pipeline.start();
    maintenance.start();
    info!(
        pipeline_every_secs = scheduling.interval.as_secs(),
        maintenance_every_secs = scheduling.maintenance_interval.as_secs(),
        "worker started"
    );

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown initiated, waiting for in-flight runs to complete...");
    pipeline.shutdown().await;
    maintenance.shutdown().await;
    info!("worker stopped");
    Ok(())
}
