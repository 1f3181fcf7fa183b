//! Process entrypoint: loads configuration, runs migrations, and starts
//! the dispatcher and reconciler. The HTTP API that will eventually sit in
//! front of [`cronmaster::kernel::Control`] is an external collaborator
//! and is not part of this binary.

use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use cronmaster::kernel::{Control, Dispatcher, DispatcherConfig, Invoker, InvokerConfig, Reconciler, ReconcilerConfig};
use cronmaster::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .connect(&config.database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    let invoker = Invoker::new(InvokerConfig {
        request_timeout: config.request_timeout,
        response_body_limit_bytes: config.response_body_limit_bytes,
        user_agent: config.user_agent.clone(),
    });

    let dispatcher = Arc::new(Dispatcher::new(
        pool.clone(),
        invoker,
        DispatcherConfig {
            max_concurrent_firings: config.max_concurrent_firings,
        },
    ));

    let reconciler = Reconciler::new(
        pool.clone(),
        dispatcher.clone(),
        ReconcilerConfig {
            live_set_interval: config.reconcile_interval,
            prune_interval: config.prune_interval,
            execution_retention: Duration::from_secs(config.execution_retention_days as u64 * 24 * 60 * 60),
            health_interval: Duration::from_secs(60),
        },
    );

    tracing::info!("reclaiming orphaned executions from a prior process");
    reconciler.reclaim_orphaned_on_startup().await;

    tracing::info!("arming active jobs");
    reconciler.reconcile_live_set_once().await;

    let control = Control::new(dispatcher.clone());
    let _ = control; // held by the API layer once it exists; kept alive here for now.

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let reconciler = Arc::new(reconciler);
    let reconciler_task = {
        let reconciler = reconciler.clone();
        tokio::spawn(async move { reconciler.run(shutdown_rx).await })
    };

    tracing::info!(port = config.port, "cronmaster scheduler core running");
    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received, draining in-flight firings");

    let _ = shutdown_tx.send(true);
    dispatcher.shutdown(config.shutdown_drain_deadline).await;
    let _ = reconciler_task.await;

    tracing::info!("shutdown complete");
    Ok(())
}
