//! DisQueue Worker Service
//!
//! Connects to the broker, builds one `(StreamManager, JobProcessor)` pair
//! per configured queue, and runs them on a single cooperative `Worker`
//! until a shutdown signal arrives.
//!
//! Handler registration (`build_handlers`) is the one piece of this binary
//! that is genuinely application-specific; everything upstream of it is
//! reusable across deployments.

use async_trait::async_trait;
use disqueue_config::{Environment, FromEnv};
use disqueue_core::{
    DisqueueConfig, HandlerError, HandlerRegistry, HealthState, JobHandler, JobProcessor, JobStore,
    StreamManager, Worker,
};
use eyre::{Result, WrapErr};
use redis::aio::ConnectionManager;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};

/// Connects to the broker and verifies it with a `PING`.
async fn connect(url: &str) -> redis::RedisResult<ConnectionManager> {
    info!(url, "connecting to broker");
    let client = redis::Client::open(url)?;
    let manager = ConnectionManager::new(client).await?;
    let mut conn = manager.clone();
    let _: String = redis::cmd("PING").query_async(&mut conn).await?;
    info!("connected to broker");
    Ok(manager)
}

/// Logs and succeeds every job. Stands in for real, application-supplied
/// handlers, which is the one piece this binary can't generalize.
struct LoggingHandler;

#[async_trait]
impl JobHandler for LoggingHandler {
    async fn handle(&self, payload: serde_json::Value) -> Result<(), HandlerError> {
        info!(%payload, "processed job");
        Ok(())
    }
}

fn build_handlers(config: &DisqueueConfig) -> HandlerRegistry {
    config
        .queues
        .iter()
        .fold(HandlerRegistry::new(), |registry, queue| registry.register(queue.name.clone(), Arc::new(LoggingHandler)))
}

async fn start_health_server(state: HealthState, port: u16) -> Result<()> {
    let app = disqueue_core::health_router(state);
    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr).await.wrap_err_with(|| format!("failed to bind health server to {addr}"))?;
    info!(port, "health server listening");
    axum::serve(listener, app).await.wrap_err("health server failed")?;
    Ok(())
}

pub async fn run() -> Result<()> {
    let environment = Environment::from_env();
    disqueue_config::tracing::init_tracing(&environment);
    disqueue_core::metrics::init_metrics();

    info!(?environment, "starting disqueue worker");

    let config = DisqueueConfig::from_env().wrap_err("failed to load configuration")?;
    let redis = connect(&config.redis.uri).await.wrap_err("failed to connect to broker")?;
    let job_store = JobStore::new(redis.clone());
    let handlers = build_handlers(&config);
    let queues = Arc::new(config.queues.clone());

    let mut queue_workers = Vec::with_capacity(config.queues.iter().count());
    for queue in config.queues.iter() {
        let stream_manager = StreamManager::new(queue, job_store.clone()).await;
        let processor = JobProcessor::new(job_store.clone(), handlers.clone(), queue.clone());
        queue_workers.push((stream_manager, processor, job_store.clone()));
        info!(queue = %queue.name, priorities = ?queue.priorities, "queue registered");
    }
    let mut worker = Worker::new(queue_workers);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = shutdown_signal().await {
            error!(error = %e, "error waiting for shutdown signal");
        }
        let _ = shutdown_tx.send(true);
    });

    let health_state = HealthState::new(
        Arc::new(redis),
        job_store,
        queues,
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
    );
    let health_port = config.health.port;
    tokio::spawn(async move {
        if let Err(e) = start_health_server(health_state, health_port).await {
            error!(error = %e, "health server failed");
        }
    });

    worker.run(shutdown_rx).await;

    info!("disqueue worker stopped");
    Ok(())
}

async fn shutdown_signal() -> Result<()> {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }

    Ok(())
}
