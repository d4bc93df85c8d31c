//! Cascade dispatcher
//!
//! Queue-driven dispatch engine for asynchronous inference workloads. Each
//! worker pulls one message at a time, runs the per-request pipeline to
//! completion (fetch payload, forward to the user container, persist the
//! result and status markers), and acknowledges or leaves the message for
//! redelivery based on the outcome.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cascade_dispatcher::{
    AsyncWorkloadHandler, Config, HandlerConfig, LogEventSink, QueueConsumer,
};
use cascade_queue::{MemoryQueue, QueueClient};
use cascade_store::{MemoryStore, ObjectStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting cascade dispatcher");

    let config = Config::from_env()?;
    info!(
        cluster_uid = %config.cluster_uid,
        api_name = %config.api_name,
        bucket = %config.bucket,
        target_url = %config.target_url,
        workers = config.workers,
        "Configuration loaded"
    );

    // Durable backends are wired here. The in-memory implementations stand
    // in for dev runs; production deployments substitute store/queue
    // clients for their durable services behind the same traits.
    let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new());
    let queue: Arc<dyn QueueClient> = Arc::new(MemoryQueue::new(config.visibility_timeout));

    let handler = Arc::new(AsyncWorkloadHandler::new(
        HandlerConfig {
            cluster_uid: config.cluster_uid.clone(),
            bucket: config.bucket.clone(),
            api_name: config.api_name.clone(),
            target_url: config.target_url.clone(),
        },
        store,
        Arc::new(LogEventSink::new()),
        config.target_timeout,
    ));

    let consumer = QueueConsumer::new(queue, handler, config.workers, config.receive_wait);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let consumer_handle = tokio::spawn(consumer.run(shutdown_rx));

    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");

    let _ = shutdown_tx.send(true);

    // Let in-flight requests drain; anything still running is redelivered
    // by the queue once its visibility lease expires.
    match tokio::time::timeout(Duration::from_secs(30), consumer_handle).await {
        Ok(_) => info!("Dispatcher shutdown complete"),
        Err(_) => info!("Shutdown drain timed out; exiting"),
    }

    Ok(())
}
