use std::sync::Arc;

use anyhow::{Error, Result, anyhow};
use notification_service::{
    api::{self, AppState},
    clients::{
        broadcaster::ChannelBroadcaster, database::PostgresStore, health::HealthChecker,
        rbmq::RabbitMqConnector, store::NotificationStore,
    },
    config::Config,
    consumer::QueueConsumer,
    logging,
    pipeline::NotificationPipeline,
    queue::ConnectionManager,
    utils::retry_with_backoff,
};
use tokio::sync::watch;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Error> {
    let config = Config::load()?;

    logging::init(config.log_format);

    info!(
        queue = %config.notification_queue_name,
        port = config.server_port,
        "Starting notification service"
    );

    let store: Arc<dyn NotificationStore> = Arc::new(
        retry_with_backoff(&config.retry_config(), || {
            PostgresStore::connect(&config.database_url)
        })
        .await?,
    );

    let broadcaster = Arc::new(ChannelBroadcaster::new(config.broadcast_capacity));

    let pipeline = Arc::new(NotificationPipeline::new(
        store.clone(),
        broadcaster.clone(),
        config.store_timeout(),
    ));

    let manager = ConnectionManager::new(
        RabbitMqConnector::new(config.clone()),
        config.retry_config(),
    );

    let state = Arc::new(AppState {
        pipeline: pipeline.clone(),
        broadcaster: broadcaster.clone(),
        health_checker: HealthChecker::new(
            store,
            broadcaster,
            manager.status(),
            config.store_timeout(),
        ),
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let consumer = QueueConsumer::new(
        pipeline,
        config.processing_timeout(),
        config.redelivery_delay(),
    );
    let consumer_shutdown = shutdown_rx.clone();
    let mut consumer_task =
        tokio::spawn(async move { consumer.run(&manager, consumer_shutdown).await });

    let mut server_shutdown = shutdown_rx;
    let mut server_task = tokio::spawn(api::run_api_server(
        state,
        config.server_port,
        async move {
            let _ = server_shutdown.changed().await;
        },
    ));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Shutdown signal received"),
        result = &mut consumer_task => {
            shutdown_tx.send_replace(true);
            let _ = server_task.await;
            return match result {
                Ok(Ok(())) => Err(anyhow!("Queue consumer exited unexpectedly")),
                Ok(Err(e)) => Err(e),
                Err(e) => Err(e.into()),
            };
        }
        result = &mut server_task => {
            error!("HTTP server stopped, shutting down");
            shutdown_tx.send_replace(true);
            match consumer_task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(error = %e, "Queue consumer failed during shutdown"),
                Err(e) => error!(error = %e, "Queue consumer task panicked"),
            }
            return result?;
        }
    }

    shutdown_tx.send_replace(true);

    let (consumer_result, server_result) = tokio::join!(consumer_task, server_task);
    consumer_result??;
    server_result??;

    info!("Notification service stopped");

    Ok(())
}
