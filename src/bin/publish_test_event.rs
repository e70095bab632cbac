use anyhow::{Error, Result};
use notification_service::{
    clients::rbmq::RabbitMqClient, config::Config, logging, models::event::Event,
};
use tracing::info;

/// Publishes a sample shipping update to the inbound queue.
#[tokio::main]
async fn main() -> Result<(), Error> {
    let config = Config::load()?;

    logging::init(config.log_format);

    let event = Event::new("shipping_updated")
        .with_user_id("user123")
        .with_order_id("order456")
        .with_status("shipped");

    let client = RabbitMqClient::connect(&config).await?;
    client.publish_event(&event).await?;

    info!(
        queue = %config.notification_queue_name,
        event_type = %event.event_type,
        "Sent test event"
    );

    Ok(())
}
