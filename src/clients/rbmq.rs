use async_trait::async_trait;
use futures_util::StreamExt;
use lapin::{
    BasicProperties, Channel, Connection, ConnectionProperties, Consumer,
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, BasicQosOptions,
        BasicRejectOptions, QueueDeclareOptions,
    },
    types::FieldTable,
};
use tracing::{debug, info};

use crate::{
    config::Config,
    error::QueueError,
    models::{event::Event, message::FailedMessage},
    queue::{ChannelConnector, Delivery, DeliveryChannel},
};

const CONSUMER_TAG: &str = "notification_worker";

pub struct RabbitMqClient {
    _connection: Connection,
    channel: Channel,
    queue_name: String,
    failed_queue_name: String,
}

impl RabbitMqClient {
    pub async fn connect(config: &Config) -> Result<Self, QueueError> {
        info!("Connecting to RabbitMQ");

        let connection = Connection::connect(&config.rabbitmq_url, ConnectionProperties::default())
            .await
            .map_err(|e| QueueError::Connection(format!("Failed to connect to RabbitMQ: {}", e)))?;

        debug!("RabbitMQ connection established");

        let channel = connection.create_channel().await.map_err(|e| {
            QueueError::Connection(format!("RabbitMQ channel creation failed: {}", e))
        })?;

        channel
            .basic_qos(config.prefetch_count, BasicQosOptions::default())
            .await
            .map_err(|e| QueueError::Connection(format!("Failed to set up QoS: {}", e)))?;

        for queue in [&config.notification_queue_name, &config.failed_queue_name] {
            channel
                .queue_declare(
                    queue,
                    QueueDeclareOptions {
                        durable: true,
                        ..Default::default()
                    },
                    FieldTable::default(),
                )
                .await
                .map_err(|e| {
                    QueueError::Connection(format!("Failed to declare queue {}: {}", queue, e))
                })?;

            debug!(queue = %queue, "Queue declared");
        }

        info!(queue = %config.notification_queue_name, "Connected to RabbitMQ");

        Ok(Self {
            _connection: connection,
            channel,
            queue_name: config.notification_queue_name.clone(),
            failed_queue_name: config.failed_queue_name.clone(),
        })
    }

    pub async fn create_consumer(&self) -> Result<Consumer, QueueError> {
        self.channel
            .basic_consume(
                &self.queue_name,
                CONSUMER_TAG,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| QueueError::Connection(format!("Failed to create consumer: {}", e)))
    }

    /// Publishes an event to the inbound queue as a persistent message.
    pub async fn publish_event(&self, event: &Event) -> Result<(), QueueError> {
        let payload = serde_json::to_vec(event).map_err(|e| QueueError::Publish {
            queue: self.queue_name.clone(),
            reason: e.to_string(),
        })?;

        self.publish(&self.queue_name, &payload).await
    }

    async fn publish(&self, queue: &str, payload: &[u8]) -> Result<(), QueueError> {
        let publish_error = |e: lapin::Error| QueueError::Publish {
            queue: queue.to_string(),
            reason: e.to_string(),
        };

        self.channel
            .basic_publish(
                "",
                queue,
                BasicPublishOptions::default(),
                payload,
                BasicProperties::default().with_delivery_mode(2),
            )
            .await
            .map_err(publish_error)?
            .await
            .map_err(publish_error)?;

        Ok(())
    }
}

/// One consuming session on the inbound queue.
pub struct RabbitMqSession {
    client: RabbitMqClient,
    consumer: Consumer,
}

#[async_trait]
impl DeliveryChannel for RabbitMqSession {
    async fn recv(&mut self) -> Option<Result<Delivery, QueueError>> {
        let next = self.consumer.next().await?;

        Some(
            next.map(|delivery| Delivery {
                tag: delivery.delivery_tag,
                data: delivery.data,
                redelivered: delivery.redelivered,
            })
            .map_err(|e| QueueError::Stream(e.to_string())),
        )
    }

    async fn acknowledge(&self, tag: u64) -> Result<(), QueueError> {
        self.client
            .channel
            .basic_ack(tag, BasicAckOptions::default())
            .await
            .map_err(|e| QueueError::Ack {
                tag,
                reason: e.to_string(),
            })
    }

    async fn reject(&self, tag: u64, requeue: bool) -> Result<(), QueueError> {
        self.client
            .channel
            .basic_reject(tag, BasicRejectOptions { requeue })
            .await
            .map_err(|e| QueueError::Reject {
                tag,
                reason: e.to_string(),
            })
    }

    async fn publish_failed(&self, message: &FailedMessage) -> Result<(), QueueError> {
        let payload = serde_json::to_vec(message).map_err(|e| QueueError::Publish {
            queue: self.client.failed_queue_name.clone(),
            reason: e.to_string(),
        })?;

        self.client
            .publish(&self.client.failed_queue_name, &payload)
            .await
    }
}

pub struct RabbitMqConnector {
    config: Config,
}

impl RabbitMqConnector {
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ChannelConnector for RabbitMqConnector {
    type Channel = RabbitMqSession;

    async fn connect(&self) -> Result<RabbitMqSession, QueueError> {
        let client = RabbitMqClient::connect(&self.config).await?;
        let consumer = client.create_consumer().await?;

        Ok(RabbitMqSession { client, consumer })
    }
}
