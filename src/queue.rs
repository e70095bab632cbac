//! Broker sessions and their lifecycle.

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{error, info};

use crate::{
    error::QueueError,
    models::{message::FailedMessage, retry::RetryConfig},
    utils::retry_with_backoff,
};

/// One message taken off the inbound channel together with the tag needed
/// to settle it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub tag: u64,
    pub data: Vec<u8>,
    pub redelivered: bool,
}

/// A live subscription to the inbound channel.
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    /// Waits for the next delivery. `None` means the session is over and a
    /// new one has to be opened.
    async fn recv(&mut self) -> Option<Result<Delivery, QueueError>>;

    async fn acknowledge(&self, tag: u64) -> Result<(), QueueError>;

    async fn reject(&self, tag: u64, requeue: bool) -> Result<(), QueueError>;

    async fn publish_failed(&self, message: &FailedMessage) -> Result<(), QueueError>;
}

#[async_trait]
pub trait ChannelConnector: Send + Sync {
    type Channel: DeliveryChannel;

    async fn connect(&self) -> Result<Self::Channel, QueueError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerStatus {
    Connecting,
    Connected,
    Disconnected,
}

impl BrokerStatus {
    pub fn as_str(&self) -> &str {
        match self {
            BrokerStatus::Connecting => "connecting",
            BrokerStatus::Connected => "connected",
            BrokerStatus::Disconnected => "disconnected",
        }
    }
}

/// Owns opening broker sessions, retrying with backoff, and publishing the
/// current connection state.
pub struct ConnectionManager<C> {
    connector: C,
    retry_config: RetryConfig,
    status: watch::Sender<BrokerStatus>,
}

impl<C: ChannelConnector> ConnectionManager<C> {
    pub fn new(connector: C, retry_config: RetryConfig) -> Self {
        let (status, _) = watch::channel(BrokerStatus::Disconnected);

        Self {
            connector,
            retry_config,
            status,
        }
    }

    pub fn status(&self) -> watch::Receiver<BrokerStatus> {
        self.status.subscribe()
    }

    pub fn current_status(&self) -> BrokerStatus {
        *self.status.borrow()
    }

    /// Opens a session, retrying per the configured policy. Every call
    /// starts with a fresh attempt budget.
    pub async fn connect(&self) -> Result<C::Channel, QueueError> {
        self.status.send_replace(BrokerStatus::Connecting);

        match retry_with_backoff(&self.retry_config, || self.connector.connect()).await {
            Ok(channel) => {
                self.status.send_replace(BrokerStatus::Connected);
                info!("Broker session established");
                Ok(channel)
            }
            Err(e) => {
                self.status.send_replace(BrokerStatus::Disconnected);
                error!(
                    error = %e,
                    max_attempts = self.retry_config.max_attempts,
                    "Giving up on broker connection"
                );
                Err(e)
            }
        }
    }

    pub fn mark_disconnected(&self) {
        self.status.send_replace(BrokerStatus::Disconnected);
    }
}
