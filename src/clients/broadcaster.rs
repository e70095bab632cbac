use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::debug;

use crate::error::BroadcastError;

/// Best-effort fan-out to whoever is connected right now.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    /// Pushes `message` to every current subscriber and returns how many
    /// there were. Subscribers that join later never see it.
    async fn broadcast(&self, message: &str) -> Result<usize, BroadcastError>;

    fn subscriber_count(&self) -> usize;
}

/// In-process broadcaster backing the `/ws` realtime endpoint.
///
/// Subscribers that fall more than `capacity` messages behind lose the
/// oldest ones.
pub struct ChannelBroadcaster {
    tx: broadcast::Sender<String>,
}

impl ChannelBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }
}

#[async_trait]
impl Broadcaster for ChannelBroadcaster {
    async fn broadcast(&self, message: &str) -> Result<usize, BroadcastError> {
        // send only fails when nobody is listening
        let recipients = self.tx.send(message.to_string()).unwrap_or(0);

        debug!(recipients, "Notification broadcast");

        Ok(recipients)
    }

    fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
