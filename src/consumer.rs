//! Queue ingress: drives each delivery through the pipeline and settles it.
//!
//! Per delivery the consumer decodes, processes, and then makes exactly one
//! settlement decision:
//!
//! - processed successfully: acknowledge
//! - undecodable or unknown to this version: acknowledge and drop
//! - store failure or processing timeout: requeue for redelivery
//! - fault inside processing: publish to the failed queue, then acknowledge
//!
//! Duplicates are possible. A delivery whose record was written but whose
//! acknowledgement never reached the broker is processed again on
//! redelivery and produces a second record.

use std::{panic::AssertUnwindSafe, sync::Arc, time::Duration};

use anyhow::{Error, Result, anyhow};
use futures_util::FutureExt;
use tokio::{
    sync::watch,
    time::{sleep, timeout},
};
use tracing::{debug, error, info, warn};

use crate::{
    error::QueueError,
    models::{event::Event, message::FailedMessage},
    pipeline::{NotificationPipeline, ProcessOutcome},
    queue::{ChannelConnector, ConnectionManager, Delivery, DeliveryChannel},
    utils::panic_message,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    Acknowledge,
    Drop(String),
    Requeue(String),
    DeadLetter(String),
}

#[derive(Debug)]
pub enum SessionEnd {
    Shutdown,
    Closed,
    Failed(QueueError),
}

pub struct QueueConsumer {
    pipeline: Arc<NotificationPipeline>,
    processing_timeout: Duration,
    redelivery_delay: Duration,
}

impl QueueConsumer {
    pub fn new(
        pipeline: Arc<NotificationPipeline>,
        processing_timeout: Duration,
        redelivery_delay: Duration,
    ) -> Self {
        Self {
            pipeline,
            processing_timeout,
            redelivery_delay,
        }
    }

    /// Runs sessions until shutdown is signalled. Each time a session ends
    /// the connection manager opens a new one; the loop only fails once the
    /// manager's retry budget is spent.
    pub async fn run<C: ChannelConnector>(
        &self,
        manager: &ConnectionManager<C>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), Error> {
        loop {
            if *shutdown.borrow() {
                break;
            }

            let mut channel = tokio::select! {
                _ = shutdown.changed() => break,
                connected = manager.connect() => connected
                    .map_err(|e| anyhow!("Queue consumer stopped: {}", e))?,
            };

            info!("Queue consumer listening");

            let end = self.consume(&mut channel, &mut shutdown).await;
            manager.mark_disconnected();

            match end {
                SessionEnd::Shutdown => break,
                SessionEnd::Closed => warn!("Delivery stream closed, reconnecting"),
                SessionEnd::Failed(e) => warn!(error = %e, "Broker session failed, reconnecting"),
            }
        }

        info!("Queue consumer stopped");
        Ok(())
    }

    /// Processes deliveries from one session, one at a time, in delivery
    /// order. An in-flight delivery is always settled before shutdown is
    /// honoured.
    pub async fn consume<D: DeliveryChannel>(
        &self,
        channel: &mut D,
        shutdown: &mut watch::Receiver<bool>,
    ) -> SessionEnd {
        loop {
            let next = tokio::select! {
                biased;
                _ = shutdown.changed() => return SessionEnd::Shutdown,
                next = channel.recv() => next,
            };

            let delivery = match next {
                Some(Ok(delivery)) => delivery,
                Some(Err(e)) => return SessionEnd::Failed(e),
                None => return SessionEnd::Closed,
            };

            let disposition = self.handle(&delivery).await;

            if let Err(e) = self.settle(channel, &delivery, &disposition).await {
                error!(
                    error = %e,
                    delivery_tag = delivery.tag,
                    "Failed to settle delivery"
                );
                return SessionEnd::Failed(e);
            }
        }
    }

    /// Decides what should happen to a delivery. Never touches the broker.
    pub async fn handle(&self, delivery: &Delivery) -> Disposition {
        let event = match Event::decode(&delivery.data) {
            Ok(event) => event,
            Err(e) => {
                warn!(
                    error = %e,
                    delivery_tag = delivery.tag,
                    payload = %String::from_utf8_lossy(&delivery.data),
                    "Dropping undecodable message"
                );
                return Disposition::Drop(e.to_string());
            }
        };

        debug!(
            delivery_tag = delivery.tag,
            redelivered = delivery.redelivered,
            event_type = %event.event_type,
            user_id = %event.user_id_or_empty(),
            "Received event"
        );

        let processing = AssertUnwindSafe(self.pipeline.process(&event)).catch_unwind();

        match timeout(self.processing_timeout, processing).await {
            Ok(Ok(Ok(ProcessOutcome::Delivered { id, .. }))) => {
                info!(
                    delivery_tag = delivery.tag,
                    notification_id = %id,
                    event_type = %event.event_type,
                    "Event processed"
                );
                Disposition::Acknowledge
            }
            Ok(Ok(Ok(ProcessOutcome::Skipped(reason)))) => Disposition::Drop(reason.to_string()),
            Ok(Ok(Err(e))) => Disposition::Requeue(e.to_string()),
            Ok(Err(panic)) => {
                let reason = panic_message(panic.as_ref());
                error!(
                    delivery_tag = delivery.tag,
                    event_type = %event.event_type,
                    user_id = %event.user_id_or_empty(),
                    reason = %reason,
                    "Processing panicked"
                );
                Disposition::DeadLetter(format!("processing panicked: {}", reason))
            }
            Err(_) => {
                warn!(
                    delivery_tag = delivery.tag,
                    event_type = %event.event_type,
                    timeout_ms = self.processing_timeout.as_millis() as u64,
                    "Processing timed out"
                );
                Disposition::Requeue(format!(
                    "processing exceeded {}ms",
                    self.processing_timeout.as_millis()
                ))
            }
        }
    }

    pub async fn settle<D: DeliveryChannel>(
        &self,
        channel: &D,
        delivery: &Delivery,
        disposition: &Disposition,
    ) -> Result<(), QueueError> {
        match disposition {
            Disposition::Acknowledge => channel.acknowledge(delivery.tag).await,
            Disposition::Drop(reason) => {
                info!(delivery_tag = delivery.tag, reason = %reason, "Acknowledging without effect");
                channel.acknowledge(delivery.tag).await
            }
            Disposition::Requeue(reason) => {
                warn!(
                    delivery_tag = delivery.tag,
                    reason = %reason,
                    delay_ms = self.redelivery_delay.as_millis() as u64,
                    "Returning delivery for redelivery"
                );
                sleep(self.redelivery_delay).await;
                channel.reject(delivery.tag, true).await
            }
            Disposition::DeadLetter(reason) => {
                let failed = FailedMessage::new(&delivery.data, reason.clone());

                match channel.publish_failed(&failed).await {
                    Ok(()) => channel.acknowledge(delivery.tag).await,
                    Err(e) => {
                        error!(
                            error = %e,
                            delivery_tag = delivery.tag,
                            "Failed to park message, rejecting without requeue"
                        );
                        channel.reject(delivery.tag, false).await
                    }
                }
            }
        }
    }
}
