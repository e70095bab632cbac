//! Shared classify → persist → broadcast path used by both ingress routes.

use std::{sync::Arc, time::Duration};

use tokio::time::timeout;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    classifier::classify,
    clients::{broadcaster::Broadcaster, store::NotificationStore},
    error::{ClassifyError, StoreError},
    models::{event::Event, notification::NewNotification},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Persisted, then handed to the broadcaster. `recipients` is `None`
    /// when the broadcast itself failed.
    Delivered {
        id: Uuid,
        message: String,
        recipients: Option<usize>,
    },
    /// Nothing persisted, nothing broadcast.
    Skipped(ClassifyError),
}

pub struct NotificationPipeline {
    store: Arc<dyn NotificationStore>,
    broadcaster: Arc<dyn Broadcaster>,
    store_timeout: Duration,
}

impl NotificationPipeline {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        broadcaster: Arc<dyn Broadcaster>,
        store_timeout: Duration,
    ) -> Self {
        Self {
            store,
            broadcaster,
            store_timeout,
        }
    }

    pub async fn process(&self, event: &Event) -> Result<ProcessOutcome, StoreError> {
        let message = match classify(event) {
            Ok(message) => message,
            Err(e) => {
                warn!(
                    event_type = %event.event_type,
                    user_id = %event.user_id_or_empty(),
                    reason = %e,
                    "Skipping event"
                );
                return Ok(ProcessOutcome::Skipped(e));
            }
        };

        info!(
            event_type = %event.event_type,
            user_id = %event.user_id_or_empty(),
            "Sending notification"
        );

        let notification = NewNotification::new(
            event.user_id_or_empty().to_string(),
            event.event_type.clone(),
            message.clone(),
        );

        let id = self.persist(&notification).await?;

        let recipients = match self.broadcaster.broadcast(&message).await {
            Ok(recipients) => Some(recipients),
            Err(e) => {
                warn!(
                    error = %e,
                    notification_id = %id,
                    event_type = %event.event_type,
                    "Broadcast failed, notification persisted only"
                );
                None
            }
        };

        Ok(ProcessOutcome::Delivered {
            id,
            message,
            recipients,
        })
    }

    async fn persist(&self, notification: &NewNotification) -> Result<Uuid, StoreError> {
        let result = match timeout(self.store_timeout, self.store.save(notification)).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(self.store_timeout)),
        };

        if let Err(e) = &result {
            error!(
                error = %e,
                event_type = %notification.event_type,
                user_id = %notification.user_id,
                "Failed to persist notification"
            );
        }

        result
    }
}
