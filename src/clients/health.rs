use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use chrono::Utc;
use tokio::{sync::watch, time::timeout};
use tracing::{debug, warn};

use crate::{
    clients::{broadcaster::Broadcaster, store::NotificationStore},
    error::StoreError,
    models::health::{HealthStatus, ReadinessResponse, ServiceHealth},
    queue::BrokerStatus,
};

pub struct HealthChecker {
    store: Arc<dyn NotificationStore>,
    broadcaster: Arc<dyn Broadcaster>,
    broker_status: watch::Receiver<BrokerStatus>,
    store_timeout: Duration,
}

impl HealthChecker {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        broadcaster: Arc<dyn Broadcaster>,
        broker_status: watch::Receiver<BrokerStatus>,
        store_timeout: Duration,
    ) -> Self {
        Self {
            store,
            broadcaster,
            broker_status,
            store_timeout,
        }
    }

    pub async fn check_all(&self) -> ReadinessResponse {
        let mut checks = HashMap::new();

        checks.insert("database".to_string(), self.check_database().await);
        checks.insert("message_broker".to_string(), self.check_broker());

        ReadinessResponse {
            status: Self::determine_overall_status(&checks),
            timestamp: Utc::now(),
            subscribers: self.broadcaster.subscriber_count(),
            checks,
        }
    }

    async fn check_database(&self) -> ServiceHealth {
        let start = Instant::now();

        match timeout(self.store_timeout, self.store.health_check()).await {
            Ok(Ok(())) => {
                let elapsed = start.elapsed().as_millis() as u64;
                debug!(response_time_ms = elapsed, "Database health check passed");
                ServiceHealth::healthy(elapsed)
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Database health check failed");
                ServiceHealth::unhealthy(e.to_string())
            }
            Err(_) => {
                let e = StoreError::Timeout(self.store_timeout);
                warn!(error = %e, "Database health check timed out");
                ServiceHealth::unhealthy(e.to_string())
            }
        }
    }

    fn check_broker(&self) -> ServiceHealth {
        let status = *self.broker_status.borrow();

        match status {
            BrokerStatus::Connected => ServiceHealth::healthy(0).with_state(status.as_str()),
            BrokerStatus::Connecting => {
                ServiceHealth::degraded("Reconnecting to broker".to_string())
                    .with_state(status.as_str())
            }
            BrokerStatus::Disconnected => {
                warn!("Broker is disconnected");
                ServiceHealth::unhealthy("Not connected to broker".to_string())
                    .with_state(status.as_str())
            }
        }
    }

    fn determine_overall_status(checks: &HashMap<String, ServiceHealth>) -> HealthStatus {
        if checks
            .values()
            .any(|health| health.status == HealthStatus::Unhealthy)
        {
            HealthStatus::Unhealthy
        } else if checks
            .values()
            .any(|health| health.status == HealthStatus::Degraded)
        {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }
}
