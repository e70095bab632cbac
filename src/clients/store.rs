use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::{
    error::StoreError,
    models::notification::{NewNotification, NotificationRecord},
};

/// Append-only sink for notification records.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Appends one record and returns the identifier the store assigned.
    async fn save(&self, notification: &NewNotification) -> Result<Uuid, StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;
}

/// Process-local store for tests and in-process runs.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<Vec<NotificationRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<NotificationRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|records| records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn save(&self, notification: &NewNotification) -> Result<Uuid, StoreError> {
        let id = Uuid::new_v4();
        let record = notification.clone().into_record(id, Utc::now());

        self.records
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))?
            .push(record);

        Ok(id)
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
