use std::sync::Arc;

use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio_postgres::{Client, NoTls};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    clients::store::NotificationStore, error::StoreError, models::notification::NewNotification,
};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS notifications (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    user_id TEXT NOT NULL,
    type TEXT NOT NULL,
    message TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);
CREATE INDEX IF NOT EXISTS notifications_user_id_idx ON notifications (user_id);
"#;

pub struct PostgresStore {
    database_url: String,
    client: RwLock<Arc<Client>>,
}

impl PostgresStore {
    pub async fn connect(database_url: &str) -> Result<Self, Error> {
        info!("Connecting to PostgreSQL database");

        let client = Self::open(database_url)
            .await
            .map_err(|e| anyhow!("Failed to connect to database: {}", e))?;

        client
            .batch_execute(SCHEMA)
            .await
            .map_err(|e| anyhow!("Failed to prepare notifications table: {}", e))?;

        info!("PostgreSQL connection established");

        Ok(Self {
            database_url: database_url.to_string(),
            client: RwLock::new(Arc::new(client)),
        })
    }

    async fn open(database_url: &str) -> Result<Client, tokio_postgres::Error> {
        let (client, connection) = tokio_postgres::connect(database_url, NoTls).await?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!(error = %e, "PostgreSQL connection terminated");
            }
        });

        Ok(client)
    }

    /// Returns a live client, replacing the shared one if its connection
    /// has gone away.
    async fn client(&self) -> Result<Arc<Client>, StoreError> {
        let current = self.client.read().await.clone();
        if !current.is_closed() {
            return Ok(current);
        }

        let mut guard = self.client.write().await;
        if !guard.is_closed() {
            return Ok(guard.clone());
        }

        warn!("PostgreSQL connection closed, reconnecting");

        let client = Self::open(&self.database_url)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        *guard = Arc::new(client);

        info!("PostgreSQL connection re-established");

        Ok(guard.clone())
    }
}

fn store_error(e: tokio_postgres::Error) -> StoreError {
    if e.code().is_some() {
        StoreError::Rejected(e.to_string())
    } else {
        StoreError::Unavailable(e.to_string())
    }
}

#[async_trait]
impl NotificationStore for PostgresStore {
    async fn save(&self, notification: &NewNotification) -> Result<Uuid, StoreError> {
        let client = self.client().await?;

        let row = client
            .query_one(
                r#"
                INSERT INTO notifications (user_id, type, message)
                VALUES ($1, $2, $3)
                RETURNING id
                "#,
                &[
                    &notification.user_id,
                    &notification.event_type,
                    &notification.message,
                ],
            )
            .await
            .map_err(|e| {
                error!(
                    error = %e,
                    user_id = %notification.user_id,
                    event_type = %notification.event_type,
                    "Failed to write notification to database"
                );
                store_error(e)
            })?;

        let id: Uuid = row
            .try_get(0)
            .map_err(|e| StoreError::Rejected(format!("Unexpected id column: {}", e)))?;

        debug!(
            notification_id = %id,
            event_type = %notification.event_type,
            "Notification written to database"
        );

        Ok(id)
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        let client = self.client().await?;

        client
            .query_one("SELECT 1", &[])
            .await
            .map_err(|e| StoreError::Unavailable(format!("Database health check failed: {}", e)))?;

        Ok(())
    }
}
