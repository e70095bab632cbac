use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A persisted notification. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRecord {
    pub id: Uuid,
    pub user_id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct NewNotification {
    pub user_id: String,
    pub event_type: String,
    pub message: String,
}

impl NewNotification {
    pub fn new(user_id: String, event_type: String, message: String) -> Self {
        Self {
            user_id,
            event_type,
            message,
        }
    }

    pub fn into_record(self, id: Uuid, created_at: DateTime<Utc>) -> NotificationRecord {
        NotificationRecord {
            id,
            user_id: self.user_id,
            event_type: self.event_type,
            message: self.message,
            created_at,
        }
    }
}
