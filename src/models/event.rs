use serde::{Deserialize, Serialize};

use crate::error::DecodeError;

/// Something that happened upstream, as published on the queue or posted
/// to `/notify`. Only `type` is required to decode; the remaining fields
/// are checked by the classifier for the types that need them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl Event {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            ..Default::default()
        }
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_order_id(mut self, order_id: impl Into<String>) -> Self {
        self.order_id = Some(order_id.into());
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    /// Decodes a queue message body.
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let text = std::str::from_utf8(payload)?;
        let event: Event = serde_json::from_str(text)?;

        if event.event_type.trim().is_empty() {
            return Err(DecodeError::EmptyType);
        }

        Ok(event)
    }

    pub fn user_id_or_empty(&self) -> &str {
        self.user_id.as_deref().unwrap_or_default()
    }
}

/// Body accepted by `POST /notify`. Every field is optional at the JSON
/// level so that missing fields surface as a validation error rather than
/// an extractor rejection.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifyRequest {
    #[serde(default)]
    pub user_id: Option<String>,

    #[serde(default, rename = "type")]
    pub event_type: Option<String>,

    #[serde(default)]
    pub order_id: Option<String>,

    #[serde(default)]
    pub status: Option<String>,
}
