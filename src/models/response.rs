use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn processed() -> Self {
        Self {
            message: "Notification processed".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

/// Frame pushed to realtime subscribers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RealtimeFrame {
    pub event: String,
    pub data: String,
}

impl RealtimeFrame {
    pub fn notification(message: impl Into<String>) -> Self {
        Self {
            event: "notification".to_string(),
            data: message.into(),
        }
    }
}
