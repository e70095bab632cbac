use std::time::Duration;

use thiserror::Error;

/// A queue body that can never be processed, no matter how often it is
/// redelivered.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("payload is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("payload is not a valid event: {0}")]
    Json(#[from] serde_json::Error),

    #[error("event type is empty")]
    EmptyType,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClassifyError {
    #[error("unrecognized event type '{0}'")]
    Unrecognized(String),

    #[error("event type '{event_type}' is missing required field '{field}'")]
    MissingField {
        event_type: String,
        field: &'static str,
    },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("notification store unavailable: {0}")]
    Unavailable(String),

    #[error("notification store did not respond within {0:?}")]
    Timeout(Duration),

    #[error("notification store rejected the write: {0}")]
    Rejected(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BroadcastError {
    #[error("realtime transport closed")]
    Closed,
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("broker connection failed: {0}")]
    Connection(String),

    #[error("failed to acknowledge delivery {tag}: {reason}")]
    Ack { tag: u64, reason: String },

    #[error("failed to reject delivery {tag}: {reason}")]
    Reject { tag: u64, reason: String },

    #[error("failed to publish to {queue}: {reason}")]
    Publish { queue: String, reason: String },

    #[error("delivery stream failed: {0}")]
    Stream(String),
}

/// Errors surfaced to callers of the synchronous ingress.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IngressError {
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}
