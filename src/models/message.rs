use serde::{Deserialize, Serialize};

/// Payload published to the failed queue when processing a delivery
/// faulted. The original body is kept verbatim, lossily decoded if it was
/// not valid UTF-8.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedMessage {
    pub original_payload: String,
    pub failure_reason: String,
    pub failed_at: String,
}

impl FailedMessage {
    pub fn new(payload: &[u8], failure_reason: impl Into<String>) -> Self {
        Self {
            original_payload: String::from_utf8_lossy(payload).into_owned(),
            failure_reason: failure_reason.into(),
            failed_at: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        }
    }
}
