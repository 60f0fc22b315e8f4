use serde::{Deserialize, Serialize};

use crate::ids::Guid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    #[default]
    Continue,
    Complete,
    Cancel,
}

/// One chunk of a multi-part transfer, sent as the body of a `.multi` call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MultiPartRequest {
    pub transaction_id: Guid,
    #[serde(default)]
    pub method: String,
    pub status: MessageStatus,
    #[serde(default)]
    pub current_position: u64,
    #[serde(default)]
    pub bytes_sent: u64,
    #[serde(default)]
    pub total_bytes: u64,
    #[serde(default, with = "serde_bytes")]
    pub payload: Vec<u8>,
}

impl MultiPartRequest {
    /// A bare cancellation for `transaction_id`.
    pub fn cancel(transaction_id: Guid) -> Self {
        Self { transaction_id, status: MessageStatus::Cancel, ..Self::default() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MultiPartResponse {
    #[serde(rename = "continue")]
    pub proceed: bool,
    #[serde(default, with = "serde_bytes")]
    pub response_bytes: Option<Vec<u8>>,
}

impl MultiPartResponse {
    pub fn proceed() -> Self {
        Self { proceed: true, response_bytes: None }
    }

    pub fn stop() -> Self {
        Self { proceed: false, response_bytes: None }
    }

    pub fn completed(response_bytes: Vec<u8>) -> Self {
        Self { proceed: true, response_bytes: Some(response_bytes) }
    }
}
