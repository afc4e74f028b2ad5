//! Topic HTTP Protocol
//!
//! Manual injection of events into a topic, mirroring what a crawler does.

use crate::queue::types::MessageId;
use serde::{Deserialize, Serialize};

pub const ENDPOINT_PUBLISH: &str = "/topics/:name/publish";

#[derive(Debug, Serialize, Deserialize)]
pub struct PublishResponse {
    pub topic: String,
    pub delivered: Vec<DeliveredCopy>,
    pub failed: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeliveredCopy {
    pub queue: String,
    pub message_id: MessageId,
}
