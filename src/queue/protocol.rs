//! Queue HTTP Protocol
//!
//! Operator-facing DTOs for inspecting queues and draining dead letters.

use super::types::{Message, QueueStats};
use serde::{Deserialize, Serialize};

pub const ENDPOINT_QUEUE_STATS: &str = "/queues/:name/stats";
pub const ENDPOINT_DEAD_LETTERS: &str = "/queues/:name/dead_letters";
pub const ENDPOINT_REDRIVE: &str = "/queues/:name/redrive";

#[derive(Debug, Serialize, Deserialize)]
pub struct QueueStatsResponse {
    pub queue: String,
    pub stats: Option<QueueStats>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeadLettersResponse {
    pub queue: String,
    pub messages: Vec<Message>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RedriveResponse {
    pub queue: String,
    pub redriven: usize,
}
