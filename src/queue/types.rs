use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Unique identifier for a message within a queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct MessageId(pub String);

impl MessageId {
    /// Generates a new random UUID v4-based MessageId.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An envelope carrying one normalized event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub body: serde_json::Value,
    /// How many times the message was handed out without being acknowledged.
    pub receive_count: u32,
    /// Timestamp (ms) when the message was enqueued.
    pub enqueued_at: u64,
}

/// A message handed to a consumer together with the end of its claim.
#[derive(Debug, Clone)]
pub struct ReceivedMessage {
    pub message: Message,
    /// When the claim lapses and the message becomes visible again.
    pub visibility_deadline: tokio::time::Instant,
}

impl ReceivedMessage {
    pub fn id(&self) -> &MessageId {
        &self.message.id
    }

    pub fn body(&self) -> &serde_json::Value {
        &self.message.body
    }

    pub fn is_claim_expired(&self) -> bool {
        tokio::time::Instant::now() >= self.visibility_deadline
    }
}

pub const DEFAULT_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_MAX_RECEIVE_COUNT: u32 = 3;

/// Per-queue behaviour knobs.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub visibility_timeout: Duration,
    /// A receive that would push `receive_count` above this dead-letters the message.
    pub max_receive_count: u32,
    /// Maximum number of live (non dead-lettered) messages; `None` is unbounded.
    pub capacity: Option<usize>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            visibility_timeout: DEFAULT_VISIBILITY_TIMEOUT,
            max_receive_count: DEFAULT_MAX_RECEIVE_COUNT,
            capacity: None,
        }
    }
}

/// Point-in-time counters of a queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub visible: usize,
    pub in_flight: usize,
    pub dead_lettered: usize,
}

/// Helper to get the current system time in milliseconds.
pub fn now_ms() -> u64 {
    crate::storage::types::now_ms()
}
