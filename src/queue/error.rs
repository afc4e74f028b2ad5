use thiserror::Error;

use super::types::MessageId;

/// Errors surfaced by queue operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// The queue is at capacity. Transient: the caller should retry.
    #[error("queue {queue} is full (capacity {capacity})")]
    Full { queue: String, capacity: usize },

    /// The message is not held by the queue (already acknowledged or dead-lettered).
    #[error("message {id} not found in queue {queue}")]
    UnknownMessage { queue: String, id: MessageId },
}

impl QueueError {
    pub fn is_transient(&self) -> bool {
        matches!(self, QueueError::Full { .. })
    }
}
