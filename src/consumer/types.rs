use crate::storage::types::Record;

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// What a handler produced for one message.
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerOutcome {
    /// Rows the group upserts into the record store before acknowledging.
    Record(Vec<Record>),
    /// Notification payloads the handler dispatched (possibly none).
    Detected(Vec<serde_json::Value>),
    /// Nothing to persist or report.
    Done,
}

/// How a handler communicates retryability to its group.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandlerError {
    /// The message may succeed later; it is released or left to expire.
    #[error("retryable: {0}")]
    Retryable(String),
    /// Retrying is futile (e.g. malformed body).
    #[error("terminal: {0}")]
    Terminal(String),
}

impl HandlerError {
    pub fn retryable(reason: impl std::fmt::Display) -> Self {
        HandlerError::Retryable(reason.to_string())
    }

    pub fn terminal(reason: impl std::fmt::Display) -> Self {
        HandlerError::Terminal(reason.to_string())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, HandlerError::Retryable(_))
    }
}

pub type HandlerResult = Result<HandlerOutcome, HandlerError>;

/// Redelivery speed after a retryable failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RetryStrategy {
    /// Release the claim so the message is visible again at once.
    Release,
    /// Keep the claim and let the visibility timeout lapse.
    #[default]
    Expire,
}

/// Per-group runtime knobs.
#[derive(Debug, Clone)]
pub struct GroupConfig {
    pub name: String,
    /// Upper bound on messages processed simultaneously. Always at least 1.
    pub max_concurrency: usize,
    /// Messages drawn per poll.
    pub batch_size: usize,
    /// Long-poll wait when the queue is empty.
    pub poll_wait: Duration,
    /// Budget for a single handler invocation.
    pub handler_timeout: Duration,
    pub retry_strategy: RetryStrategy,
    /// Dead-letter terminal failures at once instead of waiting out the receive budget.
    pub terminal_to_dead_letter: bool,
    /// Keep extending the claim while the handler is still running.
    pub renew_visibility: bool,
}

impl GroupConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            max_concurrency: 1,
            batch_size: 10,
            poll_wait: Duration::from_secs(1),
            handler_timeout: Duration::from_secs(300),
            retry_strategy: RetryStrategy::default(),
            terminal_to_dead_letter: false,
            renew_visibility: true,
        }
    }

    pub fn max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }
}

/// Running totals for a group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupStats {
    pub acknowledged: u64,
    pub retried: u64,
    pub dead_lettered: u64,
    /// Held messages whose claim lapsed before a worker slot freed up.
    pub skipped: u64,
    pub in_flight: usize,
}
