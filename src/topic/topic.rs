//! Fan-out Topic
//!
//! Copies every published message into each subscribed queue. Subscribers are
//! attempted concurrently and independently: a subscriber that keeps failing
//! exhausts only its own retry budget and never delays delivery to the others.

use super::error::PublishError;
use crate::queue::queue::DurableQueue;
use crate::queue::types::MessageId;

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

/// Per-subscriber retry budget for transient enqueue failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub attempts: usize,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            initial_delay: Duration::from_millis(150),
            max_delay: Duration::from_millis(1200),
        }
    }
}

/// Outcome of a publish that reached at least one subscriber.
#[derive(Debug, Clone, Default)]
pub struct PublishReport {
    /// `(queue name, message id)` per subscriber that accepted the message.
    pub delivered: Vec<(String, MessageId)>,
    /// Names of subscribers whose retry budget ran out.
    pub failed: Vec<String>,
}

impl PublishReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct Topic {
    name: String,
    subscribers: Vec<Arc<DurableQueue>>,
    retry: RetryPolicy,
}

impl Topic {
    pub fn new(name: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            name: name.into(),
            subscribers: Vec::new(),
            retry,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Adds a queue to the fan-out set. Subscribing the same queue twice is a no-op.
    pub fn subscribe(&mut self, queue: Arc<DurableQueue>) {
        if self.subscribers.iter().any(|q| q.name() == queue.name()) {
            return;
        }
        tracing::info!("Subscribed queue {} to topic {}", queue.name(), self.name);
        self.subscribers.push(queue);
    }

    pub fn subscriber_names(&self) -> Vec<String> {
        self.subscribers
            .iter()
            .map(|q| q.name().to_string())
            .collect()
    }

    /// Copies `body` into every subscribed queue.
    ///
    /// Succeeds when at least one subscriber accepted the message; the report lists
    /// the subscribers that did not. Fails only when every subscriber failed.
    pub async fn publish(&self, body: serde_json::Value) -> Result<PublishReport, PublishError> {
        let mut report = PublishReport::default();

        if self.subscribers.is_empty() {
            tracing::warn!("Topic {} has no subscribers, message dropped", self.name);
            return Ok(report);
        }

        let mut deliveries = JoinSet::new();
        for queue in &self.subscribers {
            let queue = queue.clone();
            let body = body.clone();
            let retry = self.retry.clone();
            deliveries.spawn(async move {
                let result = enqueue_with_retry(&queue, body, &retry).await;
                (queue.name().to_string(), result)
            });
        }

        while let Some(joined) = deliveries.join_next().await {
            match joined {
                Ok((queue, Some(id))) => report.delivered.push((queue, id)),
                Ok((queue, None)) => report.failed.push(queue),
                Err(e) => {
                    tracing::error!("Delivery task for topic {} aborted: {}", self.name, e);
                }
            }
        }

        // A panicked delivery task leaves no name behind; account for it by elimination.
        for name in self.subscriber_names() {
            let seen = report.delivered.iter().any(|(q, _)| q == &name)
                || report.failed.contains(&name);
            if !seen {
                report.failed.push(name);
            }
        }

        if report.delivered.is_empty() {
            tracing::error!(
                "Publish to topic {} failed for all {} subscriber(s)",
                self.name,
                report.failed.len()
            );
            return Err(PublishError::AllSubscribersFailed {
                topic: self.name.clone(),
                failed: report.failed,
            });
        }

        if !report.is_complete() {
            tracing::warn!(
                "Publish to topic {} partially failed: {:?}",
                self.name,
                report.failed
            );
        }

        tracing::debug!(
            "Published to topic {} ({} subscriber(s))",
            self.name,
            report.delivered.len()
        );
        Ok(report)
    }
}

/// Enqueues with exponential backoff and jitter. Returns `None` once the budget is spent
/// or the error is not transient.
async fn enqueue_with_retry(
    queue: &DurableQueue,
    body: serde_json::Value,
    retry: &RetryPolicy,
) -> Option<MessageId> {
    let mut delay_ms = retry.initial_delay.as_millis() as u64;
    let max_delay_ms = retry.max_delay.as_millis() as u64;
    let attempts = retry.attempts.max(1);

    for attempt in 0..attempts {
        match queue.enqueue(body.clone()).await {
            Ok(id) => return Some(id),
            Err(e) => {
                if !e.is_transient() || attempt + 1 == attempts {
                    tracing::warn!(
                        "Giving up on queue {} after {} attempt(s): {}",
                        queue.name(),
                        attempt + 1,
                        e
                    );
                    return None;
                }
                tracing::debug!("Enqueue to {} failed, retrying: {}", queue.name(), e);
                // Simple jitter to prevent thundering herd
                let jitter = rand::random::<u64>() % 50;
                tokio::time::sleep(Duration::from_millis(delay_ms + jitter)).await;
                delay_ms = (delay_ms * 2).min(max_delay_ms);
            }
        }
    }

    None
}
