//! Consumer Group
//!
//! Drains one `DurableQueue` with at most `max_concurrency` messages in flight.
//!
//! ## Responsibilities
//! - **Polling**: a single loop claims up to `batch_size` messages per poll.
//! - **Bounding**: every worker holds a semaphore permit from dispatch until its
//!   message is acknowledged, released or dead-lettered. Claimed messages without a
//!   permit wait in the poll loop; their visibility timeout is the backpressure.
//! - **Claim renewal**: a sidecar task keeps extending the claim while the handler runs.
//! - **Shutdown**: dispatch stops at once, held messages are released, and the group
//!   waits for in-flight workers to settle. Nothing is acknowledged that was not processed.

use super::registry::HandlerFn;
use super::types::*;
use crate::queue::queue::DurableQueue;
use crate::queue::types::{MessageId, ReceivedMessage};
use crate::storage::memory::RecordStore;

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, watch};
use tokio::task::JoinHandle;

/// Aborts the claim-renewal sidecar when the worker finishes or unwinds.
struct RenewalGuard(Option<JoinHandle<()>>);

impl Drop for RenewalGuard {
    fn drop(&mut self) {
        if let Some(handle) = self.0.take() {
            handle.abort();
        }
    }
}

#[derive(Default)]
struct Counters {
    acknowledged: AtomicU64,
    retried: AtomicU64,
    dead_lettered: AtomicU64,
    skipped: AtomicU64,
}

pub struct ConsumerGroup {
    config: GroupConfig,
    queue: Arc<DurableQueue>,
    handler: HandlerFn,
    store: Arc<RecordStore>,
    slots: Arc<Semaphore>,
    counters: Counters,
}

impl ConsumerGroup {
    pub fn new(
        config: GroupConfig,
        queue: Arc<DurableQueue>,
        handler: HandlerFn,
        store: Arc<RecordStore>,
    ) -> Arc<Self> {
        let config = GroupConfig {
            max_concurrency: config.max_concurrency.max(1),
            batch_size: config.batch_size.max(1),
            ..config
        };
        let slots = Arc::new(Semaphore::new(config.max_concurrency));

        Arc::new(Self {
            config,
            queue,
            handler,
            store,
            slots,
            counters: Counters::default(),
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &GroupConfig {
        &self.config
    }

    /// Workers currently between dispatch and settlement.
    pub fn in_flight(&self) -> usize {
        self.config.max_concurrency - self.slots.available_permits()
    }

    pub fn stats(&self) -> GroupStats {
        GroupStats {
            acknowledged: self.counters.acknowledged.load(Ordering::Relaxed),
            retried: self.counters.retried.load(Ordering::Relaxed),
            dead_lettered: self.counters.dead_lettered.load(Ordering::Relaxed),
            skipped: self.counters.skipped.load(Ordering::Relaxed),
            in_flight: self.in_flight(),
        }
    }

    /// Spawns the poll loop and returns immediately.
    pub fn start(self: Arc<Self>, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(shutdown).await })
    }

    /// Runs the poll loop until `shutdown` flips to `true`, then drains in-flight work.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            group = %self.config.name,
            queue = %self.queue.name(),
            max_concurrency = self.config.max_concurrency,
            batch_size = self.config.batch_size,
            "consumer group started"
        );

        'poll: loop {
            if *shutdown.borrow() {
                break;
            }

            let batch = tokio::select! {
                _ = wait_for_shutdown(&mut shutdown) => break 'poll,
                batch = self.queue.receive_wait(self.config.batch_size, self.config.poll_wait) => batch,
            };

            if batch.is_empty() {
                continue;
            }
            tracing::trace!(group = %self.config.name, count = batch.len(), "polled batch");

            let mut held: VecDeque<ReceivedMessage> = batch.into();
            while let Some(received) = held.pop_front() {
                let permit = tokio::select! {
                    permit = self.slots.clone().acquire_owned() => permit.ok(),
                    _ = wait_for_shutdown(&mut shutdown) => None,
                };

                let Some(permit) = permit else {
                    held.push_front(received);
                    self.release_held(held).await;
                    break 'poll;
                };

                if received.is_claim_expired() {
                    // Already visible again; whoever claims it next will process it.
                    tracing::debug!(
                        group = %self.config.name,
                        message_id = %received.id(),
                        "claim lapsed before a worker slot freed up, skipping"
                    );
                    self.counters.skipped.fetch_add(1, Ordering::Relaxed);
                    continue;
                }

                let group = self.clone();
                tokio::spawn(async move {
                    group.process(received, permit).await;
                });
            }
        }

        self.drain().await;
        tracing::info!(group = %self.config.name, "consumer group stopped");
    }

    /// Waits until every worker has returned its permit.
    async fn drain(&self) {
        let in_flight = self.in_flight();
        if in_flight > 0 {
            tracing::info!(
                group = %self.config.name,
                in_flight,
                "waiting for in-flight messages to settle"
            );
        }
        let _ = self
            .slots
            .acquire_many(self.config.max_concurrency as u32)
            .await;
    }

    async fn release_held(&self, held: VecDeque<ReceivedMessage>) {
        for received in held {
            if let Err(e) = self.queue.release(received.id()).await {
                tracing::debug!(group = %self.config.name, "release on shutdown: {}", e);
            }
        }
    }

    /// Runs the handler for one message and settles it. The permit is held throughout.
    async fn process(self: Arc<Self>, received: ReceivedMessage, _permit: OwnedSemaphorePermit) {
        let id = received.id().clone();
        let receive_count = received.message.receive_count;
        let renewal = RenewalGuard(
            self.config
                .renew_visibility
                .then(|| self.spawn_visibility_renewal(&id)),
        );

        tracing::debug!(
            group = %self.config.name,
            message_id = %id,
            receive_count,
            "processing message"
        );

        let result = match tokio::time::timeout(
            self.config.handler_timeout,
            (self.handler)(received.message.body),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(HandlerError::Retryable(format!(
                "handler timed out after {:?}",
                self.config.handler_timeout
            ))),
        };

        drop(renewal);
        self.settle(&id, result).await;
    }

    async fn settle(&self, id: &MessageId, result: HandlerResult) {
        match result {
            Ok(outcome) => {
                match outcome {
                    HandlerOutcome::Record(records) => {
                        let count = records.len();
                        for record in records {
                            self.store.put(record);
                        }
                        tracing::debug!(group = %self.config.name, message_id = %id, count, "recorded");
                    }
                    HandlerOutcome::Detected(notifications) if !notifications.is_empty() => {
                        tracing::info!(
                            group = %self.config.name,
                            message_id = %id,
                            count = notifications.len(),
                            "detection emitted"
                        );
                    }
                    HandlerOutcome::Detected(_) | HandlerOutcome::Done => {}
                }

                self.queue.acknowledge(id).await;
                self.counters.acknowledged.fetch_add(1, Ordering::Relaxed);
            }
            Err(HandlerError::Retryable(reason)) => {
                self.counters.retried.fetch_add(1, Ordering::Relaxed);
                match self.config.retry_strategy {
                    RetryStrategy::Release => {
                        tracing::warn!(group = %self.config.name, message_id = %id, "retryable failure, releasing: {}", reason);
                        if let Err(e) = self.queue.release(id).await {
                            tracing::debug!(group = %self.config.name, "release failed: {}", e);
                        }
                    }
                    RetryStrategy::Expire => {
                        tracing::warn!(group = %self.config.name, message_id = %id, "retryable failure, awaiting redelivery: {}", reason);
                    }
                }
            }
            Err(HandlerError::Terminal(reason)) => {
                if self.config.terminal_to_dead_letter {
                    tracing::error!(group = %self.config.name, message_id = %id, "terminal failure, dead-lettering: {}", reason);
                    match self.queue.fail(id).await {
                        Ok(()) => {
                            self.counters.dead_lettered.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(e) => {
                            tracing::debug!(group = %self.config.name, "dead-letter failed: {}", e);
                        }
                    }
                } else {
                    tracing::error!(group = %self.config.name, message_id = %id, "terminal failure, awaiting receive budget: {}", reason);
                    self.counters.retried.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }

    /// Extends the claim every third of the visibility timeout while the handler runs.
    fn spawn_visibility_renewal(&self, id: &MessageId) -> JoinHandle<()> {
        let queue = self.queue.clone();
        let id = id.clone();
        let timeout = queue.config().visibility_timeout;
        let every = (timeout / 3).max(Duration::from_millis(10));

        tokio::spawn(async move {
            loop {
                tokio::time::sleep(every).await;

                match queue.extend_visibility(&id, timeout).await {
                    Ok(_) => {
                        tracing::trace!("Renewed claim for message {}", id);
                    }
                    Err(_) => {
                        // Settled or already redelivered
                        tracing::trace!("Message {} no longer needs claim renewal", id);
                        break;
                    }
                }
            }
        })
    }
}

/// Resolves once the flag is `true` or the sender is gone.
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}
