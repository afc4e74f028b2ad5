//! Durable Message Queue
//!
//! An at-least-once buffer between a topic and a consumer group. Each message moves
//! through a small state machine:
//!
//! ```text
//! enqueue ─► Visible ─receive─► Claimed ─acknowledge─► (removed)
//!               ▲                  │
//!               ├──── release ─────┤
//!               ├─ deadline lapse ─┘
//!               │
//!  receive with receive_count > max_receive_count ─► DeadLettered
//! ```
//!
//! ## Responsibilities
//! - **Visibility**: a claimed message is hidden until `now + visibility_timeout`.
//! - **Redelivery**: a claim that is never acknowledged lapses and the message is handed
//!   out again with `receive_count` incremented.
//! - **Dead-lettering**: a receive that pushes `receive_count` past `max_receive_count`
//!   moves the message to the dead-letter list instead of returning it. The move happens
//!   under the same lock as the receive, so it is atomic.

use super::error::QueueError;
use super::types::*;

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

struct QueuedMessage {
    message: Message,
    /// `None` while visible; `Some(deadline)` while claimed.
    invisible_until: Option<Instant>,
}

impl QueuedMessage {
    fn is_visible(&self, now: Instant) -> bool {
        match self.invisible_until {
            None => true,
            Some(deadline) => deadline <= now,
        }
    }
}

#[derive(Default)]
struct QueueState {
    next_seq: u64,
    /// Insertion order gives best-effort FIFO.
    messages: BTreeMap<u64, QueuedMessage>,
    index: HashMap<MessageId, u64>,
    dead_letters: Vec<Message>,
}

impl QueueState {
    fn push(&mut self, message: Message) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.index.insert(message.id.clone(), seq);
        self.messages.insert(
            seq,
            QueuedMessage {
                message,
                invisible_until: None,
            },
        );
    }

    fn remove(&mut self, id: &MessageId) -> Option<QueuedMessage> {
        let seq = self.index.remove(id)?;
        self.messages.remove(&seq)
    }

    fn get_mut(&mut self, id: &MessageId) -> Option<&mut QueuedMessage> {
        let seq = self.index.get(id)?;
        self.messages.get_mut(seq)
    }
}

/// The buffer a consumer group drains.
pub struct DurableQueue {
    name: String,
    config: QueueConfig,
    state: Mutex<QueueState>,
    /// Wakes long-polling receivers when something becomes visible.
    notify: Notify,
}

impl DurableQueue {
    pub fn new(name: impl Into<String>, config: QueueConfig) -> Self {
        Self {
            name: name.into(),
            config,
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Appends a message with `receive_count = 0`.
    ///
    /// Fails with the transient `QueueError::Full` when the queue is at capacity.
    pub async fn enqueue(&self, body: serde_json::Value) -> Result<MessageId, QueueError> {
        let mut state = self.state.lock().await;

        if let Some(capacity) = self.config.capacity
            && state.messages.len() >= capacity
        {
            return Err(QueueError::Full {
                queue: self.name.clone(),
                capacity,
            });
        }

        let id = MessageId::new();
        state.push(Message {
            id: id.clone(),
            body,
            receive_count: 0,
            enqueued_at: now_ms(),
        });
        drop(state);

        tracing::trace!(queue = %self.name, message_id = %id, "enqueued");
        self.notify.notify_waiters();
        Ok(id)
    }

    /// Claims up to `max_batch` visible messages without waiting.
    pub async fn receive(&self, max_batch: usize) -> Vec<ReceivedMessage> {
        self.receive_inner(max_batch).await.0
    }

    /// Claims up to `max_batch` visible messages, waiting at most `wait` for one to appear.
    pub async fn receive_wait(&self, max_batch: usize, wait: Duration) -> Vec<ReceivedMessage> {
        let wait_end = Instant::now() + wait;

        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let (batch, next_deadline) = self.receive_inner(max_batch).await;
            if !batch.is_empty() || Instant::now() >= wait_end {
                return batch;
            }

            // A lapsing claim makes a message visible without any notification.
            let wake = next_deadline.map_or(wait_end, |deadline| deadline.min(wait_end));
            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep_until(wake) => {}
            }
        }
    }

    /// Returns the claimed batch and the earliest pending claim deadline.
    async fn receive_inner(&self, max_batch: usize) -> (Vec<ReceivedMessage>, Option<Instant>) {
        let mut batch = Vec::new();
        if max_batch == 0 {
            return (batch, None);
        }

        let now = Instant::now();
        let deadline = now + self.config.visibility_timeout;
        let mut exceeded = Vec::new();
        let mut next_deadline: Option<Instant> = None;

        let mut state = self.state.lock().await;

        for (seq, entry) in state.messages.iter_mut() {
            if batch.len() >= max_batch {
                break;
            }
            if !entry.is_visible(now) {
                if let Some(until) = entry.invisible_until {
                    next_deadline = Some(next_deadline.map_or(until, |d| d.min(until)));
                }
                continue;
            }

            entry.message.receive_count += 1;
            if entry.message.receive_count > self.config.max_receive_count {
                exceeded.push(*seq);
                continue;
            }

            entry.invisible_until = Some(deadline);
            batch.push(ReceivedMessage {
                message: entry.message.clone(),
                visibility_deadline: deadline,
            });
        }

        for seq in exceeded {
            if let Some(entry) = state.messages.remove(&seq) {
                state.index.remove(&entry.message.id);
                tracing::warn!(
                    queue = %self.name,
                    message_id = %entry.message.id,
                    receive_count = entry.message.receive_count,
                    "receive count exceeded, moving message to dead-letter queue"
                );
                state.dead_letters.push(entry.message);
            }
        }

        if !batch.is_empty() {
            tracing::trace!(queue = %self.name, count = batch.len(), "claimed batch");
        }

        (batch, next_deadline)
    }

    /// Permanently removes a message. Acknowledging an unknown id is a no-op.
    ///
    /// Returns whether a message was removed.
    pub async fn acknowledge(&self, id: &MessageId) -> bool {
        let removed = self.state.lock().await.remove(id).is_some();
        if removed {
            tracing::trace!(queue = %self.name, message_id = %id, "acknowledged");
        } else {
            tracing::debug!(queue = %self.name, message_id = %id, "acknowledge of unknown message ignored");
        }
        removed
    }

    /// Makes a message visible again immediately. The receive count is left unchanged.
    pub async fn release(&self, id: &MessageId) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        let entry = state.get_mut(id).ok_or_else(|| self.unknown(id))?;
        entry.invisible_until = None;
        drop(state);

        tracing::trace!(queue = %self.name, message_id = %id, "released");
        self.notify.notify_waiters();
        Ok(())
    }

    /// Pushes the claim deadline of a message still being worked on to `now + extension`.
    pub async fn extend_visibility(
        &self,
        id: &MessageId,
        extension: Duration,
    ) -> Result<Instant, QueueError> {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        let entry = state.get_mut(id).ok_or_else(|| self.unknown(id))?;

        if entry.is_visible(now) {
            return Err(self.unknown(id));
        }

        let deadline = now + extension;
        entry.invisible_until = Some(deadline);
        Ok(deadline)
    }

    /// Moves a message straight to the dead-letter list (terminal handler failure).
    pub async fn fail(&self, id: &MessageId) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        let entry = state.remove(id).ok_or_else(|| self.unknown(id))?;

        tracing::warn!(
            queue = %self.name,
            message_id = %id,
            receive_count = entry.message.receive_count,
            "terminal failure, moving message to dead-letter queue"
        );
        state.dead_letters.push(entry.message);
        Ok(())
    }

    pub async fn stats(&self) -> QueueStats {
        let now = Instant::now();
        let state = self.state.lock().await;
        let visible = state
            .messages
            .values()
            .filter(|entry| entry.is_visible(now))
            .count();

        QueueStats {
            visible,
            in_flight: state.messages.len() - visible,
            dead_lettered: state.dead_letters.len(),
        }
    }

    /// Live (not dead-lettered) messages, visible or claimed.
    pub async fn len(&self) -> usize {
        self.state.lock().await.messages.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Snapshot of the dead-letter list, oldest first.
    pub async fn dead_letters(&self) -> Vec<Message> {
        self.state.lock().await.dead_letters.clone()
    }

    /// Operator action: moves every dead-lettered message back with a reset receive count.
    pub async fn redrive_dead_letters(&self) -> usize {
        let mut state = self.state.lock().await;
        let dead = std::mem::take(&mut state.dead_letters);
        let count = dead.len();

        for mut message in dead {
            message.receive_count = 0;
            state.push(message);
        }
        drop(state);

        if count > 0 {
            tracing::info!(queue = %self.name, count, "redrove dead-lettered messages");
            self.notify.notify_waiters();
        }
        count
    }

    fn unknown(&self, id: &MessageId) -> QueueError {
        QueueError::UnknownMessage {
            queue: self.name.clone(),
            id: id.clone(),
        }
    }
}
