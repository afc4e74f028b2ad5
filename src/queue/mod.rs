//! Durable Queue Module
//!
//! The at-least-once buffer sitting between a fan-out topic and a consumer group.
//!
//! ## Delivery Model
//! Queues follow a **claim / acknowledge** model:
//! 1. **Receive**: a consumer claims a batch of visible messages; each claim hides the
//!    message until its visibility deadline.
//! 2. **Acknowledge**: successful processing removes the message for good.
//! 3. **Redelivery**: a released message, or one whose deadline lapsed, is handed out
//!    again with its receive count incremented.
//! 4. **Dead-lettering**: once the receive count passes the configured maximum the
//!    message is parked in the dead-letter list and never retried automatically.
//!
//! ## Submodules
//! - **`queue`**: the `DurableQueue` state machine.
//! - **`registry`**: name to queue lookup built from static configuration.
//! - **`handlers`** / **`protocol`**: operator HTTP endpoints (stats, dead letters, redrive).

pub mod error;
pub mod handlers;
pub mod protocol;
pub mod queue;
pub mod registry;
pub mod types;

#[cfg(test)]
mod tests;
