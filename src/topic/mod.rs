//! Fan-out Topic Module
//!
//! Publish/subscribe channels that duplicate each published message into every
//! subscribed queue.
//!
//! ## Guarantees
//! - **Completeness**: one `publish` leaves one copy in each subscriber that accepted it.
//! - **Independence**: subscribers are retried separately with backoff; one failing
//!   queue never holds back the others.
//! - **Failure reporting**: `publish` errors only when no subscriber accepted the
//!   message, so the producer can retry at its next scheduled run.

pub mod error;
pub mod handlers;
pub mod protocol;
pub mod registry;
pub mod topic;
