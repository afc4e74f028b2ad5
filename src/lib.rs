//! Threat-Intel Pipeline Library
//!
//! This library crate defines the core modules of the pipeline. It serves as the
//! foundation for the binary executable (`main.rs`).
//!
//! ## Data Flow
//! `Scheduler → Crawler → Topic → { record queue, detect queue } → { recorder, detector } → Record Store`
//!
//! ## Architecture Modules
//! - **`storage`**: sharded in-memory record table with logical expiry and a
//!   background reclaimer.
//! - **`queue`**: at-least-once durable queues with visibility timeouts, receive
//!   counting and dead-lettering.
//! - **`topic`**: fan-out of each published message into every subscribed queue.
//! - **`consumer`**: concurrency-bounded consumer groups and the handler registry.
//! - **`scheduler`**: interval jobs that drive the crawlers.
//! - **`intel`**: the IOC / entity domain: recorders, detectors, alerting, feeds.
//! - **`config`**: static topology from TOML plus environment overrides.
//! - **`pipeline`** / **`server`**: wiring and the HTTP admin surface.

pub mod config;
pub mod consumer;
pub mod intel;
pub mod pipeline;
pub mod queue;
pub mod scheduler;
pub mod server;
pub mod storage;
pub mod topic;
