//! Consumer Group Module
//!
//! Pools of workers that drain a durable queue, apply domain logic and settle each
//! message. Recorder groups persist handler output into the record store; detector
//! groups only read it.
//!
//! ## Message Lifecycle
//! `Visible → Claimed → { Acknowledged | Released → Visible | DeadlineExpired → Visible | DeadLettered }`
//!
//! 1. **Claim**: the poll loop receives a batch; each claim hides the message.
//! 2. **Dispatch**: a worker slot (semaphore permit) is taken per message; the group
//!    never runs more than `max_concurrency` handlers at once.
//! 3. **Handle**: the registered handler returns an outcome or a retryable/terminal error.
//! 4. **Settle**: success acknowledges, retryable failures release or expire, terminal
//!    failures optionally dead-letter right away.
//!
//! ## Submodules
//! - **`group`**: the poll loop, worker dispatch and settlement.
//! - **`registry`**: maps handler names (e.g. "ioc_record") to executable closures.
//! - **`types`**: handler outcome/error taxonomy and group configuration.

pub mod group;
pub mod registry;
pub mod types;
