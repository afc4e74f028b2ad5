//! Scheduler Module
//!
//! Fires crawler jobs (and any other periodic work) on fixed intervals.

pub mod scheduler;
