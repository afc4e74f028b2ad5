//! Threat-Intel Domain Module
//!
//! The business logic plugged into the pipeline core.
//!
//! ## Pipelines
//! - **IOC**: crawlers publish indicators (IPs, domains, hashes) to the `ioc` topic;
//!   `ioc_record` stores them and `ioc_detect` matches them against recorded entities.
//! - **Entity**: observed entities are published to the `entity` topic;
//!   `entity_record` stores them and `entity_detect` matches them against recorded IOCs.
//!
//! ## Submodules
//! - **`types`**: `IndicatorEvent`, the message body of both pipelines.
//! - **`recorder`** / **`detector`**: the four consumer-group handlers.
//! - **`alert`**: `Notifier` implementations for detections.
//! - **`crawler`** / **`urlhaus`**: feed retrieval.

pub mod alert;
pub mod crawler;
pub mod detector;
pub mod recorder;
pub mod types;
pub mod urlhaus;

#[cfg(test)]
mod tests;

use crate::consumer::registry::HandlerRegistry;
use crate::storage::memory::RecordStore;
use alert::Notifier;
use detector::Detector;
use std::sync::Arc;
use std::time::Duration;
use types::RecordKind;

pub const IOC_RECORD: &str = "ioc_record";
pub const IOC_DETECT: &str = "ioc_detect";
pub const ENTITY_RECORD: &str = "entity_record";
pub const ENTITY_DETECT: &str = "entity_detect";

/// Registers the recorder and detector handlers of both pipelines.
pub fn register_intel_handlers(
    registry: &HandlerRegistry,
    store: Arc<RecordStore>,
    notifier: Arc<dyn Notifier>,
    retention: Duration,
) {
    let detector = Detector::new(store, notifier);

    registry.insert(IOC_RECORD, recorder::record_handler(RecordKind::Ioc, retention));
    registry.insert(ENTITY_RECORD, recorder::record_handler(RecordKind::Entity, retention));
    registry.insert(IOC_DETECT, detector.clone().handler(RecordKind::Ioc));
    registry.insert(ENTITY_DETECT, detector.handler(RecordKind::Entity));
}
