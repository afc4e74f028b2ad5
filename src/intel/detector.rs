//! Detector Handlers
//!
//! Match each incoming event against the opposite pipeline's records: a new IOC is
//! looked up among recorded entities, a new entity among recorded IOCs. A live match
//! becomes an `Alert` for the notifier. Detectors only read the store.
//!
//! Nothing here marks a match as detected. Records are only skipped when the
//! producer already published them with `detected: true`, so a pair that keeps
//! being re-crawled (URLhaus runs daily by default) alerts again on every crawl
//! that republishes either side.

use super::alert::{Alert, AlertCause, Notifier};
use super::types::{IndicatorEvent, RecordKind, ValueType, parse_events};
use crate::consumer::registry::{HandlerFn, into_handler_fn};
use crate::consumer::types::{HandlerError, HandlerOutcome, HandlerResult};
use crate::storage::memory::RecordStore;

use std::collections::HashMap;
use std::sync::Arc;

pub struct Detector {
    store: Arc<RecordStore>,
    notifier: Arc<dyn Notifier>,
}

impl Detector {
    pub fn new(store: Arc<RecordStore>, notifier: Arc<dyn Notifier>) -> Arc<Self> {
        Arc::new(Self { store, notifier })
    }

    /// Handler for the `<kind>_detect` groups.
    pub fn handler(self: Arc<Self>, kind: RecordKind) -> HandlerFn {
        into_handler_fn(move |body| {
            let detector = self.clone();
            async move { detector.detect(kind, body).await }
        })
    }

    /// Emits at most one alert per distinct value in `body`.
    ///
    /// A failed delivery is retryable. Alerts already sent for earlier values of the
    /// same message are sent again on redelivery.
    pub async fn detect(&self, kind: RecordKind, body: serde_json::Value) -> HandlerResult {
        let events = parse_events(body)
            .map_err(|e| HandlerError::terminal(format!("malformed {} event: {}", kind, e)))?;

        let mut order: Vec<String> = Vec::new();
        let mut by_value: HashMap<String, Vec<IndicatorEvent>> = HashMap::new();
        for event in events {
            if event.kind != kind {
                return Err(HandlerError::terminal(format!(
                    "{} detector received a {} event",
                    kind, event.kind
                )));
            }
            event.validate().map_err(HandlerError::terminal)?;

            let value = event.value.clone();
            by_value
                .entry(value.clone())
                .or_insert_with(|| {
                    order.push(value);
                    Vec::new()
                })
                .push(event);
        }

        let mut emitted = Vec::new();
        for value in order {
            let Some(events) = by_value.remove(&value) else {
                continue;
            };
            let Some(matched) = self.lookup(kind.counterpart(), &value) else {
                continue;
            };

            let alert = build_alert(kind, value, events, matched);
            self.notifier
                .notify(&alert)
                .await
                .map_err(|e| HandlerError::retryable(format!("alert delivery failed: {:#}", e)))?;

            match serde_json::to_value(&alert) {
                Ok(payload) => emitted.push(payload),
                Err(e) => tracing::warn!("Failed to encode alert for {}: {}", alert.target, e),
            }
        }

        Ok(HandlerOutcome::Detected(emitted))
    }

    /// A live, not yet detected counterpart record for `value`.
    fn lookup(&self, kind: RecordKind, value: &str) -> Option<IndicatorEvent> {
        let record = self.store.get(kind.as_str(), value)?;

        let matched: IndicatorEvent = match serde_json::from_value(record.payload) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!("Unreadable {} record {}: {}", kind, value, e);
                return None;
            }
        };

        if matched.detected {
            tracing::debug!("{} record {} already detected, skipping", kind, value);
            return None;
        }
        Some(matched)
    }
}

fn build_alert(
    kind: RecordKind,
    target: String,
    events: Vec<IndicatorEvent>,
    matched: IndicatorEvent,
) -> Alert {
    let target_type = events
        .iter()
        .chain(std::iter::once(&matched))
        .find_map(|event| event.value_type)
        .unwrap_or(ValueType::Other);

    match kind {
        RecordKind::Ioc => Alert {
            cause: AlertCause::Ioc,
            target,
            target_type,
            iocs: events,
            entities: vec![matched],
        },
        RecordKind::Entity => Alert {
            cause: AlertCause::Entity,
            target,
            target_type,
            iocs: vec![matched],
            entities: events,
        },
    }
}
