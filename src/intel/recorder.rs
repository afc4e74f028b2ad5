//! Recorder Handlers
//!
//! Turn indicator events into store rows. The consumer group upserts the rows and
//! only then acknowledges, so a crash in between just replays the same upsert.

use super::types::{IndicatorEvent, RecordKind, parse_events};
use crate::consumer::registry::{HandlerFn, into_handler_fn};
use crate::consumer::types::{HandlerError, HandlerOutcome, HandlerResult};
use crate::storage::types::{RecordKey, now_ms};

use std::collections::HashMap;
use std::time::Duration;

/// Handler for the `<kind>_record` groups.
pub fn record_handler(kind: RecordKind, retention: Duration) -> HandlerFn {
    into_handler_fn(move |body| async move { build_records(kind, body, retention, now_ms()) })
}

/// Decodes `body` and returns one record per distinct `(kind, value)`.
///
/// When a batch repeats a value, the last occurrence wins.
pub fn build_records(
    kind: RecordKind,
    body: serde_json::Value,
    retention: Duration,
    now_ms: u64,
) -> HandlerResult {
    let events = parse_events(body)
        .map_err(|e| HandlerError::terminal(format!("malformed {} event: {}", kind, e)))?;

    let mut order: Vec<RecordKey> = Vec::new();
    let mut latest: HashMap<RecordKey, IndicatorEvent> = HashMap::new();

    for event in events {
        if event.kind != kind {
            return Err(HandlerError::terminal(format!(
                "{} recorder received a {} event",
                kind, event.kind
            )));
        }
        event.validate().map_err(HandlerError::terminal)?;

        let key = event.record_key();
        if latest.insert(key.clone(), event).is_none() {
            order.push(key);
        }
    }

    let mut records = Vec::with_capacity(order.len());
    for key in order {
        if let Some(event) = latest.remove(&key) {
            let record = event
                .to_record(retention, now_ms)
                .map_err(|e| HandlerError::terminal(format!("unencodable event {}: {}", key, e)))?;
            records.push(record);
        }
    }

    tracing::debug!(kind = %kind, count = records.len(), "built records");
    Ok(HandlerOutcome::Record(records))
}
