//! Indicator Data Types
//!
//! Defines the message body that flows through both pipelines and the mapping from
//! an event to its record in the shared store.

use crate::storage::types::{Record, RecordKey};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Which pipeline an event belongs to. Doubles as the record partition key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Ioc,
    Entity,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Ioc => "ioc",
            RecordKind::Entity => "entity",
        }
    }

    /// The kind a detector looks up: IOCs are matched against entities and vice versa.
    pub fn counterpart(&self) -> RecordKind {
        match self {
            RecordKind::Ioc => RecordKind::Entity,
            RecordKind::Entity => RecordKind::Ioc,
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ValueType {
    #[serde(rename = "ipaddr")]
    IpAddr,
    #[serde(rename = "domain")]
    Domain,
    #[serde(rename = "url")]
    Url,
    #[serde(rename = "filehash.sha256")]
    FileHashSha256,
    #[default]
    #[serde(rename = "other", other)]
    Other,
}

impl ValueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::IpAddr => "ipaddr",
            ValueType::Domain => "domain",
            ValueType::Url => "url",
            ValueType::FileHashSha256 => "filehash.sha256",
            ValueType::Other => "other",
        }
    }
}

/// A normalized indicator or entity observation, as published to a topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndicatorEvent {
    #[serde(rename = "type")]
    pub kind: RecordKind,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_type: Option<ValueType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Epoch seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_at: Option<i64>,
    #[serde(default)]
    pub detected: bool,
}

impl IndicatorEvent {
    pub fn new(kind: RecordKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
            value_type: None,
            source: None,
            reason: None,
            description: None,
            label: None,
            observed_at: None,
            detected: false,
        }
    }

    pub fn ioc(value: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            value_type: Some(value_type),
            ..Self::new(RecordKind::Ioc, value)
        }
    }

    pub fn entity(value: impl Into<String>) -> Self {
        Self::new(RecordKind::Entity, value)
    }

    pub fn record_key(&self) -> RecordKey {
        RecordKey::new(self.kind.as_str(), self.value.clone())
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.value.trim().is_empty() {
            return Err(format!("{} event has an empty value", self.kind));
        }
        Ok(())
    }

    /// Builds the stored row. The retention window starts at `observed_at`, or at
    /// `now_ms` when the event carries no observation time.
    pub fn to_record(&self, retention: Duration, now_ms: u64) -> Result<Record, serde_json::Error> {
        let from_ms = self
            .observed_at
            .and_then(|secs| u64::try_from(secs).ok())
            .map(|secs| secs.saturating_mul(1000))
            .unwrap_or(now_ms);

        let payload = serde_json::to_value(self)?;
        Ok(Record::new(self.kind.as_str(), self.value.clone(), payload).with_ttl(from_ms, retention))
    }
}

/// Decodes a message body holding either one event or an array of events.
pub fn parse_events(body: serde_json::Value) -> Result<Vec<IndicatorEvent>, serde_json::Error> {
    match body {
        serde_json::Value::Array(_) => serde_json::from_value(body),
        other => serde_json::from_value(other).map(|event| vec![event]),
    }
}
