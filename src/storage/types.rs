//! Record Data Types
//!
//! A `Record` is a stored fact about an indicator or an entity, addressed by a
//! `(partition_key, sort_key)` composite key and optionally bounded by an
//! absolute expiry timestamp.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Composite primary key of a record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct RecordKey {
    pub partition_key: String,
    pub sort_key: String,
}

impl RecordKey {
    pub fn new(partition_key: impl Into<String>, sort_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            sort_key: sort_key.into(),
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.partition_key, self.sort_key)
    }
}

/// A row of the record store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Record {
    pub partition_key: String,
    pub sort_key: String,
    /// Epoch milliseconds after which the record is treated as absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
    /// Domain data attached by the recorder.
    pub payload: serde_json::Value,
}

impl Record {
    pub fn new(
        partition_key: impl Into<String>,
        sort_key: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            partition_key: partition_key.into(),
            sort_key: sort_key.into(),
            expires_at: None,
            payload,
        }
    }

    /// Sets an absolute expiry (epoch milliseconds).
    pub fn expires_at(mut self, expires_at_ms: u64) -> Self {
        self.expires_at = Some(expires_at_ms);
        self
    }

    /// Sets the expiry to `from_ms + ttl`.
    pub fn with_ttl(self, from_ms: u64, ttl: Duration) -> Self {
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        self.expires_at(from_ms.saturating_add(ttl_ms))
    }

    pub fn key(&self) -> RecordKey {
        RecordKey::new(self.partition_key.clone(), self.sort_key.clone())
    }

    /// A record whose expiry equals `now_ms` is already expired.
    pub fn is_expired_at(&self, now_ms: u64) -> bool {
        matches!(self.expires_at, Some(expires_at) if expires_at <= now_ms)
    }
}

/// Current wall-clock time in epoch milliseconds.
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
