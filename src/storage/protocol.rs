//! Record Store HTTP Protocol
//!
//! Endpoint constants and DTOs for the read-only record lookup exposed by the
//! admin surface.

use super::types::Record;
use serde::{Deserialize, Serialize};

/// Lookup of a single record: `/records/{partition_key}/{sort_key}`.
pub const ENDPOINT_GET_RECORD: &str = "/records/:partition_key/:sort_key";

#[derive(Debug, Serialize, Deserialize)]
pub struct GetRecordResponse {
    /// `None` when the record does not exist or has expired.
    pub record: Option<Record>,
}
