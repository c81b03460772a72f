//! Prometheus HTTP API payloads

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Envelope shared by every `/api/v1` endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse<T> {
    /// `success` or `error`
    pub status: String,
    /// Payload on success
    pub data: Option<T>,
    /// Error class on failure (`bad_data`, `timeout`, ...)
    #[serde(default, rename = "errorType")]
    pub error_type: Option<String>,
    /// Error message on failure
    #[serde(default)]
    pub error: Option<String>,
    /// Non-fatal warnings
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl<T> ApiResponse<T> {
    /// Whether the backend reported success
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }

    /// Backend failure rendered as `errorType: error`
    #[must_use]
    pub fn error_message(&self) -> String {
        match (self.error_type.as_deref(), self.error.as_deref()) {
            (Some(kind), Some(message)) => format!("{kind}: {message}"),
            (None, Some(message)) => message.to_string(),
            (Some(kind), None) => kind.to_string(),
            (None, None) => format!("backend returned status {:?}", self.status),
        }
    }
}

/// Result of an instant or range query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryData {
    /// `vector`, `matrix`, `scalar` or `string`
    #[serde(rename = "resultType")]
    pub result_type: String,
    /// Series or value, as returned by the backend
    pub result: Value,
}

/// Successful backend answer plus any warnings it carried
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched<T> {
    /// Payload
    pub data: T,
    /// Non-fatal warnings reported by the backend
    pub warnings: Vec<String>,
}

/// Evaluation window for a range query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryRange {
    /// Inclusive start
    pub start: DateTime<Utc>,
    /// Inclusive end
    pub end: DateTime<Utc>,
    /// Resolution step
    pub step: Duration,
}

impl QueryRange {
    /// Build a range; `end >= start` is left for the backend to check
    #[must_use]
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>, step: Duration) -> Self {
        Self { start, end, step }
    }
}
