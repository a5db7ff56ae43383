/// Yandex Cloud operation API data models
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A long-running operation as reported by the operation service
///
/// `metadata` and `response` are service-specific payloads and are kept as raw JSON.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_by: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub done: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Status>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<serde_json::Value>,
}

/// Error status attached to a failed operation
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Status {
    pub code: i32,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<serde_json::Value>,
}

/// A finished operation that carries an error status
#[derive(Debug, Clone, Error)]
#[error("operation {operation_id} failed with code {code}: {message}")]
pub struct OperationFailed {
    pub operation_id: String,
    pub code: i32,
    pub message: String,
}

impl Operation {
    /// Resolve a finished operation into its response payload.
    ///
    /// Returns `Ok(None)` for operations that completed without a response body
    /// (e.g. deletes) or that are still running. Callers that care check `done` first.
    pub fn into_result(self) -> Result<Option<serde_json::Value>, OperationFailed> {
        match self.error {
            Some(status) => Err(OperationFailed {
                operation_id: self.id,
                code: status.code,
                message: status.message,
            }),
            None => Ok(self.response),
        }
    }

    /// Whether the operation finished with an error status
    pub fn is_failed(&self) -> bool {
        self.done && self.error.is_some()
    }
}

/// Error body returned by the API for non-2xx responses
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: i32,
    pub message: String,
    #[serde(default)]
    pub details: Option<serde_json::Value>,
}
