//! Uniform response envelope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Metadata attached to every response envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMetadata {
    /// When the call completed.
    pub timestamp: DateTime<Utc>,
    /// Identifier sent as `X-Request-ID`.
    pub request_id: String,
    /// Wall time spent, retries included.
    pub processing_time_ms: u64,
    /// Number of network attempts made (0 when rejected locally).
    pub attempts: u32,
}

/// Outcome of an API call: success flag, payload or error, and metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    /// Whether the call succeeded.
    pub success: bool,
    /// Payload on success.
    pub data: Option<T>,
    /// Structured error on failure.
    pub error: Option<ApiError>,
    /// Request metadata.
    pub metadata: ResponseMetadata,
}

impl<T> ApiResponse<T> {
    /// Successful envelope.
    #[must_use]
    pub const fn ok(data: T, metadata: ResponseMetadata) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            metadata,
        }
    }

    /// Failed envelope.
    #[must_use]
    pub const fn failed(error: ApiError, metadata: ResponseMetadata) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
            metadata,
        }
    }

    /// Returns true if the call succeeded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.success
    }

    /// Converts the envelope into a `Result`.
    ///
    /// # Errors
    ///
    /// Returns the carried error, or an internal error if a successful
    /// envelope has no payload.
    pub fn into_result(self) -> Result<T, ApiError> {
        match (self.data, self.error) {
            (Some(data), None) => Ok(data),
            (_, Some(error)) => Err(error),
            (None, None) => Err(ApiError::internal("response carried neither data nor error")),
        }
    }

    /// Maps the payload, keeping the metadata.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ApiResponse<U> {
        ApiResponse {
            success: self.success,
            data: self.data.map(f),
            error: self.error,
            metadata: self.metadata,
        }
    }
}
