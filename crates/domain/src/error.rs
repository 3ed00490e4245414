//! Domain error types

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Domain-level errors that can occur during validation or processing.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// The provided URL is invalid or malformed.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// The HTTP method is not supported.
    #[error("unsupported HTTP method: {0}")]
    UnsupportedMethod(String),

    /// A token could not be decoded.
    #[error("malformed token: {0}")]
    MalformedToken(String),

    /// A field failed validation.
    #[error("invalid {field}: {reason}")]
    InvalidField {
        /// Name of the offending field.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// A role name is not recognised.
    #[error("unknown role: {0}")]
    UnknownRole(String),
}

impl DomainError {
    /// Shorthand for an [`DomainError::InvalidField`].
    #[must_use]
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            reason: reason.into(),
        }
    }
}

/// Result type alias for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;

/// Error taxonomy shared by every layer that talks to the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Invalid credentials or expired session.
    Auth,
    /// Malformed input.
    Validation,
    /// Too many attempts for an identifier.
    RateLimited,
    /// Timeout or connection failure.
    Network,
    /// The circuit breaker rejected the call without contacting the server.
    CircuitOpen,
    /// The server answered with a 5xx status.
    Server,
    /// Role or claim insufficient.
    Permission,
    /// Client configuration does not allow the operation.
    Config,
    /// The requested resource does not exist.
    NotFound,
    /// Unexpected client-side failure (decoding, storage).
    Internal,
}

impl ErrorKind {
    /// Maps an HTTP status code to an error kind.
    #[must_use]
    pub const fn from_status(status: u16) -> Self {
        match status {
            401 => Self::Auth,
            403 => Self::Permission,
            404 => Self::NotFound,
            408 => Self::Network,
            429 => Self::RateLimited,
            500..=599 => Self::Server,
            _ => Self::Validation,
        }
    }

    /// Returns true for failures that may clear up on their own.
    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(
            self,
            Self::Network | Self::Server | Self::CircuitOpen | Self::RateLimited
        )
    }

    /// Stable machine-readable code, e.g. `CIRCUIT_OPEN`.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Auth => "AUTH",
            Self::Validation => "VALIDATION",
            Self::RateLimited => "RATE_LIMITED",
            Self::Network => "NETWORK",
            Self::CircuitOpen => "CIRCUIT_OPEN",
            Self::Server => "SERVER",
            Self::Permission => "PERMISSION",
            Self::Config => "CONFIG",
            Self::NotFound => "NOT_FOUND",
            Self::Internal => "INTERNAL",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Structured error surfaced to callers and carried in response envelopes.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    /// Error category.
    pub kind: ErrorKind,
    /// Human-readable description.
    pub message: String,
    /// HTTP status, when the error came from a response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Server-provided error code, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ApiError {
    /// Creates an error of the given kind.
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            code: None,
        }
    }

    /// Creates an error from an HTTP status.
    #[must_use]
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::from_status(status),
            message: message.into(),
            status: Some(status),
            code: None,
        }
    }

    /// Attaches a server error code.
    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Authentication failure.
    #[must_use]
    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Auth, message)
    }

    /// Input validation failure.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    /// Too many attempts.
    #[must_use]
    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RateLimited, message)
    }

    /// Network failure.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, message)
    }

    /// Circuit breaker rejection.
    #[must_use]
    pub fn circuit_open() -> Self {
        Self::new(
            ErrorKind::CircuitOpen,
            "service temporarily unavailable, circuit breaker is open",
        )
    }

    /// Insufficient role or permission.
    #[must_use]
    pub fn permission(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Permission, message)
    }

    /// Client configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, message)
    }

    /// Unexpected client-side failure.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Returns true if the error is of the given kind.
    #[must_use]
    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }
}

impl From<DomainError> for ApiError {
    fn from(error: DomainError) -> Self {
        Self::validation(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ErrorKind::from_status(401), ErrorKind::Auth);
        assert_eq!(ErrorKind::from_status(403), ErrorKind::Permission);
        assert_eq!(ErrorKind::from_status(422), ErrorKind::Validation);
        assert_eq!(ErrorKind::from_status(429), ErrorKind::RateLimited);
        assert_eq!(ErrorKind::from_status(503), ErrorKind::Server);
        assert_eq!(ErrorKind::from_status(408), ErrorKind::Network);
    }

    #[test]
    fn test_api_error_display() {
        let err = ApiError::from_status(503, "upstream down");
        assert_eq!(err.to_string(), "SERVER: upstream down");
        assert_eq!(err.status, Some(503));
    }

    #[test]
    fn test_api_error_serializes_kind_as_code() {
        let json = serde_json::to_value(ApiError::circuit_open()).unwrap_or_default();
        assert_eq!(json["kind"], "CIRCUIT_OPEN");
        assert!(json.get("status").is_none());
    }

    #[test]
    fn test_domain_error_becomes_validation() {
        let err: ApiError = DomainError::invalid("email", "must not be empty").into();
        assert!(err.is(ErrorKind::Validation));
        assert!(err.message.contains("email"));
    }
}
