//! Error handling module
//!
//! Defines the gateway error taxonomy and retry classification

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Error kind discriminant
///
/// Callers branch on this rather than on individual variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    RateLimit,
    ModelNotSupported,
    Gateway,
}

impl ErrorKind {
    /// Get error type string
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation_error",
            ErrorKind::RateLimit => "rate_limit_error",
            ErrorKind::ModelNotSupported => "model_not_supported_error",
            ErrorKind::Gateway => "gateway_error",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What went wrong underneath a `GatewayError::Gateway`
#[derive(Debug, Clone, PartialEq)]
pub enum FailureCause {
    /// Non-2xx response not covered by a more specific kind
    Http,
    /// Connection, DNS or body read failure
    Network,
    /// The attempt exceeded its deadline
    Timeout,
    /// 2xx response that did not parse or had no usable completion
    InvalidResponse,
    /// Provider rejected the API key (401)
    Unauthorized,
    /// Structured output did not parse as JSON
    MalformedJson { schema: serde_json::Value },
    /// The caller cancelled the call
    Cancelled,
    /// Retries exhausted; wraps the last retryable failure
    RetriesExhausted,
}

/// Gateway error types
#[derive(Error, Debug, Clone)]
pub enum GatewayError {
    /// Bad input, bad schema, missing API key, or provider 400
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        status: Option<u16>,
    },

    /// Local bucket exhaustion or provider 429
    #[error("Rate limit exceeded: {message}")]
    RateLimit {
        message: String,
        /// Seconds to wait before trying again
        retry_after: Option<u64>,
        status: Option<u16>,
        attempts: Option<u32>,
    },

    /// Provider does not know or serve the requested model
    #[error("Model not supported: {model} ({message})")]
    ModelNotSupported {
        model: String,
        message: String,
        status: Option<u16>,
    },

    /// Transport, upstream or response failure
    #[error("Gateway error: {message}")]
    Gateway {
        message: String,
        cause: FailureCause,
        status: Option<u16>,
        /// Raw provider payload or completion text, for diagnostics
        raw: Option<String>,
        attempts: Option<u32>,
    },
}

impl GatewayError {
    /// Get error kind discriminant
    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::Validation { .. } => ErrorKind::Validation,
            GatewayError::RateLimit { .. } => ErrorKind::RateLimit,
            GatewayError::ModelNotSupported { .. } => ErrorKind::ModelNotSupported,
            GatewayError::Gateway { .. } => ErrorKind::Gateway,
        }
    }

    /// Get error type string
    pub fn error_type(&self) -> &'static str {
        self.kind().as_str()
    }

    /// Whether another attempt may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            GatewayError::Validation { .. } | GatewayError::ModelNotSupported { .. } => false,
            GatewayError::RateLimit { .. } => true,
            GatewayError::Gateway { cause, .. } => matches!(
                cause,
                FailureCause::Http
                    | FailureCause::Network
                    | FailureCause::Timeout
                    | FailureCause::InvalidResponse
            ),
        }
    }

    /// HTTP status from the provider, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            GatewayError::Validation { status, .. }
            | GatewayError::RateLimit { status, .. }
            | GatewayError::ModelNotSupported { status, .. }
            | GatewayError::Gateway { status, .. } => *status,
        }
    }

    /// Number of attempts made before this error was returned
    pub fn attempts(&self) -> Option<u32> {
        match self {
            GatewayError::RateLimit { attempts, .. } | GatewayError::Gateway { attempts, .. } => *attempts,
            _ => None,
        }
    }

    /// Provider-requested wait before retrying
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            GatewayError::RateLimit { retry_after, .. } => retry_after.map(Duration::from_secs),
            _ => None,
        }
    }

    /// Raw provider payload, if kept
    pub fn raw(&self) -> Option<&str> {
        match self {
            GatewayError::Gateway { raw, .. } => raw.as_deref(),
            _ => None,
        }
    }

    /// Human readable message without the kind prefix
    pub fn message(&self) -> &str {
        match self {
            GatewayError::Validation { message, .. }
            | GatewayError::RateLimit { message, .. }
            | GatewayError::ModelNotSupported { message, .. }
            | GatewayError::Gateway { message, .. } => message,
        }
    }

    /// Whether the call was cancelled by the caller
    pub fn is_cancelled(&self) -> bool {
        matches!(self, GatewayError::Gateway { cause: FailureCause::Cancelled, .. })
    }

    /// Set the attempt count on kinds that carry one
    pub(crate) fn with_attempts(mut self, count: u32) -> Self {
        match &mut self {
            GatewayError::RateLimit { attempts, .. } | GatewayError::Gateway { attempts, .. } => {
                *attempts = Some(count);
            }
            _ => {}
        }
        self
    }

    /// Convert to a serializable error report
    pub fn to_report(&self) -> ErrorReport {
        ErrorReport {
            error_type: self.error_type().to_string(),
            message: self.message().to_string(),
            status: self.status(),
            retry_after: self.retry_after().map(|d| d.as_secs()),
            attempts: self.attempts(),
            raw: self.raw().map(str::to_string),
        }
    }
}

/// Serializable error report for callers that surface failures to users
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorReport {
    /// Error type
    #[serde(rename = "type")]
    pub error_type: String,
    /// Error message
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(rename = "retryAfter", skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
}

/// Rate limiter error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RateLimiterError {
    /// Request can never be satisfied by this bucket
    #[error("Requested {requested} tokens exceeds bucket capacity {capacity}")]
    ExceedsCapacity { requested: u32, capacity: u32 },

    /// Waiting for tokens would exceed the configured bound
    #[error("Rate limit wait of {wait_ms}ms exceeds maximum of {max_wait_ms}ms")]
    WaitTimeExceeded { wait_ms: u64, max_wait_ms: u64 },

    /// Configuration value out of range
    #[error("Invalid rate limiter config: {0}")]
    InvalidConfig(String),
}

impl From<RateLimiterError> for GatewayError {
    fn from(err: RateLimiterError) -> Self {
        match err {
            RateLimiterError::InvalidConfig(message) => GatewayError::Validation { message, status: None },
            RateLimiterError::ExceedsCapacity { .. } => GatewayError::RateLimit {
                message: err.to_string(),
                retry_after: None,
                status: None,
                attempts: None,
            },
            RateLimiterError::WaitTimeExceeded { wait_ms, .. } => GatewayError::RateLimit {
                message: err.to_string(),
                retry_after: Some(wait_ms.div_ceil(1000)),
                status: None,
                attempts: None,
            },
        }
    }
}

/// Result type alias
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Error construction helpers
pub mod helpers {
    use super::*;

    /// Create validation error
    pub fn validation_error(message: impl Into<String>) -> GatewayError {
        GatewayError::Validation { message: message.into(), status: None }
    }

    /// Create model not supported error
    pub fn model_not_supported_error(model: impl Into<String>, message: impl Into<String>, status: Option<u16>) -> GatewayError {
        GatewayError::ModelNotSupported {
            model: model.into(),
            message: message.into(),
            status,
        }
    }

    /// Create gateway error without status or payload
    pub fn gateway_error(cause: FailureCause, message: impl Into<String>) -> GatewayError {
        GatewayError::Gateway {
            message: message.into(),
            cause,
            status: None,
            raw: None,
            attempts: None,
        }
    }

    /// Create cancellation error
    pub fn cancelled_error() -> GatewayError {
        gateway_error(FailureCause::Cancelled, "Request was cancelled")
    }
}

/// Error context extension trait
pub trait ErrorContext<T> {
    /// Add validation error context
    fn validation_context(self, message: &str) -> GatewayResult<T>;

    /// Add network error context
    fn network_context(self, message: &str) -> GatewayResult<T>;
}

impl<T, E> ErrorContext<T> for Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn validation_context(self, message: &str) -> GatewayResult<T> {
        self.map_err(|e| helpers::validation_error(format!("{}: {}", message, e)))
    }

    fn network_context(self, message: &str) -> GatewayResult<T> {
        self.map_err(|e| helpers::gateway_error(FailureCause::Network, format!("{}: {}", message, e)))
    }
}
