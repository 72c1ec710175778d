//! Logging utilities
//!
//! Lifecycle event types, the injected logger trait, and request summaries for debug logs

use crate::models::openai::OpenAIRequest;
use crate::utils::error::ErrorKind;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

/// Set to true to include full message content in debug request summaries
pub const VERBOSE_REQUEST_LOGGING: bool = false;

/// Emitted before the first attempt
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestStartEvent {
    pub request_id: String,
    pub model: String,
    pub operation: String,
    pub message_count: usize,
    pub has_schema: bool,
    pub user_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Emitted once a call returns a result
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestSuccessEvent {
    pub request_id: String,
    pub model: String,
    pub operation: String,
    pub duration_ms: u64,
    pub tokens_used: Option<u32>,
    pub attempts: u32,
    pub timestamp: DateTime<Utc>,
}

/// Emitted for every failed attempt and for the final failure
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestErrorEvent {
    pub request_id: String,
    pub model: String,
    pub operation: String,
    pub duration_ms: u64,
    pub error_type: ErrorKind,
    pub status_code: Option<u16>,
    pub message: String,
    pub attempt: u32,
    /// False when another attempt follows
    pub terminal: bool,
    pub timestamp: DateTime<Utc>,
}

/// Emitted when a call has to wait on the local bucket or the provider
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitEvent {
    pub request_id: String,
    pub wait_time_ms: u64,
    pub tokens_available: f64,
    pub retry_after: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigChangeEvent {
    pub property: String,
    pub new_value: serde_json::Value,
}

/// Receives gateway lifecycle events
///
/// Every method defaults to doing nothing; implement the ones you need.
pub trait GatewayLogger: Send + Sync {
    fn info(&self, _message: &str) {}

    fn debug(&self, _message: &str) {}

    fn error(&self, _message: &str) {}

    fn log_request_start(&self, _event: &RequestStartEvent) {}

    fn log_request_success(&self, _event: &RequestSuccessEvent) {}

    fn log_request_error(&self, _event: &RequestErrorEvent) {}

    fn log_rate_limit(&self, _event: &RateLimitEvent) {}

    fn log_config_change(&self, _event: &ConfigChangeEvent) {}
}

/// Discards every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLogger;

impl GatewayLogger for NoopLogger {}

/// Forwards events to `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl GatewayLogger for TracingLogger {
    fn info(&self, message: &str) {
        info!("{}", message);
    }

    fn debug(&self, message: &str) {
        debug!("{}", message);
    }

    fn error(&self, message: &str) {
        error!("{}", message);
    }

    fn log_request_start(&self, event: &RequestStartEvent) {
        info!(
            request_id = %event.request_id,
            model = %event.model,
            operation = %event.operation,
            message_count = event.message_count,
            has_schema = event.has_schema,
            user_id = event.user_id.as_deref().unwrap_or("-"),
            "Request started"
        );
    }

    fn log_request_success(&self, event: &RequestSuccessEvent) {
        info!(
            request_id = %event.request_id,
            model = %event.model,
            operation = %event.operation,
            duration_ms = event.duration_ms,
            tokens_used = event.tokens_used,
            attempts = event.attempts,
            "Request completed"
        );
    }

    fn log_request_error(&self, event: &RequestErrorEvent) {
        if event.terminal {
            error!(
                request_id = %event.request_id,
                model = %event.model,
                error_type = %event.error_type,
                status_code = event.status_code,
                attempt = event.attempt,
                duration_ms = event.duration_ms,
                "Request failed: {}",
                event.message
            );
        } else {
            warn!(
                request_id = %event.request_id,
                model = %event.model,
                error_type = %event.error_type,
                status_code = event.status_code,
                attempt = event.attempt,
                "Attempt failed, will retry: {}",
                event.message
            );
        }
    }

    fn log_rate_limit(&self, event: &RateLimitEvent) {
        warn!(
            request_id = %event.request_id,
            wait_time_ms = event.wait_time_ms,
            tokens_available = event.tokens_available,
            retry_after = event.retry_after,
            "Rate limited, waiting"
        );
    }

    fn log_config_change(&self, event: &ConfigChangeEvent) {
        info!(property = %event.property, new_value = %event.new_value, "Configuration changed");
    }
}

/// Truncate a string with a note about original length
pub fn truncate_content(s: &str, max_chars: usize) -> String {
    let total = s.chars().count();
    if total > max_chars {
        let head: String = s.chars().take(max_chars).collect();
        format!("{}... ({} chars truncated)", head, total - max_chars)
    } else {
        s.to_string()
    }
}

/// Create a filtered summary of an outbound request for logging
pub fn create_request_log_summary(request: &OpenAIRequest) -> serde_json::Value {
    if VERBOSE_REQUEST_LOGGING {
        return serde_json::to_value(request).unwrap_or(serde_json::json!({"error": "serialize failed"}));
    }

    let messages: Vec<serde_json::Value> = request
        .messages
        .iter()
        .map(|msg| {
            // System prompts are long and repetitive
            let max_len = if msg.role == "system" { 100 } else { 200 };
            serde_json::json!({
                "role": msg.role,
                "content": truncate_content(&msg.content, max_len),
            })
        })
        .collect();

    serde_json::json!({
        "model": request.model,
        "max_tokens": request.max_tokens,
        "temperature": request.temperature,
        "structured": request.response_format.is_some(),
        "messages": messages,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::openai::OpenAIMessage;

    #[test]
    fn test_truncate_content_respects_char_boundaries() {
        assert_eq!(truncate_content("héllo", 10), "héllo");
        assert_eq!(truncate_content("héllo", 2), "hé... (3 chars truncated)");
    }

    #[test]
    fn test_request_summary_truncates_messages() {
        let request = OpenAIRequest {
            model: "m".to_string(),
            messages: vec![OpenAIMessage { role: "system".to_string(), content: "x".repeat(150) }],
            temperature: None,
            max_tokens: Some(10),
            top_p: None,
            frequency_penalty: None,
            presence_penalty: None,
            seed: None,
            response_format: None,
        };
        let summary = create_request_log_summary(&request);
        assert_eq!(summary["model"], "m");
        assert_eq!(summary["structured"], false);
        assert!(summary["messages"][0]["content"].as_str().unwrap().ends_with("(50 chars truncated)"));
    }

    #[test]
    fn test_noop_logger_accepts_events() {
        let logger = NoopLogger;
        logger.log_config_change(&ConfigChangeEvent {
            property: "capacity".to_string(),
            new_value: serde_json::json!(5),
        });
    }
}
