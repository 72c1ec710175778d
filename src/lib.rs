//! AI Gateway Library
//!
//! Rate-limited, resilient client for OpenAI-compatible chat completion APIs

pub mod config;
pub mod models;
pub mod services;
pub mod utils;

// Re-export common types
pub use config::Settings;
pub use models::{ChatCompletionRequest, ChatCompletionResponse, ChatMessage, CompletionContent, JsonSchema, ModelParams, Role};
pub use services::{FlashcardGenerator, GatewayClient, GatewayConfig, RateLimiter, RateLimiterConfig, RateLimiterPreset};
pub use utils::error::{ErrorKind, GatewayError, GatewayResult};
pub use utils::logging::{GatewayLogger, NoopLogger, TracingLogger};

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Library description
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Get version information
pub fn version_info() -> String {
    format!("{} v{} - {}", NAME, VERSION, DESCRIPTION)
}
