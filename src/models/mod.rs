//! Data models module
//!
//! Defines caller-facing chat types, JSON schema descriptors and the upstream wire format

pub mod chat;
pub mod openai;
pub mod schema;

pub use chat::{ChatCompletionRequest, ChatCompletionResponse, ChatMessage, CompletionContent, ModelParams, Role};
pub use schema::{validate_schema, validate_schema_value, JsonSchema};
