//! Chat completion data models
//!
//! Caller-facing request and response types

use crate::models::schema::JsonSchema;
use crate::utils::error::{helpers::validation_error, GatewayResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Message author role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = crate::utils::error::GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system" => Ok(Role::System),
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(validation_error(format!("Invalid message role: {}", other))),
        }
    }
}

/// Chat message
///
/// Fields are private so a constructed message stays as validated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    role: Role,
    content: String,
}

impl ChatMessage {
    /// Create a message, rejecting content that is empty after trimming
    pub fn new(role: Role, content: impl Into<String>) -> GatewayResult<Self> {
        let content = content.into().trim().to_string();
        if content.is_empty() {
            return Err(validation_error(format!("{} message content cannot be empty", role.as_str())));
        }
        Ok(Self { role, content })
    }

    pub fn system(content: impl Into<String>) -> GatewayResult<Self> {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> GatewayResult<Self> {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> GatewayResult<Self> {
        Self::new(Role::Assistant, content)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }
}

/// Sampling parameters passed through verbatim when present
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
}

/// Chat completion request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatCompletionRequest {
    /// Ordered conversation; must not be empty
    pub messages: Vec<ChatMessage>,
    /// Overrides the client's default model
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_params: Option<ModelParams>,
    /// Requests structured output conforming to this schema
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_schema: Option<JsonSchema>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Correlation ID; generated when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl ChatCompletionRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_params(mut self, params: ModelParams) -> Self {
        self.model_params = Some(params);
        self
    }

    pub fn with_schema(mut self, schema: JsonSchema) -> Self {
        self.response_schema = Some(schema);
        self
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }
}

/// Completion payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CompletionContent {
    /// Raw text, returned when no schema was requested
    Text(String),
    /// Parsed JSON, returned when a schema was requested
    Structured(serde_json::Value),
}

impl CompletionContent {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            CompletionContent::Text(text) => Some(text),
            CompletionContent::Structured(_) => None,
        }
    }

    pub fn as_structured(&self) -> Option<&serde_json::Value> {
        match self {
            CompletionContent::Structured(value) => Some(value),
            CompletionContent::Text(_) => None,
        }
    }
}

/// Chat completion result
#[derive(Debug, Clone, PartialEq)]
pub struct ChatCompletionResponse {
    pub content: CompletionContent,
    /// Model that served the request
    pub model: String,
    pub request_id: String,
    pub tokens_used: Option<u32>,
    /// Attempts made, including the successful one
    pub attempts: u32,
    pub duration: Duration,
}
