//! OpenAI-compatible wire models
//!
//! Defines the chat completion payload sent upstream and the response shapes consumed

use crate::models::chat::{ChatCompletionRequest, ModelParams};
use serde::{Deserialize, Serialize};

/// Name given to the structured output schema
pub const STRUCTURED_RESPONSE_NAME: &str = "structured_response";

/// Chat completion payload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OpenAIRequest {
    /// Model name
    pub model: String,
    /// Message list
    pub messages: Vec<OpenAIMessage>,
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
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<OpenAIResponseFormat>,
}

/// Wire message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OpenAIMessage {
    pub role: String,
    pub content: String,
}

/// Structured output directive
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OpenAIResponseFormat {
    #[serde(rename = "type")]
    pub format_type: String,
    pub json_schema: OpenAIJsonSchema,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OpenAIJsonSchema {
    pub name: String,
    pub strict: bool,
    pub schema: serde_json::Value,
}

impl OpenAIRequest {
    /// Map a caller request onto the wire shape
    pub fn from_chat_request(request: &ChatCompletionRequest, model: &str) -> Self {
        let params = request.model_params.clone().unwrap_or_default();
        let ModelParams {
            temperature,
            max_tokens,
            top_p,
            frequency_penalty,
            presence_penalty,
            seed,
        } = params;

        Self {
            model: model.to_string(),
            messages: request
                .messages
                .iter()
                .map(|m| OpenAIMessage {
                    role: m.role().as_str().to_string(),
                    content: m.content().to_string(),
                })
                .collect(),
            temperature,
            max_tokens,
            top_p,
            frequency_penalty,
            presence_penalty,
            seed,
            response_format: request.response_schema.as_ref().map(|schema| OpenAIResponseFormat {
                format_type: "json_schema".to_string(),
                json_schema: OpenAIJsonSchema {
                    name: STRUCTURED_RESPONSE_NAME.to_string(),
                    strict: true,
                    schema: schema.to_value(),
                },
            }),
        }
    }
}

/// Chat completion response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIResponse {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub choices: Vec<OpenAIChoice>,
    #[serde(default)]
    pub usage: Option<OpenAIUsage>,
}

impl OpenAIResponse {
    /// First non-empty completion text
    pub fn first_content(&self) -> Option<&str> {
        self.choices
            .iter()
            .filter_map(|c| c.message.as_ref()?.content.as_deref())
            .find(|content| !content.trim().is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIChoice {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub message: Option<OpenAIResponseMessage>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIResponseMessage {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

/// Token usage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIUsage {
    #[serde(default)]
    pub prompt_tokens: Option<u32>,
    #[serde(default)]
    pub completion_tokens: Option<u32>,
    #[serde(default)]
    pub total_tokens: Option<u32>,
}

/// Error response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIErrorResponse {
    pub error: OpenAIError,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIError {
    pub message: String,
    #[serde(rename = "type", default)]
    pub error_type: Option<String>,
    #[serde(default)]
    pub code: Option<serde_json::Value>,
}

/// Extract the provider's error message from a body, falling back to the raw text
pub fn error_message(body: &str) -> String {
    match serde_json::from_str::<OpenAIErrorResponse>(body) {
        Ok(parsed) => parsed.error.message,
        Err(_) if body.trim().is_empty() => "empty response body".to_string(),
        Err(_) => body.to_string(),
    }
}
