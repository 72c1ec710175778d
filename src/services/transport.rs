//! HTTP transport
//!
//! One outbound exchange, no retries or timeouts. The gateway client owns those.

use crate::models::openai::OpenAIRequest;
use crate::utils::error::{ErrorContext, GatewayResult};
use async_trait::async_trait;
use reqwest::Client;
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

/// Outbound request, fully resolved
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: OpenAIRequest,
}

/// Raw upstream response
#[derive(Debug, Clone, Default)]
pub struct TransportResponse {
    pub status: u16,
    /// Header names are lowercase
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl TransportResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Failure before a status line was received
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,
}

/// Transport trait for the upstream chat completion endpoint
#[async_trait]
pub trait Transport: Send + Sync {
    /// Get the transport name
    fn name(&self) -> &str;

    /// Send one request and return whatever came back
    async fn send(&self, request: &TransportRequest) -> Result<TransportResponse, TransportError>;
}

/// reqwest-backed transport
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Create a new transport instance
    pub fn new() -> GatewayResult<Self> {
        let client = Client::builder()
            .user_agent(concat!("aigateway/", env!("CARGO_PKG_VERSION")))
            .build()
            .network_context("Failed to create HTTP client")?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    fn name(&self) -> &str {
        "reqwest"
    }

    async fn send(&self, request: &TransportRequest) -> Result<TransportResponse, TransportError> {
        debug!(url = %request.url, model = %request.body.model, "Sending chat completion request");

        // Headers come from the caller, Content-Type included
        let body = serde_json::to_vec(&request.body).map_err(|e| TransportError::Network(e.to_string()))?;
        let mut builder = self.client.post(&request.url).body(body);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await.map_err(map_reqwest_error)?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| Some((name.as_str().to_ascii_lowercase(), value.to_str().ok()?.to_string())))
            .collect();
        let body = response.text().await.map_err(map_reqwest_error)?;

        debug!(status, body_len = body.len(), "Received upstream response");
        Ok(TransportResponse { status, headers, body })
    }
}

fn map_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Network(err.to_string())
    }
}
