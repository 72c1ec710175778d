//! Gateway client
//!
//! Validates chat completion requests, takes capacity from the shared rate
//! limiter, and supervises the upstream call through timeout, retry and backoff.

use crate::config::Settings;
use crate::models::chat::{ChatCompletionRequest, ChatCompletionResponse, ChatMessage, CompletionContent};
use crate::models::openai::{error_message, OpenAIRequest, OpenAIResponse};
use crate::models::schema::{validate_schema, validate_schema_value, JsonSchema};
use crate::services::backoff::{backoff_delay, parse_retry_after, Sleeper, TokioSleeper};
use crate::services::rate_limiter::{RateLimitStatus, RateLimiter, RateLimiterConfig, RateLimiterConfigUpdate};
use crate::services::transport::{ReqwestTransport, Transport, TransportError, TransportRequest, TransportResponse};
use crate::utils::error::helpers::{cancelled_error, gateway_error, model_not_supported_error, validation_error};
use crate::utils::error::{FailureCause, GatewayError, GatewayResult};
use crate::utils::logging::{
    create_request_log_summary, ConfigChangeEvent, GatewayLogger, NoopLogger, RateLimitEvent, RequestErrorEvent,
    RequestStartEvent, RequestSuccessEvent, TracingLogger,
};
use chrono::Utc;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_MODEL: &str = "openai/gpt-4o-mini";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(30_000);
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1000);
/// Wait applied to a 429 without a usable `Retry-After` header
pub const DEFAULT_RETRY_AFTER_SECS: u64 = 60;
pub const REQUEST_ID_HEADER: &str = "X-Request-ID";

const OPERATION_CHAT_COMPLETION: &str = "chat_completion";

/// Client configuration, fixed per instance
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayConfig {
    pub api_key: String,
    pub base_url: String,
    pub default_model: String,
    /// Deadline for each attempt
    pub timeout: Duration,
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Base of the exponential backoff
    pub retry_delay: Duration,
    /// Sent with every request (e.g. `HTTP-Referer`, `X-Title`)
    pub extra_headers: Vec<(String, String)>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            default_model: DEFAULT_MODEL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            extra_headers: Vec::new(),
        }
    }
}

impl GatewayConfig {
    fn validate(&self) -> GatewayResult<()> {
        if self.api_key.trim().is_empty() {
            return Err(validation_error("API key is required"));
        }
        if !self.base_url.starts_with("http") {
            return Err(validation_error(format!(
                "Invalid base URL format, should start with 'http': {}",
                self.base_url
            )));
        }
        if self.default_model.trim().is_empty() {
            return Err(validation_error("Default model cannot be empty"));
        }
        if self.timeout.is_zero() {
            return Err(validation_error("Timeout cannot be 0"));
        }
        Ok(())
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

/// Builder for [`GatewayClient`]
pub struct GatewayClientBuilder {
    config: GatewayConfig,
    rate_limiter: Option<Arc<RateLimiter>>,
    logger: Option<Arc<dyn GatewayLogger>>,
    transport: Option<Arc<dyn Transport>>,
    sleeper: Option<Arc<dyn Sleeper>>,
}

impl GatewayClientBuilder {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::from_config(GatewayConfig {
            api_key: api_key.into(),
            ..Default::default()
        })
    }

    pub fn from_config(config: GatewayConfig) -> Self {
        Self {
            config,
            rate_limiter: None,
            logger: None,
            transport: None,
            sleeper: None,
        }
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.config.base_url = base_url.into();
        self
    }

    pub fn default_model(mut self, model: impl Into<String>) -> Self {
        self.config.default_model = model.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.config.max_retries = max_retries;
        self
    }

    pub fn retry_delay(mut self, retry_delay: Duration) -> Self {
        self.config.retry_delay = retry_delay;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.extra_headers.push((name.into(), value.into()));
        self
    }

    pub fn rate_limiter(mut self, rate_limiter: Arc<RateLimiter>) -> Self {
        self.rate_limiter = Some(rate_limiter);
        self
    }

    pub fn logger(mut self, logger: Arc<dyn GatewayLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = Some(sleeper);
        self
    }

    pub fn build(self) -> GatewayResult<GatewayClient> {
        self.config.validate()?;

        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new()?),
        };

        Ok(GatewayClient {
            inner: Arc::new(ClientInner {
                config: self.config,
                rate_limiter: self.rate_limiter.unwrap_or_default(),
                logger: self.logger.unwrap_or_else(|| Arc::new(NoopLogger)),
                transport,
                sleeper: self.sleeper.unwrap_or_else(|| Arc::new(TokioSleeper)),
            }),
        })
    }
}

struct ClientInner {
    config: GatewayConfig,
    rate_limiter: Arc<RateLimiter>,
    logger: Arc<dyn GatewayLogger>,
    transport: Arc<dyn Transport>,
    sleeper: Arc<dyn Sleeper>,
}

/// Chat completion gateway client
///
/// Cloning is cheap; clones share the rate limiter and collaborators.
#[derive(Clone)]
pub struct GatewayClient {
    inner: Arc<ClientInner>,
}

impl std::fmt::Debug for GatewayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayClient")
            .field("base_url", &self.inner.config.base_url)
            .field("default_model", &self.inner.config.default_model)
            .field("transport", &self.inner.transport.name())
            .field("rate_limiter", &self.inner.rate_limiter)
            .finish()
    }
}

/// Per-call identity used in log events
struct CallContext {
    request_id: String,
    model: String,
    started: Instant,
}

impl CallContext {
    fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}

impl GatewayClient {
    pub fn builder(api_key: impl Into<String>) -> GatewayClientBuilder {
        GatewayClientBuilder::new(api_key)
    }

    /// Create a client with default collaborators
    pub fn new(config: GatewayConfig) -> GatewayResult<Self> {
        GatewayClientBuilder::from_config(config).build()
    }

    /// Production client: reqwest transport, tracing logger, limiter from the configured profile
    pub fn from_settings(settings: &Settings) -> GatewayResult<Self> {
        let rate_limiter = RateLimiter::new(settings.rate_limit.config)?;
        GatewayClientBuilder::from_config(settings.gateway_config())
            .rate_limiter(Arc::new(rate_limiter))
            .logger(Arc::new(TracingLogger))
            .build()
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.inner.config
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.inner.rate_limiter
    }

    /// Trimmed system message; empty content is a validation error
    pub fn create_system_message(content: &str) -> GatewayResult<ChatMessage> {
        ChatMessage::system(content)
    }

    /// Trimmed user message; empty content is a validation error
    pub fn create_user_message(content: &str) -> GatewayResult<ChatMessage> {
        ChatMessage::user(content)
    }

    pub fn validate_schema(schema: &JsonSchema) -> GatewayResult<()> {
        validate_schema(schema)
    }

    /// Structural check for a schema held as raw JSON
    pub fn validate_schema_value(schema: &serde_json::Value) -> GatewayResult<()> {
        validate_schema_value(schema)
    }

    /// Issue one chat completion call
    pub async fn chat_completion(&self, request: ChatCompletionRequest) -> GatewayResult<ChatCompletionResponse> {
        self.chat_completion_with_cancel(request, &CancellationToken::new()).await
    }

    /// Issue one chat completion call that `cancel` can abort at any suspension point
    pub async fn chat_completion_with_cancel(
        &self,
        request: ChatCompletionRequest,
        cancel: &CancellationToken,
    ) -> GatewayResult<ChatCompletionResponse> {
        self.run_logged(request, cancel, Ok).await
    }

    /// Chat completion whose structured result is deserialized into `T`
    pub async fn chat_completion_structured<T: DeserializeOwned>(&self, request: ChatCompletionRequest) -> GatewayResult<T> {
        let schema = request
            .response_schema
            .as_ref()
            .map(JsonSchema::to_value)
            .ok_or_else(|| validation_error("Structured completion requires a response schema"))?;

        self.run_logged(request, &CancellationToken::new(), move |response| {
            let value = match response.content {
                CompletionContent::Structured(value) => value,
                CompletionContent::Text(text) => serde_json::Value::String(text),
            };

            serde_json::from_value(value.clone()).map_err(|e| GatewayError::Gateway {
                message: format!("Structured response does not match the expected shape: {}", e),
                cause: FailureCause::MalformedJson { schema },
                status: None,
                raw: Some(value.to_string()),
                attempts: Some(response.attempts),
            })
        })
        .await
    }

    /// Run one call between its start event and exactly one terminal event.
    /// `finish` shapes the response; its failure is logged as the terminal error.
    async fn run_logged<T, F>(&self, request: ChatCompletionRequest, cancel: &CancellationToken, finish: F) -> GatewayResult<T>
    where
        F: FnOnce(ChatCompletionResponse) -> GatewayResult<T>,
    {
        let ctx = CallContext {
            request_id: request
                .request_id
                .clone()
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            model: request
                .model
                .clone()
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| self.inner.config.default_model.clone()),
            started: Instant::now(),
        };

        self.inner.logger.log_request_start(&RequestStartEvent {
            request_id: ctx.request_id.clone(),
            model: ctx.model.clone(),
            operation: OPERATION_CHAT_COMPLETION.to_string(),
            message_count: request.messages.len(),
            has_schema: request.response_schema.is_some(),
            user_id: request.user_id.clone(),
            timestamp: Utc::now(),
        });

        let finished = self.execute(&ctx, &request, cancel).await.and_then(|response| {
            let (model, tokens_used, attempts) = (response.model.clone(), response.tokens_used, response.attempts);
            finish(response).map(|value| (value, model, tokens_used, attempts))
        });

        match finished {
            Ok((value, model, tokens_used, attempts)) => {
                self.inner.logger.log_request_success(&RequestSuccessEvent {
                    request_id: ctx.request_id.clone(),
                    model,
                    operation: OPERATION_CHAT_COMPLETION.to_string(),
                    duration_ms: ctx.elapsed_ms(),
                    tokens_used,
                    attempts,
                    timestamp: Utc::now(),
                });
                Ok(value)
            }
            Err(err) => {
                self.log_error(&ctx, &err, err.attempts().unwrap_or(0), true);
                Err(err)
            }
        }
    }

    pub fn rate_limit_status(&self) -> RateLimitStatus {
        self.inner.rate_limiter.status()
    }

    /// Apply a partial limiter update, logging each changed property
    pub fn update_rate_limit_config(&self, update: RateLimiterConfigUpdate) -> GatewayResult<RateLimiterConfig> {
        let config = self.inner.rate_limiter.update_config(update)?;
        for (property, new_value) in update.changes() {
            self.inner.logger.log_config_change(&ConfigChangeEvent {
                property: property.to_string(),
                new_value,
            });
        }
        Ok(config)
    }

    pub fn reset_rate_limit(&self) {
        self.inner.rate_limiter.reset();
        self.inner.logger.info("Rate limiter reset");
    }

    async fn execute(
        &self,
        ctx: &CallContext,
        request: &ChatCompletionRequest,
        cancel: &CancellationToken,
    ) -> GatewayResult<ChatCompletionResponse> {
        validate_request(request)?;

        self.acquire_capacity(ctx, cancel).await?;

        let payload = OpenAIRequest::from_chat_request(request, &ctx.model);
        debug!(request_id = %ctx.request_id, summary = %create_request_log_summary(&payload), "Built chat completion payload");

        let transport_request = TransportRequest {
            url: self.inner.config.completions_url(),
            headers: self.request_headers(&ctx.request_id),
            body: payload,
        };

        let (response, content, attempts) = self.send_with_retry(ctx, &transport_request, cancel).await?;

        let content = match &request.response_schema {
            None => CompletionContent::Text(content),
            Some(schema) => parse_structured(content, schema, attempts)?,
        };

        Ok(ChatCompletionResponse {
            content,
            model: response.model.unwrap_or_else(|| ctx.model.clone()),
            request_id: ctx.request_id.clone(),
            tokens_used: response.usage.and_then(|u| u.total_tokens),
            attempts,
            duration: ctx.started.elapsed(),
        })
    }

    async fn acquire_capacity(&self, ctx: &CallContext, cancel: &CancellationToken) -> GatewayResult<()> {
        let limiter = &self.inner.rate_limiter;
        if !limiter.can_acquire(1) {
            let status = limiter.status();
            self.inner.logger.log_rate_limit(&RateLimitEvent {
                request_id: ctx.request_id.clone(),
                wait_time_ms: status.time_until_next_token_ms,
                tokens_available: status.available_tokens,
                retry_after: None,
            });
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(cancelled_error()),
            acquired = limiter.acquire(1) => {
                let waited = acquired?;
                if !waited.is_zero() {
                    debug!(request_id = %ctx.request_id, waited_ms = waited.as_millis() as u64, "Acquired rate limit token after waiting");
                }
                Ok(())
            }
        }
    }

    fn request_headers(&self, request_id: &str) -> Vec<(String, String)> {
        let config = &self.inner.config;
        let mut headers = vec![
            ("Content-Type".to_string(), "application/json".to_string()),
            ("Authorization".to_string(), format!("Bearer {}", config.api_key)),
            (REQUEST_ID_HEADER.to_string(), request_id.to_string()),
        ];
        headers.extend(config.extra_headers.iter().cloned());
        headers
    }

    /// Retry loop; returns the parsed response, its content and the attempt count
    async fn send_with_retry(
        &self,
        ctx: &CallContext,
        request: &TransportRequest,
        cancel: &CancellationToken,
    ) -> GatewayResult<(OpenAIResponse, String, u32)> {
        let config = &self.inner.config;
        let max_attempts = config.max_retries.saturating_add(1);
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            debug!(request_id = %ctx.request_id, attempt, max_attempts, "Sending attempt");

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(cancelled_error().with_attempts(attempt)),
                outcome = tokio::time::timeout(config.timeout, self.inner.transport.send(request)) => outcome,
            };

            let err = match outcome {
                Ok(Ok(response)) => match classify_response(response, &ctx.model) {
                    Ok((parsed, content)) => return Ok((parsed, content, attempt)),
                    Err(err) => err,
                },
                Ok(Err(TransportError::Timeout)) | Err(_) => gateway_error(
                    FailureCause::Timeout,
                    format!("Request timed out after {}ms", config.timeout.as_millis()),
                ),
                Ok(Err(TransportError::Network(message))) => gateway_error(FailureCause::Network, message),
            };

            if !err.is_retryable() {
                return Err(err.with_attempts(attempt));
            }
            if attempt >= max_attempts {
                return Err(exhausted(err, attempt));
            }

            self.log_error(ctx, &err, attempt, false);

            let delay = match &err {
                GatewayError::RateLimit { retry_after, .. } => {
                    let secs = retry_after.unwrap_or(DEFAULT_RETRY_AFTER_SECS);
                    self.inner.logger.log_rate_limit(&RateLimitEvent {
                        request_id: ctx.request_id.clone(),
                        wait_time_ms: secs.saturating_mul(1000),
                        tokens_available: self.inner.rate_limiter.available_tokens(),
                        retry_after: Some(secs),
                    });
                    Duration::from_secs(secs)
                }
                _ => backoff_delay(config.retry_delay, attempt - 1),
            };

            debug!(request_id = %ctx.request_id, delay_ms = delay.as_millis() as u64, "Backing off before retry");
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(cancelled_error().with_attempts(attempt)),
                _ = self.inner.sleeper.sleep(delay) => {}
            }
        }
    }

    fn log_error(&self, ctx: &CallContext, err: &GatewayError, attempt: u32, terminal: bool) {
        self.inner.logger.log_request_error(&RequestErrorEvent {
            request_id: ctx.request_id.clone(),
            model: ctx.model.clone(),
            operation: OPERATION_CHAT_COMPLETION.to_string(),
            duration_ms: ctx.elapsed_ms(),
            error_type: err.kind(),
            status_code: err.status(),
            message: err.message().to_string(),
            attempt,
            terminal,
            timestamp: Utc::now(),
        });
    }
}

/// Checks run before any capacity is taken or network attempt made
pub fn validate_request(request: &ChatCompletionRequest) -> GatewayResult<()> {
    if request.messages.is_empty() {
        return Err(validation_error("Messages array cannot be empty"));
    }

    for (index, message) in request.messages.iter().enumerate() {
        if message.content().trim().is_empty() {
            return Err(validation_error(format!("Message at index {} has empty content", index)));
        }
    }

    if let Some(schema) = &request.response_schema {
        validate_schema(schema)?;
    }

    Ok(())
}

/// Map an upstream response onto success or a typed failure
fn classify_response(response: TransportResponse, model: &str) -> GatewayResult<(OpenAIResponse, String)> {
    let status = response.status;

    if response.is_success() {
        let parsed: OpenAIResponse = match serde_json::from_str(&response.body) {
            Ok(parsed) => parsed,
            Err(e) => {
                return Err(GatewayError::Gateway {
                    message: format!("Failed to parse provider response: {}", e),
                    cause: FailureCause::InvalidResponse,
                    status: Some(status),
                    raw: Some(response.body),
                    attempts: None,
                })
            }
        };

        return match parsed.first_content().map(str::to_string) {
            Some(content) => Ok((parsed, content)),
            None => Err(GatewayError::Gateway {
                message: "No completion content in provider response".to_string(),
                cause: FailureCause::InvalidResponse,
                status: Some(status),
                raw: Some(response.body),
                attempts: None,
            }),
        };
    }

    let message = error_message(&response.body);
    match status {
        401 => Err(GatewayError::Gateway {
            message: format!("Unauthorized: {}", message),
            cause: FailureCause::Unauthorized,
            status: Some(status),
            raw: Some(response.body),
            attempts: None,
        }),
        429 => Err(GatewayError::RateLimit {
            message,
            retry_after: Some(parse_retry_after(response.header("retry-after")).unwrap_or(DEFAULT_RETRY_AFTER_SECS)),
            status: Some(status),
            attempts: None,
        }),
        400 => {
            let lowered = message.to_lowercase();
            if lowered.contains("schema") || lowered.contains("json") {
                Err(GatewayError::Validation { message, status: Some(status) })
            } else if lowered.contains("model") {
                Err(model_not_supported_error(model, message, Some(status)))
            } else {
                Err(GatewayError::Validation {
                    message: format!("Invalid request: {}", message),
                    status: Some(status),
                })
            }
        }
        404 => Err(model_not_supported_error(model, message, Some(status))),
        _ => Err(GatewayError::Gateway {
            message: format!("Upstream returned {}: {}", status, message),
            cause: FailureCause::Http,
            status: Some(status),
            raw: Some(response.body),
            attempts: None,
        }),
    }
}

/// Terminal error once every attempt has failed
fn exhausted(last: GatewayError, attempts: u32) -> GatewayError {
    match last {
        // The provider's wait hint stays useful to the caller
        GatewayError::RateLimit { .. } => last.with_attempts(attempts),
        _ => GatewayError::Gateway {
            message: format!("Request failed after {} attempts: {}", attempts, last.message()),
            cause: FailureCause::RetriesExhausted,
            status: last.status(),
            raw: last.raw().map(str::to_string),
            attempts: Some(attempts),
        },
    }
}

fn parse_structured(content: String, schema: &JsonSchema, attempts: u32) -> GatewayResult<CompletionContent> {
    match serde_json::from_str::<serde_json::Value>(&content) {
        Ok(value) => Ok(CompletionContent::Structured(value)),
        Err(e) => Err(GatewayError::Gateway {
            message: format!("Structured response is not valid JSON: {}", e),
            cause: FailureCause::MalformedJson { schema: schema.to_value() },
            status: None,
            raw: Some(content),
            attempts: Some(attempts),
        }),
    }
}
