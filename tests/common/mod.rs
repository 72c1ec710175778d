//! Shared test doubles

#![allow(dead_code)]

use aigateway::services::{RateLimiter, RateLimiterPreset, Sleeper, Transport, TransportError, TransportRequest, TransportResponse};
use aigateway::utils::logging::{
    ConfigChangeEvent, GatewayLogger, RateLimitEvent, RequestErrorEvent, RequestStartEvent, RequestSuccessEvent,
};
use aigateway::GatewayClient;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One scripted transport outcome
#[derive(Clone)]
pub enum Scripted {
    Respond(TransportResponse),
    Fail(TransportError),
    /// Never completes; only a timeout or cancellation ends the attempt
    Hang,
}

/// Transport that replays a script; the last entry repeats once the script runs out
pub struct MockTransport {
    script: Mutex<VecDeque<Scripted>>,
    last: Mutex<Option<Scripted>>,
    requests: Mutex<Vec<TransportRequest>>,
}

impl MockTransport {
    pub fn new(script: Vec<Scripted>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            last: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<TransportRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn name(&self) -> &str {
        "mock"
    }

    async fn send(&self, request: &TransportRequest) -> Result<TransportResponse, TransportError> {
        self.requests.lock().unwrap().push(request.clone());

        let next = {
            let mut script = self.script.lock().unwrap();
            let mut last = self.last.lock().unwrap();
            match script.pop_front() {
                Some(step) => {
                    *last = Some(step.clone());
                    step
                }
                None => last.clone().expect("mock transport script is empty"),
            }
        };

        match next {
            Scripted::Respond(response) => Ok(response),
            Scripted::Fail(err) => Err(err),
            Scripted::Hang => std::future::pending().await,
        }
    }
}

/// Records requested sleeps and returns at once
#[derive(Default)]
pub struct RecordingSleeper {
    sleeps: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
    }
}

/// Keeps every lifecycle event
#[derive(Default)]
pub struct RecordingLogger {
    pub starts: Mutex<Vec<RequestStartEvent>>,
    pub successes: Mutex<Vec<RequestSuccessEvent>>,
    pub errors: Mutex<Vec<RequestErrorEvent>>,
    pub rate_limits: Mutex<Vec<RateLimitEvent>>,
    pub config_changes: Mutex<Vec<ConfigChangeEvent>>,
    pub infos: Mutex<Vec<String>>,
}

impl RecordingLogger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl GatewayLogger for RecordingLogger {
    fn info(&self, message: &str) {
        self.infos.lock().unwrap().push(message.to_string());
    }

    fn log_request_start(&self, event: &RequestStartEvent) {
        self.starts.lock().unwrap().push(event.clone());
    }

    fn log_request_success(&self, event: &RequestSuccessEvent) {
        self.successes.lock().unwrap().push(event.clone());
    }

    fn log_request_error(&self, event: &RequestErrorEvent) {
        self.errors.lock().unwrap().push(event.clone());
    }

    fn log_rate_limit(&self, event: &RateLimitEvent) {
        self.rate_limits.lock().unwrap().push(event.clone());
    }

    fn log_config_change(&self, event: &ConfigChangeEvent) {
        self.config_changes.lock().unwrap().push(event.clone());
    }
}

/// 200 response with a single completion
pub fn completion(content: &str) -> Scripted {
    Scripted::Respond(TransportResponse::new(
        200,
        serde_json::json!({
            "id": "cmpl-1",
            "model": "test-model",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": content}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        })
        .to_string(),
    ))
}

/// Error response in the provider's error body format
pub fn status(code: u16, message: &str) -> Scripted {
    Scripted::Respond(TransportResponse::new(
        code,
        serde_json::json!({"error": {"message": message}}).to_string(),
    ))
}

pub fn network_failure() -> Scripted {
    Scripted::Fail(TransportError::Network("connection reset by peer".to_string()))
}

pub const RETRY_DELAY: Duration = Duration::from_millis(100);

/// Client wired to test doubles with a generous limiter
pub fn test_client(transport: Arc<MockTransport>, sleeper: Arc<RecordingSleeper>, max_retries: u32) -> GatewayClient {
    GatewayClient::builder("sk-test")
        .default_model("test-model")
        .transport(transport)
        .sleeper(sleeper)
        .max_retries(max_retries)
        .retry_delay(RETRY_DELAY)
        .rate_limiter(Arc::new(RateLimiter::from_preset(RateLimiterPreset::Development)))
        .build()
        .expect("test client")
}
