//! Gateway client behaviour tests

mod common;

use aigateway::models::{ChatCompletionRequest, ChatMessage, CompletionContent, JsonSchema, ModelParams};
use aigateway::services::{RateLimiter, RateLimiterConfig, RateLimiterConfigUpdate, TransportError, TransportResponse};
use aigateway::utils::error::FailureCause;
use aigateway::{ErrorKind, GatewayClient, GatewayError};
use common::*;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn hello_request() -> ChatCompletionRequest {
    ChatCompletionRequest::new(vec![ChatMessage::user("Say hello").unwrap()])
}

#[tokio::test(start_paused = true)]
async fn test_empty_messages_rejected_without_network() {
    let transport = MockTransport::new(vec![completion("unused")]);
    let client = test_client(transport.clone(), RecordingSleeper::new(), 3);
    let before = client.rate_limit_status().available_tokens;

    let err = client.chat_completion(ChatCompletionRequest::new(vec![])).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(transport.calls(), 0);
    assert_eq!(client.rate_limit_status().available_tokens, before);
}

#[tokio::test(start_paused = true)]
async fn test_schema_without_type_rejected_without_network() {
    let err = JsonSchema::from_value(json!({"properties": {"a": {"type": "string"}}})).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let transport = MockTransport::new(vec![completion("{}")]);
    let client = test_client(transport.clone(), RecordingSleeper::new(), 3);
    let request = hello_request().with_schema(JsonSchema::new(""));

    let err = client.chat_completion(request).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(transport.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_recovers_after_two_failures_with_exponential_backoff() {
    let transport = MockTransport::new(vec![network_failure(), status(502, "bad gateway"), completion("hi")]);
    let sleeper = RecordingSleeper::new();
    let client = test_client(transport.clone(), sleeper.clone(), 3);

    let response = client.chat_completion(hello_request()).await.unwrap();

    assert_eq!(response.content, CompletionContent::Text("hi".to_string()));
    assert_eq!(response.attempts, 3);
    assert_eq!(transport.calls(), 3);
    assert_eq!(sleeper.sleeps(), vec![RETRY_DELAY, RETRY_DELAY * 2]);
}

#[tokio::test(start_paused = true)]
async fn test_persistent_network_failure_exhausts_attempts() {
    let transport = MockTransport::new(vec![network_failure()]);
    let sleeper = RecordingSleeper::new();
    let client = test_client(transport.clone(), sleeper.clone(), 2);

    let err = client.chat_completion(hello_request()).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Gateway);
    assert_eq!(err.attempts(), Some(3));
    assert!(err.message().contains("connection reset by peer"));
    assert!(!err.is_retryable());
    assert_eq!(transport.calls(), 3);
    assert_eq!(sleeper.sleeps().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_unauthorized_is_terminal() {
    let transport = MockTransport::new(vec![status(401, "invalid api key"), completion("never")]);
    let sleeper = RecordingSleeper::new();
    let client = test_client(transport.clone(), sleeper.clone(), 3);

    let err = client.chat_completion(hello_request()).await.unwrap_err();

    assert!(matches!(err, GatewayError::Gateway { cause: FailureCause::Unauthorized, .. }));
    assert_eq!(err.status(), Some(401));
    assert_eq!(err.attempts(), Some(1));
    assert_eq!(transport.calls(), 1);
    assert!(sleeper.sleeps().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_provider_rate_limit_waits_retry_after() {
    let limited = Scripted::Respond(
        TransportResponse::new(429, r#"{"error":{"message":"slow down"}}"#).with_header("Retry-After", "5"),
    );
    let transport = MockTransport::new(vec![limited, completion("done")]);
    let sleeper = RecordingSleeper::new();
    let logger = RecordingLogger::new();
    let client = GatewayClient::builder("sk-test")
        .transport(transport.clone())
        .sleeper(sleeper.clone())
        .logger(logger.clone())
        .retry_delay(RETRY_DELAY)
        .build()
        .unwrap();

    let response = client.chat_completion(hello_request()).await.unwrap();

    assert_eq!(response.attempts, 2);
    assert_eq!(sleeper.sleeps(), vec![Duration::from_secs(5)]);
    let rate_limits = logger.rate_limits.lock().unwrap();
    assert_eq!(rate_limits.len(), 1);
    assert_eq!(rate_limits[0].retry_after, Some(5));
}

#[tokio::test(start_paused = true)]
async fn test_provider_rate_limit_on_last_attempt_is_returned() {
    let transport = MockTransport::new(vec![Scripted::Respond(
        TransportResponse::new(429, "").with_header("retry-after", "2"),
    )]);
    let sleeper = RecordingSleeper::new();
    let client = test_client(transport.clone(), sleeper.clone(), 1);

    let err = client.chat_completion(hello_request()).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::RateLimit);
    assert_eq!(err.retry_after(), Some(Duration::from_secs(2)));
    assert_eq!(err.attempts(), Some(2));
    assert_eq!(sleeper.sleeps(), vec![Duration::from_secs(2)]);
}

#[tokio::test(start_paused = true)]
async fn test_not_found_is_model_not_supported() {
    let transport = MockTransport::new(vec![status(404, "no such model")]);
    let client = test_client(transport.clone(), RecordingSleeper::new(), 3);

    let err = client
        .chat_completion(hello_request().with_model("vendor/ghost"))
        .await
        .unwrap_err();

    match err {
        GatewayError::ModelNotSupported { model, status, .. } => {
            assert_eq!(model, "vendor/ghost");
            assert_eq!(status, Some(404));
        }
        other => panic!("Expected model not supported error, got {:?}", other),
    }
    assert_eq!(transport.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_bad_request_classification() {
    let transport = MockTransport::new(vec![status(400, "response_format json_schema is invalid")]);
    let client = test_client(transport.clone(), RecordingSleeper::new(), 3);
    let err = client.chat_completion(hello_request()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(err.status(), Some(400));

    let transport = MockTransport::new(vec![status(400, "The model does not exist")]);
    let client = test_client(transport.clone(), RecordingSleeper::new(), 3);
    let err = client.chat_completion(hello_request()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ModelNotSupported);
    assert_eq!(transport.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_structured_output_round_trip() {
    let transport = MockTransport::new(vec![completion(r#"{"a":"x"}"#)]);
    let client = test_client(transport.clone(), RecordingSleeper::new(), 3);
    let schema = JsonSchema::from_value(json!({
        "type": "object",
        "properties": {"a": {"type": "string"}},
        "required": ["a"]
    }))
    .unwrap();

    let response = client.chat_completion(hello_request().with_schema(schema)).await.unwrap();

    assert_eq!(response.content, CompletionContent::Structured(json!({"a": "x"})));
    let sent = &transport.requests()[0].body;
    let format = sent.response_format.as_ref().expect("response format sent");
    assert_eq!(format.format_type, "json_schema");
    assert_eq!(format.json_schema.name, "structured_response");
    assert!(format.json_schema.strict);
    assert_eq!(format.json_schema.schema["required"], json!(["a"]));
}

#[tokio::test(start_paused = true)]
async fn test_plain_text_returned_verbatim() {
    let transport = MockTransport::new(vec![completion("hello")]);
    let client = test_client(transport, RecordingSleeper::new(), 3);

    let response = client.chat_completion(hello_request()).await.unwrap();

    assert_eq!(response.content.as_text(), Some("hello"));
    assert_eq!(response.model, "test-model");
    assert_eq!(response.tokens_used, Some(15));
}

#[tokio::test(start_paused = true)]
async fn test_typed_structured_completion() {
    #[derive(Debug, Deserialize)]
    struct Answer {
        a: String,
    }

    let transport = MockTransport::new(vec![completion(r#"{"a":"typed"}"#)]);
    let client = test_client(transport, RecordingSleeper::new(), 3);
    let request = hello_request().with_schema(JsonSchema::object([("a", JsonSchema::string())]));

    let answer: Answer = client.chat_completion_structured(request).await.unwrap();
    assert_eq!(answer.a, "typed");

    let err = client.chat_completion_structured::<Answer>(hello_request()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test(start_paused = true)]
async fn test_malformed_structured_output_is_terminal() {
    let transport = MockTransport::new(vec![completion("not json at all")]);
    let sleeper = RecordingSleeper::new();
    let client = test_client(transport.clone(), sleeper.clone(), 3);
    let schema = JsonSchema::object([("a", JsonSchema::string())]);

    let err = client.chat_completion(hello_request().with_schema(schema.clone())).await.unwrap_err();

    match &err {
        GatewayError::Gateway { cause: FailureCause::MalformedJson { schema: sent }, raw, .. } => {
            assert_eq!(sent, &schema.to_value());
            assert_eq!(raw.as_deref(), Some("not json at all"));
        }
        other => panic!("Expected malformed JSON error, got {:?}", other),
    }
    assert_eq!(transport.calls(), 1);
    assert!(sleeper.sleeps().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_empty_completion_is_retried() {
    let transport = MockTransport::new(vec![completion("   "), completion("second time")]);
    let sleeper = RecordingSleeper::new();
    let client = test_client(transport.clone(), sleeper.clone(), 3);

    let response = client.chat_completion(hello_request()).await.unwrap();

    assert_eq!(response.content.as_text(), Some("second time"));
    assert_eq!(sleeper.sleeps(), vec![RETRY_DELAY]);
}

#[tokio::test(start_paused = true)]
async fn test_attempt_timeout_is_retryable() {
    let transport = MockTransport::new(vec![Scripted::Hang, completion("late but fine")]);
    let sleeper = RecordingSleeper::new();
    let client = GatewayClient::builder("sk-test")
        .transport(transport.clone())
        .sleeper(sleeper.clone())
        .timeout(Duration::from_millis(50))
        .retry_delay(RETRY_DELAY)
        .build()
        .unwrap();

    let response = client.chat_completion(hello_request()).await.unwrap();

    assert_eq!(response.attempts, 2);
    assert_eq!(sleeper.sleeps(), vec![RETRY_DELAY]);
}

#[tokio::test(start_paused = true)]
async fn test_transport_timeout_error_is_retryable() {
    let transport = MockTransport::new(vec![Scripted::Fail(TransportError::Timeout), completion("ok")]);
    let client = test_client(transport.clone(), RecordingSleeper::new(), 3);

    let response = client.chat_completion(hello_request()).await.unwrap();
    assert_eq!(response.attempts, 2);
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_is_never_retried() {
    let transport = MockTransport::new(vec![Scripted::Hang]);
    let sleeper = RecordingSleeper::new();
    let client = test_client(transport.clone(), sleeper.clone(), 3);
    let token = CancellationToken::new();

    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        canceller.cancel();
    });

    let err = client.chat_completion_with_cancel(hello_request(), &token).await.unwrap_err();

    assert!(err.is_cancelled());
    assert!(!err.is_retryable());
    assert_eq!(err.attempts(), Some(1));
    assert_eq!(transport.calls(), 1);
    assert!(sleeper.sleeps().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_before_start_skips_network() {
    let transport = MockTransport::new(vec![completion("unused")]);
    let client = test_client(transport.clone(), RecordingSleeper::new(), 3);
    let token = CancellationToken::new();
    token.cancel();

    let err = client.chat_completion_with_cancel(hello_request(), &token).await.unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(transport.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_local_rate_limit_exhaustion_skips_network() {
    let limiter = RateLimiter::new(RateLimiterConfig {
        capacity: 1,
        refill_rate: 1.0,
        refill_interval_ms: 60_000,
        max_wait_time_ms: 1000,
    })
    .unwrap();
    let transport = MockTransport::new(vec![completion("first")]);
    let logger = RecordingLogger::new();
    let client = GatewayClient::builder("sk-test")
        .transport(transport.clone())
        .sleeper(RecordingSleeper::new())
        .logger(logger.clone())
        .rate_limiter(Arc::new(limiter))
        .build()
        .unwrap();

    client.chat_completion(hello_request()).await.unwrap();
    let err = client.chat_completion(hello_request()).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::RateLimit);
    assert_eq!(err.retry_after(), Some(Duration::from_secs(60)));
    assert_eq!(transport.calls(), 1);
    assert_eq!(logger.rate_limits.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_calls_share_bucket() {
    let limiter = RateLimiter::new(RateLimiterConfig {
        capacity: 3,
        refill_rate: 1.0,
        refill_interval_ms: 1000,
        max_wait_time_ms: 10_000,
    })
    .unwrap();
    let transport = MockTransport::new(vec![completion("ok")]);
    let client = GatewayClient::builder("sk-test")
        .transport(transport.clone())
        .sleeper(RecordingSleeper::new())
        .rate_limiter(Arc::new(limiter))
        .build()
        .unwrap();

    let started = tokio::time::Instant::now();
    let calls = (0..5).map(|_| {
        let client = client.clone();
        async move { client.chat_completion(hello_request()).await }
    });
    let results = futures::future::join_all(calls).await;

    assert!(results.iter().all(|r| r.is_ok()));
    assert_eq!(transport.calls(), 5);
    assert!(started.elapsed() >= Duration::from_millis(2000));
    assert!(client.rate_limit_status().available_tokens >= 0.0);
}

#[tokio::test(start_paused = true)]
async fn test_request_headers_and_payload() {
    let transport = MockTransport::new(vec![completion("ok")]);
    let client = GatewayClient::builder("sk-secret")
        .default_model("default/model")
        .header("X-Title", "Flashcards")
        .transport(transport.clone())
        .sleeper(RecordingSleeper::new())
        .build()
        .unwrap();

    let request = hello_request()
        .with_request_id("req-42")
        .with_params(ModelParams { max_tokens: Some(64), top_p: Some(0.9), ..Default::default() });
    client.chat_completion(request).await.unwrap();

    let sent = &transport.requests()[0];
    let header = |name: &str| {
        sent.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.clone())
    };
    assert!(sent.url.ends_with("/chat/completions"));
    assert_eq!(header("authorization").as_deref(), Some("Bearer sk-secret"));
    assert_eq!(header("content-type").as_deref(), Some("application/json"));
    assert_eq!(header("x-request-id").as_deref(), Some("req-42"));
    assert_eq!(header("x-title").as_deref(), Some("Flashcards"));
    assert_eq!(sent.body.model, "default/model");
    assert_eq!(sent.body.max_tokens, Some(64));
    assert_eq!(sent.body.top_p, Some(0.9));
    assert_eq!(sent.body.temperature, None);
}

#[tokio::test(start_paused = true)]
async fn test_lifecycle_events() {
    let transport = MockTransport::new(vec![network_failure(), completion("ok")]);
    let logger = RecordingLogger::new();
    let client = GatewayClient::builder("sk-test")
        .transport(transport)
        .sleeper(RecordingSleeper::new())
        .logger(logger.clone())
        .build()
        .unwrap();

    client
        .chat_completion(hello_request().with_user_id("user-1").with_request_id("req-1"))
        .await
        .unwrap();

    let starts = logger.starts.lock().unwrap();
    assert_eq!(starts.len(), 1);
    assert_eq!(starts[0].request_id, "req-1");
    assert_eq!(starts[0].user_id.as_deref(), Some("user-1"));
    assert_eq!(starts[0].message_count, 1);
    assert!(!starts[0].has_schema);

    let errors = logger.errors.lock().unwrap();
    assert_eq!(errors.len(), 1);
    assert!(!errors[0].terminal);
    assert_eq!(errors[0].error_type, ErrorKind::Gateway);

    let successes = logger.successes.lock().unwrap();
    assert_eq!(successes.len(), 1);
    assert_eq!(successes[0].attempts, 2);
    assert_eq!(successes[0].tokens_used, Some(15));
}

#[tokio::test(start_paused = true)]
async fn test_terminal_failure_logged_once() {
    let transport = MockTransport::new(vec![status(401, "nope")]);
    let logger = RecordingLogger::new();
    let client = GatewayClient::builder("sk-test")
        .transport(transport)
        .sleeper(RecordingSleeper::new())
        .logger(logger.clone())
        .build()
        .unwrap();

    client.chat_completion(hello_request()).await.unwrap_err();

    let errors = logger.errors.lock().unwrap();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].terminal);
    assert_eq!(errors[0].status_code, Some(401));
    assert!(logger.successes.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_typed_decode_failure_logged_as_terminal_error() {
    #[derive(Debug, Deserialize)]
    struct Answer {
        #[allow(dead_code)]
        a: String,
    }

    let transport = MockTransport::new(vec![completion(r#"{"b":1}"#)]);
    let logger = RecordingLogger::new();
    let client = GatewayClient::builder("sk-test")
        .transport(transport)
        .sleeper(RecordingSleeper::new())
        .logger(logger.clone())
        .build()
        .unwrap();
    let request = hello_request().with_schema(JsonSchema::object([("a", JsonSchema::string())]));

    let err = client.chat_completion_structured::<Answer>(request).await.unwrap_err();

    match &err {
        GatewayError::Gateway { cause: FailureCause::MalformedJson { .. }, raw, attempts, .. } => {
            assert_eq!(raw.as_deref(), Some(r#"{"b":1}"#));
            assert_eq!(*attempts, Some(1));
        }
        other => panic!("Expected malformed JSON error, got {:?}", other),
    }

    assert_eq!(logger.starts.lock().unwrap().len(), 1);
    assert!(logger.successes.lock().unwrap().is_empty());
    let errors = logger.errors.lock().unwrap();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].terminal);
    assert_eq!(errors[0].error_type, ErrorKind::Gateway);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_management_passthroughs() {
    let logger = RecordingLogger::new();
    let client = GatewayClient::builder("sk-test")
        .transport(MockTransport::new(vec![completion("ok")]))
        .sleeper(RecordingSleeper::new())
        .logger(logger.clone())
        .build()
        .unwrap();

    let config = client
        .update_rate_limit_config(RateLimiterConfigUpdate {
            capacity: Some(2),
            refill_interval_ms: Some(500),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(config.capacity, 2);
    assert_eq!(client.rate_limit_status().available_tokens, 2.0);
    {
        let changes = logger.config_changes.lock().unwrap();
        let properties: Vec<&str> = changes.iter().map(|c| c.property.as_str()).collect();
        assert_eq!(properties, vec!["capacity", "refillIntervalMs"]);
    }

    client.chat_completion(hello_request()).await.unwrap();
    assert_eq!(client.rate_limit_status().available_tokens, 1.0);

    client.reset_rate_limit();
    assert_eq!(client.rate_limit_status().available_tokens, 2.0);
    assert_eq!(logger.infos.lock().unwrap().len(), 1);

    let err = client
        .update_rate_limit_config(RateLimiterConfigUpdate { capacity: Some(0), ..Default::default() })
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[test]
fn test_message_helpers() {
    assert_eq!(GatewayClient::create_user_message("  hi ").unwrap().content(), "hi");
    assert_eq!(GatewayClient::create_system_message("\n").unwrap_err().kind(), ErrorKind::Validation);
    assert!(GatewayClient::validate_schema(&JsonSchema::array(JsonSchema::string())).is_ok());
    assert!(GatewayClient::validate_schema_value(&json!({"type": "object"})).is_ok());
    assert!(GatewayClient::validate_schema_value(&json!({"properties": {}})).is_err());
}

#[test]
fn test_missing_api_key_is_validation_error() {
    let err = GatewayClient::builder("").build().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}
