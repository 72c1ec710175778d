//! Service layer module
//!
//! Contains the rate limiter, HTTP transport, gateway client and flashcard generator

pub mod backoff;
pub mod client;
pub mod flashcards;
pub mod rate_limiter;
pub mod transport;

pub use backoff::{Sleeper, TokioSleeper};
pub use client::{GatewayClient, GatewayClientBuilder, GatewayConfig};
pub use flashcards::{FlashcardGenerator, FlashcardGeneratorConfig, FlashcardProposal};
pub use rate_limiter::{RateLimitStatus, RateLimiter, RateLimiterConfig, RateLimiterConfigUpdate, RateLimiterPreset};
pub use transport::{ReqwestTransport, Transport, TransportError, TransportRequest, TransportResponse};
