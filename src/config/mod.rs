//! Configuration management module
//!
//! Responsible for loading and managing gateway configuration from environment variables and an optional JSON file

pub mod file;
pub mod settings;

pub use file::{FileConfig, RateLimitFileConfig};
pub use settings::{GatewaySettings, LoggingConfig, RateLimitSettings, Settings};
