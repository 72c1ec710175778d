//! Application configuration settings
//!
//! Defines all configuration structures and loading logic

use crate::config::file::FileConfig;
use crate::services::client::{GatewayConfig, DEFAULT_BASE_URL, DEFAULT_MODEL};
use crate::services::rate_limiter::{RateLimiterConfig, RateLimiterPreset};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Upstream API configuration
    pub gateway: GatewaySettings,
    /// Rate limiter configuration
    pub rate_limit: RateLimitSettings,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Upstream API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewaySettings {
    /// API key
    pub api_key: String,
    /// API base URL
    pub base_url: String,
    /// Model used when a request names none
    pub default_model: String,
    /// Per-attempt timeout in milliseconds
    pub timeout_ms: u64,
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Backoff base in milliseconds
    pub retry_delay_ms: u64,
    /// Sent as `HTTP-Referer` (OpenRouter app attribution)
    pub http_referer: Option<String>,
    /// Sent as `X-Title`
    pub app_title: Option<String>,
}

/// Rate limiter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSettings {
    /// Profile the values started from
    pub preset: RateLimiterPreset,
    /// Effective values after overrides
    pub config: RateLimiterConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
    /// Log format (text/json)
    pub format: String,
}

impl Settings {
    /// Create a new configuration instance from the environment
    pub fn new() -> Result<Self> {
        // Load .env file if it exists
        dotenv::dotenv().ok();

        let preset: RateLimiterPreset = get_env_or_default("AI_RATE_LIMIT_PRESET", "default")
            .parse()
            .context("Invalid rate limit preset")?;

        let settings = Self {
            gateway: GatewaySettings {
                api_key: std::env::var("AI_API_KEY")
                    .or_else(|_| std::env::var("OPENROUTER_API_KEY"))
                    .context("AI_API_KEY environment variable not set")?,
                base_url: get_env_or_default("AI_BASE_URL", DEFAULT_BASE_URL),
                default_model: get_env_or_default("AI_MODEL", DEFAULT_MODEL),
                timeout_ms: get_env_or_default("AI_TIMEOUT_MS", "30000")
                    .parse()
                    .context("Invalid timeout value")?,
                max_retries: get_env_or_default("AI_MAX_RETRIES", "3")
                    .parse()
                    .context("Invalid maximum retries")?,
                retry_delay_ms: get_env_or_default("AI_RETRY_DELAY_MS", "1000")
                    .parse()
                    .context("Invalid retry delay")?,
                http_referer: std::env::var("AI_HTTP_REFERER").ok().filter(|v| !v.is_empty()),
                app_title: std::env::var("AI_APP_TITLE").ok().filter(|v| !v.is_empty()),
            },
            rate_limit: RateLimitSettings {
                preset,
                config: preset.config(),
            },
            logging: LoggingConfig {
                level: get_env_or_default("RUST_LOG", "info"),
                format: get_env_or_default("LOG_FORMAT", "text"),
            },
        };

        // Validate configuration
        settings.validate()?;

        Ok(settings)
    }

    /// Environment settings with the optional JSON config file applied on top
    pub fn load() -> Result<Self> {
        let mut settings = Self::new()?;
        if let Some(file) = FileConfig::load_default()? {
            settings.apply_file(&file)?;
        }
        Ok(settings)
    }

    /// Overlay values present in a config file
    pub fn apply_file(&mut self, file: &FileConfig) -> Result<()> {
        if let Some(base_url) = &file.base_url {
            self.gateway.base_url = base_url.clone();
        }
        if let Some(model) = &file.default_model {
            self.gateway.default_model = model.clone();
        }
        if let Some(timeout_ms) = file.timeout_ms {
            self.gateway.timeout_ms = timeout_ms;
        }
        if let Some(max_retries) = file.max_retries {
            self.gateway.max_retries = max_retries;
        }
        if let Some(retry_delay_ms) = file.retry_delay_ms {
            self.gateway.retry_delay_ms = retry_delay_ms;
        }
        if let Some(referer) = &file.http_referer {
            self.gateway.http_referer = Some(referer.clone());
        }
        if let Some(title) = &file.app_title {
            self.gateway.app_title = Some(title.clone());
        }
        if let Some(rate_limit) = &file.rate_limit {
            let (preset, config) = rate_limit.resolve(self.rate_limit.preset);
            self.rate_limit = RateLimitSettings { preset, config };
        }

        debug!(preset = self.rate_limit.preset.as_str(), "Applied file configuration");
        self.validate()
    }

    /// Validate configuration validity
    fn validate(&self) -> Result<()> {
        if self.gateway.api_key.trim().is_empty() {
            anyhow::bail!("API key cannot be empty");
        }

        if self.gateway.api_key.contains(char::is_whitespace) {
            anyhow::bail!("API key cannot contain whitespace characters");
        }

        // Validate URL format
        if !self.gateway.base_url.starts_with("http") {
            anyhow::bail!("Invalid base URL format, should start with 'http'");
        }

        if self.gateway.default_model.trim().is_empty() {
            anyhow::bail!("Default model cannot be empty");
        }

        if self.gateway.timeout_ms == 0 {
            anyhow::bail!("Timeout values cannot be 0");
        }

        self.rate_limit
            .config
            .validate()
            .context("Invalid rate limit configuration")?;

        // Validate log level
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            anyhow::bail!("Invalid log level: {}", self.logging.level);
        }

        // Validate log format
        let valid_formats = ["text", "json"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            anyhow::bail!("Invalid log format: {}", self.logging.format);
        }

        Ok(())
    }

    /// Client configuration derived from these settings
    pub fn gateway_config(&self) -> GatewayConfig {
        let mut extra_headers = Vec::new();
        if let Some(referer) = &self.gateway.http_referer {
            extra_headers.push(("HTTP-Referer".to_string(), referer.clone()));
        }
        if let Some(title) = &self.gateway.app_title {
            extra_headers.push(("X-Title".to_string(), title.clone()));
        }

        GatewayConfig {
            api_key: self.gateway.api_key.clone(),
            base_url: self.gateway.base_url.clone(),
            default_model: self.gateway.default_model.clone(),
            timeout: Duration::from_millis(self.gateway.timeout_ms),
            max_retries: self.gateway.max_retries,
            retry_delay: Duration::from_millis(self.gateway.retry_delay_ms),
            extra_headers,
        }
    }
}

/// Get environment variable or default value
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
