//! File-based configuration loading
//!
//! Optional JSON file overriding environment settings and rate limit profiles

use crate::services::rate_limiter::{RateLimiterConfig, RateLimiterConfigUpdate, RateLimiterPreset};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "AIGATEWAY_CONFIG";

/// Configuration loaded from JSON file; every field is optional
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_delay_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_referer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimitFileConfig>,
}

/// Rate limit section: a preset plus individual overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitFileConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preset: Option<RateLimiterPreset>,
    #[serde(flatten)]
    pub overrides: RateLimiterConfigUpdate,
}

impl RateLimitFileConfig {
    /// Effective preset and config; `fallback` applies when no preset is named
    pub fn resolve(&self, fallback: RateLimiterPreset) -> (RateLimiterPreset, RateLimiterConfig) {
        let preset = self.preset.unwrap_or(fallback);
        let mut config = preset.config();
        if let Some(capacity) = self.overrides.capacity {
            config.capacity = capacity;
        }
        if let Some(rate) = self.overrides.refill_rate {
            config.refill_rate = rate;
        }
        if let Some(interval) = self.overrides.refill_interval_ms {
            config.refill_interval_ms = interval;
        }
        if let Some(max_wait) = self.overrides.max_wait_time_ms {
            config.max_wait_time_ms = max_wait;
        }
        (preset, config)
    }
}

impl FileConfig {
    /// Load configuration from JSON file
    pub fn load(path: &Path) -> Result<Self> {
        info!("Loading configuration from: {:?}", path);

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: FileConfig = serde_json::from_str(&content)
            .with_context(|| "Failed to parse config JSON")?;

        config.validate()?;

        debug!(has_rate_limit = config.rate_limit.is_some(), "Loaded file configuration");
        Ok(config)
    }

    /// Load configuration from default locations
    /// Searches in order:
    /// 1. `$AIGATEWAY_CONFIG`
    /// 2. ~/.config/aigateway/aigateway.json
    /// 3. ./aigateway.json
    ///
    /// Returns `None` when no file exists; a named but missing file is an error.
    pub fn load_default() -> Result<Option<Self>> {
        if let Ok(explicit) = std::env::var(CONFIG_PATH_ENV) {
            return Self::load(Path::new(&explicit)).map(Some);
        }

        match Self::default_paths().into_iter().find(|p| p.exists()) {
            Some(path) => Self::load(&path).map(Some),
            None => Ok(None),
        }
    }

    fn default_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".config").join("aigateway").join("aigateway.json"));
        }
        paths.push(PathBuf::from("aigateway.json"));
        paths
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if let Some(base_url) = &self.base_url {
            if !base_url.starts_with("http") {
                anyhow::bail!("Invalid base URL: {}", base_url);
            }
        }

        if self.timeout_ms == Some(0) {
            anyhow::bail!("timeoutMs cannot be 0");
        }

        if let Some(rate_limit) = &self.rate_limit {
            let (preset, config) = rate_limit.resolve(RateLimiterPreset::Default);
            config
                .validate()
                .with_context(|| format!("Invalid rate limit settings (preset '{}')", preset.as_str()))?;
        }

        Ok(())
    }
}
