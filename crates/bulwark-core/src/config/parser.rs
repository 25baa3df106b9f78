//! Configuration loading from YAML/JSON and validation.

use std::fs;
use std::path::Path;
use thiserror::Error;

use super::schema::{ResilienceConfig, RetryPolicy};

/// Errors that can occur when loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Unsupported config format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl ResilienceConfig {
    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: ResilienceConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: ResilienceConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file; the extension picks the format.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        tracing::debug!(path = %path.display(), "Loading resilience configuration");
        let contents = fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml(&contents),
            Some("json") => Self::from_json(&contents),
            other => Err(ConfigError::UnsupportedFormat(
                other.unwrap_or("<none>").to_string(),
            )),
        }
    }

    /// Reject configurations that cannot work.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let cb = &self.circuit_breaker;
        if cb.failure_threshold == 0 {
            return Err(invalid("circuit_breaker.failure_threshold must be at least 1"));
        }
        if cb.success_threshold == 0 {
            return Err(invalid("circuit_breaker.success_threshold must be at least 1"));
        }
        if cb.open_timeout.is_zero() {
            return Err(invalid("circuit_breaker.open_timeout must be positive"));
        }
        if cb.reset_timeout.is_zero() {
            return Err(invalid("circuit_breaker.reset_timeout must be positive"));
        }

        validate_policy("query_retry", &self.query_retry)?;
        validate_policy("batch_retry", &self.batch_retry)?;

        let d = &self.deadlines;
        if d.query.is_zero() || d.batch.is_zero() || d.probe.is_zero() {
            return Err(invalid("deadlines must all be positive"));
        }

        if self.pool.max_size == 0 {
            return Err(invalid("pool.max_size must be at least 1"));
        }

        let threshold = self.monitor.cleanup_threshold_percent;
        if !(0.0..=100.0).contains(&threshold) {
            return Err(invalid(format!(
                "monitor.cleanup_threshold_percent must be within 0..=100, got {}",
                threshold
            )));
        }
        if self.monitor.probe_query.trim().is_empty() {
            return Err(invalid("monitor.probe_query must not be empty"));
        }

        if self.validation.max_date_range_days < 1 {
            return Err(invalid("validation.max_date_range_days must be at least 1"));
        }
        if self.validation.max_limit < 1 {
            return Err(invalid("validation.max_limit must be at least 1"));
        }

        Ok(())
    }
}

fn validate_policy(section: &str, policy: &RetryPolicy) -> Result<(), ConfigError> {
    if !(policy.backoff_multiplier >= 1.0) {
        return Err(invalid(format!(
            "{}.backoff_multiplier must be at least 1.0",
            section
        )));
    }
    if policy.base_delay > policy.max_delay {
        return Err(invalid(format!(
            "{}.base_delay must not exceed max_delay",
            section
        )));
    }
    Ok(())
}

fn invalid(message: impl Into<String>) -> ConfigError {
    let message = message.into();
    tracing::warn!(reason = %message, "Rejected resilience configuration");
    ConfigError::ValidationError(message)
}
