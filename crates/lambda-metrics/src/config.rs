// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::constants::{
    DEFAULT_BATCH_SIZE, DEFAULT_FLUSH_INTERVAL, DEFAULT_MAX_ATTEMPTS, DEFAULT_SITE,
    DEFAULT_TIMEOUT,
};
use crate::error::ConfigError;
use crate::processor::ProcessorConfig;
use crate::retry::RetryStrategy;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Configuration for the metrics processor and its Datadog client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Datadog API key, only needed by the Datadog client
    pub api_key: Option<String>,
    /// Datadog site (e.g., datadoghq.com, datadoghq.eu)
    pub site: String,
    pub flush_interval: Duration,
    /// Points in the open batch before an early flush
    pub batch_size: usize,
    pub should_retry: bool,
    /// Total delivery attempts per batch when retrying
    pub max_attempts: u32,
    /// Delay between delivery attempts
    pub retry_backoff: Duration,
    /// Timeout for each request to the intake
    pub timeout: Duration,
    /// HTTPS proxy URL
    pub https_proxy: Option<String>,
    /// Log level (e.g., trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            site: DEFAULT_SITE.to_string(),
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            batch_size: DEFAULT_BATCH_SIZE,
            should_retry: true,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_backoff: Duration::ZERO,
            timeout: DEFAULT_TIMEOUT,
            https_proxy: None,
            log_level: "info".to_string(),
        }
    }
}

fn parse_env<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|val| val.trim().parse::<T>().ok())
}

impl Config {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let api_key = env::var("DD_API_KEY").ok().filter(|key| !key.is_empty());
        let site = env::var("DD_SITE").unwrap_or(defaults.site);
        let flush_interval = parse_env::<u64>("DD_METRICS_FLUSH_INTERVAL_SECS")
            .map_or(defaults.flush_interval, Duration::from_secs);
        let batch_size = parse_env("DD_METRICS_BATCH_SIZE").unwrap_or(defaults.batch_size);
        let should_retry = env::var("DD_METRICS_SHOULD_RETRY")
            .map(|val| val.to_lowercase() != "false")
            .unwrap_or(defaults.should_retry);
        let max_attempts =
            parse_env("DD_METRICS_MAX_ATTEMPTS").unwrap_or(defaults.max_attempts);
        let retry_backoff = parse_env::<u64>("DD_METRICS_RETRY_BACKOFF_MS")
            .map_or(defaults.retry_backoff, Duration::from_millis);
        let timeout = parse_env::<u64>("DD_METRICS_TIMEOUT_SECS")
            .map_or(defaults.timeout, Duration::from_secs);
        let https_proxy = env::var("DD_PROXY_HTTPS")
            .or_else(|_| env::var("HTTPS_PROXY"))
            .ok();
        let log_level = env::var("DD_LOG_LEVEL")
            .map(|val| val.to_lowercase())
            .unwrap_or(defaults.log_level);

        let config = Self {
            api_key,
            site,
            flush_interval,
            batch_size,
            should_retry,
            max_attempts,
            retry_backoff,
            timeout,
            https_proxy,
            log_level,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.flush_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "Flush interval must be greater than 0".to_string(),
            ));
        }

        if self.batch_size == 0 {
            return Err(ConfigError::Invalid(
                "Batch size must be greater than 0".to_string(),
            ));
        }

        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "Max attempts must be greater than 0".to_string(),
            ));
        }

        if self.site.trim().is_empty() {
            return Err(ConfigError::Invalid("DD_SITE cannot be empty".to_string()));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.log_level.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.log_level
            )));
        }

        Ok(())
    }

    #[must_use]
    pub fn retry_strategy(&self) -> RetryStrategy {
        match (self.should_retry, self.retry_backoff.is_zero()) {
            (false, _) => RetryStrategy::Disabled,
            (true, true) => RetryStrategy::Immediate(self.max_attempts),
            (true, false) => RetryStrategy::LinearBackoff(
                self.max_attempts,
                u64::try_from(self.retry_backoff.as_millis()).unwrap_or(u64::MAX),
            ),
        }
    }

    #[must_use]
    pub fn processor_config(&self) -> ProcessorConfig {
        ProcessorConfig {
            flush_interval: self.flush_interval,
            batch_size_limit: self.batch_size,
            retry_strategy: self.retry_strategy(),
            on_failure: None,
        }
    }
}
