// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::constants::{
    DEFAULT_EXPORT_INTERVAL, DEFAULT_EXPORT_TIMEOUT, DEFAULT_QUEUE_CAPACITY, MAX_EXPORT_TIMEOUT,
};
use crate::errors::ConfigError;
use crate::exporter::ExporterConfig;
use crate::scheduler::SchedulerOptions;
use std::env;
use std::time::Duration;

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Configuration for the metrics subsystem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsConfig {
    /// Collector endpoint, e.g. `https://otlp-gateway.example.net/otlp/v1/metrics`
    pub url: Option<String>,
    /// Collector API key, sent as a bearer token
    pub api_key: Option<String>,
    /// Period of the resource metrics export
    pub interval: Duration,
    /// Upper bound for a single export request
    pub timeout: Duration,
    /// Batches queued beyond this are dropped
    pub queue_capacity: usize,
    /// Whether every tick also exports the chaos flag
    pub chaos_on_tick: bool,
    /// Whether every tick also exports request and auth counters
    pub counters_on_tick: bool,
    /// Log level (e.g., trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            interval: DEFAULT_EXPORT_INTERVAL,
            timeout: DEFAULT_EXPORT_TIMEOUT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            chaos_on_tick: true,
            counters_on_tick: true,
            log_level: "info".to_string(),
        }
    }
}

fn env_millis(key: &str) -> Result<Option<Duration>, ConfigError> {
    match env::var(key) {
        Ok(val) => val
            .trim()
            .parse::<u64>()
            .map(|ms| Some(Duration::from_millis(ms)))
            .map_err(|e| ConfigError::Invalid(format!("{key}={val:?}: {e}"))),
        Err(_) => Ok(None),
    }
}

fn env_flag(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|val| val.trim().to_lowercase() != "false")
        .unwrap_or(default)
}

impl MetricsConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let url = env::var("PIZZA_METRICS_URL")
            .ok()
            .filter(|val| !val.trim().is_empty());
        let api_key = env::var("PIZZA_METRICS_API_KEY")
            .ok()
            .filter(|val| !val.trim().is_empty());
        let interval = env_millis("PIZZA_METRICS_INTERVAL_MS")?.unwrap_or(defaults.interval);
        let timeout = env_millis("PIZZA_METRICS_TIMEOUT_MS")?.unwrap_or(defaults.timeout);
        let queue_capacity = match env::var("PIZZA_METRICS_QUEUE_CAPACITY") {
            Ok(val) => val.trim().parse::<usize>().map_err(|e| {
                ConfigError::Invalid(format!("PIZZA_METRICS_QUEUE_CAPACITY={val:?}: {e}"))
            })?,
            Err(_) => defaults.queue_capacity,
        };
        let chaos_on_tick = env_flag("PIZZA_METRICS_CHAOS_ON_TICK", defaults.chaos_on_tick);
        let counters_on_tick =
            env_flag("PIZZA_METRICS_COUNTERS_ON_TICK", defaults.counters_on_tick);
        let log_level = env::var("PIZZA_LOG_LEVEL")
            .map(|val| val.to_lowercase())
            .unwrap_or(defaults.log_level);

        let config = Self {
            url,
            api_key,
            interval,
            timeout,
            queue_capacity,
            chaos_on_tick,
            counters_on_tick,
            log_level,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval.is_zero() {
            return Err(ConfigError::Invalid(
                "Export interval must be greater than 0".to_string(),
            ));
        }

        if self.timeout.is_zero() || self.timeout > MAX_EXPORT_TIMEOUT {
            return Err(ConfigError::Invalid(format!(
                "Export timeout must be between 1ms and {}s",
                MAX_EXPORT_TIMEOUT.as_secs()
            )));
        }

        if self.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "Export queue capacity must be greater than 0".to_string(),
            ));
        }

        if let Some(url) = &self.url {
            let parsed = reqwest::Url::parse(url)
                .map_err(|e| ConfigError::Invalid(format!("Invalid collector URL {url:?}: {e}")))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(ConfigError::Invalid(format!(
                    "Collector URL must use http or https, got {url:?}"
                )));
            }
        }

        if !VALID_LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.log_level
            )));
        }

        Ok(())
    }

    /// Exporter settings, or `None` when no collector is configured.
    pub fn exporter(&self) -> Option<ExporterConfig> {
        let (url, api_key) = (self.url.as_ref()?, self.api_key.as_ref()?);
        Some(ExporterConfig {
            url: url.clone(),
            api_key: api_key.clone(),
            timeout: self.timeout,
            queue_capacity: self.queue_capacity,
        })
    }

    pub fn scheduler(&self) -> SchedulerOptions {
        SchedulerOptions {
            interval: self.interval,
            include_chaos_on_tick: self.chaos_on_tick,
            include_counters_on_tick: self.counters_on_tick,
        }
    }
}
