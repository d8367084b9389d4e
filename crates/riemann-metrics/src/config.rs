// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::backoff::BackoffConfig;
use crate::constants::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_FLUSH_INTERVAL, DEFAULT_HOST, DEFAULT_INITIAL_RECONNECT_DELAY,
    DEFAULT_KEEPALIVE_INTERVAL, DEFAULT_NAMESPACE, DEFAULT_PORT, DEFAULT_RECONNECT_DELAY_CEILING,
    DEFAULT_TAG, DEFAULT_WRITE_TIMEOUT,
};
use crate::errors::ConfigError;
use crate::util::parse_metric_namespace;
use std::env;
use std::time::Duration;

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Configuration for the metric pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Riemann collector host
    pub host: String,
    /// Riemann collector TCP port
    pub port: u16,
    /// Prefix of every service name
    pub namespace: String,
    /// Tag attached to every event
    pub tag: String,
    /// Period of the drain-and-publish cycle
    pub flush_interval: Duration,
    /// Delay before the first reconnect after a failure
    pub initial_reconnect_delay: Duration,
    /// Upper bound of the reconnect delay
    pub reconnect_delay_ceiling: Duration,
    /// Period of the heartbeat sent while connected
    pub keepalive_interval: Duration,
    /// Bound on a single connect attempt
    pub connect_timeout: Duration,
    /// Bound on writing one message before the connection is failed
    pub write_timeout: Duration,
    /// Log level (e.g., trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            namespace: DEFAULT_NAMESPACE.to_string(),
            tag: DEFAULT_TAG.to_string(),
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            initial_reconnect_delay: DEFAULT_INITIAL_RECONNECT_DELAY,
            reconnect_delay_ceiling: DEFAULT_RECONNECT_DELAY_CEILING,
            keepalive_interval: DEFAULT_KEEPALIVE_INTERVAL,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            log_level: "info".to_string(),
        }
    }
}

fn millis(value: Option<String>, default: Duration) -> Duration {
    value
        .and_then(|val| val.trim().parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(default)
}

impl PipelineConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds a configuration from any variable source. Numbers that do not
    /// parse fall back to their default.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let host = lookup("RIEMANN_HOST").unwrap_or(defaults.host);
        let port = lookup("RIEMANN_PORT")
            .and_then(|port| port.trim().parse::<u16>().ok())
            .unwrap_or(defaults.port);
        let namespace = lookup("RIEMANN_PREFIX").unwrap_or(defaults.namespace);
        let tag = lookup("RIEMANN_TAG").unwrap_or(defaults.tag);
        let log_level = lookup("RIEMANN_LOG_LEVEL")
            .map(|val| val.to_lowercase())
            .unwrap_or(defaults.log_level);

        let config = Self {
            host,
            port,
            namespace: namespace.trim().to_string(),
            tag,
            flush_interval: millis(lookup("RIEMANN_PUSH_INTERVAL_MS"), defaults.flush_interval),
            initial_reconnect_delay: millis(
                lookup("RIEMANN_INITIAL_RECONNECT_MS"),
                defaults.initial_reconnect_delay,
            ),
            reconnect_delay_ceiling: millis(
                lookup("RIEMANN_RECONNECT_LIMIT_MS"),
                defaults.reconnect_delay_ceiling,
            ),
            keepalive_interval: millis(
                lookup("RIEMANN_KEEPALIVE_INTERVAL_MS"),
                defaults.keepalive_interval,
            ),
            connect_timeout: millis(lookup("RIEMANN_CONNECT_TIMEOUT_MS"), defaults.connect_timeout),
            write_timeout: millis(lookup("RIEMANN_WRITE_TIMEOUT_MS"), defaults.write_timeout),
            log_level,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::Invalid(
                "Riemann port must be greater than 0".to_string(),
            ));
        }

        if self.host.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "RIEMANN_HOST cannot be empty".to_string(),
            ));
        }

        parse_metric_namespace(&self.namespace).map_err(ConfigError::Invalid)?;

        let intervals = [
            ("flush interval", self.flush_interval),
            ("initial reconnect delay", self.initial_reconnect_delay),
            ("reconnect delay ceiling", self.reconnect_delay_ceiling),
            ("keepalive interval", self.keepalive_interval),
            ("connect timeout", self.connect_timeout),
            ("write timeout", self.write_timeout),
        ];
        if let Some((name, _)) = intervals.iter().find(|(_, value)| value.is_zero()) {
            return Err(ConfigError::Invalid(format!(
                "{name} must be greater than 0"
            )));
        }

        if self.initial_reconnect_delay > self.reconnect_delay_ceiling {
            return Err(ConfigError::Invalid(format!(
                "initial reconnect delay ({}ms) exceeds the ceiling ({}ms)",
                self.initial_reconnect_delay.as_millis(),
                self.reconnect_delay_ceiling.as_millis()
            )));
        }

        if !VALID_LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.log_level
            )));
        }

        Ok(())
    }

    pub fn backoff(&self) -> BackoffConfig {
        BackoffConfig {
            initial: self.initial_reconnect_delay,
            ceiling: self.reconnect_delay_ceiling,
        }
    }
}
