// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Deserializer};
use std::env;
use std::fmt;
use std::time::Duration;

use crate::batch::BatchLimits;
use crate::constants;
use crate::error::ShipperError;
use crate::queue::QueuePolicy;

/// Configuration of a [`LogShipper`](crate::shipper::LogShipper).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ShipperConfig {
    /// Log group receiving every stream
    pub log_group: String,
    /// Fixed destination stream; when unset each record goes to the stream named after its source
    pub stream_name: Option<String>,
    /// Batch through per-stream workers; when false every record is put on its own
    pub use_queues: bool,
    /// Longest time an event waits before its batch is sent
    #[serde(deserialize_with = "deserialize_duration_from_seconds")]
    pub send_interval: Duration,
    /// Ceiling of the accounted size of one batch, in bytes
    pub max_batch_size: usize,
    /// Ceiling of the number of events in one batch
    pub max_batch_count: usize,
    /// Create the log group when the shipper starts
    pub create_log_group: bool,
    /// Overflow behaviour of the per-stream queues
    pub queue_policy: QueuePolicy,
    /// Region of the remote service, used to derive the endpoint
    pub region: Option<String>,
    /// Explicit endpoint URL, overrides `region`
    pub endpoint: Option<String>,
    /// Timeout of one HTTP request
    #[serde(deserialize_with = "deserialize_duration_from_seconds")]
    pub request_timeout: Duration,
    /// HTTPS proxy URL
    pub https_proxy: Option<String>,
    /// Log level of the shipper's own diagnostics (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for ShipperConfig {
    fn default() -> Self {
        Self {
            log_group: constants::DEFAULT_LOG_GROUP.to_string(),
            stream_name: None,
            use_queues: true,
            send_interval: constants::DEFAULT_SEND_INTERVAL,
            max_batch_size: constants::MAX_BATCH_SIZE_BYTES,
            max_batch_count: constants::MAX_BATCH_COUNT,
            create_log_group: true,
            queue_policy: QueuePolicy::default(),
            region: None,
            endpoint: None,
            request_timeout: constants::DEFAULT_REQUEST_TIMEOUT,
            https_proxy: None,
            log_level: "info".to_string(),
        }
    }
}

impl ShipperConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, ShipperError> {
        let defaults = Self::default();

        let log_group =
            env::var("LOG_SHIPPER_LOG_GROUP").unwrap_or_else(|_| defaults.log_group.clone());
        let stream_name = env::var("LOG_SHIPPER_STREAM_NAME").ok();
        let use_queues = env::var("LOG_SHIPPER_USE_QUEUES")
            .map(|val| val.to_lowercase() != "false")
            .unwrap_or(defaults.use_queues);
        let send_interval = env::var("LOG_SHIPPER_SEND_INTERVAL")
            .ok()
            .and_then(|val| parse_seconds(&val))
            .unwrap_or(defaults.send_interval);
        let max_batch_size = env::var("LOG_SHIPPER_MAX_BATCH_SIZE")
            .ok()
            .and_then(|val| val.parse::<usize>().ok())
            .unwrap_or(defaults.max_batch_size);
        let max_batch_count = env::var("LOG_SHIPPER_MAX_BATCH_COUNT")
            .ok()
            .and_then(|val| val.parse::<usize>().ok())
            .unwrap_or(defaults.max_batch_count);
        let create_log_group = env::var("LOG_SHIPPER_CREATE_LOG_GROUP")
            .map(|val| val.to_lowercase() != "false")
            .unwrap_or(defaults.create_log_group);
        let queue_policy = match env::var("LOG_SHIPPER_QUEUE_POLICY") {
            Ok(val) => val.parse::<QueuePolicy>()?,
            Err(_) => defaults.queue_policy,
        };
        let region = env::var("LOG_SHIPPER_REGION")
            .or_else(|_| env::var("AWS_REGION"))
            .or_else(|_| env::var("AWS_DEFAULT_REGION"))
            .ok();
        let endpoint = env::var("LOG_SHIPPER_ENDPOINT").ok();
        let request_timeout = env::var("LOG_SHIPPER_REQUEST_TIMEOUT")
            .ok()
            .and_then(|val| parse_seconds(&val))
            .unwrap_or(defaults.request_timeout);
        let https_proxy = env::var("LOG_SHIPPER_PROXY_HTTPS")
            .or_else(|_| env::var("HTTPS_PROXY"))
            .ok();
        let log_level = env::var("LOG_SHIPPER_LOG_LEVEL")
            .map(|val| val.to_lowercase())
            .unwrap_or(defaults.log_level);

        let config = Self {
            log_group,
            stream_name,
            use_queues,
            send_interval,
            max_batch_size,
            max_batch_count,
            create_log_group,
            queue_policy,
            region,
            endpoint,
            request_timeout,
            https_proxy,
            log_level,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ShipperError> {
        if self.log_group.trim().is_empty() {
            return Err(ShipperError::InvalidConfig(
                "log_group cannot be empty".to_string(),
            ));
        }

        if self
            .stream_name
            .as_deref()
            .is_some_and(|name| name.trim().is_empty())
        {
            return Err(ShipperError::InvalidConfig(
                "stream_name cannot be empty when set".to_string(),
            ));
        }

        if self.send_interval.is_zero() || self.send_interval > constants::MAX_SEND_INTERVAL {
            return Err(ShipperError::InvalidConfig(format!(
                "send_interval must be greater than 0 and at most {} seconds",
                constants::MAX_SEND_INTERVAL.as_secs()
            )));
        }

        // The remote service refuses anything above its own ceilings
        if self.max_batch_size == 0 || self.max_batch_size > constants::MAX_BATCH_SIZE_BYTES {
            return Err(ShipperError::InvalidConfig(format!(
                "max_batch_size must be between 1 and {}",
                constants::MAX_BATCH_SIZE_BYTES
            )));
        }
        if self.max_batch_count == 0 || self.max_batch_count > constants::MAX_BATCH_COUNT {
            return Err(ShipperError::InvalidConfig(format!(
                "max_batch_count must be between 1 and {}",
                constants::MAX_BATCH_COUNT
            )));
        }

        if self.queue_policy.capacity() == Some(0) {
            return Err(ShipperError::InvalidConfig(
                "queue_policy capacity must be greater than 0".to_string(),
            ));
        }

        if self.request_timeout.is_zero() {
            return Err(ShipperError::InvalidConfig(
                "request_timeout must be greater than 0".to_string(),
            ));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.log_level.as_str()) {
            return Err(ShipperError::InvalidConfig(format!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.log_level
            )));
        }

        Ok(())
    }

    /// URL of the remote service: `endpoint` if set, otherwise derived from `region`.
    pub fn endpoint_url(&self) -> Result<String, ShipperError> {
        if let Some(endpoint) = self.endpoint.as_deref().filter(|e| !e.trim().is_empty()) {
            return Ok(endpoint.trim_end_matches('/').to_string());
        }
        match self.region.as_deref().filter(|r| !r.trim().is_empty()) {
            Some(region) => Ok(format!("https://logs.{region}.amazonaws.com")),
            None => Err(ShipperError::InvalidConfig(
                "either endpoint or region must be set".to_string(),
            )),
        }
    }

    #[must_use]
    pub fn limits(&self) -> BatchLimits {
        BatchLimits {
            max_batch_size: self.max_batch_size,
            max_batch_count: self.max_batch_count,
        }
    }
}

fn parse_seconds(val: &str) -> Option<Duration> {
    val.trim()
        .parse::<f64>()
        .ok()
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
}

fn deserialize_duration_from_seconds<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Duration, D::Error> {
    struct DurationVisitor;
    impl serde::de::Visitor<'_> for DurationVisitor {
        type Value = Duration;
        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            write!(f, "a duration in seconds (integer or float)")
        }
        fn visit_u64<E: serde::de::Error>(self, v: u64) -> Result<Self::Value, E> {
            Ok(Duration::from_secs(v))
        }
        fn visit_i64<E: serde::de::Error>(self, v: i64) -> Result<Self::Value, E> {
            u64::try_from(v)
                .map(Duration::from_secs)
                .map_err(|_| E::custom("negative durations are not allowed"))
        }
        fn visit_f64<E: serde::de::Error>(self, v: f64) -> Result<Self::Value, E> {
            Duration::try_from_secs_f64(v).map_err(E::custom)
        }
    }
    deserializer.deserialize_any(DurationVisitor)
}
