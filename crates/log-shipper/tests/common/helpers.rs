// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Helper functions for integration tests

use log_shipper::config::ShipperConfig;
use log_shipper::record::LogRecord;
use std::time::{Duration, UNIX_EPOCH};

/// A record created `ms` milliseconds after the Unix epoch
#[allow(dead_code)]
pub fn record_at(name: &str, ms: u64, message: &str) -> LogRecord {
    LogRecord {
        created: UNIX_EPOCH + Duration::from_millis(ms),
        ..LogRecord::new(name, message)
    }
}

/// Configuration sending through queues with the given interval and count ceiling
#[allow(dead_code)]
pub fn batching_config(send_interval: Duration, max_batch_count: usize) -> ShipperConfig {
    ShipperConfig {
        log_group: "integration".to_string(),
        send_interval,
        max_batch_count,
        ..Default::default()
    }
}
