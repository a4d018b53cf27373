// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! # Log Shipper
//!
//! Forwards structured log records, batched per destination stream, to a
//! remote append-only log ingestion service organized as groups of streams
//! (the CloudWatch Logs model).
//!
//! ## Pipeline
//!
//! ```text
//!   LogRecord ──> record (normalize) ──> registry (ensure stream)
//!                                             │
//!                                             v
//!                                   queue (one per stream)
//!                                             │
//!                                             v
//!                           worker: batch accumulation (time/size/count)
//!                                             │
//!                                             v
//!                           submitter (sort, sequence token, retry)
//!                                             │
//!                                             v
//!                                      LogsApi (remote)
//! ```
//!
//! [`shipper::LogShipper`] is the owned context tying these together; its
//! [`flush`](shipper::LogShipper::flush) drains every stream before returning.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]
#![deny(unused_extern_crates)]
#![deny(unused_allocation)]
#![deny(unused_assignments)]
#![deny(unused_comparisons)]
#![allow(clippy::module_name_repetitions)]

/// Remote log ingestion API: request/response types and the `LogsApi` trait
pub mod api;

/// Batch bookkeeping and accumulation limits
pub mod batch;

/// HTTP implementation of `LogsApi`
pub mod client;

/// Configuration - defaults, environment variables and validation
pub mod config;

/// Protocol ceilings and defaults
pub mod constants;

/// Error types
pub mod error;

/// `tracing` front-end feeding records into the shipper
pub mod layer;

/// Formatter for the shipper's own diagnostics
pub mod logger;

/// Per-stream FIFO queue with explicit overflow policy
pub mod queue;

/// Log record normalization into wire events
pub mod record;

/// Stream provisioning and sequencing state
pub mod registry;

/// Shipper context: routing, workers, shutdown
pub mod shipper;

/// Batch submission with sequence token renewal
pub mod submitter;

/// Per-stream worker running the batch accumulator
pub mod worker;

#[cfg(test)]
pub(crate) mod test_utils;

/// Target prefix of every event emitted by this crate.
///
/// The `tracing` front-end ignores events under this target so that a failure
/// of the shipper is never shipped through the shipper itself.
pub const CRATE_TARGET: &str = "log_shipper";
