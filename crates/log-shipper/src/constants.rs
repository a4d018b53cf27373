// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Limits of the remote log ingestion API and shipper defaults.
//!
//! The remote service accounts a batch as the sum of all event messages in
//! UTF-8 plus a fixed framing overhead per event.

use std::time::Duration;

/// Maximum accounted size of one `PutLogEvents` batch in bytes.
pub const MAX_BATCH_SIZE_BYTES: usize = 1_048_576;

/// Maximum number of events in one `PutLogEvents` batch.
pub const MAX_BATCH_COUNT: usize = 10_000;

/// Per-event framing overhead counted by the remote service.
pub const EVENT_OVERHEAD_BYTES: usize = 26;

/// Maximum time an event is held before its batch is submitted.
pub const DEFAULT_SEND_INTERVAL: Duration = Duration::from_secs(60);

/// Longest accepted send interval. The remote service refuses a batch whose
/// events span more than 24 hours.
pub const MAX_SEND_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Attempts made for one batch when the remote keeps rejecting the token.
pub const MAX_SUBMIT_ATTEMPTS: usize = 5;

/// Log group used when none is configured.
pub const DEFAULT_LOG_GROUP: &str = "log_shipper";

/// Timeout of a single HTTP request to the remote service.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Error code returned when a group or stream already exists.
pub(crate) const RESOURCE_ALREADY_EXISTS: &str = "ResourceAlreadyExistsException";

/// Error code returned when the sequence token is stale.
pub(crate) const INVALID_SEQUENCE_TOKEN: &str = "InvalidSequenceTokenException";

/// Error code returned when the batch was already accepted under the sent token.
pub(crate) const DATA_ALREADY_ACCEPTED: &str = "DataAlreadyAcceptedException";
