// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::api::RejectedLogEventsInfo;
use crate::constants::{DATA_ALREADY_ACCEPTED, INVALID_SEQUENCE_TOKEN, RESOURCE_ALREADY_EXISTS};

/// Errors returned by the remote log ingestion API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// The service answered with an error document.
    #[error("{code}: {message}")]
    Service {
        code: String,
        message: String,
        expected_sequence_token: Option<String>,
    },

    /// The request never produced a service answer (connect, timeout, decode).
    #[error("Transport error: {0}")]
    Transport(String),

    /// The request could not be signed.
    #[error("Failed to sign request: {0}")]
    Signing(String),
}

impl ApiError {
    #[must_use]
    pub fn service(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Service {
            code: code.into(),
            message: message.into(),
            expected_sequence_token: None,
        }
    }

    #[must_use]
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Service { code, .. } => Some(code),
            _ => None,
        }
    }

    /// Whether this is the conflict returned when creating an existing group or stream.
    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        self.code() == Some(RESOURCE_ALREADY_EXISTS)
    }

    /// The token to retry with when the rejection is a stale/duplicate token.
    ///
    /// Returns `None` for every other error. The inner `None` means the
    /// service expects no token at all (its message ends in `null`).
    #[must_use]
    pub fn corrected_sequence_token(&self) -> Option<Option<String>> {
        let Self::Service {
            code,
            message,
            expected_sequence_token,
        } = self
        else {
            return None;
        };
        if code != INVALID_SEQUENCE_TOKEN && code != DATA_ALREADY_ACCEPTED {
            return None;
        }

        let token = expected_sequence_token
            .as_deref()
            .or_else(|| message.split_whitespace().last())
            .filter(|token| !token.is_empty() && *token != "null")
            .map(ToString::to_string);
        Some(token)
    }
}

/// Errors surfaced by the shipper to the embedding process.
#[derive(Debug, thiserror::Error)]
pub enum ShipperError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to normalize log record: {0}")]
    Normalize(#[from] serde_json::Error),

    #[error("Remote API error: {0}")]
    Api(#[from] ApiError),

    #[error("Gave up on stream {stream} after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        stream: String,
        attempts: usize,
        last_error: ApiError,
    },

    #[error("Failed to deliver logs to stream {stream}: {info:?}")]
    PartialRejection {
        stream: String,
        info: RejectedLogEventsInfo,
    },

    #[error("Queue for stream {stream} is full ({capacity} events)")]
    QueueFull { stream: String, capacity: usize },

    #[error("Worker for stream {0} has stopped")]
    StreamClosed(String),

    #[error("No tokio runtime available: {0}")]
    NoRuntime(String),
}
