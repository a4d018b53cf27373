// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Delivery of one batch to the remote service.
//!
//! Every put to a stream must carry the token returned by the previous put.
//! When the stored token is stale the service rejects the call and names the
//! token it expects; the submitter retries right away with that token, a
//! bounded number of times.
//!
//! # State machine
//!
//! ```text
//!   Idle ──> Sent{1} ──> Accepted
//!              │  ^
//!              v  │
//!     RetryableRejected      (stale or duplicate token, attempts left)
//!              │
//!              v
//!        FatalRejected       (other error, attempts exhausted, partial rejection)
//! ```

use std::sync::Arc;
use tracing::debug;

use crate::api::{LogsApi, PutLogEventsRequest, PutLogEventsResponse, RejectedLogEventsInfo};
use crate::error::{ApiError, ShipperError};
use crate::record::Event;
use crate::registry::StreamState;

/// Terminal failure of a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fatal {
    /// The service refused the call with a non-retryable error.
    Rejected(ApiError),
    /// Every attempt was rejected for a stale or duplicate token.
    Exhausted { attempts: usize, last_error: ApiError },
    /// The call was accepted but some events were refused.
    PartiallyRejected {
        next_token: Option<String>,
        info: RejectedLogEventsInfo,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitState {
    Idle,
    /// Put number `attempt` (starting at 1) is in flight.
    Sent { attempt: usize },
    Accepted { next_token: Option<String> },
    /// Put number `attempt` was refused; retry with `token`.
    RetryableRejected {
        attempt: usize,
        token: Option<String>,
        error: ApiError,
    },
    FatalRejected(Fatal),
}

impl SubmitState {
    /// Transition out of `Sent { attempt }` given the service's answer.
    #[must_use]
    pub fn on_response(
        attempt: usize,
        result: Result<PutLogEventsResponse, ApiError>,
        max_attempts: usize,
    ) -> Self {
        match result {
            Ok(PutLogEventsResponse {
                next_sequence_token,
                rejected_log_events_info: Some(info),
            }) => Self::FatalRejected(Fatal::PartiallyRejected {
                next_token: next_sequence_token,
                info,
            }),
            Ok(response) => Self::Accepted {
                next_token: response.next_sequence_token,
            },
            Err(error) => match error.corrected_sequence_token() {
                Some(token) if attempt < max_attempts => Self::RetryableRejected {
                    attempt,
                    token,
                    error,
                },
                Some(_) => Self::FatalRejected(Fatal::Exhausted {
                    attempts: attempt,
                    last_error: error,
                }),
                None => Self::FatalRejected(Fatal::Rejected(error)),
            },
        }
    }
}

/// Puts batches into the streams of one log group.
pub struct Submitter {
    client: Arc<dyn LogsApi>,
    log_group: String,
    max_attempts: usize,
}

impl Submitter {
    #[must_use]
    pub fn new(client: Arc<dyn LogsApi>, log_group: impl Into<String>, max_attempts: usize) -> Self {
        Self {
            client,
            log_group: log_group.into(),
            max_attempts: max_attempts.max(1),
        }
    }

    /// Sorts `events` by timestamp and puts them into `stream`.
    ///
    /// The stream's token is locked for the whole submission and updated
    /// with the token of the accepting call.
    pub async fn submit(&self, stream: &StreamState, mut events: Vec<Event>) -> Result<(), ShipperError> {
        if events.is_empty() {
            return Ok(());
        }
        events.sort_by_key(|event| event.timestamp);

        let mut stored_token = stream.token_slot().lock().await;
        let mut request = PutLogEventsRequest {
            log_group_name: self.log_group.clone(),
            log_stream_name: stream.name().to_string(),
            log_events: events,
            sequence_token: stored_token.clone(),
        };

        let mut state = SubmitState::Idle;
        loop {
            state = match state {
                SubmitState::Idle => SubmitState::Sent { attempt: 1 },
                SubmitState::Sent { attempt } => {
                    let result = self.client.put_log_events(&request).await;
                    SubmitState::on_response(attempt, result, self.max_attempts)
                }
                SubmitState::RetryableRejected {
                    attempt,
                    token,
                    error,
                } => {
                    debug!(
                        "SHIPPER | Attempt {} to {}/{} rejected ({}), retrying with token {:?}",
                        attempt,
                        self.log_group,
                        stream.name(),
                        error,
                        token
                    );
                    request.sequence_token = token;
                    SubmitState::Sent {
                        attempt: attempt + 1,
                    }
                }
                SubmitState::Accepted { next_token } => {
                    debug!(
                        "SHIPPER | Sent {} log events to {}/{}",
                        request.log_events.len(),
                        self.log_group,
                        stream.name()
                    );
                    *stored_token = next_token;
                    return Ok(());
                }
                SubmitState::FatalRejected(fatal) => {
                    return Err(match fatal {
                        Fatal::Rejected(error) => ShipperError::Api(error),
                        Fatal::Exhausted {
                            attempts,
                            last_error,
                        } => ShipperError::RetriesExhausted {
                            stream: stream.name().to_string(),
                            attempts,
                            last_error,
                        },
                        Fatal::PartiallyRejected { next_token, info } => {
                            *stored_token = next_token;
                            ShipperError::PartialRejection {
                                stream: stream.name().to_string(),
                                info,
                            }
                        }
                    });
                }
            };
        }
    }
}
