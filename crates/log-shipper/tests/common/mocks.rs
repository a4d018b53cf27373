// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! In-memory implementation of the remote log service for testing

use async_trait::async_trait;
use log_shipper::api::{
    LogsApi, PutLogEventsRequest, PutLogEventsResponse, RejectedLogEventsInfo,
};
use log_shipper::error::ApiError;
use log_shipper::record::Event;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use tokio::time::Instant;

/// A batch accepted by the service
#[derive(Debug, Clone)]
pub struct AcceptedBatch {
    pub events: Vec<Event>,
    pub sequence_token: Option<String>,
    pub received_at: Instant,
}

#[derive(Default)]
struct StreamLog {
    expected_token: Option<String>,
    batches: Vec<AcceptedBatch>,
}

#[derive(Default)]
struct State {
    groups: HashSet<String>,
    streams: HashMap<(String, String), StreamLog>,
    stream_creations: usize,
    put_calls: Vec<PutLogEventsRequest>,
    next_token: u64,
    reject_next_put: Option<RejectedLogEventsInfo>,
}

/// Enforces the sequence token protocol of the real service: every put must
/// carry the token returned by the previous put to the same stream.
#[derive(Default)]
pub struct InMemoryLogsService {
    state: Mutex<State>,
}

#[allow(dead_code)]
impl InMemoryLogsService {
    pub fn with_stream(self, group: &str, stream: &str) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.groups.insert(group.to_string());
            state
                .streams
                .insert((group.to_string(), stream.to_string()), StreamLog::default());
        }
        self
    }

    /// Accepted batches of a stream, in acceptance order
    pub fn batches(&self, group: &str, stream: &str) -> Vec<AcceptedBatch> {
        self.state
            .lock()
            .unwrap()
            .streams
            .get(&(group.to_string(), stream.to_string()))
            .map(|log| log.batches.clone())
            .unwrap_or_default()
    }

    pub fn messages(&self, group: &str, stream: &str) -> Vec<String> {
        self.batches(group, stream)
            .into_iter()
            .flat_map(|batch| batch.events.into_iter().map(|e| e.message))
            .collect()
    }

    pub fn expected_token(&self, group: &str, stream: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .streams
            .get(&(group.to_string(), stream.to_string()))
            .and_then(|log| log.expected_token.clone())
    }

    /// Simulates another writer advancing the stream, so the next put carries a stale token
    pub fn advance_token(&self, group: &str, stream: &str) -> String {
        let mut state = self.state.lock().unwrap();
        state.next_token += 1;
        let token = format!("foreign-{}", state.next_token);
        if let Some(log) = state
            .streams
            .get_mut(&(group.to_string(), stream.to_string()))
        {
            log.expected_token = Some(token.clone());
        }
        token
    }

    /// The next accepted put reports some of its events as rejected
    pub fn reject_next_put(&self, info: RejectedLogEventsInfo) {
        self.state.lock().unwrap().reject_next_put = Some(info);
    }

    pub fn put_calls(&self) -> Vec<PutLogEventsRequest> {
        self.state.lock().unwrap().put_calls.clone()
    }

    pub fn stream_creations(&self) -> usize {
        self.state.lock().unwrap().stream_creations
    }

    pub fn has_group(&self, group: &str) -> bool {
        self.state.lock().unwrap().groups.contains(group)
    }
}

#[async_trait]
impl LogsApi for InMemoryLogsService {
    async fn create_log_group(&self, log_group_name: &str) -> Result<(), ApiError> {
        let mut state = self.state.lock().unwrap();
        if !state.groups.insert(log_group_name.to_string()) {
            return Err(ApiError::service(
                "ResourceAlreadyExistsException",
                "The specified log group already exists",
            ));
        }
        Ok(())
    }

    async fn create_log_stream(
        &self,
        log_group_name: &str,
        log_stream_name: &str,
    ) -> Result<(), ApiError> {
        // Give concurrent callers a chance to overlap
        tokio::task::yield_now().await;

        let mut state = self.state.lock().unwrap();
        state.stream_creations += 1;
        if !state.groups.contains(log_group_name) {
            return Err(ApiError::service(
                "ResourceNotFoundException",
                "The specified log group does not exist.",
            ));
        }
        let key = (log_group_name.to_string(), log_stream_name.to_string());
        if state.streams.contains_key(&key) {
            return Err(ApiError::service(
                "ResourceAlreadyExistsException",
                "The specified log stream already exists",
            ));
        }
        state.streams.insert(key, StreamLog::default());
        Ok(())
    }

    async fn put_log_events(
        &self,
        request: &PutLogEventsRequest,
    ) -> Result<PutLogEventsResponse, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.put_calls.push(request.clone());
        state.next_token += 1;
        let next_token = state.next_token.to_string();
        let rejected = state.reject_next_put.take();

        let key = (
            request.log_group_name.clone(),
            request.log_stream_name.clone(),
        );
        let Some(log) = state.streams.get_mut(&key) else {
            return Err(ApiError::service(
                "ResourceNotFoundException",
                "The specified log stream does not exist.",
            ));
        };

        if request.sequence_token != log.expected_token {
            let expected = log.expected_token.as_deref().unwrap_or("null");
            return Err(ApiError::service(
                "InvalidSequenceTokenException",
                format!(
                    "The given sequenceToken is invalid. The next expected sequenceToken is: {expected}"
                ),
            ));
        }

        log.batches.push(AcceptedBatch {
            events: request.log_events.clone(),
            sequence_token: request.sequence_token.clone(),
            received_at: Instant::now(),
        });
        log.expected_token = Some(next_token.clone());

        Ok(PutLogEventsResponse {
            next_sequence_token: Some(next_token),
            rejected_log_events_info: rejected,
        })
    }
}
