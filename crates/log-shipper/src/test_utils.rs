// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Recording `LogsApi` double for unit tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use crate::api::{LogsApi, PutLogEventsRequest, PutLogEventsResponse};
use crate::error::ApiError;

/// Records every call and answers puts from a script.
///
/// Once the script is exhausted, puts succeed with `token-<n>` where `n`
/// counts successful puts.
#[derive(Default)]
pub(crate) struct MockLogsApi {
    groups: Mutex<Vec<String>>,
    streams: Mutex<Vec<(String, String)>>,
    puts: Mutex<Vec<PutLogEventsRequest>>,
    script: Mutex<VecDeque<Result<PutLogEventsResponse, ApiError>>>,
    create_group_error: Mutex<Option<ApiError>>,
    create_stream_error: Mutex<Option<ApiError>>,
    accepted: Mutex<usize>,
    create_delay: Option<Duration>,
}

impl MockLogsApi {
    /// Makes stream creation yield for a while, so concurrent callers overlap.
    pub(crate) fn with_create_delay(mut self) -> Self {
        self.create_delay = Some(Duration::from_millis(20));
        self
    }

    pub(crate) fn script_put(&self, result: Result<PutLogEventsResponse, ApiError>) {
        self.script.lock().unwrap().push_back(result);
    }

    pub(crate) fn fail_create_group(&self, error: ApiError) {
        *self.create_group_error.lock().unwrap() = Some(error);
    }

    pub(crate) fn fail_create_stream(&self, error: ApiError) {
        *self.create_stream_error.lock().unwrap() = Some(error);
    }

    pub(crate) fn clear_create_stream_error(&self) {
        *self.create_stream_error.lock().unwrap() = None;
    }

    pub(crate) fn group_creations(&self) -> Vec<String> {
        self.groups.lock().unwrap().clone()
    }

    pub(crate) fn stream_creations(&self) -> Vec<(String, String)> {
        self.streams.lock().unwrap().clone()
    }

    pub(crate) fn put_requests(&self) -> Vec<PutLogEventsRequest> {
        self.puts.lock().unwrap().clone()
    }

    /// Timestamps of every event put, in submission order.
    pub(crate) fn put_timestamps(&self) -> Vec<i64> {
        self.put_requests()
            .iter()
            .flat_map(|request| request.log_events.iter().map(|e| e.timestamp))
            .collect()
    }
}

#[async_trait]
impl LogsApi for MockLogsApi {
    async fn create_log_group(&self, log_group_name: &str) -> Result<(), ApiError> {
        self.groups.lock().unwrap().push(log_group_name.to_string());
        match self.create_group_error.lock().unwrap().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn create_log_stream(
        &self,
        log_group_name: &str,
        log_stream_name: &str,
    ) -> Result<(), ApiError> {
        self.streams
            .lock()
            .unwrap()
            .push((log_group_name.to_string(), log_stream_name.to_string()));
        if let Some(delay) = self.create_delay {
            tokio::time::sleep(delay).await;
        }
        match self.create_stream_error.lock().unwrap().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn put_log_events(
        &self,
        request: &PutLogEventsRequest,
    ) -> Result<PutLogEventsResponse, ApiError> {
        self.puts.lock().unwrap().push(request.clone());
        let scripted = self.script.lock().unwrap().pop_front();
        if let Some(result) = scripted {
            return result;
        }
        let mut accepted = self.accepted.lock().unwrap();
        *accepted += 1;
        Ok(PutLogEventsResponse {
            next_sequence_token: Some(format!("token-{accepted}")),
            rejected_log_events_info: None,
        })
    }
}
