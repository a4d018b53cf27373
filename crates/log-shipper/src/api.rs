// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Remote log ingestion API.
//!
//! The shipper only needs three operations of the service: create a group,
//! create a stream, and put a sorted batch of events into a stream. Request
//! and response types mirror the service's JSON documents.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::record::Event;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLogGroupRequest {
    pub log_group_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLogStreamRequest {
    pub log_group_name: String,
    pub log_stream_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PutLogEventsRequest {
    pub log_group_name: String,
    pub log_stream_name: String,
    /// Events sorted ascending by timestamp.
    pub log_events: Vec<Event>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence_token: Option<String>,
}

/// Indices of events the service refused inside an accepted batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RejectedLogEventsInfo {
    pub too_new_log_event_start_index: Option<i64>,
    pub too_old_log_event_end_index: Option<i64>,
    pub expired_log_event_end_index: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PutLogEventsResponse {
    pub next_sequence_token: Option<String>,
    pub rejected_log_events_info: Option<RejectedLogEventsInfo>,
}

/// Operations of the remote log ingestion service used by the shipper.
#[async_trait]
pub trait LogsApi: Send + Sync {
    /// Creates a log group. Fails with `ResourceAlreadyExistsException` if it exists.
    async fn create_log_group(&self, log_group_name: &str) -> Result<(), ApiError>;

    /// Creates a log stream. Fails with `ResourceAlreadyExistsException` if it exists.
    async fn create_log_stream(
        &self,
        log_group_name: &str,
        log_stream_name: &str,
    ) -> Result<(), ApiError>;

    /// Puts a batch of events into a stream.
    ///
    /// `sequence_token` must be the token returned by the previous put to the
    /// same stream, or absent for a stream that never received events.
    async fn put_log_events(
        &self,
        request: &PutLogEventsRequest,
    ) -> Result<PutLogEventsResponse, ApiError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_put_request_omits_missing_token() {
        let request = PutLogEventsRequest {
            log_group_name: "group".to_string(),
            log_stream_name: "stream".to_string(),
            log_events: vec![Event::new(1, "a")],
            sequence_token: None,
        };

        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "logGroupName": "group",
                "logStreamName": "stream",
                "logEvents": [{"timestamp": 1, "message": "a"}],
            })
        );
    }

    #[test]
    fn test_put_request_carries_token() {
        let request = PutLogEventsRequest {
            log_group_name: "group".to_string(),
            log_stream_name: "stream".to_string(),
            log_events: vec![],
            sequence_token: Some("123".to_string()),
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["sequenceToken"], "123");
    }

    #[test]
    fn test_put_response_parsing() {
        let response: PutLogEventsResponse = serde_json::from_value(json!({
            "nextSequenceToken": "abc",
            "rejectedLogEventsInfo": {"tooOldLogEventEndIndex": 2}
        }))
        .unwrap();

        assert_eq!(response.next_sequence_token.as_deref(), Some("abc"));
        assert_eq!(
            response.rejected_log_events_info,
            Some(RejectedLogEventsInfo {
                too_old_log_event_end_index: Some(2),
                ..Default::default()
            })
        );
    }

    #[test]
    fn test_put_response_empty_document() {
        let response: PutLogEventsResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(response, PutLogEventsResponse::default());
    }
}
