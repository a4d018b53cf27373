// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Normalization of log records into wire events.
//!
//! The remote service only accepts text payloads, so structured messages are
//! serialized to JSON here rather than forwarded as native values.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::constants::EVENT_OVERHEAD_BYTES;
use crate::error::ShipperError;

/// Rendered message of a log record.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Text(String),
    Fields(Map<String, Value>),
}

impl From<&str> for Message {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Message {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Map<String, Value>> for Message {
    fn from(value: Map<String, Value>) -> Self {
        Self::Fields(value)
    }
}

/// A log record as produced by the logging front-end.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    /// Source name; routes the record to a stream unless a fixed stream is configured.
    pub name: String,
    /// Creation time of the record.
    pub created: SystemTime,
    pub message: Message,
}

impl LogRecord {
    /// Creates a record stamped with the current time.
    #[must_use]
    pub fn new(name: impl Into<String>, message: impl Into<Message>) -> Self {
        Self {
            name: name.into(),
            created: SystemTime::now(),
            message: message.into(),
        }
    }
}

/// A wire-ready log event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Milliseconds since the Unix epoch at record creation.
    pub timestamp: i64,
    pub message: String,
}

impl Event {
    #[must_use]
    pub fn new(timestamp: i64, message: impl Into<String>) -> Self {
        Self {
            timestamp,
            message: message.into(),
        }
    }

    /// Normalizes a record, serializing structured messages to JSON.
    pub fn from_record(record: &LogRecord) -> Result<Self, ShipperError> {
        let message = match &record.message {
            Message::Text(text) => text.clone(),
            Message::Fields(fields) => serde_json::to_string(fields)?,
        };
        Ok(Self {
            timestamp: epoch_millis(record.created),
            message,
        })
    }

    /// Size of the event as accounted by the remote service.
    #[must_use]
    pub fn accounted_size(&self) -> usize {
        self.message.len() + EVENT_OVERHEAD_BYTES
    }
}

fn epoch_millis(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(elapsed) => i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX),
        Err(before) => i64::try_from(before.duration().as_millis())
            .map(|ms| -ms)
            .unwrap_or(i64::MIN),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn record_at(ms: u64, message: Message) -> LogRecord {
        LogRecord {
            name: "app.worker".to_string(),
            created: UNIX_EPOCH + Duration::from_millis(ms),
            message,
        }
    }

    #[test]
    fn test_text_record() {
        let record = record_at(1_700_000_000_123, "hello".into());
        let event = Event::from_record(&record).unwrap();

        assert_eq!(event.timestamp, 1_700_000_000_123);
        assert_eq!(event.message, "hello");
    }

    #[test]
    fn test_mapping_record_serialized_to_json() {
        let mut fields = Map::new();
        fields.insert("user".to_string(), json!("alice"));
        fields.insert("attempts".to_string(), json!(3));
        let record = record_at(5, fields.into());

        let event = Event::from_record(&record).unwrap();
        let parsed: Value = serde_json::from_str(&event.message).unwrap();

        assert_eq!(parsed, json!({"user": "alice", "attempts": 3}));
    }

    #[test]
    fn test_timestamp_is_creation_time() {
        let mut record = LogRecord::new("svc", "late");
        record.created = UNIX_EPOCH + Duration::from_secs(10);

        let event = Event::from_record(&record).unwrap();
        assert_eq!(event.timestamp, 10_000);
    }

    #[test]
    fn test_timestamp_before_epoch() {
        let record = LogRecord {
            name: "svc".to_string(),
            created: UNIX_EPOCH - Duration::from_millis(1500),
            message: "old".into(),
        };
        assert_eq!(Event::from_record(&record).unwrap().timestamp, -1500);
    }

    #[test]
    fn test_accounted_size_counts_utf8_bytes() {
        assert_eq!(Event::new(0, "").accounted_size(), 26);
        assert_eq!(Event::new(0, "abc").accounted_size(), 29);
        // "é" is two bytes in UTF-8
        assert_eq!(Event::new(0, "é").accounted_size(), 28);
    }

    #[test]
    fn test_event_wire_format() {
        let event = Event::new(42, "msg");
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"timestamp": 42, "message": "msg"})
        );
    }
}
