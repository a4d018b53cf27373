// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! `tracing` front-end.
//!
//! [`ShipperLayer`] turns every event it sees into a [`LogRecord`] named
//! after the event target, so each module logs to its own stream unless a
//! fixed stream is configured.
//!
//! Events of this crate and of the HTTP stack it uses are skipped: a failing
//! delivery must never be shipped through the delivery that failed.
//!
//! ```rust,ignore
//! use tracing_subscriber::prelude::*;
//!
//! let shipper = Arc::new(LogShipper::start(config, client).await?);
//! tracing_subscriber::registry()
//!     .with(ShipperLayer::new(Arc::clone(&shipper)))
//!     .init();
//! ```

use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::{debug, Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

use crate::record::{LogRecord, Message};
use crate::shipper::LogShipper;
use crate::CRATE_TARGET;

/// Crates whose events are never shipped.
const IGNORED_CRATES: [&str; 10] = [
    CRATE_TARGET,
    "h2",
    "hyper",
    "hyper_util",
    "mio",
    "reqwest",
    "rustls",
    "tokio",
    "tower",
    "want",
];

/// Rendering of an event into a record message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MessageFormat {
    /// A JSON object with `level`, `message` and every event field.
    #[default]
    Json,
    /// The message followed by ` key=value` pairs.
    Text,
}

pub struct ShipperLayer {
    shipper: Arc<LogShipper>,
    format: MessageFormat,
}

impl ShipperLayer {
    #[must_use]
    pub fn new(shipper: Arc<LogShipper>) -> Self {
        Self {
            shipper,
            format: MessageFormat::default(),
        }
    }

    #[must_use]
    pub fn with_format(mut self, format: MessageFormat) -> Self {
        self.format = format;
        self
    }
}

impl<S: Subscriber> Layer<S> for ShipperLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if is_ignored(metadata.target()) {
            return;
        }

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let message = match self.format {
            MessageFormat::Json => {
                let mut fields = Map::new();
                fields.insert(
                    "level".to_string(),
                    Value::String(metadata.level().to_string()),
                );
                if let Some(message) = visitor.message {
                    fields.insert("message".to_string(), Value::String(message));
                }
                fields.extend(visitor.fields);
                Message::Fields(fields)
            }
            MessageFormat::Text => {
                let mut text = visitor.message.unwrap_or_default();
                for (key, value) in visitor.fields {
                    let value = match value {
                        Value::String(s) => s,
                        other => other.to_string(),
                    };
                    if !text.is_empty() {
                        text.push(' ');
                    }
                    text.push_str(&key);
                    text.push('=');
                    text.push_str(&value);
                }
                Message::Text(text)
            }
        };

        let record = LogRecord::new(metadata.target(), message);
        if let Err(e) = self.shipper.emit(&record) {
            debug!("SHIPPER | Dropped log record from {}: {}", metadata.target(), e);
        }
    }
}

fn is_ignored(target: &str) -> bool {
    IGNORED_CRATES.iter().any(|krate| {
        target
            .strip_prefix(krate)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with("::"))
    })
}

#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    fields: Vec<(String, Value)>,
}

impl FieldVisitor {
    fn record(&mut self, field: &Field, value: Value) {
        if field.name() == "message" {
            self.message = Some(match value {
                Value::String(s) => s,
                other => other.to_string(),
            });
        } else {
            self.fields.push((field.name().to_string(), value));
        }
    }
}

impl Visit for FieldVisitor {
    fn record_f64(&mut self, field: &Field, value: f64) {
        self.record(field, Value::from(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.record(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.record(field, Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.record(field, Value::from(value));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.record(field, Value::from(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.record(field, Value::String(format!("{value:?}")));
    }
}
