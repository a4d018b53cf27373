// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Formatter for the shipper's own diagnostics.
//!
//! Lines are prefixed with `LOG_SHIPPER` so they stand apart from the
//! application output of the process embedding the shipper. The component
//! is the module path inside this crate (`worker`, `submitter`, ...), or the
//! full target for events of other crates:
//!
//! ```text
//! LOG_SHIPPER | LEVEL | [component |] [span_name{span_fields}:] message {event_fields}
//! ```

use std::fmt;
use tracing_core::{Event, Subscriber};
use tracing_subscriber::fmt::{
    format::{self, FormatEvent, FormatFields},
    FmtContext, FormattedFields,
};
use tracing_subscriber::registry::LookupSpan;

use crate::CRATE_TARGET;

#[derive(Debug, Clone, Copy)]
pub struct Formatter;

impl<S, N> FormatEvent<S, N> for Formatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();
        write!(&mut writer, "LOG_SHIPPER | {} | ", metadata.level())?;
        if let Some(component) = component(metadata.target()) {
            write!(&mut writer, "{component} | ")?;
        }

        if let Some(scope) = ctx.event_scope() {
            for span in scope.from_root() {
                write!(writer, "{}", span.name())?;

                // Stored by the fmt layer when the span was created
                let ext = span.extensions();
                if let Some(fields) = ext.get::<FormattedFields<N>>() {
                    if !fields.is_empty() {
                        write!(writer, "{{{fields}}}")?;
                    }
                }
                write!(writer, ": ")?;
            }
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}

/// Component shown for an event target; `None` for the crate root.
fn component(target: &str) -> Option<&str> {
    if target == CRATE_TARGET {
        return None;
    }
    Some(
        target
            .strip_prefix(CRATE_TARGET)
            .and_then(|rest| rest.strip_prefix("::"))
            .unwrap_or(target),
    )
}
