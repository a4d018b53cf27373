// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Batch accumulation for a single stream.
//!
//! Events are grouped until one of the following closes the batch:
//! 1. **Timeout**: no item arrived before the batch deadline
//! 2. **Shutdown**: the flush marker was received
//! 3. **Size**: the next event would push the accounted size over the limit
//! 4. **Count**: the batch already holds the maximum number of events
//! 5. **Deadline**: the item arrived, but the deadline has passed
//!
//! The item that closed a batch is never part of it: a real event becomes the
//! sole member of the next batch. Every event therefore lands in exactly one
//! batch, in arrival order.
//!
//! [`Accumulator`] is clock-free: callers pass `now`, which keeps the
//! algorithm independent of the worker's runtime and easy to test.

use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

use crate::constants;
use crate::queue::QueueItem;
use crate::record::Event;

/// Size and count ceilings of one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchLimits {
    /// Maximum accounted size in bytes (payload bytes + per-event overhead).
    pub max_batch_size: usize,
    pub max_batch_count: usize,
}

impl Default for BatchLimits {
    fn default() -> Self {
        Self {
            max_batch_size: constants::MAX_BATCH_SIZE_BYTES,
            max_batch_count: constants::MAX_BATCH_COUNT,
        }
    }
}

/// Events accumulated for one submission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    events: Vec<Event>,
    size_bytes: usize,
}

impl Batch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: Event) {
        self.size_bytes += event.accounted_size();
        self.events.push(event);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Accounted size of the batch in bytes.
    #[must_use]
    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    #[must_use]
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    #[must_use]
    pub fn into_events(self) -> Vec<Event> {
        self.events
    }

    #[must_use]
    pub fn is_full(&self, limits: &BatchLimits) -> bool {
        self.events.len() >= limits.max_batch_count
    }

    #[must_use]
    pub fn would_overflow(&self, event: &Event, limits: &BatchLimits) -> bool {
        self.size_bytes + event.accounted_size() > limits.max_batch_size
    }
}

/// Why a batch was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Timeout,
    Size,
    Count,
    Deadline,
}

/// Result of offering one poll result to the accumulator.
#[derive(Debug, PartialEq, Eq)]
pub enum Offer {
    /// The event joined the current batch.
    Appended,
    /// The current batch closed; the received event (if any) starts the next one.
    Flushed { batch: Batch, trigger: Trigger },
    /// The flush marker closed the final batch; the worker must stop.
    Finished { batch: Batch },
}

/// Accumulator state of a stream worker.
#[derive(Debug)]
pub struct Accumulator {
    limits: BatchLimits,
    send_interval: Duration,
    current: Batch,
    deadline: Instant,
}

impl Accumulator {
    /// `send_interval` is capped at [`constants::MAX_SEND_INTERVAL`].
    #[must_use]
    pub fn new(limits: BatchLimits, send_interval: Duration, now: Instant) -> Self {
        let send_interval = send_interval.min(constants::MAX_SEND_INTERVAL);
        Self {
            limits,
            send_interval,
            current: Batch::new(),
            deadline: now + send_interval,
        }
    }

    /// Instant at which the current batch must be closed.
    #[must_use]
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    #[must_use]
    pub fn current(&self) -> &Batch {
        &self.current
    }

    /// Feeds the result of one queue poll; `None` means the poll timed out.
    pub fn offer(&mut self, item: Option<QueueItem>, now: Instant) -> Offer {
        let event = match item {
            None => return self.close(Trigger::Timeout, None, now),
            Some(QueueItem::Flush) => {
                let batch = std::mem::take(&mut self.current);
                self.deadline = now + self.send_interval;
                return Offer::Finished { batch };
            }
            Some(QueueItem::Data(event)) => event,
        };

        if event.accounted_size() > self.limits.max_batch_size {
            warn!(
                "SHIPPER | Log event of {} bytes exceeds the {} bytes batch limit, it will be sent alone",
                event.accounted_size(),
                self.limits.max_batch_size
            );
        }

        let trigger = if self.current.would_overflow(&event, &self.limits) {
            Some(Trigger::Size)
        } else if self.current.is_full(&self.limits) {
            Some(Trigger::Count)
        } else if now >= self.deadline {
            Some(Trigger::Deadline)
        } else {
            None
        };

        match trigger {
            Some(trigger) => self.close(trigger, Some(event), now),
            None => {
                self.current.push(event);
                Offer::Appended
            }
        }
    }

    fn close(&mut self, trigger: Trigger, carry: Option<Event>, now: Instant) -> Offer {
        let mut next = Batch::new();
        if let Some(event) = carry {
            next.push(event);
        }
        let batch = std::mem::replace(&mut self.current, next);
        self.deadline = now + self.send_interval;
        Offer::Flushed { batch, trigger }
    }
}
