// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Per-stream FIFO queue between producers and the stream's worker.
//!
//! Producers push synchronously and never block. The single consumer (the
//! stream worker) waits for the next item up to a deadline.
//!
//! # Overflow
//!
//! Growth is governed by an explicit [`QueuePolicy`]:
//! - **Unbounded**: never refuses data (memory grows under sustained overload)
//! - **DropOldest**: evicts the oldest queued event to make room, with a warning
//! - **Reject**: refuses the new event with [`ShipperError::QueueFull`]
//!
//! [`QueueItem::Flush`] is never subject to capacity.

use serde::Deserialize;
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::warn;

use crate::error::ShipperError;
use crate::record::Event;

/// An entry of a stream queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueItem {
    Data(Event),
    /// No more events will arrive: flush the current batch and stop.
    Flush,
}

/// Behaviour of a stream queue when it holds `capacity` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum QueuePolicy {
    #[default]
    Unbounded,
    DropOldest {
        capacity: usize,
    },
    Reject {
        capacity: usize,
    },
}

impl QueuePolicy {
    #[must_use]
    pub fn capacity(&self) -> Option<usize> {
        match self {
            Self::Unbounded => None,
            Self::DropOldest { capacity } | Self::Reject { capacity } => Some(*capacity),
        }
    }
}

impl fmt::Display for QueuePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unbounded => write!(f, "unbounded"),
            Self::DropOldest { capacity } => write!(f, "drop_oldest,{capacity}"),
            Self::Reject { capacity } => write!(f, "reject,{capacity}"),
        }
    }
}

impl FromStr for QueuePolicy {
    type Err = ShipperError;

    /// Parses `unbounded`, `drop_oldest,<capacity>` or `reject,<capacity>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        let (name, capacity) = match s.split_once(',') {
            Some((name, capacity)) => (name.trim(), Some(capacity.trim())),
            None => (s.as_str(), None),
        };
        let parse_capacity = || {
            capacity
                .and_then(|c| c.parse::<usize>().ok())
                .ok_or_else(|| {
                    ShipperError::InvalidConfig(format!("queue policy '{s}' needs a capacity"))
                })
        };

        match name {
            "unbounded" => Ok(Self::Unbounded),
            "drop_oldest" => Ok(Self::DropOldest {
                capacity: parse_capacity()?,
            }),
            "reject" => Ok(Self::Reject {
                capacity: parse_capacity()?,
            }),
            other => Err(ShipperError::InvalidConfig(format!(
                "unknown queue policy '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Default)]
struct Items {
    queue: VecDeque<QueueItem>,
    /// Number of [`QueueItem::Data`] entries in `queue`.
    data_len: usize,
}

impl Items {
    fn pop_front(&mut self) -> Option<QueueItem> {
        let item = self.queue.pop_front();
        if matches!(item, Some(QueueItem::Data(_))) {
            self.data_len -= 1;
        }
        item
    }

    /// Removes the oldest event, skipping flush markers.
    fn drop_oldest_data(&mut self) {
        if let Some(index) = self
            .queue
            .iter()
            .position(|item| matches!(item, QueueItem::Data(_)))
        {
            self.queue.remove(index);
            self.data_len -= 1;
        }
    }
}

/// FIFO of [`QueueItem`]s owned by one stream.
#[derive(Debug)]
pub struct StreamQueue {
    stream: String,
    items: Mutex<Items>,
    notify: Notify,
    policy: QueuePolicy,
    closed: AtomicBool,
}

impl StreamQueue {
    #[must_use]
    pub fn new(stream: impl Into<String>, policy: QueuePolicy) -> Self {
        Self {
            stream: stream.into(),
            items: Mutex::new(Items::default()),
            notify: Notify::new(),
            policy,
            closed: AtomicBool::new(false),
        }
    }

    /// Enqueues an event without blocking, applying the overflow policy.
    pub fn push(&self, event: Event) -> Result<(), ShipperError> {
        if self.is_closed() {
            return Err(ShipperError::StreamClosed(self.stream.clone()));
        }

        {
            let mut items = self.lock();
            match self.policy {
                QueuePolicy::Unbounded => {}
                QueuePolicy::DropOldest { capacity } => {
                    if items.data_len >= capacity {
                        items.drop_oldest_data();
                        warn!(
                            "SHIPPER | Queue for stream {} full ({} items), dropping oldest log event",
                            self.stream, capacity
                        );
                    }
                }
                QueuePolicy::Reject { capacity } => {
                    if items.data_len >= capacity {
                        return Err(ShipperError::QueueFull {
                            stream: self.stream.clone(),
                            capacity,
                        });
                    }
                }
            }
            items.queue.push_back(QueueItem::Data(event));
            items.data_len += 1;
        }
        self.notify.notify_one();
        Ok(())
    }

    /// Enqueues the flush marker. Always accepted.
    pub fn push_flush(&self) {
        self.lock().queue.push_back(QueueItem::Flush);
        self.notify.notify_one();
    }

    /// Waits for the next item until `deadline`. Returns `None` on timeout.
    pub async fn pop_until(&self, deadline: Instant) -> Option<QueueItem> {
        loop {
            if let Some(item) = self.lock().pop_front() {
                return Some(item);
            }
            if tokio::time::timeout_at(deadline, self.notify.notified())
                .await
                .is_err()
            {
                // A push may race the deadline; don't leave it behind for a full interval.
                return self.lock().pop_front();
            }
        }
    }

    /// Marks the queue as no longer consumed. Later pushes fail.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of queued items, flush markers included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().queue.is_empty()
    }

    /// Number of queued events; the figure the overflow policy applies to.
    #[must_use]
    pub fn pending_events(&self) -> usize {
        self.lock().data_len
    }

    #[must_use]
    pub fn stream(&self) -> &str {
        &self.stream
    }

    fn lock(&self) -> MutexGuard<'_, Items> {
        // Items are plain data; a panicking holder cannot leave them half-written.
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
