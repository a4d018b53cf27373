// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The shipper context.
//!
//! [`LogShipper`] routes normalized records to one queue per destination
//! stream, spawning the stream's worker on first use, and coordinates the
//! final drain on [`flush`](LogShipper::flush).
//!
//! Producers never block: [`emit`](LogShipper::emit) normalizes the record
//! and pushes it under the routing lock, which is also the lock `flush` takes
//! to raise the shutdown flag and enqueue the flush markers. An event is thus
//! either queued ahead of its stream's marker or refused as a late arrival.
//!
//! A worker that hits a fatal delivery error stops for good. The failure is
//! logged, sent on the channel returned by
//! [`take_failures`](LogShipper::take_failures), and returned by `flush`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::api::LogsApi;
use crate::config::ShipperConfig;
use crate::constants::MAX_SUBMIT_ATTEMPTS;
use crate::error::ShipperError;
use crate::queue::StreamQueue;
use crate::record::{Event, LogRecord};
use crate::registry::StreamRegistry;
use crate::submitter::Submitter;
use crate::worker::StreamWorker;

/// A stream whose delivery stopped on a fatal error.
#[derive(Debug, Clone)]
pub struct WorkerFailure {
    pub stream: String,
    pub error: Arc<ShipperError>,
}

/// Collects failures of background deliveries.
struct FailureSink {
    tx: mpsc::UnboundedSender<WorkerFailure>,
    collected: Mutex<Vec<WorkerFailure>>,
}

impl FailureSink {
    fn report(&self, stream: &str, error: ShipperError) {
        error!("SHIPPER | Delivery to stream {} stopped: {}", stream, error);
        let failure = WorkerFailure {
            stream: stream.to_string(),
            error: Arc::new(error),
        };
        // Nobody listening is fine, flush still returns the failure
        let _ = self.tx.send(failure.clone());
        self.lock().push(failure);
    }

    fn drain(&self) -> Vec<WorkerFailure> {
        std::mem::take(&mut *self.lock())
    }

    fn lock(&self) -> MutexGuard<'_, Vec<WorkerFailure>> {
        self.collected.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct WorkerSlot {
    queue: Arc<StreamQueue>,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct Routing {
    shutting_down: bool,
    workers: HashMap<String, WorkerSlot>,
    /// Latest delivery of each stream in direct mode; it awaits the one before it.
    direct: HashMap<String, JoinHandle<()>>,
}

pub struct LogShipper {
    config: ShipperConfig,
    registry: Arc<StreamRegistry>,
    submitter: Arc<Submitter>,
    runtime: Handle,
    routing: Mutex<Routing>,
    failures: Arc<FailureSink>,
    failures_rx: Mutex<Option<mpsc::UnboundedReceiver<WorkerFailure>>>,
}

impl LogShipper {
    /// Creates a shipper bound to the current tokio runtime.
    ///
    /// Records can later be emitted from any thread, inside the runtime or not.
    pub fn new(config: ShipperConfig, client: Arc<dyn LogsApi>) -> Result<Self, ShipperError> {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|e| ShipperError::NoRuntime(e.to_string()))?;

        let registry = Arc::new(StreamRegistry::new(
            Arc::clone(&client),
            config.log_group.clone(),
        ));
        let submitter = Arc::new(Submitter::new(
            client,
            config.log_group.clone(),
            MAX_SUBMIT_ATTEMPTS,
        ));
        let (tx, rx) = mpsc::unbounded_channel();

        Ok(Self {
            config,
            registry,
            submitter,
            runtime,
            routing: Mutex::new(Routing::default()),
            failures: Arc::new(FailureSink {
                tx,
                collected: Mutex::new(Vec::new()),
            }),
            failures_rx: Mutex::new(Some(rx)),
        })
    }

    /// Creates a shipper and, when configured, the log group.
    pub async fn start(config: ShipperConfig, client: Arc<dyn LogsApi>) -> Result<Self, ShipperError> {
        let shipper = Self::new(config, client)?;
        if shipper.config.create_log_group {
            shipper.registry.ensure_group().await?;
        }
        debug!(
            "SHIPPER | Shipping to log group {} (queues: {})",
            shipper.config.log_group, shipper.config.use_queues
        );
        Ok(shipper)
    }

    /// Hands a record to its stream without blocking.
    ///
    /// Records arriving after [`flush`](Self::flush) started are dropped with
    /// a warning. Fails when the record cannot be normalized or when its
    /// stream refuses it (full queue, stopped worker).
    pub fn emit(&self, record: &LogRecord) -> Result<(), ShipperError> {
        let event = Event::from_record(record)?;
        let stream = self.stream_for(record);

        let mut routing = self.lock_routing();
        if routing.shutting_down {
            warn!("SHIPPER | Received message after logging system shutdown");
            return Ok(());
        }

        if !self.config.use_queues {
            let previous = routing.direct.remove(&stream);
            let task = self.spawn_direct(stream.clone(), event, previous);
            routing.direct.insert(stream, task);
            return Ok(());
        }

        let slot = routing
            .workers
            .entry(stream)
            .or_insert_with_key(|stream| self.spawn_worker(stream));
        slot.queue.push(event)
    }

    /// Submits a record on its own and waits for the outcome.
    ///
    /// Bypasses the queues. Errors are returned to the caller rather than
    /// reported as worker failures.
    pub async fn deliver(&self, record: &LogRecord) -> Result<(), ShipperError> {
        let event = Event::from_record(record)?;
        if self.is_shutting_down() {
            warn!("SHIPPER | Received message after logging system shutdown");
            return Ok(());
        }
        let stream = self.registry.ensure_stream(&self.stream_for(record)).await?;
        self.submitter.submit(&stream, vec![event]).await
    }

    /// Drains every stream and waits for all workers to stop.
    ///
    /// Everything emitted before the call is submitted (or reported as
    /// failed). Returns the failures collected since the last flush; calling
    /// it again is cheap and returns what failed in between, if anything.
    pub async fn flush(&self) -> Vec<WorkerFailure> {
        let (workers, direct) = {
            let mut routing = self.lock_routing();
            if !routing.shutting_down {
                debug!(
                    "SHIPPER | Flushing {} streams before shutdown",
                    routing.workers.len()
                );
            }
            routing.shutting_down = true;
            for slot in routing.workers.values() {
                slot.queue.push_flush();
            }
            (
                std::mem::take(&mut routing.workers),
                std::mem::take(&mut routing.direct),
            )
        };

        let tasks = workers
            .into_iter()
            .map(|(stream, slot)| (stream, slot.task))
            .chain(direct);
        for (stream, task) in tasks {
            if let Err(e) = task.await {
                self.failures
                    .report(&stream, ShipperError::StreamClosed(format!("{stream} ({e})")));
            }
        }

        self.failures.drain()
    }

    /// Receiver of worker failures as they happen. Available once.
    pub fn take_failures(&self) -> Option<mpsc::UnboundedReceiver<WorkerFailure>> {
        self.failures_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.lock_routing().shutting_down
    }

    #[must_use]
    pub fn config(&self) -> &ShipperConfig {
        &self.config
    }

    #[must_use]
    pub fn registry(&self) -> &StreamRegistry {
        &self.registry
    }

    fn stream_for(&self, record: &LogRecord) -> String {
        self.config
            .stream_name
            .clone()
            .unwrap_or_else(|| record.name.clone())
    }

    fn spawn_worker(&self, stream: &str) -> WorkerSlot {
        debug!("SHIPPER | Starting worker for stream {}", stream);
        let queue = Arc::new(StreamQueue::new(stream, self.config.queue_policy));
        let worker = StreamWorker::new(
            Arc::clone(&queue),
            Arc::clone(&self.registry),
            Arc::clone(&self.submitter),
            self.config.limits(),
            self.config.send_interval,
        );
        let failures = Arc::clone(&self.failures);
        let stream = stream.to_string();
        let task = self.runtime.spawn(async move {
            if let Err(e) = worker.run().await {
                failures.report(&stream, e);
            }
        });
        WorkerSlot { queue, task }
    }

    /// Spawns the delivery of one event. It starts once `previous`, the prior
    /// delivery to the same stream, is done, so a stream keeps emit order.
    fn spawn_direct(
        &self,
        stream: String,
        event: Event,
        previous: Option<JoinHandle<()>>,
    ) -> JoinHandle<()> {
        let registry = Arc::clone(&self.registry);
        let submitter = Arc::clone(&self.submitter);
        let failures = Arc::clone(&self.failures);
        self.runtime.spawn(async move {
            if let Some(previous) = previous {
                if let Err(e) = previous.await {
                    failures.report(&stream, ShipperError::StreamClosed(format!("{stream} ({e})")));
                }
            }
            let result = match registry.ensure_stream(&stream).await {
                Ok(state) => submitter.submit(&state, vec![event]).await,
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                failures.report(&stream, e);
            }
        })
    }

    fn lock_routing(&self) -> MutexGuard<'_, Routing> {
        self.routing.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
