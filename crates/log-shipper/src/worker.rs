// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Worker task owning the consuming side of one stream queue.
//!
//! The worker provisions its stream, then alternates between waiting on the
//! queue (bounded by the current batch deadline) and submitting batches the
//! [`Accumulator`] closes. It stops after the flush marker, or on the first
//! fatal delivery error; either way its queue is closed.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::batch::{Accumulator, Batch, BatchLimits, Offer};
use crate::error::ShipperError;
use crate::queue::StreamQueue;
use crate::registry::{StreamRegistry, StreamState};
use crate::submitter::Submitter;

pub struct StreamWorker {
    queue: Arc<StreamQueue>,
    registry: Arc<StreamRegistry>,
    submitter: Arc<Submitter>,
    limits: BatchLimits,
    send_interval: Duration,
}

impl StreamWorker {
    #[must_use]
    pub fn new(
        queue: Arc<StreamQueue>,
        registry: Arc<StreamRegistry>,
        submitter: Arc<Submitter>,
        limits: BatchLimits,
        send_interval: Duration,
    ) -> Self {
        Self {
            queue,
            registry,
            submitter,
            limits,
            send_interval,
        }
    }

    pub async fn run(self) -> Result<(), ShipperError> {
        debug!("SHIPPER | Worker for stream {} started", self.queue.stream());
        let result = self.consume().await;
        self.queue.close();
        debug!("SHIPPER | Worker for stream {} stopped", self.queue.stream());
        result
    }

    async fn consume(&self) -> Result<(), ShipperError> {
        let stream = self.registry.ensure_stream(self.queue.stream()).await?;
        let mut accumulator = Accumulator::new(self.limits, self.send_interval, Instant::now());

        loop {
            let item = self.queue.pop_until(accumulator.deadline()).await;
            match accumulator.offer(item, Instant::now()) {
                Offer::Appended => {}
                Offer::Flushed { batch, trigger } => {
                    if !batch.is_empty() {
                        debug!(
                            "SHIPPER | {:?} trigger closed a batch of {} events for stream {}",
                            trigger,
                            batch.len(),
                            stream.name()
                        );
                    }
                    self.send(&stream, batch).await?;
                }
                Offer::Finished { batch } => {
                    self.send(&stream, batch).await?;
                    return Ok(());
                }
            }
        }
    }

    async fn send(&self, stream: &StreamState, batch: Batch) -> Result<(), ShipperError> {
        if batch.is_empty() {
            return Ok(());
        }
        self.submitter.submit(stream, batch.into_events()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::LogsApi;
    use crate::error::ApiError;
    use crate::queue::QueuePolicy;
    use crate::record::Event;
    use crate::test_utils::MockLogsApi;
    use tokio::task::JoinHandle;

    struct Harness {
        api: Arc<MockLogsApi>,
        queue: Arc<StreamQueue>,
        registry: Arc<StreamRegistry>,
        submitter: Arc<Submitter>,
    }

    impl Harness {
        fn new() -> Self {
            let api = Arc::new(MockLogsApi::default());
            let client = Arc::clone(&api) as Arc<dyn LogsApi>;
            Self {
                api,
                queue: Arc::new(StreamQueue::new("app", QueuePolicy::Unbounded)),
                registry: Arc::new(StreamRegistry::new(Arc::clone(&client), "group")),
                submitter: Arc::new(Submitter::new(client, "group", 5)),
            }
        }

        fn spawn(&self, limits: BatchLimits, send_interval: Duration) -> JoinHandle<Result<(), ShipperError>> {
            let worker = StreamWorker::new(
                Arc::clone(&self.queue),
                Arc::clone(&self.registry),
                Arc::clone(&self.submitter),
                limits,
                send_interval,
            );
            tokio::spawn(worker.run())
        }

        fn batches(&self) -> Vec<Vec<String>> {
            self.api
                .put_requests()
                .into_iter()
                .map(|r| r.log_events.into_iter().map(|e| e.message).collect())
                .collect()
        }
    }

    fn push(queue: &StreamQueue, messages: &[&str]) {
        for (i, message) in messages.iter().enumerate() {
            queue.push(Event::new(i as i64, *message)).unwrap();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_count_then_time_trigger() {
        let harness = Harness::new();
        push(&harness.queue, &["A", "B", "C", "D"]);
        let limits = BatchLimits {
            max_batch_count: 3,
            ..Default::default()
        };
        let worker = harness.spawn(limits, Duration::from_secs(1));

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(harness.batches(), vec![vec!["A", "B", "C"]]);

        tokio::time::sleep(Duration::from_millis(700)).await;
        assert_eq!(harness.batches(), vec![vec!["A", "B", "C"], vec!["D"]]);

        harness.queue.push_flush();
        worker.await.unwrap().unwrap();
        assert_eq!(harness.api.put_requests().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_size_trigger_splits_events() {
        let harness = Harness::new();
        let payload = "x".repeat(80);
        push(&harness.queue, &[payload.as_str(), payload.as_str()]);
        harness.queue.push_flush();
        let limits = BatchLimits {
            max_batch_size: 100,
            ..Default::default()
        };

        harness.spawn(limits, Duration::from_secs(60)).await.unwrap().unwrap();

        let batches = harness.batches();
        assert_eq!(batches.len(), 2);
        assert!(batches.iter().all(|batch| batch.len() == 1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_marker_sends_pending_batch() {
        let harness = Harness::new();
        push(&harness.queue, &["one", "two"]);
        harness.queue.push_flush();

        let start = Instant::now();
        harness
            .spawn(BatchLimits::default(), Duration::from_secs(60))
            .await
            .unwrap()
            .unwrap();

        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(harness.batches(), vec![vec!["one", "two"]]);
        assert!(harness.queue.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_send_interval_does_not_stop_worker() {
        let harness = Harness::new();
        push(&harness.queue, &["kept"]);
        harness.queue.push_flush();

        harness
            .spawn(BatchLimits::default(), Duration::MAX)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(harness.batches(), vec![vec!["kept"]]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_stream_makes_no_calls() {
        let harness = Harness::new();
        let worker = harness.spawn(BatchLimits::default(), Duration::from_secs(1));

        tokio::time::sleep(Duration::from_secs(5)).await;
        harness.queue.push_flush();
        worker.await.unwrap().unwrap();

        assert!(harness.api.put_requests().is_empty());
        assert_eq!(harness.api.stream_creations().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_stops_worker_and_closes_queue() {
        let harness = Harness::new();
        harness
            .api
            .script_put(Err(ApiError::service("AccessDeniedException", "denied")));
        push(&harness.queue, &["lost"]);
        harness.queue.push_flush();

        let result = harness
            .spawn(BatchLimits::default(), Duration::from_secs(1))
            .await
            .unwrap();

        assert!(matches!(result, Err(ShipperError::Api(_))));
        assert!(harness.queue.is_closed());
        assert!(matches!(
            harness.queue.push(Event::new(0, "late")),
            Err(ShipperError::StreamClosed(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_provisioning_failure_stops_worker() {
        let harness = Harness::new();
        harness
            .api
            .fail_create_stream(ApiError::service("AccessDeniedException", "denied"));
        push(&harness.queue, &["a"]);

        let result = harness
            .spawn(BatchLimits::default(), Duration::from_secs(1))
            .await
            .unwrap();

        assert!(result.is_err());
        assert!(harness.api.put_requests().is_empty());
    }
}
