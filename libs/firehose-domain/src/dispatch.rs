//! Dispatch fan-out to downstream consumers
//!
//! Every consumer gets its own unbounded FIFO queue and worker task. Dispatching
//! a batch only enqueues it, so the stream never waits for a consumer, and each
//! consumer sees batches in extraction order.
//!
//! # Invariants
//!
//! - All consumers receive every batch
//! - A consumer handles one batch at a time, in the order they were dispatched
//! - Consumer failures and panics are logged, never propagated to the stream
//!
//! Queues are unbounded: a consumer that cannot keep up grows its backlog
//! without limit. The dispatcher warns once a backlog passes
//! `backlog_warn_threshold` so the condition is visible in the logs.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::batch::RecordBatch;
use crate::error::StreamError;
use crate::ports::BatchConsumer;

/// Backlog (in batches) above which a consumer is reported as lagging
pub const DEFAULT_BACKLOG_WARN_THRESHOLD: usize = 64;

struct Worker {
    name: String,
    sender: mpsc::UnboundedSender<Arc<RecordBatch>>,
    backlog: Arc<AtomicUsize>,
    handle: JoinHandle<()>,
}

/// Fan-out of flushed batches to the registered consumers
///
/// Must be created inside a tokio runtime, since it spawns one worker task per
/// consumer.
///
/// # Example
///
/// ```ignore
/// let dispatcher = Dispatcher::new(vec![Arc::new(FileConsumer::new(ctx))]);
/// dispatcher.dispatch(batch)?;
/// dispatcher.shutdown().await;
/// ```
pub struct Dispatcher {
    workers: Vec<Worker>,
    backlog_warn_threshold: usize,
}

impl Dispatcher {
    /// Spawn a worker for each consumer, in registration order
    pub fn new(consumers: Vec<Arc<dyn BatchConsumer>>) -> Self {
        Self::with_backlog_threshold(consumers, DEFAULT_BACKLOG_WARN_THRESHOLD)
    }

    pub fn with_backlog_threshold(
        consumers: Vec<Arc<dyn BatchConsumer>>,
        backlog_warn_threshold: usize,
    ) -> Self {
        let workers = consumers.into_iter().map(spawn_worker).collect();
        Self {
            workers,
            backlog_warn_threshold,
        }
    }

    /// Names of the registered consumers
    pub fn consumer_names(&self) -> Vec<&str> {
        self.workers.iter().map(|w| w.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Batches queued or in progress for the named consumer
    pub fn backlog(&self, consumer: &str) -> Option<usize> {
        self.workers
            .iter()
            .find(|w| w.name == consumer)
            .map(|w| w.backlog.load(Ordering::Acquire))
    }

    /// Hand a batch to every consumer without waiting for them
    ///
    /// # Errors
    ///
    /// Returns `StreamError::Processing` if a consumer's worker is gone, which
    /// only happens once the runtime is shutting down.
    pub fn dispatch(&self, batch: RecordBatch) -> Result<(), StreamError> {
        if self.workers.is_empty() {
            warn!("No consumers registered, batch will be dropped");
            return Ok(());
        }

        let batch = Arc::new(batch);
        for worker in &self.workers {
            let depth = worker.backlog.fetch_add(1, Ordering::AcqRel) + 1;
            if worker.sender.send(Arc::clone(&batch)).is_err() {
                worker.backlog.fetch_sub(1, Ordering::AcqRel);
                return Err(StreamError::processing(format!(
                    "consumer '{}' is no longer running",
                    worker.name
                )));
            }
            if depth > self.backlog_warn_threshold {
                warn!(
                    consumer = %worker.name,
                    backlog = depth,
                    "Consumer is falling behind"
                );
            }
        }

        debug!(
            batch_id = %batch.id(),
            consumers = self.workers.len(),
            "Batch dispatched"
        );
        Ok(())
    }

    /// Close the queues and wait until every queued batch has been handled
    pub async fn shutdown(self) {
        for worker in self.workers {
            drop(worker.sender);
            if let Err(e) = worker.handle.await {
                error!(consumer = %worker.name, error = %e, "Consumer worker ended abnormally");
            }
            info!(consumer = %worker.name, "Consumer stopped");
        }
    }
}

fn spawn_worker(consumer: Arc<dyn BatchConsumer>) -> Worker {
    let name = consumer.name().to_string();
    let (sender, mut receiver) = mpsc::unbounded_channel::<Arc<RecordBatch>>();
    let backlog = Arc::new(AtomicUsize::new(0));
    info!(consumer = %name, "Registered consumer");

    let worker_backlog = Arc::clone(&backlog);
    let worker_name = name.clone();
    let handle = tokio::spawn(async move {
        while let Some(batch) = receiver.recv().await {
            let span = info_span!(
                "consume",
                consumer = %worker_name,
                stream = %batch.stream_name(),
                batch_id = %batch.id(),
            );
            let consumer = Arc::clone(&consumer);
            let size = batch.size();

            // Each batch runs as its own task so a panicking consumer does not
            // take the worker down with it.
            let task = tokio::spawn(async move { consumer.consume(batch).await }.instrument(span));
            match task.await {
                Ok(Ok(())) => debug!(consumer = %worker_name, size, "Batch consumed"),
                Ok(Err(e)) => error!(consumer = %worker_name, error = %e, "Consumer failed"),
                Err(e) => error!(consumer = %worker_name, error = %e, "Consumer task aborted"),
            }
            worker_backlog.fetch_sub(1, Ordering::AcqRel);
        }
    });

    Worker {
        name,
        sender,
        backlog,
        handle,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConsumerError;
    use async_trait::async_trait;
    use bytes::Bytes;
    use chrono::Utc;
    use mockall::mock;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::Notify;

    mock! {
        Consumer {}

        #[async_trait]
        impl BatchConsumer for Consumer {
            fn name(&self) -> &str;
            async fn consume(&self, batch: Arc<RecordBatch>) -> Result<(), ConsumerError>;
        }
    }

    // Records the raw payload of every batch it sees
    struct RecordingConsumer {
        name: &'static str,
        seen: Arc<Mutex<Vec<Bytes>>>,
        gate: Option<Arc<Notify>>,
    }

    #[async_trait]
    impl BatchConsumer for RecordingConsumer {
        fn name(&self) -> &str {
            self.name
        }

        async fn consume(&self, batch: Arc<RecordBatch>) -> Result<(), ConsumerError> {
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            self.seen.lock().unwrap().push(batch.raw().clone());
            Ok(())
        }
    }

    struct PanickingConsumer;

    #[async_trait]
    impl BatchConsumer for PanickingConsumer {
        fn name(&self) -> &str {
            "panicking"
        }

        async fn consume(&self, _batch: Arc<RecordBatch>) -> Result<(), ConsumerError> {
            panic!("consumer bug");
        }
    }

    fn batch(raw: &'static [u8]) -> RecordBatch {
        RecordBatch::new(
            Bytes::from_static(raw),
            "decahose",
            "/tmp",
            Utc::now(),
            Duration::from_secs(1),
        )
    }

    fn recording(name: &'static str) -> (Arc<RecordingConsumer>, Arc<Mutex<Vec<Bytes>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let consumer = Arc::new(RecordingConsumer {
            name,
            seen: Arc::clone(&seen),
            gate: None,
        });
        (consumer, seen)
    }

    #[tokio::test]
    async fn test_every_consumer_gets_every_batch_in_order() {
        let (a, seen_a) = recording("a");
        let (b, seen_b) = recording("b");
        let dispatcher = Dispatcher::new(vec![a, b]);

        dispatcher.dispatch(batch(b"1\r\n")).unwrap();
        dispatcher.dispatch(batch(b"2\r\n")).unwrap();
        dispatcher.dispatch(batch(b"3\r\n")).unwrap();
        dispatcher.shutdown().await;

        let expected = vec![
            Bytes::from_static(b"1\r\n"),
            Bytes::from_static(b"2\r\n"),
            Bytes::from_static(b"3\r\n"),
        ];
        assert_eq!(*seen_a.lock().unwrap(), expected);
        assert_eq!(*seen_b.lock().unwrap(), expected);
    }

    #[tokio::test]
    async fn test_dispatch_does_not_wait_for_slow_consumer() {
        let gate = Arc::new(Notify::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let slow = Arc::new(RecordingConsumer {
            name: "slow",
            seen: Arc::clone(&seen),
            gate: Some(Arc::clone(&gate)),
        });
        let dispatcher = Dispatcher::with_backlog_threshold(vec![slow], 1);

        dispatcher.dispatch(batch(b"1\r\n")).unwrap();
        dispatcher.dispatch(batch(b"2\r\n")).unwrap();
        assert_eq!(dispatcher.backlog("slow"), Some(2));
        assert!(seen.lock().unwrap().is_empty());

        // notify_one stores at most one permit, so release until drained.
        while dispatcher.backlog("slow") != Some(0) {
            gate.notify_one();
            tokio::task::yield_now().await;
        }
        dispatcher.shutdown().await;

        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_consumer_errors_are_contained() {
        let mut failing = MockConsumer::new();
        failing.expect_name().return_const("failing".to_string());
        failing
            .expect_consume()
            .times(2)
            .returning(|_| Err(ConsumerError::failed("disk full")));

        let (ok, seen) = recording("ok");
        let dispatcher = Dispatcher::new(vec![Arc::new(failing), ok]);

        dispatcher.dispatch(batch(b"1\r\n")).unwrap();
        dispatcher.dispatch(batch(b"2\r\n")).unwrap();
        dispatcher.shutdown().await;

        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_panicking_consumer_keeps_worker_alive() {
        let (ok, seen) = recording("ok");
        let dispatcher = Dispatcher::new(vec![Arc::new(PanickingConsumer), ok]);

        dispatcher.dispatch(batch(b"1\r\n")).unwrap();
        dispatcher.dispatch(batch(b"2\r\n")).unwrap();
        assert_eq!(dispatcher.consumer_names(), vec!["panicking", "ok"]);
        dispatcher.shutdown().await;

        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_no_consumers_drops_batch() {
        let dispatcher = Dispatcher::new(Vec::new());

        assert!(dispatcher.is_empty());
        assert!(dispatcher.dispatch(batch(b"1\r\n")).is_ok());
    }
}
