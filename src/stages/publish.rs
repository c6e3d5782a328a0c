//! PublishStage: a pool of workers that poll the transform queue, send each
//! document through the publisher registry, and forward to the publish
//! queue. Mirrors [`crate::stages::transform::TransformStage`]'s shared-flag
//! marker handling, since the same "multiple workers share one input queue"
//! topology applies here.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{watch, Mutex, Notify};
use tracing::{info, warn};

use crate::crawl_queue::CrawlQueue;
use crate::notify::NotificationSink;
use crate::publish::PublisherRegistry;
use crate::queue::{BoundedQueue, Phase, QueueItem};

pub struct PublishStage {
    crawl_queue: Arc<CrawlQueue>,
    registry: Mutex<PublisherRegistry>,
    input: BoundedQueue,
    output: BoundedQueue,
    notifier: Arc<dyn NotificationSink>,
    alive: watch::Receiver<bool>,
    poll_timeout: Duration,
    upstream_done: Arc<AtomicBool>,
    marker_forwarded: Arc<AtomicBool>,
    /// Mirrors [`crate::stages::transform::TransformStage`]'s in-flight
    /// barrier: the worker that dequeues the marker waits for every sibling's
    /// in-flight document to be forwarded first.
    in_flight: Arc<AtomicUsize>,
    idle: Arc<Notify>,
}

impl PublishStage {
    pub fn new(
        crawl_queue: Arc<CrawlQueue>,
        registry: PublisherRegistry,
        input: BoundedQueue,
        output: BoundedQueue,
        notifier: Arc<dyn NotificationSink>,
        alive: watch::Receiver<bool>,
        poll_timeout: Duration,
    ) -> Self {
        Self {
            crawl_queue,
            registry: Mutex::new(registry),
            input,
            output,
            notifier,
            alive,
            poll_timeout,
            upstream_done: Arc::new(AtomicBool::new(false)),
            marker_forwarded: Arc::new(AtomicBool::new(false)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            idle: Arc::new(Notify::new()),
        }
    }

    /// Spawns `worker_count` worker tasks. Since [`PublisherRegistry`] is a
    /// single shared instance behind a mutex here, callers that need one
    /// publisher instance per worker (per ยง5's shared-resources note) should
    /// configure `worker_count = 1`, or construct one [`PublishStage`] per
    /// worker each with its own registry.
    pub fn spawn(self: Arc<Self>, worker_count: usize) -> Vec<tokio::task::JoinHandle<()>> {
        (0..worker_count)
            .map(|idx| {
                let stage = self.clone();
                tokio::spawn(async move { stage.run_worker(idx).await })
            })
            .collect()
    }

    async fn run_worker(&self, worker_idx: usize) {
        loop {
            if !*self.alive.borrow() {
                break;
            }
            if self.upstream_done.load(Ordering::Acquire) {
                break;
            }
            let item = match self.input.poll(self.poll_timeout).await {
                Some(item) => item,
                None => continue,
            };

            if item.is_phase_complete(Phase::Transform) {
                self.upstream_done.store(true, Ordering::Release);
                self.wait_for_siblings_idle().await;
                if !self.marker_forwarded.swap(true, Ordering::AcqRel)
                    && self.output.put(QueueItem::marker(Phase::Transform)).await.is_err()
                {
                    warn!(worker_idx, "publish queue closed while forwarding marker");
                }
                break;
            }

            let id = match item.id() {
                Some(id) => id.to_string(),
                None => continue,
            };
            self.in_flight.fetch_add(1, Ordering::AcqRel);
            let start = Instant::now();
            if let Err(err) = self.process(&id).await {
                warn!(worker_idx, id, error = %err, "publish failed, dropping document");
                self.notifier.notify_error(&id, "publish", &err.to_string()).await;
                self.leave_in_flight();
                continue;
            }
            let elapsed = start.elapsed();
            let next = item.with_timing(Phase::Publish, elapsed.as_millis() as u64);
            if self.output.put(next).await.is_err() {
                warn!(worker_idx, id, "publish queue closed while forwarding document");
            }
            self.leave_in_flight();
        }
        info!(worker_idx, "publish worker exiting");
    }

    async fn wait_for_siblings_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.in_flight.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }

    fn leave_in_flight(&self) {
        if self.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle.notify_waiters();
        }
    }

    async fn process(&self, id: &str) -> anyhow::Result<()> {
        let doc = self.crawl_queue.load_document("transform", id).await?;
        self.registry.lock().await.send(&doc).await?;
        let path = self.crawl_queue.doc_path("transform", id).await?;
        tokio::fs::remove_file(&path).await?;
        Ok(())
    }

    /// Flushes and commits every publisher, called once after the last
    /// worker in this pool drains per ยง4.5's shutdown contract.
    pub async fn shutdown(&self) -> Result<(), crate::error::PublishError> {
        self.registry.lock().await.shutdown().await
    }
}
