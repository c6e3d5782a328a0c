//! TransformStage: a pool of workers that poll the extract queue, run the
//! transform pipeline, and hand documents to the transform queue. Grounded
//! on the teacher's consumer-task shape in
//! `crates/foia/src/work_queue/runner.rs`'s deep-mode concurrent consumer,
//! adapted here to a fixed worker pool per stage instead of one task per
//! deferred stage.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{watch, Notify};
use tracing::{info, warn};

use crate::crawl_queue::CrawlQueue;
use crate::notify::NotificationSink;
use crate::pipeline::TransformPipeline;
use crate::queue::{BoundedQueue, Phase, QueueItem};

pub struct TransformStage {
    crawl_queue: Arc<CrawlQueue>,
    pipeline: Arc<TransformPipeline>,
    input: BoundedQueue,
    output: BoundedQueue,
    notifier: Arc<dyn NotificationSink>,
    alive: watch::Receiver<bool>,
    poll_timeout: Duration,
    /// Set by whichever worker dequeues the upstream marker, so every other
    /// worker in the pool notices upstream is done on its next poll timeout
    /// instead of polling an empty queue forever.
    upstream_done: Arc<AtomicBool>,
    /// Ensures the marker is forwarded downstream exactly once across the
    /// whole pool, even though every worker shares the same input queue.
    marker_forwarded: Arc<AtomicBool>,
    /// Count of workers currently between dequeuing a document and
    /// forwarding its result. The worker that dequeues the marker waits for
    /// this to hit zero before forwarding it, so a sibling's in-flight
    /// document can never arrive downstream after the marker.
    in_flight: Arc<AtomicUsize>,
    idle: Arc<Notify>,
}

impl TransformStage {
    pub fn new(
        crawl_queue: Arc<CrawlQueue>,
        pipeline: Arc<TransformPipeline>,
        input: BoundedQueue,
        output: BoundedQueue,
        notifier: Arc<dyn NotificationSink>,
        alive: watch::Receiver<bool>,
        poll_timeout: Duration,
    ) -> Self {
        Self {
            crawl_queue,
            pipeline,
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

    /// Spawns `worker_count` worker tasks and returns their join handles.
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

            if item.is_phase_complete(Phase::Extract) {
                self.upstream_done.store(true, Ordering::Release);
                self.wait_for_siblings_idle().await;
                if !self.marker_forwarded.swap(true, Ordering::AcqRel)
                    && self.output.put(QueueItem::marker(Phase::Extract)).await.is_err()
                {
                    warn!(worker_idx, "transform queue closed while forwarding marker");
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
                warn!(worker_idx, id, error = %err, "transform failed, dropping document");
                self.notifier.notify_error(&id, "transform", &err.to_string()).await;
                self.leave_in_flight();
                continue;
            }
            let elapsed = start.elapsed();
            let next = item.with_timing(Phase::Transform, elapsed.as_millis() as u64);
            if self.output.put(next).await.is_err() {
                warn!(worker_idx, id, "transform queue closed while forwarding document");
            }
            self.leave_in_flight();
        }
        info!(worker_idx, "transform worker exiting");
    }

    /// Blocks until no sibling worker has a document dequeued and not yet
    /// forwarded, so the marker this worker is about to forward can never
    /// overtake another worker's in-flight item downstream.
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

    async fn process(&self, id: &str) -> Result<(), crate::error::CrawlQueueError> {
        let doc = self.crawl_queue.load_document("extract", id).await?;
        let doc = self
            .pipeline
            .run(doc)
            .await
            .map_err(|e| crate::error::CrawlQueueError::Serialize(e.to_string()))?;
        self.crawl_queue.transition("extract", "transform", &doc, id).await
    }
}
