//! BoundedQueue: a fixed-capacity FIFO with blocking put and timed poll.
//!
//! Backed by a bounded `tokio::sync::mpsc` channel. `put` realizes the
//! blocking-producer contract via `Sender::send().await`, which suspends the
//! calling task once the channel is full -- the backpressure mechanism
//! connecting heterogeneous worker pools. `poll` realizes the timed-poll
//! contract via `tokio::time::timeout` around `Receiver::recv()`, so a worker
//! can periodically re-check its cancellation flag and phase-complete state
//! instead of blocking forever. See ยง5 for why tokio tasks stand in for "OS
//! threads or equivalent" here.

pub mod item;

pub use item::{Phase, PhaseTiming, QueueItem};

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};

/// A bounded, multi-producer multi-consumer queue of [`QueueItem`]s.
///
/// Cheap to clone: the sender side is natively cloneable, and the receiver
/// side is shared behind a mutex so a worker pool can poll the same queue
/// concurrently (exactly one worker receives any given item).
#[derive(Clone)]
pub struct BoundedQueue {
    tx: mpsc::Sender<QueueItem>,
    rx: Arc<Mutex<mpsc::Receiver<QueueItem>>>,
    capacity: usize,
}

impl BoundedQueue {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            tx,
            rx: Arc::new(Mutex::new(rx)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Blocking put: suspends the caller while the queue is at capacity.
    /// Returns an error only if every receiver has been dropped.
    pub async fn put(&self, item: QueueItem) -> Result<(), QueueClosed> {
        self.tx.send(item).await.map_err(|_| QueueClosed)
    }

    /// Timed poll: returns `None` on timeout (so the caller can re-check
    /// shutdown/phase-complete state) or when the queue is closed and
    /// drained.
    pub async fn poll(&self, timeout: Duration) -> Option<QueueItem> {
        let mut rx = self.rx.lock().await;
        match tokio::time::timeout(timeout, rx.recv()).await {
            Ok(Some(item)) => Some(item),
            Ok(None) => None,
            Err(_elapsed) => None,
        }
    }

    /// Drain all currently-buffered items without blocking, for use during
    /// reset/shutdown.
    pub async fn drain_to(&self, out: &mut Vec<QueueItem>) {
        let mut rx = self.rx.lock().await;
        while let Ok(item) = rx.try_recv() {
            out.push(item);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("queue is closed")]
pub struct QueueClosed;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    /// S1: capacity-2 queue, a slow consumer, a producer posting 5 items as
    /// fast as possible -- the 3rd put must block until the consumer drains
    /// at least one item, and all 5 items are processed exactly once.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn backpressure_blocks_producer_until_consumer_drains() {
        let queue = BoundedQueue::new(2);
        let processed = Arc::new(AtomicUsize::new(0));

        let consumer_queue = queue.clone();
        let consumer_processed = processed.clone();
        let consumer = tokio::spawn(async move {
            for _ in 0..5 {
                loop {
                    if let Some(item) = consumer_queue.poll(Duration::from_millis(50)).await {
                        assert!(item.is_document());
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        consumer_processed.fetch_add(1, Ordering::SeqCst);
                        break;
                    }
                }
            }
        });

        let start = Instant::now();
        for i in 0..5 {
            queue.put(QueueItem::document(format!("doc-{i}"))).await.unwrap();
        }
        let elapsed = start.elapsed();

        consumer.await.unwrap();
        assert_eq!(processed.load(Ordering::SeqCst), 5);
        // With a slow consumer and capacity 2, posting 5 items cannot
        // complete instantly -- the producer must have blocked at least once.
        assert!(elapsed >= Duration::from_millis(20));
    }

    #[tokio::test]
    async fn poll_times_out_when_empty() {
        let queue = BoundedQueue::new(4);
        let result = queue.poll(Duration::from_millis(10)).await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn drain_to_collects_buffered_items_without_blocking() {
        let queue = BoundedQueue::new(4);
        queue.put(QueueItem::document("a")).await.unwrap();
        queue.put(QueueItem::document("b")).await.unwrap();
        let mut out = Vec::new();
        queue.drain_to(&mut out).await;
        assert_eq!(out.len(), 2);
    }
}
