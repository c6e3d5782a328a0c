//! TaskRunner: the top-level supervisor. Evaluates readiness, starts the
//! four stages in dependency order, awaits completion via marker
//! propagation, and governs crawl cadence through the [`ServiceTimer`].
//! Grounded on the teacher's daemon sleep/reload loop in
//! `crates/foiacquire-cli/src/cli/commands/daemon.rs` (a `tokio::select!`
//! between a sleep timer and a cancellation signal) and its
//! `PipelineRunner` in `crates/foia/src/work_queue/runner.rs` (stages
//! started and joined in a fixed order).

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{watch, Mutex};
use tracing::{info, warn};

use crate::crawl_queue::{CrawlQueue, CrawlType};
use crate::error::TaskRunnerError;
use crate::notify::{CrawlSummary, NotificationSink};
use crate::pipeline::TransformPipeline;
use crate::publish::PublisherRegistry;
use crate::queue::{BoundedQueue, Phase, QueueItem};
use crate::service_timer::ServiceTimer;
use crate::stages::{CrawlStats, ExtractContext, ExtractDriver, ExtractStage, MetricsStage, PublishStage, TransformStage};

/// Per-crawl lifecycle, mirroring ยง4.8's state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlState {
    Idle,
    Starting,
    Running,
    Draining,
    Completed,
    Failed,
    Aborted,
}

/// Worker-pool sizes and queue capacities for one crawl.
#[derive(Debug, Clone, Copy)]
pub struct StageSizing {
    pub extract_queue_len: usize,
    pub transform_queue_len: usize,
    pub publish_queue_len: usize,
    pub transform_workers: usize,
    pub publish_workers: usize,
    pub poll_timeout: std::time::Duration,
}

pub struct TaskRunner {
    crawl_queue: Arc<CrawlQueue>,
    service_timer: Mutex<ServiceTimer>,
    notifier: Arc<dyn NotificationSink>,
    alive_tx: watch::Sender<bool>,
    alive_rx: watch::Receiver<bool>,
    state: Mutex<CrawlState>,
}

impl TaskRunner {
    pub fn new(
        crawl_queue: Arc<CrawlQueue>,
        service_timer: ServiceTimer,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        let (alive_tx, alive_rx) = watch::channel(true);
        Self {
            crawl_queue,
            service_timer: Mutex::new(service_timer),
            notifier,
            alive_tx,
            alive_rx,
            state: Mutex::new(CrawlState::Idle),
        }
    }

    pub async fn state(&self) -> CrawlState {
        *self.state.lock().await
    }

    /// Readiness check: configuration is assumed already validated by the
    /// caller; this additionally validates the pipeline and publishers,
    /// which depend on runtime-constructed instances the supervisor doesn't
    /// own.
    pub async fn check_ready(
        &self,
        pipeline: &TransformPipeline,
        registry: &PublisherRegistry,
    ) -> Result<(), TaskRunnerError> {
        if self.crawl_queue.crawl_id().await.is_some() {
            return Err(TaskRunnerError::NotReady("a crawl is already active".to_string()));
        }
        pipeline
            .validate()
            .map_err(|e| TaskRunnerError::NotReady(e.to_string()))?;
        registry.validate()?;
        Ok(())
    }

    /// Requests graceful shutdown: workers exit promptly at their next poll
    /// once `alive` flips false.
    pub fn request_shutdown(&self) {
        let _ = self.alive_tx.send(false);
    }

    /// Runs exactly one crawl to completion (or abort), driving all four
    /// stages. Returns the aggregated throughput stats on success.
    /// `update_timer` is false for a Snapshot pass, which runs the whole
    /// pipeline but must not move the full/incremental watermarks.
    pub async fn run_once(
        &self,
        extract_driver: Box<dyn ExtractDriver>,
        pipeline: Arc<TransformPipeline>,
        registry: PublisherRegistry,
        sizing: StageSizing,
        id_prefix: &str,
        update_timer: bool,
    ) -> Result<CrawlStats, TaskRunnerError> {
        *self.state.lock().await = CrawlState::Starting;
        self.check_ready(&pipeline, &registry).await?;

        let crawl_start = Utc::now();
        let crawl_type = self
            .service_timer
            .lock()
            .await
            .decide(crawl_start)
            .unwrap_or(CrawlType::Incremental);
        let watermark = self.service_timer.lock().await.watermark();

        self.crawl_queue.reset().await?;
        self.crawl_queue.start(crawl_type, watermark).await?;
        info!(?crawl_type, "crawl starting");

        let extract_q = BoundedQueue::new(sizing.extract_queue_len);
        let transform_q = BoundedQueue::new(sizing.transform_queue_len);
        let publish_q = BoundedQueue::new(sizing.publish_queue_len);

        // Consumers before producers: publish/metrics, then transform, then extract.
        let publish_stage = Arc::new(PublishStage::new(
            self.crawl_queue.clone(),
            registry,
            transform_q.clone(),
            publish_q.clone(),
            self.notifier.clone(),
            self.alive_rx.clone(),
            sizing.poll_timeout,
        ));
        let publish_handles = publish_stage.clone().spawn(sizing.publish_workers);

        let metrics_stage = MetricsStage::new(publish_q.clone(), sizing.poll_timeout);
        let metrics_handle = tokio::spawn(async move { metrics_stage.run().await });

        let transform_stage = Arc::new(TransformStage::new(
            self.crawl_queue.clone(),
            pipeline,
            extract_q.clone(),
            transform_q.clone(),
            self.notifier.clone(),
            self.alive_rx.clone(),
            sizing.poll_timeout,
        ));
        let transform_handles = transform_stage.spawn(sizing.transform_workers);

        *self.state.lock().await = CrawlState::Running;

        let extract_ctx = ExtractContext {
            crawl_queue: self.crawl_queue.clone(),
            queue: extract_q,
            identity: crate::identity::IdentityEncoder::new(id_prefix),
            alive: self.alive_rx.clone(),
            notifier: self.notifier.clone(),
        };
        let extract_stage = ExtractStage::new(extract_driver);
        let extract_result = extract_stage.run(&extract_ctx).await;

        *self.state.lock().await = CrawlState::Draining;

        for h in transform_handles {
            let _ = h.await;
        }
        for h in publish_handles {
            let _ = h.await;
        }
        publish_stage.shutdown().await?;
        let stats = metrics_handle.await.unwrap_or_default();

        if !*self.alive_rx.borrow() {
            *self.state.lock().await = CrawlState::Aborted;
            self.crawl_queue.finish(true).await?;
            self.notifier
                .send_crawl_summary(&CrawlSummary {
                    crawl_id: self.crawl_queue.crawl_id().await.unwrap_or(0),
                    documents_extracted: stats.extract.count,
                    documents_published: stats.publish.count,
                    documents_dropped: stats.extract.count.saturating_sub(stats.publish.count),
                })
                .await;
            return Err(TaskRunnerError::NotReady("crawl aborted".to_string()));
        }

        if let Err(err) = extract_result {
            warn!(error = %err, "extract driver reported an error");
        }

        let crawl_id = self.crawl_queue.crawl_id().await.unwrap_or(0);
        if update_timer {
            self.service_timer.lock().await.record_success(crawl_type, crawl_start).await?;
        }
        self.crawl_queue.finish(false).await?;
        *self.state.lock().await = CrawlState::Completed;

        self.notifier
            .send_crawl_summary(&CrawlSummary {
                crawl_id,
                documents_extracted: stats.extract.count,
                documents_published: stats.publish.count,
                documents_dropped: stats.extract.count.saturating_sub(stats.publish.count),
            })
            .await;

        info!(crawl_id, ?crawl_type, "crawl completed");
        Ok(stats)
    }

    /// Runs only the extract stage against a fresh crawl working directory,
    /// leaving its files on disk for a later single-phase `transform` or
    /// `publish` invocation to pick up.
    pub async fn run_extract_only(
        &self,
        extract_driver: Box<dyn ExtractDriver>,
        extract_queue_len: usize,
        id_prefix: &str,
    ) -> Result<(), TaskRunnerError> {
        *self.state.lock().await = CrawlState::Starting;
        self.crawl_queue.reset().await?;
        self.crawl_queue.start(CrawlType::Incremental, None).await?;

        *self.state.lock().await = CrawlState::Running;
        let extract_q = BoundedQueue::new(extract_queue_len);
        let extract_ctx = ExtractContext {
            crawl_queue: self.crawl_queue.clone(),
            queue: extract_q,
            identity: crate::identity::IdentityEncoder::new(id_prefix),
            alive: self.alive_rx.clone(),
            notifier: self.notifier.clone(),
        };
        let extract_stage = ExtractStage::new(extract_driver);
        if let Err(err) = extract_stage.run(&extract_ctx).await {
            warn!(error = %err, "extract-only pass reported an error");
        }

        self.crawl_queue.finish(true).await?;
        *self.state.lock().await = CrawlState::Completed;
        info!("extract-only pass completed");
        Ok(())
    }

    /// Runs only the transform stage: resumes the latest crawl working
    /// directory, seeds the transform queue from every document already
    /// staged in the extract sub-area, and leaves transformed files on disk.
    pub async fn run_transform_only(
        &self,
        pipeline: Arc<TransformPipeline>,
        sizing: StageSizing,
    ) -> Result<(), TaskRunnerError> {
        *self.state.lock().await = CrawlState::Starting;
        pipeline
            .validate()
            .map_err(|e| TaskRunnerError::NotReady(e.to_string()))?;
        let crawl_id = self
            .crawl_queue
            .resume_latest()
            .await?
            .ok_or_else(|| TaskRunnerError::NotReady("no prior crawl to resume".to_string()))?;

        let extract_q = BoundedQueue::new(sizing.extract_queue_len);
        let transform_q = BoundedQueue::new(sizing.transform_queue_len);
        for id in self.crawl_queue.list_ids("extract").await? {
            let _ = extract_q.put(QueueItem::document(id)).await;
        }
        let _ = extract_q.put(QueueItem::marker(Phase::Extract)).await;

        *self.state.lock().await = CrawlState::Running;
        let transform_stage = Arc::new(TransformStage::new(
            self.crawl_queue.clone(),
            pipeline,
            extract_q,
            transform_q,
            self.notifier.clone(),
            self.alive_rx.clone(),
            sizing.poll_timeout,
        ));
        for h in transform_stage.spawn(sizing.transform_workers) {
            let _ = h.await;
        }

        self.crawl_queue.finish(true).await?;
        *self.state.lock().await = CrawlState::Completed;
        info!(crawl_id, "transform-only pass completed");
        Ok(())
    }

    /// Runs only the publish stage (plus metrics): resumes the latest crawl
    /// working directory, seeds the publish queue from every document
    /// already staged in the transform sub-area, and finishes the crawl
    /// (records the service-timer watermark, since this is the terminal
    /// phase of a single-phase sequence).
    pub async fn run_publish_only(
        &self,
        registry: PublisherRegistry,
        sizing: StageSizing,
    ) -> Result<CrawlStats, TaskRunnerError> {
        *self.state.lock().await = CrawlState::Starting;
        registry.validate()?;
        let crawl_id = self
            .crawl_queue
            .resume_latest()
            .await?
            .ok_or_else(|| TaskRunnerError::NotReady("no prior crawl to resume".to_string()))?;
        let crawl_start = Utc::now();
        let crawl_type = self.crawl_queue.crawl_type().await.unwrap_or(CrawlType::Incremental);

        let transform_q = BoundedQueue::new(sizing.transform_queue_len);
        let publish_q = BoundedQueue::new(sizing.publish_queue_len);
        for id in self.crawl_queue.list_ids("transform").await? {
            let _ = transform_q.put(QueueItem::document(id)).await;
        }
        let _ = transform_q.put(QueueItem::marker(Phase::Transform)).await;

        *self.state.lock().await = CrawlState::Running;
        let publish_stage = Arc::new(PublishStage::new(
            self.crawl_queue.clone(),
            registry,
            transform_q,
            publish_q.clone(),
            self.notifier.clone(),
            self.alive_rx.clone(),
            sizing.poll_timeout,
        ));
        let publish_handles = publish_stage.clone().spawn(sizing.publish_workers);
        let metrics_stage = MetricsStage::new(publish_q, sizing.poll_timeout);
        let metrics_handle = tokio::spawn(async move { metrics_stage.run().await });

        for h in publish_handles {
            let _ = h.await;
        }
        publish_stage.shutdown().await?;
        let stats = metrics_handle.await.unwrap_or_default();

        self.service_timer.lock().await.record_success(crawl_type, crawl_start).await?;
        self.crawl_queue.finish(false).await?;
        *self.state.lock().await = CrawlState::Completed;
        info!(crawl_id, "publish-only pass completed");
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::LogNotifier;
    use crate::pipeline::FeatureDefault;
    use crate::publish::batch::{BatchConfig, BatchPublisher};
    use crate::publish::index_client::RecordingIndexClient;
    use crate::stages::extract::{CrawlPatterns, FilesystemDriver};
    use chrono::Duration as ChronoDuration;

    #[tokio::test]
    async fn run_once_drives_a_crawl_end_to_end_and_reaches_completed() {
        let tmp = tempfile::tempdir().unwrap();
        let source_root = tmp.path().join("source");
        tokio::fs::create_dir_all(&source_root).await.unwrap();
        tokio::fs::write(source_root.join("a.txt"), "hello").await.unwrap();
        tokio::fs::write(source_root.join("b.txt"), "world").await.unwrap();

        let crawl_queue = Arc::new(CrawlQueue::new(tmp.path().join("crawl")));
        let timer = ServiceTimer::load(
            tmp.path().join("timer.json"),
            ChronoDuration::days(1),
            ChronoDuration::hours(1),
        )
        .await
        .unwrap();
        let runner = TaskRunner::new(crawl_queue, timer, Arc::new(LogNotifier));

        let recorder = Arc::new(RecordingIndexClient::default());
        let publisher = BatchPublisher::new("solr-main", recorder.clone(), None, BatchConfig::default());
        let registry = PublisherRegistry::new(vec!["solr-main".to_string()], vec![publisher]);

        let pipeline = Arc::new(TransformPipeline::new(vec![Box::new(FeatureDefault::new(
            "is-content",
            "true",
        ))]));

        let driver = Box::new(FilesystemDriver::new(source_root, CrawlPatterns::default()));
        let sizing = StageSizing {
            extract_queue_len: 8,
            transform_queue_len: 8,
            publish_queue_len: 8,
            transform_workers: 2,
            publish_workers: 1,
            poll_timeout: std::time::Duration::from_secs(5),
        };

        let stats = runner.run_once(driver, pipeline, registry, sizing, "", true).await.unwrap();
        assert_eq!(stats.documents_completed, 2);
        assert_eq!(runner.state().await, CrawlState::Completed);
        assert_eq!(recorder.adds.lock().unwrap().iter().map(|b| b.len()).sum::<usize>(), 2);
    }

    #[tokio::test]
    async fn single_phase_methods_chain_through_the_same_working_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let source_root = tmp.path().join("source");
        tokio::fs::create_dir_all(&source_root).await.unwrap();
        tokio::fs::write(source_root.join("a.txt"), "hello").await.unwrap();
        tokio::fs::write(source_root.join("b.txt"), "world").await.unwrap();

        let crawl_queue = Arc::new(CrawlQueue::new(tmp.path().join("crawl")));
        let timer = ServiceTimer::load(
            tmp.path().join("timer.json"),
            ChronoDuration::days(1),
            ChronoDuration::hours(1),
        )
        .await
        .unwrap();
        let runner = TaskRunner::new(crawl_queue, timer, Arc::new(LogNotifier));
        let sizing = StageSizing {
            extract_queue_len: 8,
            transform_queue_len: 8,
            publish_queue_len: 8,
            transform_workers: 2,
            publish_workers: 1,
            poll_timeout: std::time::Duration::from_secs(5),
        };

        let driver = Box::new(FilesystemDriver::new(source_root, CrawlPatterns::default()));
        runner.run_extract_only(driver, sizing.extract_queue_len, "").await.unwrap();
        assert_eq!(runner.state().await, CrawlState::Completed);

        let pipeline = Arc::new(TransformPipeline::new(vec![Box::new(FeatureDefault::new(
            "is-content",
            "true",
        ))]));
        runner.run_transform_only(pipeline, sizing).await.unwrap();
        assert_eq!(runner.state().await, CrawlState::Completed);

        let recorder = Arc::new(RecordingIndexClient::default());
        let publisher = BatchPublisher::new("solr-main", recorder.clone(), None, BatchConfig::default());
        let registry = PublisherRegistry::new(vec!["solr-main".to_string()], vec![publisher]);
        let stats = runner.run_publish_only(registry, sizing).await.unwrap();

        assert_eq!(stats.documents_completed, 2);
        assert_eq!(recorder.adds.lock().unwrap().iter().map(|b| b.len()).sum::<usize>(), 2);
        assert_eq!(runner.state().await, CrawlState::Completed);
    }

    #[tokio::test]
    async fn request_shutdown_aborts_an_in_flight_crawl() {
        let tmp = tempfile::tempdir().unwrap();
        let source_root = tmp.path().join("source");
        tokio::fs::create_dir_all(&source_root).await.unwrap();
        tokio::fs::write(source_root.join("a.txt"), "hello").await.unwrap();

        let crawl_queue = Arc::new(CrawlQueue::new(tmp.path().join("crawl")));
        let timer = ServiceTimer::load(
            tmp.path().join("timer.json"),
            ChronoDuration::days(1),
            ChronoDuration::hours(1),
        )
        .await
        .unwrap();
        let runner = TaskRunner::new(crawl_queue, timer, Arc::new(LogNotifier));

        let recorder = Arc::new(RecordingIndexClient::default());
        let publisher = BatchPublisher::new("solr-main", recorder.clone(), None, BatchConfig::default());
        let registry = PublisherRegistry::new(vec!["solr-main".to_string()], vec![publisher]);
        let pipeline = Arc::new(TransformPipeline::new(vec![Box::new(FeatureDefault::new(
            "is-content",
            "true",
        ))]));
        let driver = Box::new(FilesystemDriver::new(source_root, CrawlPatterns::default()));
        let sizing = StageSizing {
            extract_queue_len: 8,
            transform_queue_len: 8,
            publish_queue_len: 8,
            transform_workers: 1,
            publish_workers: 1,
            poll_timeout: std::time::Duration::from_secs(5),
        };

        // A shutdown requested before a worker ever polls `alive` models a
        // SIGTERM that lands the moment the crawl starts: every stage must
        // still see the flag and the crawl must end Aborted, not Completed.
        runner.request_shutdown();
        let err = runner
            .run_once(driver, pipeline, registry, sizing, "", true)
            .await
            .unwrap_err();
        assert!(matches!(err, TaskRunnerError::NotReady(ref msg) if msg == "crawl aborted"));
        assert_eq!(runner.state().await, CrawlState::Aborted);
    }

    #[tokio::test]
    async fn check_ready_rejects_an_empty_pipeline_registry() {
        let tmp = tempfile::tempdir().unwrap();
        let crawl_queue = Arc::new(CrawlQueue::new(tmp.path()));
        let timer = ServiceTimer::load(
            tmp.path().join("timer.json"),
            ChronoDuration::days(1),
            ChronoDuration::hours(1),
        )
        .await
        .unwrap();
        let runner = TaskRunner::new(crawl_queue, timer, Arc::new(LogNotifier));
        let pipeline = TransformPipeline::new(vec![]);
        let registry = PublisherRegistry::new(vec![], vec![]);
        assert!(runner.check_ready(&pipeline, &registry).await.is_err());
    }
}
