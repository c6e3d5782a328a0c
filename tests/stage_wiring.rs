//! Integration test driving the full extract -> transform -> publish wiring
//! through the public API only, the way a caller outside the crate would:
//! build a driver, a pipeline, and a publisher registry, then hand them to
//! `TaskRunner::run_once` and check what came out the other end.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Duration as ChronoDuration;

use crawlforge::error::PublishError;
use crawlforge::model::Document;
use crawlforge::notify::LogNotifier;
use crawlforge::pipeline::{FieldProjection, TransformPipeline, TrimField};
use crawlforge::publish::batch::{BatchConfig, BatchPublisher};
use crawlforge::publish::index_client::IndexClient;
use crawlforge::publish::PublisherRegistry;
use crawlforge::service_timer::ServiceTimer;
use crawlforge::stages::extract::{CrawlPatterns, FilesystemDriver};
use crawlforge::task_runner::{CrawlState, StageSizing, TaskRunner};

/// Records every add, the way the crate's own internal tests do, but
/// defined here since the crate's `RecordingIndexClient` is test-only and
/// not part of the public surface this test is exercising.
#[derive(Default)]
struct RecordingIndexClient {
    adds: Mutex<Vec<Vec<String>>>,
}

#[async_trait]
impl IndexClient for RecordingIndexClient {
    async fn add(&self, _publisher: &str, docs: &[Document]) -> Result<(), PublishError> {
        self.adds.lock().unwrap().push(docs.iter().map(|d| d.id.clone()).collect());
        Ok(())
    }

    async fn commit(&self, _publisher: &str) -> Result<(), PublishError> {
        Ok(())
    }

    async fn optimize(&self, _publisher: &str) -> Result<(), PublishError> {
        Ok(())
    }
}

#[tokio::test]
async fn a_crawl_carries_three_documents_from_disk_to_the_index() {
    let tmp = tempfile::tempdir().unwrap();
    let source_root = tmp.path().join("source");
    tokio::fs::create_dir_all(&source_root).await.unwrap();
    tokio::fs::write(source_root.join("a.txt"), "one").await.unwrap();
    tokio::fs::write(source_root.join("b.txt"), "two").await.unwrap();
    tokio::fs::write(source_root.join("c.txt"), "three").await.unwrap();

    let crawl_queue = Arc::new(crawlforge::crawl_queue::CrawlQueue::new(tmp.path().join("crawl")));
    let timer = ServiceTimer::load(
        tmp.path().join("timer.json"),
        ChronoDuration::days(1),
        ChronoDuration::hours(1),
    )
    .await
    .unwrap();
    let runner = TaskRunner::new(crawl_queue, timer, Arc::new(LogNotifier));

    let recorder = Arc::new(RecordingIndexClient::default());
    let publisher = BatchPublisher::new(
        "solr-main",
        recorder.clone(),
        None,
        BatchConfig {
            batch_size: 2,
            ..BatchConfig::default()
        },
    );
    let registry = PublisherRegistry::new(vec!["solr-main".to_string()], vec![publisher]);

    let pipeline = Arc::new(TransformPipeline::new(vec![
        Box::new(TrimField::new("content")),
        Box::new(FieldProjection::new(vec![
            "id".to_string(),
            "location".to_string(),
            "content".to_string(),
        ])),
    ]));

    let driver = Box::new(FilesystemDriver::new(source_root, CrawlPatterns::default()));
    let sizing = StageSizing {
        extract_queue_len: 8,
        transform_queue_len: 8,
        publish_queue_len: 8,
        transform_workers: 2,
        publish_workers: 2,
        poll_timeout: std::time::Duration::from_secs(5),
    };

    let stats = runner
        .run_once(driver, pipeline, registry, sizing, "crawlforge", true)
        .await
        .unwrap();

    assert_eq!(stats.documents_completed, 3);
    assert_eq!(runner.state().await, CrawlState::Completed);
    let published: usize = recorder.adds.lock().unwrap().iter().map(|b| b.len()).sum();
    assert_eq!(published, 3);
    // the configured id prefix must show up on every published id
    assert!(recorder
        .adds
        .lock()
        .unwrap()
        .iter()
        .flatten()
        .all(|id| id.starts_with("crawlforge-")));
}
