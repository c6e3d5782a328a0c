//! BatchPublisher: per-publisher buffering, commit cadence, and the
//! max-document cap. Grounded on the batch-then-flush shape of
//! `crates/foia-analysis/src/services/analysis/stages.rs::TextExtractionStage::run_chunk`
//! (fetch up to a batch limit, process, advance, repeat); the separate
//! commit cadence from the flush threshold has no teacher analogue and is
//! this crate's own addition to match a Solr-style index's commit cost.

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::PublishError;
use crate::model::Document;
use crate::publish::archive::ArchiveWriter;
use crate::publish::index_client::IndexClient;

/// Static thresholds for one publisher, mirroring the `<prefix>.publish.*`
/// configuration keys.
#[derive(Debug, Clone, Copy)]
pub struct BatchConfig {
    pub batch_size: usize,
    pub commit_every: u64,
    /// 0 means unlimited, per the spec's "max=unlimited when <=0" default.
    pub max_docs: u64,
    pub upload_enabled: bool,
    pub optimize_upon_completion: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            commit_every: 10_000,
            max_docs: 0,
            upload_enabled: true,
            optimize_upon_completion: false,
        }
    }
}

/// Buffers documents for one named publisher and drives the index client and
/// optional archive writer on its behalf.
pub struct BatchPublisher {
    name: String,
    index: Arc<dyn IndexClient>,
    archive: Option<ArchiveWriter>,
    config: BatchConfig,
    batch: Vec<Document>,
    sent: u64,
}

impl BatchPublisher {
    pub fn new(
        name: impl Into<String>,
        index: Arc<dyn IndexClient>,
        archive: Option<ArchiveWriter>,
        config: BatchConfig,
    ) -> Self {
        Self {
            name: name.into(),
            index,
            archive,
            config,
            batch: Vec::new(),
            sent: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sent(&self) -> u64 {
        self.sent
    }

    /// Buffers `doc`, silently dropping it once `max_docs` has been reached,
    /// flushing the batch once it reaches `batch_size`, and issuing a commit
    /// each time `sent` crosses a multiple of `commit_every`.
    pub async fn add(&mut self, doc: Document) -> Result<(), PublishError> {
        if self.config.max_docs > 0 && self.sent >= self.config.max_docs {
            return Ok(());
        }

        let prev_sent = self.sent;
        self.batch.push(doc);
        self.sent += 1;

        if self.batch.len() >= self.config.batch_size {
            self.flush_batch().await?;
        }

        if self.config.upload_enabled
            && self.config.commit_every > 0
            && prev_sent / self.config.commit_every != self.sent / self.config.commit_every
        {
            self.commit().await?;
        }
        Ok(())
    }

    async fn flush_batch(&mut self) -> Result<(), PublishError> {
        if self.batch.is_empty() {
            return Ok(());
        }
        if self.config.upload_enabled {
            self.index.add(&self.name, &self.batch).await?;
        }
        if let Some(archive) = self.archive.as_mut() {
            archive.write_batch(&self.batch).await?;
        }
        info!(publisher = %self.name, count = self.batch.len(), "flushed batch");
        self.batch.clear();
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), PublishError> {
        if self.config.upload_enabled {
            self.index.commit(&self.name).await?;
        }
        if let Some(archive) = self.archive.as_ref() {
            archive.append_commit_marker().await?;
        }
        info!(publisher = %self.name, sent = self.sent, "committed");
        Ok(())
    }

    /// Flushes any residual batch, then commits unconditionally.
    pub async fn flush_and_commit(&mut self) -> Result<(), PublishError> {
        self.flush_batch().await?;
        self.commit().await
    }

    /// Flushes, commits, and optionally optimizes before this publisher is
    /// dropped. Per the at-least-once error policy, a failure here is logged
    /// by the caller rather than rolling back buffered state.
    pub async fn shutdown(&mut self) -> Result<(), PublishError> {
        self.flush_and_commit().await?;
        if self.config.optimize_upon_completion && self.config.upload_enabled {
            if let Err(err) = self.index.optimize(&self.name).await {
                warn!(publisher = %self.name, error = %err, "optimize failed");
                return Err(err);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FieldDef, Schema};
    use crate::publish::index_client::RecordingIndexClient;

    fn sample_doc(id: &str) -> Document {
        Document::new(id, "page", Schema::new(vec![FieldDef::primary_key("id")]))
    }

    /// S2: batch=3, commit=5, max=unlimited. 8 documents in.
    #[tokio::test]
    async fn batches_of_three_commit_at_five_and_at_final_flush() {
        let recorder = Arc::new(RecordingIndexClient::default());
        let config = BatchConfig {
            batch_size: 3,
            commit_every: 5,
            max_docs: 0,
            upload_enabled: true,
            optimize_upon_completion: false,
        };
        let mut publisher = BatchPublisher::new("solr-main", recorder.clone(), None, config);

        for i in 1..=8 {
            publisher.add(sample_doc(&format!("doc-{i}"))).await.unwrap();
        }
        publisher.shutdown().await.unwrap();

        let adds = recorder.adds.lock().unwrap();
        assert_eq!(
            *adds,
            vec![
                vec!["doc-1", "doc-2", "doc-3"],
                vec!["doc-4", "doc-5", "doc-6"],
                vec!["doc-7", "doc-8"],
            ]
        );
        assert_eq!(*recorder.commits.lock().unwrap(), 2);
        assert_eq!(publisher.sent(), 8);
    }

    /// S3: batch=100, commit=10000, max=50. 100 documents offered.
    #[tokio::test]
    async fn max_docs_cap_silently_drops_the_rest() {
        let recorder = Arc::new(RecordingIndexClient::default());
        let config = BatchConfig {
            batch_size: 100,
            commit_every: 10_000,
            max_docs: 50,
            upload_enabled: true,
            optimize_upon_completion: false,
        };
        let mut publisher = BatchPublisher::new("solr-main", recorder.clone(), None, config);

        for i in 1..=100 {
            publisher.add(sample_doc(&format!("doc-{i}"))).await.unwrap();
        }
        publisher.shutdown().await.unwrap();

        assert_eq!(publisher.sent(), 50);
        let adds = recorder.adds.lock().unwrap();
        let total_added: usize = adds.iter().map(|b| b.len()).sum();
        assert_eq!(total_added, 50);
        assert_eq!(*recorder.commits.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn shutdown_with_no_documents_issues_no_add_and_one_commit() {
        let recorder = Arc::new(RecordingIndexClient::default());
        let mut publisher =
            BatchPublisher::new("solr-main", recorder.clone(), None, BatchConfig::default());
        publisher.shutdown().await.unwrap();
        assert!(recorder.adds.lock().unwrap().is_empty());
        assert_eq!(*recorder.commits.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn upload_disabled_skips_index_calls_but_still_archives() {
        let tmp = tempfile::tempdir().unwrap();
        let recorder = Arc::new(RecordingIndexClient::default());
        let archive = ArchiveWriter::new(tmp.path(), "solr-main");
        let config = BatchConfig {
            batch_size: 2,
            commit_every: 2,
            max_docs: 0,
            upload_enabled: false,
            optimize_upon_completion: false,
        };
        let mut publisher =
            BatchPublisher::new("solr-main", recorder.clone(), Some(archive), config);
        publisher.add(sample_doc("a")).await.unwrap();
        publisher.add(sample_doc("b")).await.unwrap();
        publisher.shutdown().await.unwrap();

        assert!(recorder.adds.lock().unwrap().is_empty());
        assert_eq!(*recorder.commits.lock().unwrap(), 0);
        assert!(tmp.path().join("solr-0.xml").exists());
    }
}
