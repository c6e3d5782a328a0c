//! Publisher registry: resolves configured publisher names to running
//! [`BatchPublisher`] instances and fans a document out to all of them in
//! the configured order. Grounded on the name -> instance map shape of the
//! teacher's `SourceRegistry` in `src/discovery/sources/mod.rs`; the
//! fail-before-any-work-starts validation here is this crate's own addition,
//! since the teacher's registry has no upfront check.

pub mod archive;
pub mod batch;
pub mod index_client;

pub use archive::ArchiveWriter;
pub use batch::{BatchConfig, BatchPublisher};
pub use index_client::{IndexClient, SolrClient, SolrConfig};

use crate::error::PublishError;
use crate::model::Document;

/// An ordered set of publishers, selected by the `pipe_line` configuration
/// key, that a document is sent through on its way out of the pipeline.
pub struct PublisherRegistry {
    pipeline: Vec<String>,
    publishers: std::collections::HashMap<String, BatchPublisher>,
}

impl PublisherRegistry {
    /// `pipeline` is the configured ordered list of publisher names;
    /// `publishers` are the instantiated publishers available by name.
    pub fn new(pipeline: Vec<String>, publishers: Vec<BatchPublisher>) -> Self {
        let publishers = publishers
            .into_iter()
            .map(|p| (p.name().to_string(), p))
            .collect();
        Self { pipeline, publishers }
    }

    /// Every name in `pipeline` must resolve to an instantiated publisher.
    /// Called once during the readiness check, before any crawl starts.
    pub fn validate(&self) -> Result<(), PublishError> {
        if self.pipeline.is_empty() {
            return Err(PublishError::EmptyPipeline);
        }
        for name in &self.pipeline {
            if !self.publishers.contains_key(name) {
                return Err(PublishError::UnknownPublisher(name.clone()));
            }
        }
        Ok(())
    }

    /// Sends `doc` to each configured publisher's `add` in order. A failing
    /// publisher does not stop the document from reaching the rest of the
    /// pipeline; the first error encountered is returned after every
    /// publisher has had a chance to receive the document.
    pub async fn send(&mut self, doc: &Document) -> Result<(), PublishError> {
        let mut first_err = None;
        for name in self.pipeline.clone() {
            if let Some(publisher) = self.publishers.get_mut(&name) {
                if let Err(err) = publisher.add(doc.clone()).await {
                    first_err.get_or_insert(err);
                }
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Flushes and commits every publisher, in configured order.
    pub async fn shutdown(&mut self) -> Result<(), PublishError> {
        for name in self.pipeline.clone() {
            if let Some(publisher) = self.publishers.get_mut(&name) {
                publisher.shutdown().await?;
            }
        }
        Ok(())
    }
}
