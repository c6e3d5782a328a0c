//! NotificationSink: the external mail/notification collaborator.
//!
//! Stages and the supervisor report errors and end-of-crawl summaries
//! through this trait rather than depending on a concrete transport. No
//! SMTP client is implemented here; that transport is the out-of-scope
//! external collaborator named in ยง1. The teacher has no dedicated
//! notification module; it reports failures inline with `tracing::error!`/
//! `warn!` throughout `repository/*`, `services/*`, and `scrapers/*`. This
//! trait gives that same reporting a seam: `LogNotifier` keeps the teacher's
//! log-and-continue behavior, `TableNotifier` is this crate's own
//! test-recording implementation (no teacher analogue).

use async_trait::async_trait;
use tracing::error;

/// Summary counters reported once at the end of a crawl.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlSummary {
    pub crawl_id: u64,
    pub documents_extracted: u64,
    pub documents_published: u64,
    pub documents_dropped: u64,
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Reports a single document- or stage-level error as it happens.
    async fn notify_error(&self, doc_id: &str, phase: &str, message: &str);

    /// Reports the final tally once a crawl finishes, succeeds or not.
    async fn send_crawl_summary(&self, summary: &CrawlSummary);
}

/// Default sink: every notification becomes a structured `tracing` event.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl NotificationSink for LogNotifier {
    async fn notify_error(&self, doc_id: &str, phase: &str, message: &str) {
        error!(doc_id, phase, message, "pipeline error");
    }

    async fn send_crawl_summary(&self, summary: &CrawlSummary) {
        error!(
            crawl_id = summary.crawl_id,
            extracted = summary.documents_extracted,
            published = summary.documents_published,
            dropped = summary.documents_dropped,
            "crawl summary"
        );
    }
}

/// Accumulates an in-memory table of rows, so a real mail transport (or a
/// test) can inspect what would have been sent.
#[derive(Debug, Default)]
pub struct TableNotifier {
    errors: tokio::sync::Mutex<Vec<(String, String, String)>>,
    summaries: tokio::sync::Mutex<Vec<CrawlSummary>>,
}

impl TableNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn errors(&self) -> Vec<(String, String, String)> {
        self.errors.lock().await.clone()
    }

    pub async fn summaries(&self) -> Vec<CrawlSummary> {
        self.summaries.lock().await.clone()
    }
}

#[async_trait]
impl NotificationSink for TableNotifier {
    async fn notify_error(&self, doc_id: &str, phase: &str, message: &str) {
        self.errors
            .lock()
            .await
            .push((doc_id.to_string(), phase.to_string(), message.to_string()));
    }

    async fn send_crawl_summary(&self, summary: &CrawlSummary) {
        self.summaries.lock().await.push(summary.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn table_notifier_records_errors_and_summaries() {
        let notifier = TableNotifier::new();
        notifier.notify_error("doc-1", "transform", "boom").await;
        notifier
            .send_crawl_summary(&CrawlSummary {
                crawl_id: 1,
                documents_extracted: 10,
                documents_published: 9,
                documents_dropped: 1,
            })
            .await;

        let errors = notifier.errors().await;
        assert_eq!(errors, vec![("doc-1".to_string(), "transform".to_string(), "boom".to_string())]);
        assert_eq!(notifier.summaries().await.len(), 1);
    }

    #[tokio::test]
    async fn log_notifier_does_not_panic() {
        let notifier = LogNotifier;
        notifier.notify_error("doc-1", "publish", "oops").await;
        notifier.send_crawl_summary(&CrawlSummary::default()).await;
    }
}
