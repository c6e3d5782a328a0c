//! CrawlQueue: the disk-backed staging area between pipeline stages.
//!
//! Maintains four named sub-areas (extract, transform, publish, archive)
//! under a per-crawl working directory, and moves a document's serialized
//! file between them atomically as it progresses through phases. Grounded on
//! the teacher's per-id state tracking in `src/repository/crawl/mod.rs` and
//! the hash-sharded path layout in `src/storage.rs`, adapted from a SQLite
//! row store to a plain file tree since this spec's queue has no query
//! surface of its own.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tokio::fs;
use tracing::{info, warn};

use crate::error::CrawlQueueError;
use crate::model::{xml, Document};
use crate::queue::{BoundedQueue, Phase, QueueItem, QueueClosed};

const EXTRACT: &str = "extract";
const TRANSFORM: &str = "transform";
const PUBLISH: &str = "publish";
const ARCHIVE: &str = "archive";
const NEXT_ID_FILE: &str = ".next_crawl_id";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlType {
    Full,
    Incremental,
}

#[derive(Debug, Clone)]
struct ActiveCrawl {
    crawl_id: u64,
    crawl_type: CrawlType,
    watermark: Option<DateTime<Utc>>,
    working_dir: PathBuf,
}

/// Disk-backed staging area rooted at a configured install path
/// (`<root>/<crawl-id>/{extract,transform,publish,archive}/`).
pub struct CrawlQueue {
    root: PathBuf,
    active: tokio::sync::Mutex<Option<ActiveCrawl>>,
}

impl CrawlQueue {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            active: tokio::sync::Mutex::new(None),
        }
    }

    /// Assigns a fresh, monotonic crawl id, clears any prior residue, creates
    /// the four phase sub-directories, and marks the queue active.
    pub async fn start(
        &self,
        crawl_type: CrawlType,
        watermark: Option<DateTime<Utc>>,
    ) -> Result<u64, CrawlQueueError> {
        let mut guard = self.active.lock().await;
        if let Some(existing) = guard.as_ref() {
            return Err(CrawlQueueError::AlreadyActive(existing.crawl_id));
        }

        let crawl_id = self.next_crawl_id().await?;
        let working_dir = self.root.join(crawl_id.to_string());
        if working_dir.exists() {
            fs::remove_dir_all(&working_dir)
                .await
                .map_err(|source| io_err(&working_dir, source))?;
        }
        for sub in [EXTRACT, TRANSFORM, PUBLISH, ARCHIVE] {
            let dir = working_dir.join(sub);
            fs::create_dir_all(&dir)
                .await
                .map_err(|source| io_err(&dir, source))?;
        }

        info!(crawl_id, ?crawl_type, "crawl queue started");
        *guard = Some(ActiveCrawl {
            crawl_id,
            crawl_type,
            watermark,
            working_dir,
        });
        Ok(crawl_id)
    }

    async fn next_crawl_id(&self) -> Result<u64, CrawlQueueError> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|source| io_err(&self.root, source))?;
        let counter_path = self.root.join(NEXT_ID_FILE);
        let current: u64 = match fs::read_to_string(&counter_path).await {
            Ok(s) => s.trim().parse().unwrap_or(0),
            Err(_) => 0,
        };
        let next = current + 1;
        write_atomic(&counter_path, next.to_string().as_bytes()).await?;
        Ok(next)
    }

    /// Returns the absolute file path for `id` within `phase`.
    pub async fn doc_path(&self, phase: &str, id: &str) -> Result<PathBuf, CrawlQueueError> {
        let guard = self.active.lock().await;
        let active = guard.as_ref().ok_or(CrawlQueueError::NotActive)?;
        Ok(active.working_dir.join(phase).join(format!("{id}.xml")))
    }

    /// Serializes `document` into `to_phase`'s file, then removes the
    /// `from_phase` file. The target is written durably (temp file + rename)
    /// before the source is ever touched, so a crash mid-transition leaves
    /// the document recoverable in exactly one phase.
    pub async fn transition(
        &self,
        from_phase: &str,
        to_phase: &str,
        document: &Document,
        id: &str,
    ) -> Result<(), CrawlQueueError> {
        let target = self.doc_path(to_phase, id).await?;
        let xml = xml::to_xml(document);
        write_atomic(&target, xml.as_bytes()).await?;

        let source = self.doc_path(from_phase, id).await?;
        if !source.exists() {
            warn!(id, from_phase, "source file missing during transition");
            return Err(CrawlQueueError::MissingSourceFile {
                id: id.to_string(),
                phase: from_phase.to_string(),
            });
        }
        fs::remove_file(&source)
            .await
            .map_err(|source_err| io_err(&source, source_err))?;
        Ok(())
    }

    /// Loads and deserializes the document staged for `id` in `phase`.
    pub async fn load_document(&self, phase: &str, id: &str) -> Result<Document, CrawlQueueError> {
        let path = self.doc_path(phase, id).await?;
        let contents = fs::read_to_string(&path)
            .await
            .map_err(|source| io_err(&path, source))?;
        xml::from_xml(&contents).map_err(CrawlQueueError::Deserialize)
    }

    /// Writes `document` into `phase` without expecting a prior-phase file
    /// (the initial extract write).
    pub async fn store_new(
        &self,
        phase: &str,
        document: &Document,
        id: &str,
    ) -> Result<(), CrawlQueueError> {
        let target = self.doc_path(phase, id).await?;
        write_atomic(&target, xml::to_xml(document).as_bytes()).await
    }

    /// Posts the end-of-phase marker for `phase` onto `queue`.
    pub async fn put_marker(&self, queue: &BoundedQueue, phase: Phase) -> Result<(), QueueClosed> {
        queue.put(QueueItem::marker(phase)).await
    }

    pub fn is_item_document(item: &QueueItem) -> bool {
        item.is_document()
    }

    pub fn is_item_marker(item: &QueueItem) -> bool {
        item.is_marker()
    }

    pub fn is_phase_complete(item: &QueueItem, expected_phase: Phase) -> bool {
        item.is_phase_complete(expected_phase)
    }

    /// Marks the queue inactive, optionally purging the working directory.
    pub async fn finish(&self, keep_files: bool) -> Result<(), CrawlQueueError> {
        let mut guard = self.active.lock().await;
        if let Some(active) = guard.take() {
            if !keep_files {
                let _ = fs::remove_dir_all(&active.working_dir).await;
            }
            info!(crawl_id = active.crawl_id, keep_files, "crawl queue finished");
        }
        Ok(())
    }

    /// Forcibly clears any prior active state, regardless of lifecycle.
    pub async fn reset(&self) -> Result<(), CrawlQueueError> {
        let mut guard = self.active.lock().await;
        if let Some(active) = guard.take() {
            let _ = fs::remove_dir_all(&active.working_dir).await;
        }
        Ok(())
    }

    pub async fn crawl_id(&self) -> Option<u64> {
        self.active.lock().await.as_ref().map(|a| a.crawl_id)
    }

    /// Lists document ids currently staged in `phase`, for single-phase runs
    /// that pick up where a prior invocation left off instead of driving the
    /// whole pipeline.
    pub async fn list_ids(&self, phase: &str) -> Result<Vec<String>, CrawlQueueError> {
        let guard = self.active.lock().await;
        let active = guard.as_ref().ok_or(CrawlQueueError::NotActive)?;
        let dir = active.working_dir.join(phase);
        let mut entries = fs::read_dir(&dir).await.map_err(|source| io_err(&dir, source))?;
        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|source| io_err(&dir, source))? {
            if let Some(stem) = entry.path().file_stem().and_then(|s| s.to_str()) {
                ids.push(stem.to_string());
            }
        }
        Ok(ids)
    }

    /// Resumes the most recently created crawl working directory still on
    /// disk (left behind by a prior single-phase run with `finish(true)`),
    /// marking it active without touching its contents. Returns `None` if no
    /// prior working directory exists.
    pub async fn resume_latest(&self) -> Result<Option<u64>, CrawlQueueError> {
        let mut guard = self.active.lock().await;
        if let Some(existing) = guard.as_ref() {
            return Ok(Some(existing.crawl_id));
        }
        fs::create_dir_all(&self.root).await.map_err(|source| io_err(&self.root, source))?;
        let mut entries = fs::read_dir(&self.root).await.map_err(|source| io_err(&self.root, source))?;
        let mut latest: Option<u64> = None;
        while let Some(entry) = entries.next_entry().await.map_err(|source| io_err(&self.root, source))? {
            if let Some(id) = entry.file_name().to_str().and_then(|s| s.parse::<u64>().ok()) {
                latest = Some(latest.map_or(id, |cur| cur.max(id)));
            }
        }
        let Some(crawl_id) = latest else { return Ok(None) };
        let working_dir = self.root.join(crawl_id.to_string());
        info!(crawl_id, "crawl queue resumed");
        *guard = Some(ActiveCrawl {
            crawl_id,
            crawl_type: CrawlType::Incremental,
            watermark: None,
            working_dir,
        });
        Ok(Some(crawl_id))
    }

    pub async fn crawl_type(&self) -> Option<CrawlType> {
        self.active.lock().await.as_ref().map(|a| a.crawl_type)
    }

    pub async fn watermark(&self) -> Option<DateTime<Utc>> {
        self.active.lock().await.as_ref().and_then(|a| a.watermark)
    }
}

/// Write `contents` to `path` by writing a sibling temp file and renaming it
/// into place, so a reader never observes a partially-written file.
async fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), CrawlQueueError> {
    let parent = path.parent().ok_or_else(|| CrawlQueueError::Io {
        path: path.to_path_buf(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no parent"),
    })?;
    fs::create_dir_all(parent)
        .await
        .map_err(|source| io_err(parent, source))?;
    let tmp_path = parent.join(format!(
        ".{}.tmp",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("doc")
    ));
    fs::write(&tmp_path, contents)
        .await
        .map_err(|source| io_err(&tmp_path, source))?;
    fs::rename(&tmp_path, path)
        .await
        .map_err(|source| io_err(path, source))?;
    Ok(())
}

fn io_err(path: &Path, source: std::io::Error) -> CrawlQueueError {
    CrawlQueueError::Io {
        path: path.to_path_buf(),
        source,
    }
}
