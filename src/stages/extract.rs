//! ExtractStage: the producer side of the pipeline. Drives an
//! [`ExtractDriver`], which writes document files into the extract sub-area
//! and posts document items to the extract queue, exactly like the BoundedQueue
//! contract in ยง4.3. Grounded on the teacher's configurable scraper discovery
//! loop in `src/scrapers/configurable/discovery.rs` and the HTTP client in
//! `src/scrapers/http_client/mod.rs` (single reusable `reqwest::Client`,
//! politeness delay applied after every fetch).

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use regex::Regex;
use tokio::sync::watch;
use tracing::{info, warn};
use url::Url;

use crate::crawl_queue::CrawlQueue;
use crate::error::ExtractError;
use crate::identity::IdentityEncoder;
use crate::model::{Document, FieldDef, Row, Schema};
use crate::notify::NotificationSink;
use crate::queue::{BoundedQueue, Phase, QueueItem};

/// Follow/ignore location filtering, shared by every driver.
#[derive(Debug, Clone, Default)]
pub struct CrawlPatterns {
    follow: Vec<Regex>,
    ignore: Vec<Regex>,
}

impl CrawlPatterns {
    pub fn new(follow: &[String], ignore: &[String]) -> Result<Self, ExtractError> {
        let compile = |patterns: &[String]| -> Result<Vec<Regex>, ExtractError> {
            patterns
                .iter()
                .map(|p| {
                    Regex::new(p).map_err(|e| ExtractError::InvalidPattern {
                        pattern: p.clone(),
                        message: e.to_string(),
                    })
                })
                .collect()
        };
        Ok(Self {
            follow: compile(follow)?,
            ignore: compile(ignore)?,
        })
    }

    /// A location is visited only if it matches at least one follow pattern
    /// (or no follow patterns were configured, meaning "follow everything")
    /// and matches no ignore pattern.
    pub fn should_visit(&self, location: &str) -> bool {
        let follows = self.follow.is_empty() || self.follow.iter().any(|r| r.is_match(location));
        let ignored = self.ignore.iter().any(|r| r.is_match(location));
        follows && !ignored
    }
}

/// Shared context handed to an [`ExtractDriver`] by [`ExtractStage`].
pub struct ExtractContext {
    pub crawl_queue: Arc<CrawlQueue>,
    pub queue: BoundedQueue,
    pub identity: IdentityEncoder,
    pub alive: watch::Receiver<bool>,
    pub notifier: Arc<dyn NotificationSink>,
}

impl ExtractContext {
    pub fn is_alive(&self) -> bool {
        *self.alive.borrow()
    }

    /// Stores a freshly discovered document and posts it to the extract
    /// queue with its elapsed extraction time, applying backpressure via the
    /// queue's blocking put.
    pub async fn emit(&self, document: Document, elapsed: Duration) -> Result<(), ExtractError> {
        let id = document.id.clone();
        self.crawl_queue
            .store_new("extract", &document, &id)
            .await
            .map_err(|e| ExtractError::Io {
                path: PathBuf::new(),
                source: std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
            })?;
        let item = QueueItem::document(id).with_timing(Phase::Extract, elapsed.as_millis() as u64);
        if self.queue.put(item).await.is_err() {
            warn!("extract queue closed while posting document");
        }
        Ok(())
    }
}

/// The driver contract: source-specific discovery logic that terminates by
/// posting the extract-phase marker as its last queue operation.
#[async_trait]
pub trait ExtractDriver: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, ctx: &ExtractContext) -> Result<(), ExtractError>;
}

/// Owns the driver and exposes the stage boundary the runner calls.
pub struct ExtractStage {
    driver: Box<dyn ExtractDriver>,
}

impl ExtractStage {
    pub fn new(driver: Box<dyn ExtractDriver>) -> Self {
        Self { driver }
    }

    /// Runs the driver to completion, guaranteeing the extract-phase marker
    /// is posted exactly once even if the driver returns an error partway
    /// through (a partial extract on disk is acceptable per ยง4.3.4).
    pub async fn run(&self, ctx: &ExtractContext) -> Result<(), ExtractError> {
        let result = self.driver.run(ctx).await;
        if let Err(err) = &result {
            warn!(driver = self.driver.name(), error = %err, "extract driver failed");
            ctx.notifier
                .notify_error("", "extract", &err.to_string())
                .await;
        }
        if ctx.queue.put(QueueItem::marker(Phase::Extract)).await.is_err() {
            warn!("extract queue closed while posting finish marker");
        }
        result
    }
}

fn page_schema() -> Schema {
    Schema::new(vec![
        FieldDef::primary_key("id"),
        FieldDef::text("location"),
        FieldDef::text("content"),
    ])
}

/// Walks a root directory, honoring follow/ignore patterns matched against
/// each entry's path, and emits one document per regular file.
pub struct FilesystemDriver {
    root: PathBuf,
    patterns: CrawlPatterns,
}

impl FilesystemDriver {
    pub fn new(root: impl Into<PathBuf>, patterns: CrawlPatterns) -> Self {
        Self {
            root: root.into(),
            patterns,
        }
    }

    async fn walk(&self, dir: &Path, ctx: &ExtractContext) -> Result<(), ExtractError> {
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|source| ExtractError::Io { path: dir.to_path_buf(), source })?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|source| ExtractError::Io { path: dir.to_path_buf(), source })?
        {
            if !ctx.is_alive() {
                return Ok(());
            }
            let path = entry.path();
            let location = path.to_string_lossy().to_string();
            if !self.patterns.should_visit(&location) {
                continue;
            }
            let file_type = entry
                .file_type()
                .await
                .map_err(|source| ExtractError::Io { path: path.clone(), source })?;
            if file_type.is_dir() {
                Box::pin(self.walk(&path, ctx)).await?;
                continue;
            }
            let start = Instant::now();
            let contents = tokio::fs::read_to_string(&path).await.unwrap_or_default();
            let id = ctx.identity.encode(&location);
            let mut doc = Document::new(id, "file", page_schema());
            let mut row: Row = Row::new();
            row.insert("id".into(), vec![doc.id.clone()]);
            row.insert("location".into(), vec![location.clone()]);
            row.insert("content".into(), vec![contents]);
            doc.rows.push(row);
            ctx.emit(doc, start.elapsed()).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ExtractDriver for FilesystemDriver {
    fn name(&self) -> &str {
        "filesystem"
    }

    async fn run(&self, ctx: &ExtractContext) -> Result<(), ExtractError> {
        self.walk(&self.root.clone(), ctx).await
    }
}

/// Configuration for [`WebCrawlDriver`], mirroring the `extract.*` crawl keys.
#[derive(Debug, Clone)]
pub struct WebCrawlConfig {
    pub seeds: Vec<String>,
    pub max_pages: usize,
    pub politeness_delay: Duration,
    pub user_agent: String,
    pub proxy_url: Option<String>,
}

/// Breadth-first web crawl from seed URLs, honoring follow/ignore patterns
/// and a politeness delay between fetches. Binary-vs-HTML detection and
/// robots handling are sketched only to the extent the contract requires.
pub struct WebCrawlDriver {
    config: WebCrawlConfig,
    patterns: CrawlPatterns,
    client: reqwest::Client,
}

impl WebCrawlDriver {
    pub fn new(config: WebCrawlConfig, patterns: CrawlPatterns) -> Result<Self, ExtractError> {
        let mut builder = reqwest::Client::builder().user_agent(config.user_agent.clone());
        if let Some(proxy) = &config.proxy_url {
            let proxy = reqwest::Proxy::all(proxy).map_err(|e| ExtractError::Unreachable(
                proxy.clone(),
                e.to_string(),
            ))?;
            builder = builder.proxy(proxy);
        }
        let client = builder
            .build()
            .map_err(|e| ExtractError::Unreachable("<client init>".into(), e.to_string()))?;
        Ok(Self { config, patterns, client })
    }
}

#[async_trait]
impl ExtractDriver for WebCrawlDriver {
    fn name(&self) -> &str {
        "web"
    }

    async fn run(&self, ctx: &ExtractContext) -> Result<(), ExtractError> {
        let mut visited = std::collections::HashSet::new();
        let mut frontier: Vec<String> = self.config.seeds.clone();
        let mut fetched = 0usize;

        while let Some(url) = frontier.pop() {
            if !ctx.is_alive() {
                break;
            }
            if self.config.max_pages > 0 && fetched >= self.config.max_pages {
                break;
            }
            if !visited.insert(url.clone()) || !self.patterns.should_visit(&url) {
                continue;
            }

            let start = Instant::now();
            let resp = match self.client.get(&url).send().await {
                Ok(r) => r,
                Err(err) => {
                    warn!(url, error = %err, "fetch failed, skipping");
                    ctx.notifier.notify_error(&url, "extract", &err.to_string()).await;
                    continue;
                }
            };
            let body = resp.text().await.unwrap_or_default();
            fetched += 1;

            let id = ctx.identity.encode(&url);
            let mut doc = Document::new(id, "page", page_schema());
            let mut row: Row = Row::new();
            row.insert("id".into(), vec![doc.id.clone()]);
            row.insert("location".into(), vec![url.clone()]);
            row.insert("content".into(), vec![body.clone()]);
            doc.rows.push(row);
            ctx.emit(doc, start.elapsed()).await?;

            for link in discover_links(&body, &url) {
                if !visited.contains(&link) {
                    frontier.push(link);
                }
            }

            tokio::time::sleep(self.config.politeness_delay).await;
        }
        info!(fetched, "web crawl driver finished");
        Ok(())
    }
}

fn discover_links(html: &str, base: &str) -> Vec<String> {
    let base_url = match Url::parse(base) {
        Ok(u) => u,
        Err(_) => return Vec::new(),
    };
    let document = scraper::Html::parse_document(html);
    let selector = scraper::Selector::parse("a[href]").unwrap();
    document
        .select(&selector)
        .filter_map(|el| el.value().attr("href"))
        .filter_map(|href| base_url.join(href).ok())
        .map(|u| u.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::LogNotifier;

    fn context(tmp: &Path) -> (ExtractContext, BoundedQueue) {
        let queue = BoundedQueue::new(16);
        let crawl_queue = Arc::new(CrawlQueue::new(tmp));
        let (_tx, rx) = watch::channel(true);
        let ctx = ExtractContext {
            crawl_queue,
            queue: queue.clone(),
            identity: IdentityEncoder::default(),
            alive: rx,
            notifier: Arc::new(LogNotifier),
        };
        (ctx, queue)
    }

    #[test]
    fn patterns_require_a_follow_match_and_no_ignore_match() {
        let patterns = CrawlPatterns::new(
            &["\\.txt$".to_string()],
            &["secret".to_string()],
        )
        .unwrap();
        assert!(patterns.should_visit("a/b.txt"));
        assert!(!patterns.should_visit("a/b.csv"));
        assert!(!patterns.should_visit("a/secret.txt"));
    }

    #[test]
    fn empty_follow_list_means_follow_everything() {
        let patterns = CrawlPatterns::new(&[], &["ignored".to_string()]).unwrap();
        assert!(patterns.should_visit("anything"));
        assert!(!patterns.should_visit("ignored-path"));
    }

    #[tokio::test]
    async fn filesystem_driver_emits_one_document_per_file_and_posts_the_finish_marker() {
        let tmp = tempfile::tempdir().unwrap();
        let crawl_root = tmp.path().join("crawl");
        let (ctx, queue) = context(&crawl_root);
        ctx.crawl_queue.start(crate::crawl_queue::CrawlType::Full, None).await.unwrap();

        let source_root = tmp.path().join("source");
        tokio::fs::create_dir_all(&source_root).await.unwrap();
        tokio::fs::write(source_root.join("a.txt"), "hello").await.unwrap();
        tokio::fs::write(source_root.join("b.txt"), "world").await.unwrap();

        let stage = ExtractStage::new(Box::new(FilesystemDriver::new(
            source_root,
            CrawlPatterns::default(),
        )));
        stage.run(&ctx).await.unwrap();

        let mut items = Vec::new();
        queue.drain_to(&mut items).await;
        let docs = items.iter().filter(|i| i.is_document()).count();
        let markers = items.iter().filter(|i| i.is_marker()).count();
        assert_eq!(docs, 2);
        assert_eq!(markers, 1);
        assert!(items.last().unwrap().is_phase_complete(Phase::Extract));
    }
}
