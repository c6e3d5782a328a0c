//! ServiceTimer: persisted full/incremental watermarks and the scheduling
//! decision the service loop consults each review interval. Grounded on the
//! crash-safe write-temp-then-rename pattern already used by
//! [`crate::crawl_queue::CrawlQueue`], applied here to a single small state
//! file instead of a per-document tree.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::info;

use crate::crawl_queue::CrawlType;
use crate::error::ServiceTimerError;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct TimerState {
    last_full: Option<DateTime<Utc>>,
    last_incremental: Option<DateTime<Utc>>,
}

/// Decides whether it is time for a full or incremental crawl, and persists
/// the watermark after each successful one.
pub struct ServiceTimer {
    path: PathBuf,
    full_interval: ChronoDuration,
    incremental_interval: ChronoDuration,
    state: TimerState,
}

impl ServiceTimer {
    /// Loads prior state from `path` if present, or starts with both
    /// watermarks unset (so the very first review is always due).
    pub async fn load(
        path: impl Into<PathBuf>,
        full_interval: ChronoDuration,
        incremental_interval: ChronoDuration,
    ) -> Result<Self, ServiceTimerError> {
        let path = path.into();
        let state = match fs::read_to_string(&path).await {
            Ok(contents) => serde_json::from_str(&contents)
                .map_err(|e| ServiceTimerError::Malformed(e.to_string()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => TimerState::default(),
            Err(source) => return Err(ServiceTimerError::Io { path, source }),
        };
        Ok(Self {
            path,
            full_interval,
            incremental_interval,
            state,
        })
    }

    pub fn is_time_for_full(&self, now: DateTime<Utc>) -> bool {
        match self.state.last_full {
            None => true,
            Some(last) => now - last >= self.full_interval,
        }
    }

    pub fn is_time_for_incremental(&self, now: DateTime<Utc>) -> bool {
        match self.state.last_incremental {
            None => true,
            Some(last) => now - last >= self.incremental_interval,
        }
    }

    /// Decides the next crawl type, preferring Full when both are due.
    pub fn decide(&self, now: DateTime<Utc>) -> Option<CrawlType> {
        if self.is_time_for_full(now) {
            Some(CrawlType::Full)
        } else if self.is_time_for_incremental(now) {
            Some(CrawlType::Incremental)
        } else {
            None
        }
    }

    pub fn watermark(&self) -> Option<DateTime<Utc>> {
        self.state.last_incremental
    }

    /// Records a successful crawl that started at `crawl_start`. An
    /// incremental watermark is set to the crawl's *start* time rather than
    /// its completion time, so documents modified while the crawl was
    /// running are not skipped by the next incremental pass.
    pub async fn record_success(
        &mut self,
        crawl_type: CrawlType,
        crawl_start: DateTime<Utc>,
    ) -> Result<(), ServiceTimerError> {
        match crawl_type {
            CrawlType::Full => {
                self.state.last_full = Some(crawl_start);
                self.state.last_incremental = Some(crawl_start);
            }
            CrawlType::Incremental => {
                self.state.last_incremental = Some(crawl_start);
            }
        }
        self.persist().await
    }

    async fn persist(&self) -> Result<(), ServiceTimerError> {
        let contents = serde_json::to_string_pretty(&self.state)
            .map_err(|e| ServiceTimerError::Malformed(e.to_string()))?;
        write_atomic(&self.path, contents.as_bytes()).await?;
        info!(path = %self.path.display(), "service-timer state persisted");
        Ok(())
    }
}

async fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), ServiceTimerError> {
    let parent = path.parent().ok_or_else(|| ServiceTimerError::Io {
        path: path.to_path_buf(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no parent"),
    })?;
    fs::create_dir_all(parent)
        .await
        .map_err(|source| ServiceTimerError::Io { path: parent.to_path_buf(), source })?;
    let tmp = parent.join(format!(
        ".{}.tmp",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("timer")
    ));
    fs::write(&tmp, contents)
        .await
        .map_err(|source| ServiceTimerError::Io { path: tmp.clone(), source })?;
    fs::rename(&tmp, path)
        .await
        .map_err(|source| ServiceTimerError::Io { path: path.to_path_buf(), source })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day() -> ChronoDuration {
        ChronoDuration::days(1)
    }

    #[tokio::test]
    async fn a_fresh_timer_is_due_for_both_crawl_types() {
        let tmp = tempfile::tempdir().unwrap();
        let timer = ServiceTimer::load(tmp.path().join("timer.json"), day(), ChronoDuration::hours(1))
            .await
            .unwrap();
        let now = Utc::now();
        assert!(timer.is_time_for_full(now));
        assert!(timer.is_time_for_incremental(now));
        assert_eq!(timer.decide(now), Some(CrawlType::Full));
    }

    #[tokio::test]
    async fn record_success_persists_and_reloads() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("timer.json");
        let mut timer = ServiceTimer::load(path.clone(), day(), ChronoDuration::hours(1)).await.unwrap();
        let start = Utc::now();
        timer.record_success(CrawlType::Incremental, start).await.unwrap();

        let reloaded = ServiceTimer::load(path, day(), ChronoDuration::hours(1)).await.unwrap();
        assert_eq!(reloaded.watermark(), Some(start));
        assert!(!reloaded.is_time_for_incremental(start + ChronoDuration::minutes(1)));
    }

    #[tokio::test]
    async fn full_crawl_success_also_satisfies_the_incremental_interval() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("timer.json");
        let mut timer = ServiceTimer::load(path, day(), ChronoDuration::hours(1)).await.unwrap();
        let start = Utc::now();
        timer.record_success(CrawlType::Full, start).await.unwrap();
        assert!(!timer.is_time_for_full(start + ChronoDuration::hours(2)));
        assert!(!timer.is_time_for_incremental(start + ChronoDuration::minutes(30)));
    }
}
