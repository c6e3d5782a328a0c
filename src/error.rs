//! Typed error enums for the pipeline core.
//!
//! Each component gets its own error type so callers can match on kind
//! (configuration vs. transient vs. consistency, per the error design in the
//! spec) instead of testing strings. `anyhow` is reserved for the CLI/
//! supervisor boundary where errors are only ever logged or reported.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the disk-backed [`crate::crawl_queue::CrawlQueue`].
#[derive(Debug, Error)]
pub enum CrawlQueueError {
    #[error("crawl queue I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("document {id} missing from phase {phase} during transition")]
    MissingSourceFile { id: String, phase: String },

    #[error("a crawl is already active (id {0})")]
    AlreadyActive(u64),

    #[error("no active crawl")]
    NotActive,

    #[error("document serialization failed: {0}")]
    Serialize(String),

    #[error("document deserialization failed: {0}")]
    Deserialize(String),
}

/// Errors raised while validating or running a [`crate::pipeline::TransformPipeline`].
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("transform unit {unit} rejected document {doc_id}: {message}")]
    UnitFailed {
        unit: String,
        doc_id: String,
        message: String,
    },

    #[error("pipeline has no transform units configured")]
    Empty,
}

/// Errors raised by the publisher registry, a `BatchPublisher`, or an `IndexClient`.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("unresolvable publisher name: {0}")]
    UnknownPublisher(String),

    #[error("publish pipe_line is empty")]
    EmptyPipeline,

    #[error("index add failed for publisher {publisher}: {message}")]
    IndexAdd { publisher: String, message: String },

    #[error("index commit failed for publisher {publisher}: {message}")]
    IndexCommit { publisher: String, message: String },

    #[error("archive write failed for publisher {publisher}: {source}")]
    Archive {
        publisher: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised while loading or validating [`crate::config::Config`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required configuration key: {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },

    #[error("could not read config file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse config file {path}: {source}")]
    ParseFile {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Errors raised while persisting or loading [`crate::service_timer::ServiceTimer`] state.
#[derive(Debug, Error)]
pub enum ServiceTimerError {
    #[error("service-timer I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("service-timer state file is malformed: {0}")]
    Malformed(String),
}

/// Errors raised by an [`crate::stages::extract::ExtractDriver`]. Per-document
/// fetch failures are not represented here — the driver logs and skips those
/// itself; these variants are for failures that stop the driver entirely.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("extract driver I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid follow/ignore pattern {pattern}: {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("seed location {0} could not be reached: {1}")]
    Unreachable(String, String),
}

/// Errors raised while the [`crate::task_runner::TaskRunner`] evaluates
/// readiness or drives a crawl.
#[derive(Debug, Error)]
pub enum TaskRunnerError {
    #[error("readiness check failed: {0}")]
    NotReady(String),

    #[error(transparent)]
    CrawlQueue(#[from] CrawlQueueError),

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error(transparent)]
    ServiceTimer(#[from] ServiceTimerError),
}
