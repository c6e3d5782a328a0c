//! crawlforge: a staged content-ingestion connector.
//!
//! Discovers documents from a source (filesystem or web), runs them through
//! a configurable transform pipeline, and publishes the results to a
//! Solr-compatible index in batches, with disk-backed crash-safe staging
//! between each stage.

pub mod cli;
pub mod config;
pub mod crawl_queue;
pub mod error;
pub mod identity;
pub mod model;
pub mod notify;
pub mod pipeline;
pub mod publish;
pub mod queue;
pub mod service_timer;
pub mod stages;
pub mod task_runner;
