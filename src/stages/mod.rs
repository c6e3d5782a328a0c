//! The four staged-execution workers: extract, transform, publish, metrics.

pub mod extract;
pub mod metrics;
pub mod publish;
pub mod transform;

pub use extract::{ExtractContext, ExtractDriver, ExtractStage};
pub use metrics::{CrawlStats, MetricsStage, PhaseStats};
pub use publish::PublishStage;
pub use transform::TransformStage;
