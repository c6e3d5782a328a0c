//! Command-line entry point: `run`, `service`, and `test-config`
//! subcommands, mirroring the teacher's clap derive `Cli`/`Commands` shape
//! in `src/cli/commands.rs` (a global `--config`/`-v` pair, one enum
//! variant per task).

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;

use crate::config::{Config, ConfigLoader, PhaseSelector};
use crate::crawl_queue::CrawlQueue;
use crate::notify::LogNotifier;
use crate::pipeline::{FieldProjection, TransformPipeline, TrimField};
use crate::publish::batch::{BatchConfig, BatchPublisher};
use crate::publish::index_client::SolrClient;
use crate::publish::{ArchiveWriter, PublisherRegistry};
use crate::service_timer::ServiceTimer;
use crate::stages::extract::{CrawlPatterns, FilesystemDriver, WebCrawlConfig, WebCrawlDriver};
use crate::stages::ExtractDriver;
use crate::task_runner::{StageSizing, TaskRunner};

#[derive(Parser)]
#[command(name = "crawlforge")]
#[command(about = "Staged content-ingestion connector: extract, transform, publish")]
#[command(version)]
pub struct Cli {
    /// Explicit configuration file path.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

/// Waits for either SIGINT or (on unix) SIGTERM, whichever arrives first.
async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = match signal(SignalKind::terminate()) {
            Ok(term) => term,
            Err(err) => {
                tracing::warn!(error = %err, "failed to install SIGTERM handler, watching SIGINT only");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Drive a single crawl pass and exit.
    Run,
    /// Run the long-lived scheduler loop, alternating full/incremental crawls.
    Service,
    /// Load and validate configuration, then exit.
    TestConfig,
}

impl Cli {
    async fn load_config(&self) -> anyhow::Result<Config> {
        let cwd = std::env::current_dir()?;
        let config = ConfigLoader::load(self.config.as_deref(), &cwd).await?;
        config.validate()?;
        Ok(config)
    }

    async fn build_extract_driver(config: &Config) -> anyhow::Result<Box<dyn ExtractDriver>> {
        let patterns = CrawlPatterns::new(&config.extract.follow, &config.extract.ignore)?;
        if let Some(root) = &config.extract.root {
            Ok(Box::new(FilesystemDriver::new(root.clone(), patterns)))
        } else {
            let web_config = WebCrawlConfig {
                seeds: config.extract.seeds.clone(),
                max_pages: config.extract.crawl_max_pages,
                politeness_delay: std::time::Duration::from_millis(config.extract.politeness_delay_ms),
                user_agent: config.extract.crawl_agent_string.clone(),
                proxy_url: config
                    .extract
                    .proxy_host_name
                    .as_ref()
                    .zip(config.extract.proxy_port_number)
                    .map(|(host, port)| format!("http://{host}:{port}")),
            };
            Ok(Box::new(WebCrawlDriver::new(web_config, patterns)?))
        }
    }

    fn build_registry(config: &Config) -> anyhow::Result<PublisherRegistry> {
        let publishers = config
            .publish
            .pipe_line
            .iter()
            .map(|name| {
                let index = Arc::new(SolrClient::new((&config.solr).into()));
                let batch_config = BatchConfig {
                    batch_size: config.publish.feed_batch_count,
                    commit_every: config.publish.feed_commit_count,
                    max_docs: config.publish.feed_maximum_count,
                    upload_enabled: config.publish.upload_enabled,
                    optimize_upon_completion: config.publish.optimize_upon_completion,
                };
                let archive = config
                    .publish
                    .save_files
                    .then(|| ArchiveWriter::new(config.install_root.join("archive").join(name), name.clone()));
                BatchPublisher::new(name.clone(), index, archive, batch_config)
            })
            .collect();
        let registry = PublisherRegistry::new(config.publish.pipe_line.clone(), publishers);
        registry.validate()?;
        Ok(registry)
    }

    fn build_pipeline() -> Arc<TransformPipeline> {
        Arc::new(TransformPipeline::new(vec![
            Box::new(TrimField::new("content")),
            Box::new(FieldProjection::new(vec![
                "id".to_string(),
                "location".to_string(),
                "content".to_string(),
            ])),
        ]))
    }

    async fn run_one_crawl(&self, config: &Config) -> anyhow::Result<()> {
        let crawl_queue = Arc::new(CrawlQueue::new(config.install_root.clone()));
        let timer = ServiceTimer::load(
            config.install_root.join(".service_timer.json"),
            chrono::Duration::days(1),
            chrono::Duration::hours(1),
        )
        .await?;
        let runner = Arc::new(TaskRunner::new(crawl_queue, timer, Arc::new(LogNotifier)));

        let abort_listener = {
            let runner = runner.clone();
            tokio::spawn(async move {
                wait_for_shutdown_signal().await;
                info!("shutdown signal received, aborting crawl");
                runner.request_shutdown();
            })
        };

        let result = self.run_one_crawl_inner(config, &runner).await;
        abort_listener.abort();
        result
    }

    async fn run_one_crawl_inner(&self, config: &Config, runner: &TaskRunner) -> anyhow::Result<()> {
        let sizing = StageSizing {
            extract_queue_len: config.extract.queue_length,
            transform_queue_len: config.transform.queue_length,
            publish_queue_len: config.publish.queue_length,
            transform_workers: config.transform.thread_count,
            publish_workers: config.publish.thread_count,
            poll_timeout: std::time::Duration::from_secs(config.queue.wait_timeout_secs),
        };

        let phases = if config.run.phase_list.is_empty() {
            vec![PhaseSelector::All]
        } else {
            config.run.phase_list.clone()
        };

        for phase in phases {
            match phase {
                PhaseSelector::All | PhaseSelector::Snapshot => {
                    let driver = Self::build_extract_driver(config).await?;
                    let registry = Self::build_registry(config)?;
                    let pipeline = Self::build_pipeline();
                    let stats = runner
                        .run_once(
                            driver,
                            pipeline,
                            registry,
                            sizing,
                            &config.extract.id_value_prefix,
                            phase == PhaseSelector::All,
                        )
                        .await?;
                    info!(documents = stats.documents_completed, ?phase, "run complete");
                }
                PhaseSelector::Extract => {
                    let driver = Self::build_extract_driver(config).await?;
                    runner
                        .run_extract_only(driver, sizing.extract_queue_len, &config.extract.id_value_prefix)
                        .await?;
                    info!("extract-only run complete");
                }
                PhaseSelector::Transform => {
                    let pipeline = Self::build_pipeline();
                    runner.run_transform_only(pipeline, sizing).await?;
                    info!("transform-only run complete");
                }
                PhaseSelector::Publish => {
                    let registry = Self::build_registry(config)?;
                    let stats = runner.run_publish_only(registry, sizing).await?;
                    info!(documents = stats.documents_completed, "publish-only run complete");
                }
            }
        }
        Ok(())
    }

    async fn run_service(&self, config: &Config) -> anyhow::Result<()> {
        tokio::time::sleep(std::time::Duration::from_secs(config.run.sleep_startup_delay_secs)).await;
        let sleep_secs = config.run.sleep_between_seconds()?;

        loop {
            if let Err(err) = self.run_one_crawl(config).await {
                tracing::error!(error = %err, "crawl cycle failed");
            }
            tokio::select! {
                _ = tokio::time::sleep(std::time::Duration::from_secs(sleep_secs)) => {}
                _ = tokio::signal::ctrl_c() => {
                    info!("shutdown signal received, exiting service loop");
                    break;
                }
            }
        }
        Ok(())
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let config = self.load_config().await?;
        match self.command {
            Commands::Run => self.run_one_crawl(&config).await,
            Commands::Service => self.run_service(&config).await,
            Commands::TestConfig => {
                info!("configuration is valid");
                Ok(())
            }
        }
    }
}

pub async fn run() -> anyhow::Result<()> {
    Cli::parse().run().await
}
