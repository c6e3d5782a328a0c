//! The Solr-compatible index wire contract: add, commit, optimize.
//!
//! The concrete HTTP client is an external collaborator per ยง1 (the spec
//! doesn't pin a particular Solr client) -- this module defines the trait
//! the publisher drives plus one thin `reqwest`-based implementation, shaped
//! like the teacher's `HttpClient` in `src/scrapers/http_client/mod.rs`
//! (a single reusable `reqwest::Client`, timeout configured once at
//! construction).

use async_trait::async_trait;

use crate::error::PublishError;
use crate::model::Document;

/// Operations the publisher drives against a Solr-compatible index.
#[async_trait]
pub trait IndexClient: Send + Sync {
    /// Add a batch of documents.
    async fn add(&self, publisher: &str, docs: &[Document]) -> Result<(), PublishError>;

    /// Make previously added documents visible to searchers.
    async fn commit(&self, publisher: &str) -> Result<(), PublishError>;

    /// Optionally compact the index after a crawl completes.
    async fn optimize(&self, publisher: &str) -> Result<(), PublishError>;
}

/// Configuration for [`SolrClient`], mirroring the `<prefix>.solr.*` keys.
#[derive(Debug, Clone)]
pub struct SolrConfig {
    pub base_url: String,
    pub core: String,
    pub timeout_seconds: u64,
}

/// A minimal Solr update-handler client: JSON add/commit/optimize requests
/// against `<base_url>/<core>/update`.
pub struct SolrClient {
    client: reqwest::Client,
    config: SolrConfig,
}

impl SolrClient {
    pub fn new(config: SolrConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_seconds))
            .build()
            .expect("failed to build Solr HTTP client");
        Self { client, config }
    }

    fn update_url(&self) -> String {
        format!(
            "{}/{}/update",
            self.config.base_url.trim_end_matches('/'),
            self.config.core
        )
    }
}

#[async_trait]
impl IndexClient for SolrClient {
    async fn add(&self, publisher: &str, docs: &[Document]) -> Result<(), PublishError> {
        let body: Vec<serde_json::Value> = docs
            .iter()
            .map(|doc| {
                let mut fields = serde_json::Map::new();
                for row in &doc.rows {
                    for (name, values) in row {
                        let value = if values.len() == 1 {
                            serde_json::Value::String(values[0].clone())
                        } else {
                            serde_json::Value::Array(
                                values
                                    .iter()
                                    .cloned()
                                    .map(serde_json::Value::String)
                                    .collect(),
                            )
                        };
                        fields.insert(name.clone(), value);
                    }
                }
                serde_json::Value::Object(fields)
            })
            .collect();

        let resp = self
            .client
            .post(self.update_url())
            .json(&serde_json::json!({ "add": body }))
            .send()
            .await
            .map_err(|e| PublishError::IndexAdd {
                publisher: publisher.to_string(),
                message: e.to_string(),
            })?;

        if !resp.status().is_success() {
            return Err(PublishError::IndexAdd {
                publisher: publisher.to_string(),
                message: format!("index returned status {}", resp.status()),
            });
        }
        Ok(())
    }

    async fn commit(&self, publisher: &str) -> Result<(), PublishError> {
        let resp = self
            .client
            .post(self.update_url())
            .json(&serde_json::json!({ "commit": {} }))
            .send()
            .await
            .map_err(|e| PublishError::IndexCommit {
                publisher: publisher.to_string(),
                message: e.to_string(),
            })?;
        if !resp.status().is_success() {
            return Err(PublishError::IndexCommit {
                publisher: publisher.to_string(),
                message: format!("index returned status {}", resp.status()),
            });
        }
        Ok(())
    }

    async fn optimize(&self, publisher: &str) -> Result<(), PublishError> {
        let resp = self
            .client
            .post(self.update_url())
            .json(&serde_json::json!({ "optimize": {} }))
            .send()
            .await
            .map_err(|e| PublishError::IndexCommit {
                publisher: publisher.to_string(),
                message: e.to_string(),
            })?;
        if !resp.status().is_success() {
            return Err(PublishError::IndexCommit {
                publisher: publisher.to_string(),
                message: format!("index returned status {}", resp.status()),
            });
        }
        Ok(())
    }
}

/// In-memory index client for tests: records every add/commit/optimize call.
#[cfg(test)]
pub struct RecordingIndexClient {
    pub adds: std::sync::Mutex<Vec<Vec<String>>>,
    pub commits: std::sync::Mutex<usize>,
    pub optimizes: std::sync::Mutex<usize>,
}

#[cfg(test)]
impl Default for RecordingIndexClient {
    fn default() -> Self {
        Self {
            adds: std::sync::Mutex::new(Vec::new()),
            commits: std::sync::Mutex::new(0),
            optimizes: std::sync::Mutex::new(0),
        }
    }
}

#[cfg(test)]
#[async_trait]
impl IndexClient for RecordingIndexClient {
    async fn add(&self, _publisher: &str, docs: &[Document]) -> Result<(), PublishError> {
        self.adds
            .lock()
            .unwrap()
            .push(docs.iter().map(|d| d.id.clone()).collect());
        Ok(())
    }

    async fn commit(&self, _publisher: &str) -> Result<(), PublishError> {
        *self.commits.lock().unwrap() += 1;
        Ok(())
    }

    async fn optimize(&self, _publisher: &str) -> Result<(), PublishError> {
        *self.optimizes.lock().unwrap() += 1;
        Ok(())
    }
}
