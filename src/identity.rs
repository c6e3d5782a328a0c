//! IdentityEncoder: derives a stable document id from a source locator.
//!
//! Grounded on the teacher's `DocumentVersion::compute_hash` (SHA-256 via
//! `sha2::Sha256`, hex-encoded, in `src/models/document.rs`), applied here to
//! the source locator (path or URL) rather than the document body, since ids
//! must be stable and idempotent across crawls before content is even
//! fetched.

use sha2::{Digest, Sha256};

/// An optional prefix applied to every id, matching
/// `extract.id_value_prefix` in the configuration surface.
#[derive(Debug, Clone, Default)]
pub struct IdentityEncoder {
    prefix: String,
}

impl IdentityEncoder {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Derive a stable, filesystem-safe id from a source locator. Same
    /// locator -> same id, across runs and processes.
    pub fn encode(&self, locator: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(locator.as_bytes());
        let digest = hex::encode(hasher.finalize());
        if self.prefix.is_empty() {
            digest
        } else {
            format!("{}-{}", self.prefix, digest)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_locator_yields_same_id() {
        let enc = IdentityEncoder::default();
        assert_eq!(
            enc.encode("file:///docs/report.pdf"),
            enc.encode("file:///docs/report.pdf")
        );
    }

    #[test]
    fn different_locators_yield_different_ids() {
        let enc = IdentityEncoder::default();
        assert_ne!(
            enc.encode("file:///docs/report.pdf"),
            enc.encode("file:///docs/other.pdf")
        );
    }

    #[test]
    fn prefix_is_applied() {
        let enc = IdentityEncoder::new("acme");
        assert!(enc.encode("https://example.gov/a").starts_with("acme-"));
    }

    #[test]
    fn id_is_filesystem_safe() {
        let enc = IdentityEncoder::default();
        let id = enc.encode("https://example.gov/a?b=c&d=e#frag");
        assert!(id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-'));
    }
}
