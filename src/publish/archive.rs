//! Optional XML archive writer: mirrors each flushed batch into a file on
//! disk, one file per batch, so a crawl's published documents can be
//! replayed or audited without re-hitting the index. Grounded on the
//! hash-sharded disk-write idiom in `src/storage.rs` (construct a path,
//! write the file, never mutate one already written); the per-batch
//! sequence counter has no teacher analogue, since the teacher names files
//! by content hash rather than by arrival order.

use std::path::PathBuf;

use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::PublishError;
use crate::model::{xml, Document};

/// Writes one file per batch under `<root>/<publisher>/solr-<sequence>.xml`.
pub struct ArchiveWriter {
    root: PathBuf,
    publisher: String,
    sequence: u64,
}

impl ArchiveWriter {
    pub fn new(root: impl Into<PathBuf>, publisher: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            publisher: publisher.into(),
            sequence: 0,
        }
    }

    fn current_path(&self) -> PathBuf {
        self.root.join(format!("solr-{}.xml", self.sequence))
    }

    /// Writes `docs` as a self-contained add-document stream and rotates to
    /// the next sequence number so the following write starts a fresh file.
    pub async fn write_batch(&mut self, docs: &[Document]) -> Result<(), PublishError> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|source| PublishError::Archive {
                publisher: self.publisher.clone(),
                source,
            })?;

        let mut body = String::from("<add>\n");
        for doc in docs {
            body.push_str(&xml::to_xml(doc));
            body.push('\n');
        }
        body.push_str("</add>\n");

        let path = self.current_path();
        fs::write(&path, body.as_bytes())
            .await
            .map_err(|source| PublishError::Archive {
                publisher: self.publisher.clone(),
                source,
            })?;
        self.sequence += 1;
        Ok(())
    }

    /// Appends a `<commit/>` marker to the most recently written file.
    pub async fn append_commit_marker(&self) -> Result<(), PublishError> {
        if self.sequence == 0 {
            return Ok(());
        }
        let path = self.root.join(format!("solr-{}.xml", self.sequence - 1));
        let mut file = fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .await
            .map_err(|source| PublishError::Archive {
                publisher: self.publisher.clone(),
                source,
            })?;
        file.write_all(b"<commit/>\n")
            .await
            .map_err(|source| PublishError::Archive {
                publisher: self.publisher.clone(),
                source,
            })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FieldDef, Schema};

    fn sample_doc(id: &str) -> Document {
        Document::new(id, "page", Schema::new(vec![FieldDef::primary_key("id")]))
    }

    #[tokio::test]
    async fn write_batch_rotates_sequence_and_writes_an_add_stream() {
        let tmp = tempfile::tempdir().unwrap();
        let mut writer = ArchiveWriter::new(tmp.path(), "solr-main");

        writer.write_batch(&[sample_doc("a"), sample_doc("b")]).await.unwrap();
        let first = tmp.path().join("solr-0.xml");
        assert!(first.exists());
        let contents = std::fs::read_to_string(&first).unwrap();
        assert!(contents.starts_with("<add>"));
        assert!(contents.trim_end().ends_with("</add>"));

        writer.write_batch(&[sample_doc("c")]).await.unwrap();
        assert!(tmp.path().join("solr-1.xml").exists());
        assert!(first.exists(), "prior archive file must not be touched");
    }

    #[tokio::test]
    async fn append_commit_marker_appends_to_the_latest_file() {
        let tmp = tempfile::tempdir().unwrap();
        let mut writer = ArchiveWriter::new(tmp.path(), "solr-main");
        writer.write_batch(&[sample_doc("a")]).await.unwrap();
        writer.append_commit_marker().await.unwrap();

        let contents = std::fs::read_to_string(tmp.path().join("solr-0.xml")).unwrap();
        assert!(contents.trim_end().ends_with("<commit/>"));
    }

    #[tokio::test]
    async fn append_commit_marker_before_any_batch_is_a_no_op() {
        let tmp = tempfile::tempdir().unwrap();
        let writer = ArchiveWriter::new(tmp.path(), "solr-main");
        writer.append_commit_marker().await.unwrap();
    }
}
