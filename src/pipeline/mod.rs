//! TransformPipeline: an ordered sequence of transform units mapping an
//! input document to an output document.
//!
//! Treated as a pure function by the stages that run it; the individual
//! units are an external collaborator (per ยง1) -- this module ships a
//! handful of representative stock units to exercise the contract, shaped
//! like the teacher's `PipelineStage` trait in
//! `crates/foia/src/work_queue/pipeline.rs` (a `name()` plus a fallible
//! processing method, validated before any work starts).

use async_trait::async_trait;

use crate::error::PipelineError;
use crate::model::Document;

/// A single transformation unit.
#[async_trait]
pub trait TransformUnit: Send + Sync {
    /// Human-readable name, used in error messages and logs.
    fn name(&self) -> &str;

    /// Apply this unit to `doc`, returning the transformed document.
    async fn apply(&self, doc: Document) -> Result<Document, String>;
}

/// An ordered, validated sequence of [`TransformUnit`]s.
pub struct TransformPipeline {
    units: Vec<Box<dyn TransformUnit>>,
}

impl TransformPipeline {
    pub fn new(units: Vec<Box<dyn TransformUnit>>) -> Self {
        Self { units }
    }

    /// A pipeline must have at least one configured unit; a stage that
    /// starts with an empty pipeline would silently forward documents
    /// unchanged, which the spec treats as a configuration error.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.units.is_empty() {
            return Err(PipelineError::Empty);
        }
        Ok(())
    }

    /// Run every unit in order, short-circuiting on the first failure.
    pub async fn run(&self, doc: Document) -> Result<Document, PipelineError> {
        let doc_id = doc.id.clone();
        let mut current = doc;
        for unit in &self.units {
            current = unit
                .apply(current)
                .await
                .map_err(|message| PipelineError::UnitFailed {
                    unit: unit.name().to_string(),
                    doc_id: doc_id.clone(),
                    message,
                })?;
        }
        Ok(current)
    }
}

/// Drops fields not named in a configured allow-list from every row.
pub struct FieldProjection {
    keep: Vec<String>,
}

impl FieldProjection {
    pub fn new(keep: Vec<String>) -> Self {
        Self { keep }
    }
}

#[async_trait]
impl TransformUnit for FieldProjection {
    fn name(&self) -> &str {
        "field-projection"
    }

    async fn apply(&self, mut doc: Document) -> Result<Document, String> {
        for row in &mut doc.rows {
            row.retain(|name, _| self.keep.contains(name));
        }
        Ok(doc)
    }
}

/// Fills in a feature flag if it isn't already present.
pub struct FeatureDefault {
    key: String,
    value: String,
}

impl FeatureDefault {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

#[async_trait]
impl TransformUnit for FeatureDefault {
    fn name(&self) -> &str {
        "feature-default"
    }

    async fn apply(&self, mut doc: Document) -> Result<Document, String> {
        doc.features
            .entry(self.key.clone())
            .or_insert_with(|| self.value.clone());
        Ok(doc)
    }
}

/// Trims leading/trailing whitespace from every value of a named field.
pub struct TrimField {
    field: String,
}

impl TrimField {
    pub fn new(field: impl Into<String>) -> Self {
        Self { field: field.into() }
    }
}

#[async_trait]
impl TransformUnit for TrimField {
    fn name(&self) -> &str {
        "trim-field"
    }

    async fn apply(&self, mut doc: Document) -> Result<Document, String> {
        for row in &mut doc.rows {
            if let Some(values) = row.get_mut(&self.field) {
                for v in values.iter_mut() {
                    *v = v.trim().to_string();
                }
            }
        }
        Ok(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FieldDef, Row, Schema};

    fn doc_with_row(row: Row) -> Document {
        let mut doc = Document::new(
            "doc-1",
            "page",
            Schema::new(vec![
                FieldDef::primary_key("id"),
                FieldDef::text("title"),
                FieldDef::text("junk"),
            ]),
        );
        doc.rows.push(row);
        doc
    }

    #[tokio::test]
    async fn empty_pipeline_fails_validation() {
        let pipeline = TransformPipeline::new(vec![]);
        assert!(matches!(pipeline.validate(), Err(PipelineError::Empty)));
    }

    #[tokio::test]
    async fn units_run_in_order() {
        let mut row = Row::new();
        row.insert("id".into(), vec!["doc-1".into()]);
        row.insert("title".into(), vec!["  hello  ".into()]);
        row.insert("junk".into(), vec!["drop-me".into()]);
        let doc = doc_with_row(row);

        let pipeline = TransformPipeline::new(vec![
            Box::new(TrimField::new("title")),
            Box::new(FieldProjection::new(vec!["id".into(), "title".into()])),
            Box::new(FeatureDefault::new("is-content", "true")),
        ]);
        pipeline.validate().unwrap();
        let out = pipeline.run(doc).await.unwrap();

        assert_eq!(out.rows[0].get("title").unwrap()[0], "hello");
        assert!(!out.rows[0].contains_key("junk"));
        assert_eq!(out.features.get("is-content").unwrap(), "true");
    }

    struct AlwaysFails;

    #[async_trait]
    impl TransformUnit for AlwaysFails {
        fn name(&self) -> &str {
            "always-fails"
        }
        async fn apply(&self, _doc: Document) -> Result<Document, String> {
            Err("boom".to_string())
        }
    }

    #[tokio::test]
    async fn a_failing_unit_short_circuits_with_context() {
        let doc = doc_with_row(Row::new());
        let pipeline = TransformPipeline::new(vec![Box::new(AlwaysFails)]);
        let err = pipeline.run(doc).await.unwrap_err();
        match err {
            PipelineError::UnitFailed { unit, doc_id, message } => {
                assert_eq!(unit, "always-fails");
                assert_eq!(doc_id, "doc-1");
                assert_eq!(message, "boom");
            }
            _ => panic!("expected UnitFailed"),
        }
    }
}
