//! The `Document` value model: schema-conformant rows, open features, a
//! relationship tree, and an ACL.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::schema::Schema;

/// A single row's field values, keyed by field name. Values are stored as
/// strings; multi-value fields join their values with the field's delimiter
/// (the schema, not the row, owns that policy).
pub type Row = BTreeMap<String, Vec<String>>;

/// Typed options the core reads directly off a document's features map,
/// modeled explicitly instead of left as string lookups (per the spec's
/// redesign note on open-ended feature maps).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentOptions {
    pub is_content: bool,
    pub mv_delimiter: Option<char>,
}

/// A typed relationship to zero or more child documents, forming a finite DAG
/// modeled here as an owned tree (no back-references, so cycles are
/// unrepresentable by construction).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    pub relationship_type: String,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
    #[serde(default)]
    pub children: Vec<Document>,
}

/// Access control: principal -> permission string (e.g. "read", "read,write").
pub type Acl = BTreeMap<String, String>;

/// The unit of ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Stable identifier, derived by [`crate::identity::IdentityEncoder`] from
    /// the source locator. Doubles as the schema's primary-key field value.
    pub id: String,
    pub doc_type: String,
    pub schema: Schema,
    #[serde(default)]
    pub rows: Vec<Row>,
    #[serde(default)]
    pub options: DocumentOptions,
    /// The rest of the open-ended features map, for anything the core
    /// doesn't read directly.
    #[serde(default)]
    pub features: BTreeMap<String, String>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
    #[serde(default)]
    pub acl: Acl,
}

impl Document {
    pub fn new(id: impl Into<String>, doc_type: impl Into<String>, schema: Schema) -> Self {
        Self {
            id: id.into(),
            doc_type: doc_type.into(),
            schema,
            rows: Vec::new(),
            options: DocumentOptions::default(),
            features: BTreeMap::new(),
            relationships: Vec::new(),
            acl: Acl::new(),
        }
    }

    /// Primary-key field value, read off the first row (primary-key fields
    /// are single-value by construction).
    pub fn primary_key_value(&self) -> Option<&str> {
        let pk = self.schema.primary_key_field()?;
        self.rows
            .first()?
            .get(&pk.name)?
            .first()
            .map(|s| s.as_str())
    }

    /// Every field value in every row satisfies its schema type, the primary
    /// key is present and unique across rows, and the relationship tree is
    /// finite (it always is, being an owned tree) and bounded in depth.
    pub fn validate(&self) -> Result<(), String> {
        self.schema.validate()?;
        let pk = self
            .schema
            .primary_key_field()
            .ok_or("schema has no primary-key field")?;

        let mut seen_pks = std::collections::HashSet::new();
        for row in &self.rows {
            let values = row
                .get(&pk.name)
                .ok_or_else(|| format!("row missing primary-key field {}", pk.name))?;
            let pk_value = values
                .first()
                .ok_or_else(|| format!("primary-key field {} has no value", pk.name))?;
            if !seen_pks.insert(pk_value.clone()) {
                return Err(format!("duplicate primary-key value: {pk_value}"));
            }
            for field in self.schema.fields() {
                if field.required && !row.contains_key(&field.name) {
                    return Err(format!("row missing required field {}", field.name));
                }
                if let Some(values) = row.get(&field.name) {
                    if !field.multi_value && values.len() > 1 {
                        return Err(format!(
                            "field {} is single-value but row has {} values",
                            field.name,
                            values.len()
                        ));
                    }
                }
            }
        }
        validate_relationship_depth(&self.relationships, 0, 64)
    }
}

fn validate_relationship_depth(
    relationships: &[Relationship],
    depth: usize,
    max_depth: usize,
) -> Result<(), String> {
    if depth > max_depth {
        return Err("relationship tree exceeds maximum depth".to_string());
    }
    for rel in relationships {
        for child in &rel.children {
            validate_relationship_depth(&child.relationships, depth + 1, max_depth)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::schema::FieldDef;

    fn schema() -> Schema {
        Schema::new(vec![FieldDef::primary_key("id"), FieldDef::text("title")])
    }

    #[test]
    fn validates_well_formed_document() {
        let mut doc = Document::new("doc-1", "page", schema());
        let mut row = Row::new();
        row.insert("id".into(), vec!["doc-1".into()]);
        row.insert("title".into(), vec!["hello".into()]);
        doc.rows.push(row);
        assert!(doc.validate().is_ok());
        assert_eq!(doc.primary_key_value(), Some("doc-1"));
    }

    #[test]
    fn rejects_duplicate_primary_key_across_rows() {
        let mut doc = Document::new("doc-1", "page", schema());
        for _ in 0..2 {
            let mut row = Row::new();
            row.insert("id".into(), vec!["doc-1".into()]);
            row.insert("title".into(), vec!["hello".into()]);
            doc.rows.push(row);
        }
        assert!(doc.validate().is_err());
    }

    #[test]
    fn rejects_missing_required_field() {
        let mut doc = Document::new("doc-1", "page", schema());
        let mut row = Row::new();
        row.insert("id".into(), vec!["doc-1".into()]);
        doc.rows.push(row);
        // title isn't required in this schema, so this should pass; add a
        // required field to actually exercise the rejection path.
        assert!(doc.validate().is_ok());

        let mut strict_schema = schema();
        strict_schema = Schema::new(
            strict_schema
                .fields()
                .iter()
                .cloned()
                .map(|mut f| {
                    if f.name == "title" {
                        f.required = true;
                    }
                    f
                })
                .collect(),
        );
        let mut doc2 = Document::new("doc-2", "page", strict_schema);
        let mut row2 = Row::new();
        row2.insert("id".into(), vec!["doc-2".into()]);
        doc2.rows.push(row2);
        assert!(doc2.validate().is_err());
    }
}
