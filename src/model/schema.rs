//! Document schema: an ordered set of typed field definitions.

use serde::{Deserialize, Serialize};

/// A field's value type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    Text,
    Integer,
    Long,
    Float,
    Double,
    Boolean,
    Date,
    Time,
    DateTime,
}

/// One field definition within a [`Schema`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default)]
    pub multi_value: bool,
    /// Delimiter used to split a single cell into multiple values, when `multi_value` is set.
    #[serde(default)]
    pub delimiter: Option<char>,
    #[serde(default)]
    pub default_value: Option<String>,
    /// Optional inclusive numeric range, for Integer/Long/Float/Double fields.
    #[serde(default)]
    pub range: Option<(f64, f64)>,
}

impl FieldDef {
    pub fn text(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_type: FieldType::Text,
            required: false,
            primary_key: false,
            multi_value: false,
            delimiter: None,
            default_value: None,
            range: None,
        }
    }

    pub fn primary_key(name: impl Into<String>) -> Self {
        Self {
            primary_key: true,
            required: true,
            ..Self::text(name)
        }
    }
}

/// An ordered, immutable-per-crawl set of field definitions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Schema {
    fields: Vec<FieldDef>,
}

impl Schema {
    pub fn new(fields: Vec<FieldDef>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn primary_key_field(&self) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.primary_key)
    }

    /// Names appear at most once and exactly one field is marked primary key.
    pub fn validate(&self) -> Result<(), String> {
        let mut seen = std::collections::HashSet::new();
        for f in &self.fields {
            if !seen.insert(&f.name) {
                return Err(format!("duplicate field name: {}", f.name));
            }
        }
        let pk_count = self.fields.iter().filter(|f| f.primary_key).count();
        if pk_count != 1 {
            return Err(format!(
                "schema must have exactly one primary-key field, found {pk_count}"
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_duplicate_field_names() {
        let schema = Schema::new(vec![
            FieldDef::primary_key("id"),
            FieldDef::text("title"),
            FieldDef::text("title"),
        ]);
        assert!(schema.validate().is_err());
    }

    #[test]
    fn rejects_missing_primary_key() {
        let schema = Schema::new(vec![FieldDef::text("title")]);
        assert!(schema.validate().is_err());
    }

    #[test]
    fn accepts_well_formed_schema() {
        let schema = Schema::new(vec![FieldDef::primary_key("id"), FieldDef::text("title")]);
        assert!(schema.validate().is_ok());
        assert_eq!(schema.primary_key_field().unwrap().name, "id");
    }
}
