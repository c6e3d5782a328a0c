//! Hand-rolled XML serialization for [`Document`], used for on-disk phase
//! files, and for the publisher's add-document archive stream.
//!
//! The core doesn't depend on any particular serialization dialect (per the
//! spec's design notes); this module is one pluggable implementation chosen
//! to match the external index's add-document XML contract. It only needs to
//! round-trip documents this crate itself writes, so the reader is a small
//! recursive-descent parser rather than a general-purpose XML library.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use super::document::{Acl, Document, DocumentOptions, Relationship, Row};
use super::schema::{FieldDef, FieldType, Schema};

/// Serialize a document to its XML representation.
pub fn to_xml(doc: &Document) -> String {
    let mut out = String::new();
    write_document(&mut out, doc);
    out
}

fn write_document(out: &mut String, doc: &Document) {
    let _ = write!(
        out,
        "<document id=\"{}\" type=\"{}\">",
        escape(&doc.id),
        escape(&doc.doc_type)
    );
    write_schema(out, &doc.schema);
    write_options(out, &doc.options);
    write_features(out, &doc.features);
    write_rows(out, &doc.rows);
    write_relationships(out, &doc.relationships);
    write_acl(out, &doc.acl);
    out.push_str("</document>");
}

fn write_schema(out: &mut String, schema: &Schema) {
    out.push_str("<schema>");
    for f in schema.fields() {
        let _ = write!(
            out,
            "<field name=\"{}\" type=\"{:?}\" required=\"{}\" primaryKey=\"{}\" multiValue=\"{}\"",
            escape(&f.name),
            f.field_type,
            f.required,
            f.primary_key,
            f.multi_value,
        );
        if let Some(d) = f.delimiter {
            let _ = write!(out, " delimiter=\"{}\"", escape(&d.to_string()));
        }
        if let Some(ref dv) = f.default_value {
            let _ = write!(out, " default=\"{}\"", escape(dv));
        }
        if let Some((lo, hi)) = f.range {
            let _ = write!(out, " rangeMin=\"{lo}\" rangeMax=\"{hi}\"");
        }
        out.push_str("/>");
    }
    out.push_str("</schema>");
}

fn write_options(out: &mut String, options: &DocumentOptions) {
    let _ = write!(out, "<options isContent=\"{}\"", options.is_content);
    if let Some(d) = options.mv_delimiter {
        let _ = write!(out, " mvDelimiter=\"{}\"", escape(&d.to_string()));
    }
    out.push_str("/>");
}

fn write_features(out: &mut String, features: &BTreeMap<String, String>) {
    out.push_str("<features>");
    for (k, v) in features {
        let _ = write!(
            out,
            "<feature name=\"{}\">{}</feature>",
            escape(k),
            escape(v)
        );
    }
    out.push_str("</features>");
}

fn write_rows(out: &mut String, rows: &[Row]) {
    out.push_str("<rows>");
    for row in rows {
        out.push_str("<row>");
        for (name, values) in row {
            let _ = write!(out, "<field name=\"{}\">", escape(name));
            for v in values {
                let _ = write!(out, "<value>{}</value>", escape(v));
            }
            out.push_str("</field>");
        }
        out.push_str("</row>");
    }
    out.push_str("</rows>");
}

fn write_relationships(out: &mut String, relationships: &[Relationship]) {
    out.push_str("<relationships>");
    for rel in relationships {
        let _ = write!(
            out,
            "<relationship type=\"{}\">",
            escape(&rel.relationship_type)
        );
        out.push_str("<properties>");
        for (k, v) in &rel.properties {
            let _ = write!(out, "<property name=\"{}\">{}</property>", escape(k), escape(v));
        }
        out.push_str("</properties>");
        out.push_str("<documents>");
        for child in &rel.children {
            write_document(out, child);
        }
        out.push_str("</documents>");
        out.push_str("</relationship>");
    }
    out.push_str("</relationships>");
}

fn write_acl(out: &mut String, acl: &Acl) {
    out.push_str("<acl>");
    for (principal, perm) in acl {
        let _ = write!(
            out,
            "<principal name=\"{}\">{}</principal>",
            escape(principal),
            escape(perm)
        );
    }
    out.push_str("</acl>");
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

fn unescape(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Parse a document previously produced by [`to_xml`].
pub fn from_xml(xml: &str) -> Result<Document, String> {
    let mut p = Parser::new(xml);
    p.parse_document()
}

/// A minimal recursive-descent reader over the small, fixed tag vocabulary
/// this module writes. Not a general XML parser.
struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn parse_document(&mut self) -> Result<Document, String> {
        let attrs = self.expect_start("document")?;
        let id = attrs.get("id").ok_or("document missing id")?.clone();
        let doc_type = attrs.get("type").ok_or("document missing type")?.clone();

        let schema = self.parse_schema()?;
        let options = self.parse_options()?;
        let features = self.parse_features()?;
        let rows = self.parse_rows()?;
        let relationships = self.parse_relationships()?;
        let acl = self.parse_acl()?;
        self.expect_end("document")?;

        Ok(Document {
            id,
            doc_type,
            schema,
            rows,
            options,
            features,
            relationships,
            acl,
        })
    }

    fn parse_schema(&mut self) -> Result<Schema, String> {
        self.expect_start("schema")?;
        let mut fields = Vec::new();
        loop {
            self.skip_ws();
            if self.peek_is_end("schema") {
                break;
            }
            let attrs = self.expect_self_closing("field")?;
            let field_type = match attrs.get("type").map(String::as_str) {
                Some("Text") => FieldType::Text,
                Some("Integer") => FieldType::Integer,
                Some("Long") => FieldType::Long,
                Some("Float") => FieldType::Float,
                Some("Double") => FieldType::Double,
                Some("Boolean") => FieldType::Boolean,
                Some("Date") => FieldType::Date,
                Some("Time") => FieldType::Time,
                Some("DateTime") => FieldType::DateTime,
                other => return Err(format!("unknown field type: {other:?}")),
            };
            fields.push(FieldDef {
                name: attrs.get("name").ok_or("field missing name")?.clone(),
                field_type,
                required: attrs.get("required").map(|v| v == "true").unwrap_or(false),
                primary_key: attrs
                    .get("primaryKey")
                    .map(|v| v == "true")
                    .unwrap_or(false),
                multi_value: attrs
                    .get("multiValue")
                    .map(|v| v == "true")
                    .unwrap_or(false),
                delimiter: attrs.get("delimiter").and_then(|v| v.chars().next()),
                default_value: attrs.get("default").cloned(),
                range: match (attrs.get("rangeMin"), attrs.get("rangeMax")) {
                    (Some(lo), Some(hi)) => Some((
                        lo.parse().map_err(|_| "bad rangeMin")?,
                        hi.parse().map_err(|_| "bad rangeMax")?,
                    )),
                    _ => None,
                },
            });
        }
        self.expect_end("schema")?;
        Ok(Schema::new(fields))
    }

    fn parse_options(&mut self) -> Result<DocumentOptions, String> {
        let attrs = self.expect_self_closing("options")?;
        Ok(DocumentOptions {
            is_content: attrs.get("isContent").map(|v| v == "true").unwrap_or(false),
            mv_delimiter: attrs.get("mvDelimiter").and_then(|v| v.chars().next()),
        })
    }

    fn parse_features(&mut self) -> Result<BTreeMap<String, String>, String> {
        self.expect_start("features")?;
        let mut map = BTreeMap::new();
        loop {
            self.skip_ws();
            if self.peek_is_end("features") {
                break;
            }
            let attrs = self.expect_start("feature")?;
            let name = attrs.get("name").ok_or("feature missing name")?.clone();
            let value = self.read_text_until_end("feature")?;
            map.insert(name, unescape(&value));
        }
        self.expect_end("features")?;
        Ok(map)
    }

    fn parse_rows(&mut self) -> Result<Vec<Row>, String> {
        self.expect_start("rows")?;
        let mut rows = Vec::new();
        loop {
            self.skip_ws();
            if self.peek_is_end("rows") {
                break;
            }
            self.expect_start("row")?;
            let mut row = Row::new();
            loop {
                self.skip_ws();
                if self.peek_is_end("row") {
                    break;
                }
                let attrs = self.expect_start("field")?;
                let name = attrs.get("name").ok_or("field missing name")?.clone();
                let mut values = Vec::new();
                loop {
                    self.skip_ws();
                    if self.peek_is_end("field") {
                        break;
                    }
                    self.expect_start("value")?;
                    let text = self.read_text_until_end("value")?;
                    values.push(unescape(&text));
                }
                self.expect_end("field")?;
                row.insert(name, values);
            }
            self.expect_end("row")?;
            rows.push(row);
        }
        self.expect_end("rows")?;
        Ok(rows)
    }

    fn parse_relationships(&mut self) -> Result<Vec<Relationship>, String> {
        self.expect_start("relationships")?;
        let mut rels = Vec::new();
        loop {
            self.skip_ws();
            if self.peek_is_end("relationships") {
                break;
            }
            let attrs = self.expect_start("relationship")?;
            let relationship_type = attrs.get("type").ok_or("relationship missing type")?.clone();

            self.expect_start("properties")?;
            let mut properties = BTreeMap::new();
            loop {
                self.skip_ws();
                if self.peek_is_end("properties") {
                    break;
                }
                let attrs = self.expect_start("property")?;
                let name = attrs.get("name").ok_or("property missing name")?.clone();
                let value = self.read_text_until_end("property")?;
                properties.insert(name, unescape(&value));
            }
            self.expect_end("properties")?;

            self.expect_start("documents")?;
            let mut children = Vec::new();
            loop {
                self.skip_ws();
                if self.peek_is_end("documents") {
                    break;
                }
                children.push(self.parse_document()?);
            }
            self.expect_end("documents")?;
            self.expect_end("relationship")?;

            rels.push(Relationship {
                relationship_type,
                properties,
                children,
            });
        }
        self.expect_end("relationships")?;
        Ok(rels)
    }

    fn parse_acl(&mut self) -> Result<Acl, String> {
        self.expect_start("acl")?;
        let mut acl = Acl::new();
        loop {
            self.skip_ws();
            if self.peek_is_end("acl") {
                break;
            }
            let attrs = self.expect_start("principal")?;
            let name = attrs.get("name").ok_or("principal missing name")?.clone();
            let perm = self.read_text_until_end("principal")?;
            acl.insert(name, unescape(&perm));
        }
        self.expect_end("acl")?;
        Ok(acl)
    }

    // -- low-level tag scanning --

    fn skip_ws(&mut self) {
        while self.input[self.pos..]
            .chars()
            .next()
            .map(|c| c.is_whitespace())
            .unwrap_or(false)
        {
            self.pos += 1;
        }
    }

    fn peek_is_end(&mut self, name: &str) -> bool {
        self.skip_ws();
        self.input[self.pos..].starts_with(&format!("</{name}>"))
    }

    /// Parse `<tag attr="v" ...>` (not self-closing) and return its attributes.
    fn expect_start(&mut self, name: &str) -> Result<BTreeMap<String, String>, String> {
        self.skip_ws();
        let open = format!("<{name}");
        if !self.input[self.pos..].starts_with(&open) {
            return Err(format!(
                "expected <{name}> at byte {}, found: {:.40}",
                self.pos,
                &self.input[self.pos..]
            ));
        }
        self.pos += open.len();
        let (attrs, self_closing) = self.parse_attrs_and_close()?;
        if self_closing {
            return Err(format!("expected <{name}> to have separate close tag"));
        }
        Ok(attrs)
    }

    /// Parse a self-closing `<tag attr="v" .../>` and return its attributes.
    fn expect_self_closing(&mut self, name: &str) -> Result<BTreeMap<String, String>, String> {
        self.skip_ws();
        let open = format!("<{name}");
        if !self.input[self.pos..].starts_with(&open) {
            return Err(format!("expected <{name}/> at byte {}", self.pos));
        }
        self.pos += open.len();
        let (attrs, self_closing) = self.parse_attrs_and_close()?;
        if !self_closing {
            return Err(format!("expected <{name}/> to be self-closing"));
        }
        Ok(attrs)
    }

    fn expect_end(&mut self, name: &str) -> Result<(), String> {
        self.skip_ws();
        let close = format!("</{name}>");
        if !self.input[self.pos..].starts_with(&close) {
            return Err(format!(
                "expected </{name}> at byte {}, found: {:.40}",
                self.pos,
                &self.input[self.pos..]
            ));
        }
        self.pos += close.len();
        Ok(())
    }

    /// Read attributes up to `>` or `/>`, returns (attrs, was_self_closing).
    fn parse_attrs_and_close(&mut self) -> Result<(BTreeMap<String, String>, bool), String> {
        let mut attrs = BTreeMap::new();
        loop {
            self.skip_ws();
            let rest = &self.input[self.pos..];
            if let Some(stripped) = rest.strip_prefix("/>") {
                self.pos += rest.len() - stripped.len();
                return Ok((attrs, true));
            }
            if let Some(stripped) = rest.strip_prefix('>') {
                self.pos += rest.len() - stripped.len();
                return Ok((attrs, false));
            }
            let name_end = rest
                .find('=')
                .ok_or("malformed attribute (missing '=')")?;
            let name = rest[..name_end].trim().to_string();
            let after_eq = &rest[name_end + 1..];
            let quote_start = after_eq
                .find('"')
                .ok_or("malformed attribute (missing opening quote)")?;
            let value_start = quote_start + 1;
            let value_end = after_eq[value_start..]
                .find('"')
                .ok_or("malformed attribute (missing closing quote)")?;
            let value = unescape(&after_eq[value_start..value_start + value_end]);
            let consumed = name_end + 1 + value_start + value_end + 1;
            self.pos += consumed;
            attrs.insert(name, value);
        }
    }

    fn read_text_until_end(&mut self, name: &str) -> Result<String, String> {
        let close = format!("</{name}>");
        let rest = &self.input[self.pos..];
        let end = rest
            .find(&close)
            .ok_or_else(|| format!("expected {close} before end of input"))?;
        let text = rest[..end].to_string();
        self.pos += end + close.len();
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::document::DocumentOptions;
    use crate::model::schema::FieldDef;

    fn sample_document() -> Document {
        let schema = Schema::new(vec![
            FieldDef::primary_key("id"),
            FieldDef {
                multi_value: true,
                delimiter: Some('|'),
                ..FieldDef::text("tags")
            },
        ]);
        let mut doc = Document::new("doc-1", "page", schema);
        doc.options = DocumentOptions {
            is_content: true,
            mv_delimiter: Some('|'),
        };
        doc.features.insert("mv-delimiter".into(), "|".into());
        let mut row = Row::new();
        row.insert("id".into(), vec!["doc-1".into()]);
        row.insert(
            "tags".into(),
            vec!["a&b".into(), "<weird>".into(), "c\"d".into()],
        );
        doc.rows.push(row);
        doc.acl.insert("alice".into(), "read,write".into());

        let child = Document::new("doc-1-child", "attachment", Schema::default());
        doc.relationships.push(Relationship {
            relationship_type: "attachment-of".into(),
            properties: BTreeMap::from([("order".to_string(), "1".to_string())]),
            children: vec![child],
        });
        doc
    }

    #[test]
    fn round_trips_a_document_with_relationships_and_escaping() {
        let doc = sample_document();
        let xml = to_xml(&doc);
        let parsed = from_xml(&xml).expect("parse");

        assert_eq!(parsed.id, doc.id);
        assert_eq!(parsed.doc_type, doc.doc_type);
        assert_eq!(parsed.options.is_content, doc.options.is_content);
        assert_eq!(parsed.options.mv_delimiter, doc.options.mv_delimiter);
        assert_eq!(parsed.rows, doc.rows);
        assert_eq!(parsed.acl, doc.acl);
        assert_eq!(parsed.relationships.len(), 1);
        assert_eq!(
            parsed.relationships[0].relationship_type,
            "attachment-of"
        );
        assert_eq!(parsed.relationships[0].children[0].id, "doc-1-child");
        assert_eq!(
            parsed.schema.field("tags").unwrap().delimiter,
            Some('|')
        );
    }
}
