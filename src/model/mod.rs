//! Document data model: schema, document, and the XML serialization used to
//! stage documents on disk between pipeline stages.

pub mod document;
pub mod schema;
pub mod xml;

pub use document::{Acl, Document, DocumentOptions, Relationship, Row};
pub use schema::{FieldDef, FieldType, Schema};
