//! Kindgraph declarative schema text (`.kgs`)
//!
//! The declarative projection of an ontology is a flat list of statements.
//! Every statement is scoped to one kind, one slot of a kind (property or
//! relationship), or one documentation entry, so a single statement can be
//! added or removed without re-interpreting the rest of the document.
//!
//! - `vocab`: scalar property types and type families shared with the
//!   structural representation
//! - `schema_text`: statement AST, line parser and formatter
//! - `document`: whole-document operations (merge, typed filtering,
//!   consistency checks)
//! - `digest`: stable identity for a rendered schema

pub mod digest;
pub mod document;
pub mod schema_text;
pub mod vocab;

pub use digest::{schema_digest, text_digest};
pub use document::{ConsistencyIssue, FragmentMatch, SchemaDocument, SlotSelector};
pub use schema_text::{
    is_identifier, parse_schema_text, parse_statement, Name, SchemaParseError, Statement,
    StatementKey,
};
pub use vocab::{PropertyType, TypeFamily, VocabError};
