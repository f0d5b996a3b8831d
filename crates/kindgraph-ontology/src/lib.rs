//! Kindgraph ontology core
//!
//! The structural side of an ontology: entity kinds arranged in a
//! single-inheritance tree, the relationship kinds allowed between pairs of
//! kinds, and the checks that decide whether an instance write is legal.
//!
//! ```text
//!   TypeRegistry ──┐                      ┌── ValidationService
//!                  ├── StateStore ────────┤        │
//!   RelationshipModel ┘  (OntologyState)  │        ▼
//!                                         └── AncestorQuery
//! ```
//!
//! None of the services cache anything: each call loads the full
//! [`OntologyState`] from its [`StateStore`], works on a copy, and saves the
//! whole result.

pub mod error;
pub mod model;
pub mod registry;
pub mod store;
pub mod tree;
pub mod validation;
pub mod value;

pub use error::{OntologyError, Result, StoreError};
pub use model::{DataModel, RelationshipModel, RelationshipPairing};
pub use registry::{KindProperties, TypeRegistry};
pub use store::{AncestorQuery, MemoryStateStore, OntologyState, StateStore};
pub use tree::{
    EntityKind, KindId, KindRecord, KindTree, PropertyDescriptor, PropertyMap, DELETED_PROPERTY,
    ROOT_KIND,
};
pub use validation::{ResolvedPair, ValidationService};
pub use value::PropertyValue;

pub use kindgraph_dsl::{PropertyType, TypeFamily};
