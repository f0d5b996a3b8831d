//! Error taxonomy for the ontology core and its stores.

use kindgraph_dsl::{SchemaParseError, VocabError};
use std::path::PathBuf;
use thiserror::Error;

/// Failures of a persistence collaborator (state files, schema stores).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("i/o error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot decode {path}: {source}")]
    Codec {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    /// The store refused a write. `context` names the kind or slot involved.
    #[error("store rejected change to {context}: {reason}")]
    Rejected { context: String, reason: String },
    #[error(transparent)]
    Parse(#[from] SchemaParseError),
}

#[derive(Debug, Error)]
pub enum OntologyError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("schema violation: {0}")]
    SchemaViolation(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<VocabError> for OntologyError {
    fn from(err: VocabError) -> Self {
        OntologyError::InvalidArgument(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, OntologyError>;

/// Fails with `InvalidArgument` unless `other` is empty or as long as `names`.
pub(crate) fn check_parallel(what: &str, names: usize, other: usize) -> Result<()> {
    if other != 0 && other != names {
        return Err(OntologyError::InvalidArgument(format!(
            "{what} has {other} entries but {names} names were given"
        )));
    }
    Ok(())
}
