//! Declarative schema stores.
//!
//! A store holds the whole schema text and accepts or rejects whole-document
//! writes. Both stores here refuse documents that fail
//! [`SchemaDocument::check`], so a rejected write leaves the previous text in
//! place.

use crate::files::{read_optional, write_atomic};
use kindgraph_dsl::{SchemaDocument, Statement};
use kindgraph_ontology::StoreError;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

pub trait SchemaStore: Send + Sync {
    /// Current schema text; empty when nothing was written yet.
    fn get_schema_text(&self) -> Result<String, StoreError>;

    fn write_schema_text(&self, text: &str) -> Result<(), StoreError>;
}

/// Parse and check a candidate document.
pub fn check_schema_text(text: &str) -> Result<SchemaDocument, StoreError> {
    let document = SchemaDocument::parse(text)?;
    if let Err(issues) = document.check() {
        let reasons: Vec<String> = issues.iter().map(ToString::to_string).collect();
        return Err(StoreError::Rejected {
            context: "schema".to_string(),
            reason: reasons.join("; "),
        });
    }
    Ok(document)
}

// ============================================================================
// In-memory store
// ============================================================================

/// Marks a kind (or one slot of it) as having instance data.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct Pin {
    kind: String,
    slot: Option<String>,
}

impl Pin {
    fn satisfied_by(&self, document: &SchemaDocument) -> bool {
        document.statements().iter().any(|s| match (&self.slot, s) {
            (None, Statement::Class { kind }) => *kind == self.kind,
            (Some(slot), Statement::Property { kind, name, .. })
            | (Some(slot), Statement::Relation { kind, name, .. }) => {
                *kind == self.kind && name == slot
            }
            _ => false,
        })
    }

    fn context(&self) -> String {
        match &self.slot {
            Some(slot) => format!("{}.{slot}", self.kind),
            None => self.kind.clone(),
        }
    }
}

/// In-memory schema store.
///
/// Kinds and slots can be pinned to stand in for live instance data: a write
/// that would drop a pinned kind or slot is rejected, like a graph database
/// refusing to drop a class that still has instances.
#[derive(Debug, Default)]
pub struct MemorySchemaStore {
    text: RwLock<String>,
    pins: RwLock<BTreeSet<Pin>>,
}

impl MemorySchemaStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text(text: impl Into<String>) -> Self {
        Self {
            text: RwLock::new(text.into()),
            pins: RwLock::default(),
        }
    }

    pub fn pin_instances(&self, kind: &str, slot: Option<&str>) {
        self.pins.write().insert(Pin {
            kind: kind.to_string(),
            slot: slot.map(str::to_string),
        });
    }

    pub fn unpin_instances(&self, kind: &str, slot: Option<&str>) {
        self.pins.write().remove(&Pin {
            kind: kind.to_string(),
            slot: slot.map(str::to_string),
        });
    }
}

impl SchemaStore for MemorySchemaStore {
    fn get_schema_text(&self) -> Result<String, StoreError> {
        Ok(self.text.read().clone())
    }

    fn write_schema_text(&self, text: &str) -> Result<(), StoreError> {
        let document = check_schema_text(text)?;
        if let Some(pin) = self.pins.read().iter().find(|p| !p.satisfied_by(&document)) {
            return Err(StoreError::Rejected {
                context: pin.context(),
                reason: "instance data still depends on it".to_string(),
            });
        }
        *self.text.write() = text.to_string();
        Ok(())
    }
}

// ============================================================================
// File store
// ============================================================================

#[derive(Debug)]
pub struct FileSchemaStore {
    path: PathBuf,
    io: Mutex<()>,
}

impl FileSchemaStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            io: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SchemaStore for FileSchemaStore {
    fn get_schema_text(&self) -> Result<String, StoreError> {
        let _guard = self.io.lock();
        Ok(read_optional(&self.path)?.unwrap_or_default())
    }

    fn write_schema_text(&self, text: &str) -> Result<(), StoreError> {
        check_schema_text(text)?;
        let _guard = self.io.lock();
        write_atomic(&self.path, text.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inconsistent_documents_are_rejected_and_nothing_changes() {
        let store = MemorySchemaStore::with_text("class A\n");
        let err = store
            .write_schema_text("class A\ninherits A B\n")
            .unwrap_err();
        assert!(matches!(err, StoreError::Rejected { .. }));
        assert_eq!(store.get_schema_text().unwrap(), "class A\n");
    }

    #[test]
    fn pinned_slots_block_their_removal() {
        let store = MemorySchemaStore::with_text("class A\nproperty A.x: Optional xsd:string\n");
        store.pin_instances("A", Some("x"));
        match store.write_schema_text("class A\n") {
            Err(StoreError::Rejected { context, .. }) => assert_eq!(context, "A.x"),
            other => panic!("expected rejection, got {other:?}"),
        }
        store.unpin_instances("A", Some("x"));
        store.write_schema_text("class A\n").unwrap();
    }

    #[test]
    fn file_store_starts_empty_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSchemaStore::new(dir.path().join("nested").join("schema.kgs"));
        assert_eq!(store.get_schema_text().unwrap(), "");
        store.write_schema_text("class A\n").unwrap();
        let reopened = FileSchemaStore::new(store.path().to_path_buf());
        assert_eq!(reopened.get_schema_text().unwrap(), "class A\n");
        assert!(matches!(
            reopened.write_schema_text("bogus line"),
            Err(StoreError::Parse(_))
        ));
    }
}
