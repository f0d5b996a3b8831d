//! Persistence and ancestor-lookup seams.

use crate::error::{Result, StoreError};
use crate::model::DataModel;
use crate::tree::KindTree;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The structural representation, persisted as a unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OntologyState {
    pub hierarchy: KindTree,
    pub data_model: DataModel,
}

/// Load/save of the structural state.
///
/// Every operation reloads the full state and saves the full result; an
/// implementation needs no partial-update support.
pub trait StateStore: Send + Sync {
    /// `Ok(None)` when nothing has been saved yet.
    fn load_state(&self) -> std::result::Result<Option<OntologyState>, StoreError>;

    fn save_state(&self, state: &OntologyState) -> std::result::Result<(), StoreError>;
}

/// Source of parent chains, nearest ancestor first.
///
/// Kinds the source does not know map to an empty chain.
pub trait AncestorQuery: Send + Sync {
    fn run_ancestor_query(&self, kinds: &[&str]) -> Result<BTreeMap<String, Vec<String>>>;
}

#[derive(Debug, Default)]
pub struct MemoryStateStore {
    state: RwLock<Option<OntologyState>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: OntologyState) -> Self {
        Self {
            state: RwLock::new(Some(state)),
        }
    }
}

impl StateStore for MemoryStateStore {
    fn load_state(&self) -> std::result::Result<Option<OntologyState>, StoreError> {
        Ok(self.state.read().clone())
    }

    fn save_state(&self, state: &OntologyState) -> std::result::Result<(), StoreError> {
        *self.state.write() = Some(state.clone());
        Ok(())
    }
}

pub(crate) fn load_or_default(store: &dyn StateStore) -> Result<OntologyState> {
    Ok(store.load_state()?.unwrap_or_default())
}
