//! Structural state as two JSON files: the kind hierarchy and the
//! relationship data model.

use crate::files::{read_optional, write_atomic};
use kindgraph_ontology::{DataModel, KindTree, OntologyState, StateStore, StoreError};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct JsonStateStore {
    hierarchy_path: PathBuf,
    data_model_path: PathBuf,
    // Serializes load/save within the process; across processes the last
    // writer wins.
    io: Mutex<()>,
}

impl JsonStateStore {
    pub fn new(hierarchy_path: impl Into<PathBuf>, data_model_path: impl Into<PathBuf>) -> Self {
        Self {
            hierarchy_path: hierarchy_path.into(),
            data_model_path: data_model_path.into(),
            io: Mutex::new(()),
        }
    }

    pub fn hierarchy_path(&self) -> &Path {
        &self.hierarchy_path
    }

    pub fn data_model_path(&self) -> &Path {
        &self.data_model_path
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    let Some(text) = read_optional(path)? else {
        return Ok(None);
    };
    serde_json::from_str(&text)
        .map(Some)
        .map_err(|source| StoreError::Codec {
            path: path.to_path_buf(),
            source,
        })
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec_pretty(value).map_err(|source| StoreError::Codec {
        path: path.to_path_buf(),
        source,
    })?;
    write_atomic(path, &bytes)
}

impl StateStore for JsonStateStore {
    fn load_state(&self) -> Result<Option<OntologyState>, StoreError> {
        let _guard = self.io.lock();
        let hierarchy: Option<KindTree> = read_json(&self.hierarchy_path)?;
        let data_model: Option<DataModel> = read_json(&self.data_model_path)?;
        if hierarchy.is_none() && data_model.is_none() {
            return Ok(None);
        }
        Ok(Some(OntologyState {
            hierarchy: hierarchy.unwrap_or_default(),
            data_model: data_model.unwrap_or_default(),
        }))
    }

    fn save_state(&self, state: &OntologyState) -> Result<(), StoreError> {
        let _guard = self.io.lock();
        // The hierarchy decides which kinds exist, so it goes last: a failure
        // between the two writes leaves at worst pairings for kinds the
        // hierarchy does not list yet (or still lists).
        write_json(&self.data_model_path, &state.data_model)?;
        write_json(&self.hierarchy_path, &state.hierarchy)?;
        tracing::debug!(
            hierarchy = %self.hierarchy_path.display(),
            data_model = %self.data_model_path.display(),
            kinds = state.hierarchy.len(),
            "saved ontology state"
        );
        Ok(())
    }
}
