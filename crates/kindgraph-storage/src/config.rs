//! Storage configuration.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Which representation is authoritative for schema questions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Tree + relationship map only.
    #[default]
    Structural,
    /// Additionally keeps a declarative schema text in step with every change.
    Declarative,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// JSON file holding the kind hierarchy
    pub hierarchy_path: PathBuf,
    /// JSON file holding the relationship data model
    pub data_model_path: PathBuf,
    /// Schema text file (declarative backend only)
    pub schema_path: PathBuf,
    pub backend: Backend,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::rooted_at("./ontology")
    }
}

impl StorageConfig {
    /// Default file names under `dir`.
    pub fn rooted_at(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            hierarchy_path: dir.join("hierarchy.json"),
            data_model_path: dir.join("data_model.json"),
            schema_path: dir.join("schema.kgs"),
            backend: Backend::default(),
        }
    }

    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    /// Read a JSON config file. Missing fields take their defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("failed to parse config {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_fills_defaults() {
        let config: StorageConfig =
            serde_json::from_str(r#"{"backend": "declarative", "schema_path": "s.kgs"}"#).unwrap();
        assert_eq!(config.backend, Backend::Declarative);
        assert_eq!(config.schema_path, PathBuf::from("s.kgs"));
        assert_eq!(
            config.hierarchy_path,
            PathBuf::from("./ontology").join("hierarchy.json")
        );
    }
}
