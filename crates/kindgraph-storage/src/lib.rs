//! Kindgraph storage layer
//!
//! Concrete stores for the ontology core and the facade that keeps the two
//! representations of an ontology consistent:
//!
//! ```text
//!                 ┌──────────────────────┐
//!   caller ──────►│   UnifiedOntology    │
//!                 └──────────┬───────────┘
//!          (declarative)     │      (always)
//!        ┌───────────────────┴──────────────────┐
//!        ▼                                      ▼
//!  SchemaSynchronizer                 TypeRegistry / RelationshipModel
//!        │                                      │
//!        ▼                                      ▼
//!   SchemaStore (.kgs)                 StateStore (hierarchy + data model)
//! ```
//!
//! With the declarative backend every structural change is first committed
//! to the schema store; only if the store accepts it is the structural state
//! updated. A rejected schema change therefore leaves both sides untouched.
//!
//! If the structural save fails after the schema was written, the facade
//! writes the previous schema text back. That restore is itself a write and
//! can fail; the facade then logs an error and the two sides disagree until
//! the next [`UnifiedOntology::sync_schema`]. Neither store offers a
//! transaction spanning both, so the window can be narrowed but not closed.

pub mod config;
mod files;
pub mod json_store;
pub mod schema_store;
pub mod sync;

pub use config::{Backend, StorageConfig};
pub use json_store::JsonStateStore;
pub use schema_store::{check_schema_text, FileSchemaStore, MemorySchemaStore, SchemaStore};
pub use sync::{CommitReceipt, SchemaFragment, SchemaSynchronizer};

use kindgraph_dsl::Statement;
use kindgraph_ontology::model::zip_triples;
use kindgraph_ontology::registry::descriptors;
use kindgraph_ontology::{
    AncestorQuery, EntityKind, KindProperties, OntologyError, OntologyState, PropertyMap,
    PropertyType, PropertyValue, RelationshipModel, ResolvedPair, Result, StateStore, TypeFamily,
    TypeRegistry, ValidationService, ROOT_KIND,
};
use std::sync::Arc;

// ============================================================================
// Facade
// ============================================================================

pub struct UnifiedOntology {
    registry: TypeRegistry,
    model: RelationshipModel,
    validation: ValidationService,
    schema: Option<SchemaSynchronizer>,
}

impl UnifiedOntology {
    /// Open file-backed stores as described by `config`.
    pub fn open(config: &StorageConfig) -> Self {
        let state: Arc<dyn StateStore> = Arc::new(JsonStateStore::new(
            &config.hierarchy_path,
            &config.data_model_path,
        ));
        let schema: Option<Arc<dyn SchemaStore>> = match config.backend {
            Backend::Structural => None,
            Backend::Declarative => Some(Arc::new(FileSchemaStore::new(&config.schema_path))),
        };
        Self::with_stores(state, schema)
    }

    /// Wire the services over explicit stores. Passing a schema store selects
    /// the declarative backend; ancestor lookups then come from the schema.
    pub fn with_stores(state: Arc<dyn StateStore>, schema: Option<Arc<dyn SchemaStore>>) -> Self {
        let registry = TypeRegistry::new(state.clone());
        let model = RelationshipModel::new(state.clone());
        let schema = schema.map(SchemaSynchronizer::new);
        let ancestors: Arc<dyn AncestorQuery> = match &schema {
            Some(sync) => Arc::new(sync.clone()),
            None => Arc::new(registry.clone()),
        };
        let validation = ValidationService::new(state, ancestors);
        Self {
            registry,
            model,
            validation,
            schema,
        }
    }

    pub fn backend(&self) -> Backend {
        if self.schema.is_some() {
            Backend::Declarative
        } else {
            Backend::Structural
        }
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub fn model(&self) -> &RelationshipModel {
        &self.model
    }

    pub fn validation(&self) -> &ValidationService {
        &self.validation
    }

    pub fn schema(&self) -> Option<&SchemaSynchronizer> {
        self.schema.as_ref()
    }

    fn require_schema(&self) -> Result<&SchemaSynchronizer> {
        self.schema.as_ref().ok_or_else(|| {
            OntologyError::InvalidArgument(
                "this operation needs the declarative backend".to_string(),
            )
        })
    }

    /// Run `schema_change` and then `structural_change`. When the structural
    /// half fails the schema text read beforehand is written back.
    ///
    /// Without a schema only `structural_change` runs.
    fn guarded<T>(
        &self,
        schema_change: impl FnOnce(&SchemaSynchronizer) -> Result<()>,
        structural_change: impl FnOnce() -> Result<T>,
    ) -> Result<T> {
        let Some(sync) = &self.schema else {
            return structural_change();
        };
        let before = sync.schema_text()?;
        schema_change(sync)?;
        structural_change().map_err(|err| {
            restore_schema(sync, &before, &err);
            err
        })
    }

    // ========================================================================
    // Kinds
    // ========================================================================

    pub fn create_kind(
        &self,
        kind: &str,
        parent: Option<&str>,
        properties: &[&str],
        types: &[PropertyType],
        units: &[&str],
    ) -> Result<EntityKind> {
        let mut fragments = Vec::new();
        if let Some(sync) = &self.schema {
            if kind != ROOT_KIND && self.registry.kind(kind)?.is_none() {
                let own = descriptors(properties, types, units, &[])?;
                fragments = self.kind_fragments(sync, kind, parent, &own)?;
            }
        }
        self.guarded(
            |sync| sync.commit(&fragments).map(drop),
            || {
                self.registry
                    .create_kind(kind, parent, properties, types, units)
            },
        )
    }

    pub fn create_kinds(&self, kinds: &[&str], parents: &[&str]) -> Result<Vec<EntityKind>> {
        let mut fragments = Vec::new();
        if let Some(sync) = &self.schema {
            if !parents.is_empty() && parents.len() != kinds.len() {
                return Err(OntologyError::InvalidArgument(format!(
                    "parents has {} entries but {} kinds were given",
                    parents.len(),
                    kinds.len()
                )));
            }
            for (i, kind) in kinds.iter().enumerate() {
                if *kind != ROOT_KIND && self.registry.kind(kind)?.is_none() {
                    let parent = parents.get(i).copied();
                    fragments.extend(self.kind_fragments(sync, kind, parent, &PropertyMap::new())?);
                }
            }
        }
        self.guarded(
            |sync| sync.commit(&fragments).map(drop),
            || self.registry.create_kinds(kinds, parents),
        )
    }

    /// Fragments for a new kind plus its parent when that parent will be
    /// created implicitly.
    fn kind_fragments(
        &self,
        sync: &SchemaSynchronizer,
        kind: &str,
        parent: Option<&str>,
        own: &PropertyMap,
    ) -> Result<Vec<SchemaFragment>> {
        let parent = parent.filter(|p| *p != ROOT_KIND);
        let mut fragments = Vec::new();
        if let Some(parent) = parent {
            if self.registry.kind(parent)?.is_none() {
                fragments.push(sync.project_kind(parent, None, &PropertyMap::new(), &[])?);
            }
        }
        fragments.push(sync.project_kind(kind, parent, own, &[])?);
        Ok(fragments)
    }

    /// Delete a kind with its subtree from both representations and drop
    /// every relationship pairing that involved a removed kind.
    pub fn delete_kind(&self, kind: &str) -> Result<Vec<String>> {
        if kind == ROOT_KIND {
            return self.registry.delete_kind(kind);
        }
        let subtree = match &self.schema {
            Some(_) => self.subtree(kind)?,
            None => Vec::new(),
        };
        let removed = self.guarded(
            |sync| {
                if !subtree.is_empty() {
                    sync.delete_kinds(&subtree)?;
                }
                Ok(())
            },
            || self.registry.delete_kind(kind),
        )?;
        // Pairings left behind by a failure here name kinds that no longer
        // exist; projection skips them and the next purge drops them.
        if !removed.is_empty() {
            self.model.purge_kinds(&removed)?;
        }
        Ok(removed)
    }

    fn subtree(&self, kind: &str) -> Result<Vec<String>> {
        let mut tree = self.registry.hierarchy()?;
        Ok(tree.remove_subtree(kind))
    }

    pub fn add_properties(
        &self,
        kind: &str,
        properties: &[&str],
        types: &[PropertyType],
        families: &[TypeFamily],
    ) -> Result<()> {
        self.add_properties_to_kinds(&[KindProperties {
            kind,
            properties: properties.to_vec(),
            types: types.to_vec(),
            families: families.to_vec(),
        }])
    }

    /// Add properties to several kinds with one schema commit and one
    /// structural save.
    pub fn add_properties_to_kinds(&self, batch: &[KindProperties<'_>]) -> Result<()> {
        let mut fragments = Vec::new();
        if let Some(sync) = &self.schema {
            let tree = self.registry.hierarchy()?;
            for entry in batch {
                if !tree.contains(entry.kind) {
                    return Err(OntologyError::NotFound(format!("kind `{}`", entry.kind)));
                }
                let mut fragment = sync.project_kind(entry.kind, None, &entry.descriptors()?, &[])?;
                fragment
                    .statements
                    .retain(|s| matches!(s, Statement::Property { .. }));
                fragments.push(fragment);
            }
        }
        self.guarded(
            |sync| sync.commit(&fragments).map(drop),
            || self.registry.add_properties_to_kinds(batch),
        )
    }

    pub fn remove_properties(&self, kind: &str, properties: &[&str]) -> Result<()> {
        if self.schema.is_some() {
            let existing = self
                .registry
                .kind(kind)?
                .ok_or_else(|| OntologyError::NotFound(format!("kind `{kind}`")))?;
            if let Some(missing) = properties
                .iter()
                .find(|p| !existing.own_properties.contains_key(**p))
            {
                return Err(OntologyError::InvalidArgument(format!(
                    "property `{missing}` is not defined on kind `{kind}`"
                )));
            }
        }
        self.guarded(
            |sync| {
                if !properties.is_empty() {
                    sync.delete_fragment(kind, properties)?;
                }
                Ok(())
            },
            || self.registry.remove_properties(kind, properties),
        )
    }

    /// Remove part of a kind from both representations, schema first.
    ///
    /// With no `names` this is [`delete_kind`](Self::delete_kind). Otherwise
    /// each name is one of the kind's own properties or a relationship kind
    /// the kind is the source of; every pairing of that relationship from
    /// `kind` goes with it. Returns the removed schema statements.
    pub fn delete_schema_fragment(&self, kind: &str, names: &[&str]) -> Result<Vec<Statement>> {
        let sync = self.require_schema()?;
        if names.is_empty() {
            let before = sync.document()?;
            self.delete_kind(kind)?;
            let after = sync.document()?;
            return Ok(before
                .into_statements()
                .into_iter()
                .filter(|s| !after.contains(s))
                .collect());
        }

        let entity = self
            .registry
            .kind(kind)?
            .ok_or_else(|| OntologyError::NotFound(format!("kind `{kind}`")))?;
        let data_model = self.model.data_model()?;
        let mut properties = Vec::new();
        let mut relationships: Vec<(&str, &str)> = Vec::new();
        for name in names {
            if entity.own_properties.contains_key(*name) {
                properties.push(*name);
                continue;
            }
            let before = relationships.len();
            relationships.extend(
                data_model
                    .pairings(name)
                    .unwrap_or_default()
                    .iter()
                    .filter(|pairing| pairing.kind_a == kind)
                    .map(|pairing| (*name, pairing.kind_b.as_str())),
            );
            if relationships.len() == before {
                return Err(OntologyError::InvalidArgument(format!(
                    "`{name}` is neither a property of `{kind}` nor a relationship kind from it"
                )));
            }
        }

        let mut removed = Vec::new();
        self.guarded(
            |sync| {
                removed = sync.delete_fragment(kind, names)?;
                Ok(())
            },
            || {
                if !properties.is_empty() {
                    self.registry.remove_properties(kind, &properties)?;
                }
                if !relationships.is_empty() {
                    let sources = vec![kind; relationships.len()];
                    let (rels, targets): (Vec<&str>, Vec<&str>) =
                        relationships.iter().copied().unzip();
                    self.model
                        .delete_relationship_kinds(&sources, &rels, &targets)?;
                }
                Ok(())
            },
        )?;
        Ok(removed)
    }

    // ========================================================================
    // Relationships
    // ========================================================================

    pub fn create_relationship_kind(
        &self,
        kind_a: &str,
        relationship_kind: &str,
        kind_b: &str,
    ) -> Result<bool> {
        Ok(self.create_relationship_kinds(&[kind_a], &[relationship_kind], &[kind_b])? == 1)
    }

    /// Allow each `(kinds_a[i], relationship_kinds[i], kinds_b[i])` with one
    /// schema commit and one structural save. Returns how many pairings were
    /// new.
    pub fn create_relationship_kinds(
        &self,
        kinds_a: &[&str],
        relationship_kinds: &[&str],
        kinds_b: &[&str],
    ) -> Result<usize> {
        let triples = zip_triples(kinds_a, relationship_kinds, kinds_b)?;
        // A relation on a kind the schema does not declare is rejected by
        // the store.
        let fragments = match &self.schema {
            Some(sync) => sync.project_relations(&triples)?,
            None => Vec::new(),
        };
        self.guarded(
            |sync| sync.commit(&fragments).map(drop),
            || {
                self.model
                    .create_relationship_kinds(kinds_a, relationship_kinds, kinds_b)
            },
        )
    }

    pub fn delete_relationship_kind(
        &self,
        kind_a: &str,
        relationship_kind: &str,
        kind_b: &str,
    ) -> Result<bool> {
        Ok(self.delete_relationship_kinds(&[kind_a], &[relationship_kind], &[kind_b])? == 1)
    }

    /// Remove several pairings with one schema write and one structural
    /// save. An unknown relationship kind fails the batch before either side
    /// changes.
    pub fn delete_relationship_kinds(
        &self,
        kinds_a: &[&str],
        relationship_kinds: &[&str],
        kinds_b: &[&str],
    ) -> Result<usize> {
        let triples = zip_triples(kinds_a, relationship_kinds, kinds_b)?;
        if self.schema.is_some() {
            let data_model = self.model.data_model()?;
            if let Some((_, unknown, _)) = triples
                .iter()
                .find(|(_, rel, _)| data_model.pairings(rel).is_none())
            {
                return Err(OntologyError::InvalidArgument(format!(
                    "relationship kind `{unknown}` does not exist"
                )));
            }
        }
        self.guarded(
            |sync| sync.delete_relationships(&triples).map(drop),
            || {
                self.model
                    .delete_relationship_kinds(kinds_a, relationship_kinds, kinds_b)
            },
        )
    }

    pub fn add_relationship_properties(
        &self,
        kind_a: &str,
        relationship_kind: &str,
        kind_b: &str,
        properties: &[&str],
        types: &[PropertyType],
    ) -> Result<()> {
        self.model
            .add_relationship_properties(kind_a, relationship_kind, kind_b, properties, types)
    }

    // ========================================================================
    // Validation
    // ========================================================================

    pub fn validate_entity_properties(
        &self,
        kind: &str,
        property_names: &[&str],
        property_values: &[PropertyValue],
    ) -> Result<()> {
        self.validation
            .validate_entity_properties(kind, property_names, property_values)
    }

    pub fn validate_relationship(
        &self,
        kind_a: &str,
        relationship_kind: &str,
        kind_b: &str,
        property_names: &[&str],
        property_values: &[PropertyValue],
    ) -> Result<ResolvedPair> {
        self.validation.validate_relationship(
            kind_a,
            relationship_kind,
            kind_b,
            property_names,
            property_values,
        )
    }

    // ========================================================================
    // Schema
    // ========================================================================

    pub fn update_label(&self, kind: &str, property: Option<&str>, text: &str) -> Result<()> {
        self.require_schema()?.update_label(kind, property, text)
    }

    /// Set several labels in one schema commit.
    pub fn update_labels(&self, labels: &[(&str, Option<&str>, &str)]) -> Result<CommitReceipt> {
        self.require_schema()?.update_labels(labels)
    }

    /// Project the whole structural state into the schema (for a store that
    /// was populated before the declarative backend was enabled).
    pub fn sync_schema(&self) -> Result<CommitReceipt> {
        let sync = self.require_schema()?;
        let state = OntologyState {
            hierarchy: self.registry.hierarchy()?,
            data_model: self.model.data_model()?,
        };
        let fragments = sync.project_state(&state)?;
        sync.commit(&fragments)
    }
}

fn restore_schema(sync: &SchemaSynchronizer, before: &str, cause: &OntologyError) {
    if matches!(sync.schema_text(), Ok(current) if current == before) {
        return;
    }
    if let Err(restore) = sync.restore_text(before) {
        tracing::error!(
            error = %restore,
            cause = %cause,
            "could not restore the schema after a failed structural update; run `schema sync`"
        );
    }
}
