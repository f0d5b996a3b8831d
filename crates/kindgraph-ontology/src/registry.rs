//! Entity-kind registry over a [`StateStore`].

use crate::error::{check_parallel, OntologyError, Result};
use crate::store::{load_or_default, AncestorQuery, OntologyState, StateStore};
use crate::tree::{EntityKind, KindId, KindTree, PropertyDescriptor, PropertyMap, ROOT_KIND};
use kindgraph_dsl::{PropertyType, TypeFamily};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;

/// Creates, queries and edits entity kinds.
///
/// Holds no state of its own: every call loads the hierarchy from the store
/// and writes the full result back.
#[derive(Clone)]
pub struct TypeRegistry {
    store: Arc<dyn StateStore>,
}

impl TypeRegistry {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    fn load(&self) -> Result<OntologyState> {
        load_or_default(self.store.as_ref())
    }

    fn save(&self, state: &OntologyState) -> Result<()> {
        self.store.save_state(state)?;
        Ok(())
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Create `kind` under `parent` (the root when `None`).
    ///
    /// `types` and `units` are either empty (defaults: `string`, `""`) or as
    /// long as `properties`. A missing parent is created as a child of the
    /// root. Creating an existing kind returns it unchanged.
    pub fn create_kind(
        &self,
        kind: &str,
        parent: Option<&str>,
        properties: &[&str],
        types: &[PropertyType],
        units: &[&str],
    ) -> Result<EntityKind> {
        let own = descriptors(properties, types, units, &[])?;
        let mut state = self.load()?;
        let created = create_in(&mut state.hierarchy, kind, parent, own)?;
        if created {
            self.save(&state)?;
        }
        entity_of(&state.hierarchy, kind)
    }

    /// Create several property-less kinds at once. `parents` is empty (all
    /// under the root) or as long as `kinds`.
    pub fn create_kinds(&self, kinds: &[&str], parents: &[&str]) -> Result<Vec<EntityKind>> {
        check_parallel("parents", kinds.len(), parents.len())?;
        let mut state = self.load()?;
        let mut changed = false;
        for (i, kind) in kinds.iter().enumerate() {
            let parent = parents.get(i).copied();
            changed |= create_in(&mut state.hierarchy, kind, parent, PropertyMap::new())?;
        }
        if changed {
            self.save(&state)?;
        }
        kinds
            .iter()
            .map(|kind| entity_of(&state.hierarchy, kind))
            .collect()
    }

    /// Delete `kind` and its whole subtree, returning the removed names.
    ///
    /// Unknown kinds and an empty hierarchy are no-ops. The root cannot be
    /// deleted.
    pub fn delete_kind(&self, kind: &str) -> Result<Vec<String>> {
        if kind == ROOT_KIND {
            return Err(OntologyError::InvalidArgument(format!(
                "the root kind `{ROOT_KIND}` cannot be deleted"
            )));
        }
        let mut state = self.load()?;
        if state.hierarchy.is_empty() {
            tracing::info!(kind = %kind, "kind hierarchy is empty; nothing to delete");
            return Ok(Vec::new());
        }
        let removed = state.hierarchy.remove_subtree(kind);
        if removed.is_empty() {
            tracing::info!(kind = %kind, "kind does not exist; nothing to delete");
            return Ok(removed);
        }
        self.save(&state)?;
        tracing::info!(kind = %kind, removed = removed.len(), "deleted kind and its subtree");
        Ok(removed)
    }

    /// Add or overwrite properties in the kind's own map.
    ///
    /// Kinds created earlier under `kind` keep the inherited snapshot they
    /// were created with.
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

    /// [`add_properties`](Self::add_properties) for several kinds with one
    /// load and one save. An unknown kind anywhere in the batch fails it
    /// before anything is written.
    pub fn add_properties_to_kinds(&self, batch: &[KindProperties<'_>]) -> Result<()> {
        let added = batch
            .iter()
            .map(KindProperties::descriptors)
            .collect::<Result<Vec<_>>>()?;
        let mut state = self.load()?;
        for (entry, added) in batch.iter().zip(added) {
            let record = state
                .hierarchy
                .get_mut(entry.kind)
                .ok_or_else(|| OntologyError::NotFound(format!("kind `{}`", entry.kind)))?;
            record.own.extend(added);
        }
        self.save(&state)?;
        for entry in batch {
            tracing::info!(kind = %entry.kind, count = entry.properties.len(), "added properties");
        }
        Ok(())
    }

    /// Remove properties from the kind's own map. Either all names are
    /// removed or, if any is not an own property of `kind`, none is.
    pub fn remove_properties(&self, kind: &str, properties: &[&str]) -> Result<()> {
        let mut state = self.load()?;
        let record = state
            .hierarchy
            .get_mut(kind)
            .ok_or_else(|| OntologyError::NotFound(format!("kind `{kind}`")))?;
        if let Some(missing) = properties.iter().find(|p| !record.own.contains_key(**p)) {
            return Err(OntologyError::InvalidArgument(format!(
                "property `{missing}` is not defined on kind `{kind}`"
            )));
        }
        for property in properties {
            record.own.remove(*property);
        }
        self.save(&state)?;
        tracing::info!(kind = %kind, count = properties.len(), "removed properties");
        Ok(())
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Resolved (inherited + own) properties of `kind`; empty if unknown.
    pub fn get_kind(&self, kind: &str) -> Result<PropertyMap> {
        let state = self.load()?;
        match state.hierarchy.get(kind) {
            Some(record) => Ok(record.resolved()),
            None => {
                tracing::error!(kind = %kind, "kind does not exist");
                Ok(PropertyMap::new())
            }
        }
    }

    pub fn kind(&self, kind: &str) -> Result<Option<EntityKind>> {
        Ok(self.load()?.hierarchy.entity(kind))
    }

    /// Every kind with its parent, parents before children.
    pub fn all_kinds(&self) -> Result<Vec<EntityKind>> {
        let state = self.load()?;
        Ok(state
            .hierarchy
            .preorder()
            .into_iter()
            .filter_map(|record| state.hierarchy.entity(&record.name))
            .collect())
    }

    /// Parent chain of `kind`, nearest first; empty if unknown or the root.
    pub fn ancestors(&self, kind: &str) -> Result<Vec<String>> {
        Ok(self.load()?.hierarchy.ancestors(kind))
    }

    pub fn hierarchy(&self) -> Result<KindTree> {
        Ok(self.load()?.hierarchy)
    }

    /// Indented tree text, two spaces per level, optionally listing each
    /// kind's resolved properties.
    pub fn render_hierarchy(&self, with_properties: bool) -> Result<String> {
        let state = self.load()?;
        let mut out = String::new();
        for (record, depth) in state.hierarchy.preorder_with_depth() {
            let _ = write!(out, "{:indent$}{}", "", record.name, indent = depth * 2);
            if with_properties {
                let props: Vec<String> = record
                    .resolved()
                    .iter()
                    .map(|(name, desc)| format!("{name}: {desc}"))
                    .collect();
                let _ = write!(out, " {{{}}}", props.join(", "));
            }
            out.push('\n');
        }
        Ok(out)
    }
}

impl AncestorQuery for TypeRegistry {
    fn run_ancestor_query(&self, kinds: &[&str]) -> Result<BTreeMap<String, Vec<String>>> {
        let tree = self.load()?.hierarchy;
        Ok(kinds
            .iter()
            .map(|kind| (kind.to_string(), tree.ancestors(kind)))
            .collect())
    }
}

/// Properties to add to one kind, as parallel lists. `types` and `families`
/// are either empty (defaults) or as long as `properties`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KindProperties<'a> {
    pub kind: &'a str,
    pub properties: Vec<&'a str>,
    pub types: Vec<PropertyType>,
    pub families: Vec<TypeFamily>,
}

impl KindProperties<'_> {
    pub fn descriptors(&self) -> Result<PropertyMap> {
        descriptors(&self.properties, &self.types, &[], &self.families)
    }
}

/// Build descriptors from parallel lists, filling defaults for empty lists.
pub fn descriptors(
    properties: &[&str],
    types: &[PropertyType],
    units: &[&str],
    families: &[TypeFamily],
) -> Result<PropertyMap> {
    check_parallel("types", properties.len(), types.len())?;
    check_parallel("units", properties.len(), units.len())?;
    check_parallel("families", properties.len(), families.len())?;
    properties
        .iter()
        .enumerate()
        .map(|(i, name)| {
            if name.is_empty() {
                return Err(OntologyError::InvalidArgument(
                    "property names must not be empty".to_string(),
                ));
            }
            let descriptor = PropertyDescriptor::new(types.get(i).copied().unwrap_or_default())
                .with_unit(units.get(i).copied().unwrap_or_default())
                .with_family(families.get(i).copied().unwrap_or_default());
            Ok((name.to_string(), descriptor))
        })
        .collect()
}

/// Returns whether `kind` was newly inserted.
fn create_in(
    tree: &mut KindTree,
    kind: &str,
    parent: Option<&str>,
    own: PropertyMap,
) -> Result<bool> {
    if kind.is_empty() {
        return Err(OntologyError::InvalidArgument(
            "kind names must not be empty".to_string(),
        ));
    }
    if tree.is_empty() {
        *tree = KindTree::with_root();
    }
    if tree.contains(kind) {
        tracing::info!(kind = %kind, "kind already exists");
        return Ok(false);
    }
    let parent = parent.unwrap_or(ROOT_KIND);
    if parent == kind {
        return Err(OntologyError::InvalidArgument(format!(
            "kind `{kind}` cannot be its own parent"
        )));
    }
    let parent_id = ensure_parent(tree, parent);
    tree.insert(kind, Some(parent_id), own);
    tracing::info!(kind = %kind, parent = %parent, "created kind");
    Ok(true)
}

fn ensure_parent(tree: &mut KindTree, parent: &str) -> KindId {
    if let Some(id) = tree.id(parent) {
        return id;
    }
    tracing::warn!(
        parent = %parent,
        "parent kind does not exist; creating it as a child of `{ROOT_KIND}`"
    );
    let root = tree.id(ROOT_KIND);
    tree.insert(parent, root, PropertyMap::new())
}

fn entity_of(tree: &KindTree, kind: &str) -> Result<EntityKind> {
    tree.entity(kind)
        .ok_or_else(|| OntologyError::NotFound(format!("kind `{kind}`")))
}
