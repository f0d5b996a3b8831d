//! Relationship-kind data model: which kind pairs a relationship kind may
//! connect, and the typed properties each pairing carries.

use crate::error::{OntologyError, Result};
use crate::registry::descriptors;
use crate::store::{load_or_default, OntologyState, StateStore};
use crate::tree::PropertyMap;
use kindgraph_dsl::PropertyType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipPairing {
    pub kind_a: String,
    pub kind_b: String,
    #[serde(default)]
    pub properties: PropertyMap,
}

impl RelationshipPairing {
    pub fn connects(&self, kind_a: &str, kind_b: &str) -> bool {
        self.kind_a == kind_a && self.kind_b == kind_b
    }
}

/// Relationship kind name → ordered pairings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataModel {
    pub relationships: BTreeMap<String, Vec<RelationshipPairing>>,
}

impl DataModel {
    pub fn is_empty(&self) -> bool {
        self.relationships.is_empty()
    }

    pub fn pairings(&self, relationship_kind: &str) -> Option<&[RelationshipPairing]> {
        self.relationships.get(relationship_kind).map(Vec::as_slice)
    }

    /// Lines of the form `(A)-[R {props}]->(B)`, sorted by relationship kind
    /// and then in registration order.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (rel, pairings) in &self.relationships {
            for pairing in pairings {
                let props: Vec<String> = pairing
                    .properties
                    .iter()
                    .map(|(name, desc)| format!("{name}: {desc}"))
                    .collect();
                let props = if props.is_empty() {
                    String::new()
                } else {
                    format!(" {{{}}}", props.join(", "))
                };
                out.push_str(&format!(
                    "({})-[{rel}{props}]->({})\n",
                    pairing.kind_a, pairing.kind_b
                ));
            }
        }
        out
    }
}

/// Registers and edits relationship kinds over a [`StateStore`].
#[derive(Clone)]
pub struct RelationshipModel {
    store: Arc<dyn StateStore>,
}

impl RelationshipModel {
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

    /// Allow `relationship_kind` between `kind_a` and `kind_b`. Returns
    /// `false` (and changes nothing) if the pairing is already registered.
    pub fn create_relationship_kind(
        &self,
        kind_a: &str,
        relationship_kind: &str,
        kind_b: &str,
    ) -> Result<bool> {
        Ok(self.create_relationship_kinds(&[kind_a], &[relationship_kind], &[kind_b])? == 1)
    }

    /// Register several pairings with one load and one save. The three lists
    /// are parallel; a pair already registered is skipped. Returns how many
    /// pairings were added.
    pub fn create_relationship_kinds(
        &self,
        kinds_a: &[&str],
        relationship_kinds: &[&str],
        kinds_b: &[&str],
    ) -> Result<usize> {
        let triples = zip_triples(kinds_a, relationship_kinds, kinds_b)?;
        if triples
            .iter()
            .any(|(a, rel, b)| a.is_empty() || rel.is_empty() || b.is_empty())
        {
            return Err(OntologyError::InvalidArgument(
                "relationship kind and both kinds must be named".to_string(),
            ));
        }
        let mut state = self.load()?;
        let mut added = 0;
        for (kind_a, relationship_kind, kind_b) in triples {
            let pairings = state
                .data_model
                .relationships
                .entry(relationship_kind.to_string())
                .or_default();
            if pairings.iter().any(|p| p.connects(kind_a, kind_b)) {
                tracing::info!(
                    kind_a = %kind_a,
                    relationship = %relationship_kind,
                    kind_b = %kind_b,
                    "relationship kind already registered for this pair"
                );
                continue;
            }
            pairings.push(RelationshipPairing {
                kind_a: kind_a.to_string(),
                kind_b: kind_b.to_string(),
                properties: PropertyMap::new(),
            });
            tracing::info!(
                kind_a = %kind_a,
                relationship = %relationship_kind,
                kind_b = %kind_b,
                "created relationship kind"
            );
            added += 1;
        }
        if added > 0 {
            self.save(&state)?;
        }
        Ok(added)
    }

    pub fn get_relationship_kind(
        &self,
        relationship_kind: &str,
    ) -> Result<Option<Vec<RelationshipPairing>>> {
        let state = self.load()?;
        let found = state
            .data_model
            .relationships
            .get(relationship_kind)
            .cloned();
        if found.is_none() {
            tracing::info!(relationship = %relationship_kind, "relationship kind does not exist");
        }
        Ok(found)
    }

    /// Remove one pairing. Returns whether a pairing was removed; the
    /// relationship kind itself stays registered even when its last pairing
    /// goes.
    pub fn delete_relationship_kind(
        &self,
        kind_a: &str,
        relationship_kind: &str,
        kind_b: &str,
    ) -> Result<bool> {
        Ok(self.delete_relationship_kinds(&[kind_a], &[relationship_kind], &[kind_b])? == 1)
    }

    /// Remove several pairings with one load and one save. Every relationship
    /// kind must be registered, otherwise nothing is removed. Returns how many
    /// pairings were removed.
    pub fn delete_relationship_kinds(
        &self,
        kinds_a: &[&str],
        relationship_kinds: &[&str],
        kinds_b: &[&str],
    ) -> Result<usize> {
        let triples = zip_triples(kinds_a, relationship_kinds, kinds_b)?;
        let mut state = self.load()?;
        if let Some(unknown) = relationship_kinds
            .iter()
            .find(|rel| !state.data_model.relationships.contains_key(**rel))
        {
            return Err(OntologyError::InvalidArgument(format!(
                "relationship kind `{unknown}` does not exist"
            )));
        }
        let mut removed = 0;
        for (kind_a, relationship_kind, kind_b) in triples {
            let pairings = known_pairings(&mut state, relationship_kind)?;
            let before = pairings.len();
            pairings.retain(|p| !p.connects(kind_a, kind_b));
            if pairings.len() == before {
                tracing::info!(
                    kind_a = %kind_a,
                    relationship = %relationship_kind,
                    kind_b = %kind_b,
                    "no such pairing; nothing to delete"
                );
                continue;
            }
            tracing::info!(
                kind_a = %kind_a,
                relationship = %relationship_kind,
                kind_b = %kind_b,
                "deleted relationship pairing"
            );
            removed += before - pairings.len();
        }
        if removed > 0 {
            self.save(&state)?;
        }
        Ok(removed)
    }

    /// Add typed properties to every pairing of `relationship_kind` between
    /// `kind_a` and `kind_b`.
    pub fn add_relationship_properties(
        &self,
        kind_a: &str,
        relationship_kind: &str,
        kind_b: &str,
        properties: &[&str],
        types: &[PropertyType],
    ) -> Result<()> {
        let added = descriptors(properties, types, &[], &[])?;
        let mut state = self.load()?;
        let pairings = known_pairings(&mut state, relationship_kind)?;
        let mut matched = false;
        for pairing in pairings.iter_mut().filter(|p| p.connects(kind_a, kind_b)) {
            pairing.properties.extend(added.clone());
            matched = true;
        }
        if !matched {
            return Err(OntologyError::InvalidArgument(format!(
                "`{relationship_kind}` is not registered between `{kind_a}` and `{kind_b}`"
            )));
        }
        self.save(&state)?;
        tracing::info!(
            relationship = %relationship_kind,
            count = properties.len(),
            "added relationship properties"
        );
        Ok(())
    }

    /// All-or-nothing removal of properties from the matching pairings.
    pub fn remove_relationship_properties(
        &self,
        kind_a: &str,
        relationship_kind: &str,
        kind_b: &str,
        properties: &[&str],
    ) -> Result<()> {
        let mut state = self.load()?;
        let pairings = known_pairings(&mut state, relationship_kind)?;
        let targets: Vec<&mut RelationshipPairing> = pairings
            .iter_mut()
            .filter(|p| p.connects(kind_a, kind_b))
            .collect();
        if targets.is_empty() {
            return Err(OntologyError::InvalidArgument(format!(
                "`{relationship_kind}` is not registered between `{kind_a}` and `{kind_b}`"
            )));
        }
        for pairing in &targets {
            if let Some(missing) = properties
                .iter()
                .find(|p| !pairing.properties.contains_key(**p))
            {
                return Err(OntologyError::InvalidArgument(format!(
                    "property `{missing}` is not defined on `({kind_a})-[{relationship_kind}]->({kind_b})`"
                )));
            }
        }
        for pairing in targets {
            for property in properties {
                pairing.properties.remove(*property);
            }
        }
        self.save(&state)?;
        Ok(())
    }

    /// Drop every pairing that mentions one of `kinds` on either side.
    /// Returns how many pairings were removed.
    pub fn purge_kinds(&self, kinds: &[String]) -> Result<usize> {
        let mut state = self.load()?;
        let mut removed = 0;
        for pairings in state.data_model.relationships.values_mut() {
            let before = pairings.len();
            pairings.retain(|p| !kinds.contains(&p.kind_a) && !kinds.contains(&p.kind_b));
            removed += before - pairings.len();
        }
        if removed > 0 {
            self.save(&state)?;
            tracing::info!(removed, "dropped pairings of deleted kinds");
        }
        Ok(removed)
    }

    pub fn relationship_kinds(&self) -> Result<Vec<String>> {
        Ok(self
            .load()?
            .data_model
            .relationships
            .into_keys()
            .collect())
    }

    pub fn data_model(&self) -> Result<DataModel> {
        Ok(self.load()?.data_model)
    }

    pub fn render_data_model(&self) -> Result<String> {
        Ok(self.load()?.data_model.render())
    }
}

/// Zip three parallel lists into `(kind_a, relationship_kind, kind_b)`.
pub fn zip_triples<'a>(
    kinds_a: &[&'a str],
    relationship_kinds: &[&'a str],
    kinds_b: &[&'a str],
) -> Result<Vec<(&'a str, &'a str, &'a str)>> {
    if kinds_a.len() != relationship_kinds.len() || kinds_b.len() != relationship_kinds.len() {
        return Err(OntologyError::InvalidArgument(format!(
            "expected parallel lists, got {} source kinds, {} relationship kinds and {} target kinds",
            kinds_a.len(),
            relationship_kinds.len(),
            kinds_b.len()
        )));
    }
    Ok(kinds_a
        .iter()
        .zip(relationship_kinds)
        .zip(kinds_b)
        .map(|((a, rel), b)| (*a, *rel, *b))
        .collect())
}

fn known_pairings<'a>(
    state: &'a mut OntologyState,
    relationship_kind: &str,
) -> Result<&'a mut Vec<RelationshipPairing>> {
    state
        .data_model
        .relationships
        .get_mut(relationship_kind)
        .ok_or_else(|| {
            OntologyError::InvalidArgument(format!(
                "relationship kind `{relationship_kind}` does not exist"
            ))
        })
}
