//! Instance-write validation against the registered kinds and relationships.

use crate::error::{OntologyError, Result};
use crate::model::RelationshipPairing;
use crate::store::{load_or_default, AncestorQuery, StateStore};
use crate::tree::PropertyMap;
use crate::value::PropertyValue;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// The registered pairing a relationship instance was checked against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedPair {
    pub kind_a: String,
    pub relationship_kind: String,
    pub kind_b: String,
    pub properties: PropertyMap,
}

#[derive(Clone)]
pub struct ValidationService {
    store: Arc<dyn StateStore>,
    ancestors: Arc<dyn AncestorQuery>,
}

impl ValidationService {
    pub fn new(store: Arc<dyn StateStore>, ancestors: Arc<dyn AncestorQuery>) -> Self {
        Self { store, ancestors }
    }

    /// Check entity property values against the kind's resolved properties.
    pub fn validate_entity_properties(
        &self,
        kind: &str,
        property_names: &[&str],
        property_values: &[PropertyValue],
    ) -> Result<()> {
        check_lengths(property_names, property_values)?;
        let state = load_or_default(self.store.as_ref())?;
        let declared = state
            .hierarchy
            .get(kind)
            .map(|record| record.resolved())
            .unwrap_or_default();
        check_values(&format!("kind `{kind}`"), &declared, property_names, property_values)
    }

    /// Check that `relationship_kind` may connect `kind_a` to `kind_b` and that
    /// the property values fit the pairing that allows it.
    ///
    /// An exact pairing wins. Otherwise both ancestor chains are walked
    /// nearest first (each kind itself included) with `kind_a`'s chain as the
    /// outer loop, and the first registered pairing found is used.
    pub fn validate_relationship(
        &self,
        kind_a: &str,
        relationship_kind: &str,
        kind_b: &str,
        property_names: &[&str],
        property_values: &[PropertyValue],
    ) -> Result<ResolvedPair> {
        check_lengths(property_names, property_values)?;
        let state = load_or_default(self.store.as_ref())?;
        let pairings = state
            .data_model
            .pairings(relationship_kind)
            .ok_or_else(|| {
                OntologyError::SchemaViolation(format!(
                    "relationship kind `{relationship_kind}` is not registered"
                ))
            })?;

        let pairing = match pairings.iter().find(|p| p.connects(kind_a, kind_b)) {
            Some(exact) => exact,
            None => self
                .resolve_through_ancestors(pairings, kind_a, kind_b)?
                .ok_or_else(|| {
                    OntologyError::SchemaViolation(format!(
                        "`{relationship_kind}` is not allowed between `{kind_a}` and `{kind_b}` or any of their ancestors"
                    ))
                })?,
        };

        let context = format!(
            "`({})-[{relationship_kind}]->({})`",
            pairing.kind_a, pairing.kind_b
        );
        check_values(&context, &pairing.properties, property_names, property_values)?;
        tracing::debug!(
            kind_a = %kind_a,
            relationship = %relationship_kind,
            kind_b = %kind_b,
            resolved_a = %pairing.kind_a,
            resolved_b = %pairing.kind_b,
            "relationship validated"
        );
        Ok(ResolvedPair {
            kind_a: pairing.kind_a.clone(),
            relationship_kind: relationship_kind.to_string(),
            kind_b: pairing.kind_b.clone(),
            properties: pairing.properties.clone(),
        })
    }

    fn resolve_through_ancestors<'p>(
        &self,
        pairings: &'p [RelationshipPairing],
        kind_a: &str,
        kind_b: &str,
    ) -> Result<Option<&'p RelationshipPairing>> {
        let chains = self.ancestors.run_ancestor_query(&[kind_a, kind_b])?;
        let chain = |kind: &str| {
            let mut chain = vec![kind.to_string()];
            chain.extend(chains.get(kind).cloned().unwrap_or_default());
            chain
        };
        let chain_a = chain(kind_a);
        let chain_b = chain(kind_b);
        for a in &chain_a {
            for b in &chain_b {
                if let Some(found) = pairings.iter().find(|p| p.connects(a, b)) {
                    return Ok(Some(found));
                }
            }
        }
        Ok(None)
    }
}

fn check_lengths(names: &[&str], values: &[PropertyValue]) -> Result<()> {
    if names.len() != values.len() {
        return Err(OntologyError::InvalidArgument(format!(
            "{} property names but {} values",
            names.len(),
            values.len()
        )));
    }
    Ok(())
}

fn check_values(
    context: &str,
    declared: &PropertyMap,
    names: &[&str],
    values: &[PropertyValue],
) -> Result<()> {
    for (name, value) in names.iter().zip(values) {
        let descriptor = declared.get(*name).ok_or_else(|| {
            OntologyError::SchemaViolation(format!("property `{name}` is not declared on {context}"))
        })?;
        if value.property_type() != descriptor.ty {
            return Err(OntologyError::SchemaViolation(format!(
                "property `{name}` of {context} expects {} but got {} ({value})",
                descriptor.ty,
                value.property_type()
            )));
        }
    }
    Ok(())
}
