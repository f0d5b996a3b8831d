//! Keeps the declarative schema text in step with structural changes.
//!
//! Writes always go through the same cycle: read the whole schema, parse it
//! into statements, edit the statement list, render and hand the complete
//! document back to the store. The store either accepts it or rejects it as
//! a whole.

use crate::schema_store::SchemaStore;
use kindgraph_dsl::{
    is_identifier, schema_digest, FragmentMatch, SchemaDocument, SlotSelector, Statement,
    TypeFamily,
};
use kindgraph_ontology::{
    AncestorQuery, OntologyError, OntologyState, PropertyMap, Result, StoreError, ROOT_KIND,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Statements describing one kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaFragment {
    pub kind: String,
    pub statements: Vec<Statement>,
}

/// Outcome of a successful commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitReceipt {
    /// Statements added or updated; zero means the schema was left alone.
    pub changed: usize,
    pub digest: String,
}

#[derive(Clone)]
pub struct SchemaSynchronizer {
    store: Arc<dyn SchemaStore>,
}

impl SchemaSynchronizer {
    pub fn new(store: Arc<dyn SchemaStore>) -> Self {
        Self { store }
    }

    pub fn schema_text(&self) -> Result<String> {
        Ok(self.store.get_schema_text()?)
    }

    pub fn document(&self) -> Result<SchemaDocument> {
        let text = self.store.get_schema_text()?;
        Ok(SchemaDocument::parse(&text).map_err(StoreError::from)?)
    }

    // ========================================================================
    // Projection
    // ========================================================================

    /// Project one kind: its class, its parent link, one statement per own
    /// property and one `Set` relation per `(relationship, target)`.
    pub fn project_kind(
        &self,
        kind: &str,
        parent: Option<&str>,
        properties: &PropertyMap,
        relationships: &[(String, String)],
    ) -> Result<SchemaFragment> {
        require_identifier(kind)?;
        let mut statements = vec![Statement::Class {
            kind: kind.to_string(),
        }];
        if let Some(parent) = parent {
            require_identifier(parent)?;
            statements.push(Statement::Inherits {
                kind: kind.to_string(),
                parent: parent.to_string(),
            });
        }
        for (name, descriptor) in properties {
            require_identifier(name)?;
            statements.push(Statement::Property {
                kind: kind.to_string(),
                name: name.clone(),
                family: descriptor.type_family,
                ty: descriptor.ty,
            });
        }
        for (relationship, target) in relationships {
            require_identifier(relationship)?;
            require_identifier(target)?;
            statements.push(Statement::Relation {
                kind: kind.to_string(),
                name: relationship.clone(),
                family: TypeFamily::Set,
                target: target.clone(),
            });
        }
        Ok(SchemaFragment {
            kind: kind.to_string(),
            statements,
        })
    }

    /// Fragments for every kind of a structural state except the root.
    ///
    /// Kinds directly under the root get no `inherits`; relationships are
    /// projected on `kind_a` and skipped (with a warning) when either side is
    /// not in the hierarchy.
    pub fn project_state(&self, state: &OntologyState) -> Result<Vec<SchemaFragment>> {
        let mut relationships: BTreeMap<&str, Vec<(String, String)>> = BTreeMap::new();
        for (rel, pairings) in &state.data_model.relationships {
            for pairing in pairings {
                let known = |k: &str| k != ROOT_KIND && state.hierarchy.contains(k);
                if !known(&pairing.kind_a) || !known(&pairing.kind_b) {
                    tracing::warn!(
                        kind_a = %pairing.kind_a,
                        relationship = %rel,
                        kind_b = %pairing.kind_b,
                        "relationship refers to a kind outside the hierarchy; not projected"
                    );
                    continue;
                }
                relationships
                    .entry(pairing.kind_a.as_str())
                    .or_default()
                    .push((rel.clone(), pairing.kind_b.clone()));
            }
        }

        state
            .hierarchy
            .preorder()
            .into_iter()
            .filter(|record| record.name != ROOT_KIND)
            .map(|record| {
                let parent = state
                    .hierarchy
                    .parent_name(&record.name)
                    .filter(|p| *p != ROOT_KIND);
                let rels = relationships
                    .get(record.name.as_str())
                    .map(Vec::as_slice)
                    .unwrap_or_default();
                self.project_kind(&record.name, parent, &record.own, rels)
            })
            .collect()
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Merge fragments into the schema and write it once.
    ///
    /// Identical statements are not duplicated; property and label slots are
    /// replaced in place. If the store rejects the result the schema is
    /// unchanged.
    pub fn commit(&self, fragments: &[SchemaFragment]) -> Result<CommitReceipt> {
        let mut document = self.document()?;
        let changed = document.merge(
            fragments
                .iter()
                .flat_map(|fragment| fragment.statements.iter().cloned()),
        );
        let digest = schema_digest(&document);
        if changed == 0 {
            tracing::info!(digest = %digest, "schema already contains every statement");
            return Ok(CommitReceipt { changed, digest });
        }
        self.store.write_schema_text(&document.render())?;
        tracing::info!(
            fragments = fragments.len(),
            changed,
            digest = %digest,
            "committed schema fragments"
        );
        Ok(CommitReceipt { changed, digest })
    }

    /// Remove part of a kind from the schema.
    ///
    /// With no `names` the whole kind goes, together with relationship slots
    /// of other kinds that target it. Otherwise each name selects one of the
    /// kind's property or relationship slots (and its label). Returns the
    /// removed statements.
    pub fn delete_fragment(&self, kind: &str, names: &[&str]) -> Result<Vec<Statement>> {
        let predicates: Vec<FragmentMatch> = if names.is_empty() {
            whole_kind(kind)
        } else {
            names
                .iter()
                .map(|name| FragmentMatch::Owned {
                    kind: kind.to_string(),
                    slot: Some(SlotSelector::named(*name)),
                })
                .collect()
        };
        self.remove(kind, &predicates)
    }

    /// Remove several whole kinds in one write (e.g. a subtree).
    pub fn delete_kinds(&self, kinds: &[String]) -> Result<Vec<Statement>> {
        let predicates: Vec<FragmentMatch> =
            kinds.iter().flat_map(|kind| whole_kind(kind)).collect();
        self.remove(&kinds.join(", "), &predicates)
    }

    /// Relation statements for `(kind_a, relationship, kind_b)` triples,
    /// one fragment per triple. No class statements are emitted: a relation
    /// on a kind the schema does not declare is rejected at commit.
    pub fn project_relations(&self, triples: &[(&str, &str, &str)]) -> Result<Vec<SchemaFragment>> {
        triples
            .iter()
            .map(|(kind_a, relationship, kind_b)| {
                let mut fragment = self.project_kind(
                    kind_a,
                    None,
                    &PropertyMap::new(),
                    &[(relationship.to_string(), kind_b.to_string())],
                )?;
                fragment.statements.retain(|s| s.target().is_some());
                Ok(fragment)
            })
            .collect()
    }

    /// Remove the relationship slot `kind_a.relationship -> kind_b`.
    pub fn delete_relationship(
        &self,
        kind_a: &str,
        relationship: &str,
        kind_b: &str,
    ) -> Result<Vec<Statement>> {
        self.delete_relationships(&[(kind_a, relationship, kind_b)])
    }

    /// Remove several relationship slots in one write.
    pub fn delete_relationships(&self, triples: &[(&str, &str, &str)]) -> Result<Vec<Statement>> {
        let predicates: Vec<FragmentMatch> = triples
            .iter()
            .map(|(kind_a, relationship, kind_b)| FragmentMatch::Owned {
                kind: kind_a.to_string(),
                slot: Some(SlotSelector {
                    name: relationship.to_string(),
                    target: Some(kind_b.to_string()),
                }),
            })
            .collect();
        let context = triples
            .iter()
            .map(|(kind_a, relationship, _)| format!("{kind_a}.{relationship}"))
            .collect::<Vec<_>>()
            .join(", ");
        self.remove(&context, &predicates)
    }

    /// Set the documentation of a kind (`property: None`) or one of its
    /// slots. Replaces any previous label for the same target.
    pub fn update_label(&self, kind: &str, property: Option<&str>, text: &str) -> Result<()> {
        self.update_labels(&[(kind, property, text)])?;
        Ok(())
    }

    /// Several [`update_label`](Self::update_label)s as one commit.
    pub fn update_labels(&self, labels: &[(&str, Option<&str>, &str)]) -> Result<CommitReceipt> {
        let fragments: Vec<SchemaFragment> = labels
            .iter()
            .map(|(kind, property, text)| SchemaFragment {
                kind: kind.to_string(),
                statements: vec![Statement::Label {
                    kind: kind.to_string(),
                    slot: property.map(str::to_string),
                    text: text.to_string(),
                }],
            })
            .collect();
        self.commit(&fragments)
    }

    /// Put back a schema text read before a change whose structural half
    /// failed.
    pub(crate) fn restore_text(&self, text: &str) -> Result<()> {
        self.store.write_schema_text(text)?;
        tracing::warn!("restored schema text after a failed structural update");
        Ok(())
    }

    fn remove(&self, context: &str, predicates: &[FragmentMatch]) -> Result<Vec<Statement>> {
        let mut document = self.document()?;
        let removed = document.remove_matching(predicates);
        if removed.is_empty() {
            tracing::info!(target_kind = %context, "nothing in the schema matches; nothing to delete");
            return Ok(removed);
        }
        match self.store.write_schema_text(&document.render()) {
            Ok(()) => {
                tracing::info!(
                    target_kind = %context,
                    removed = removed.len(),
                    "removed schema statements"
                );
                Ok(removed)
            }
            Err(err) => {
                if let StoreError::Rejected {
                    context: blocked, ..
                } = &err
                {
                    tracing::error!(
                        target_kind = %context,
                        blocked_by = %blocked,
                        "schema deletion rejected; existing instance data may still use it, delete that data first"
                    );
                }
                Err(OntologyError::Store(err))
            }
        }
    }
}

impl AncestorQuery for SchemaSynchronizer {
    fn run_ancestor_query(&self, kinds: &[&str]) -> Result<BTreeMap<String, Vec<String>>> {
        let document = self.document()?;
        Ok(kinds
            .iter()
            .map(|kind| (kind.to_string(), document.ancestors(kind)))
            .collect())
    }
}

fn whole_kind(kind: &str) -> Vec<FragmentMatch> {
    vec![
        FragmentMatch::Owned {
            kind: kind.to_string(),
            slot: None,
        },
        FragmentMatch::TargetOf {
            kind: kind.to_string(),
        },
    ]
}

fn require_identifier(name: &str) -> Result<()> {
    if is_identifier(name) {
        Ok(())
    } else {
        Err(OntologyError::InvalidArgument(format!(
            "`{name}` cannot be used in schema text (letters, digits and `_` only, not starting with a digit)"
        )))
    }
}
