//! Schema documents: an ordered statement collection with merge, typed
//! deletion and whole-document consistency checks.

use crate::schema_text::{parse_schema_text, Name, SchemaParseError, Statement, StatementKey};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

// ============================================================================
// Deletion predicates
// ============================================================================

/// Selects one slot of a kind. `target` narrows relationship slots to a
/// single target kind; property slots only match when it is `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotSelector {
    pub name: Name,
    pub target: Option<Name>,
}

impl SlotSelector {
    pub fn named(name: impl Into<Name>) -> Self {
        Self {
            name: name.into(),
            target: None,
        }
    }
}

/// Typed predicate over statements, used to remove schema fragments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FragmentMatch {
    /// Statements scoped to `kind`. With `slot: None` this is the whole kind
    /// (class, inherits, every slot and label); otherwise one slot and its label.
    Owned {
        kind: Name,
        slot: Option<SlotSelector>,
    },
    /// Relationship slots on any kind whose target is `kind`.
    TargetOf { kind: Name },
}

impl FragmentMatch {
    pub fn matches(&self, statement: &Statement) -> bool {
        match self {
            FragmentMatch::Owned { kind, slot: None } => statement.owner() == kind.as_str(),
            FragmentMatch::Owned {
                kind,
                slot: Some(selector),
            } => {
                if statement.owner() != kind.as_str() {
                    return false;
                }
                match statement {
                    Statement::Property { name, .. } => {
                        *name == selector.name && selector.target.is_none()
                    }
                    Statement::Relation { name, target, .. } => {
                        *name == selector.name
                            && selector.target.as_ref().map_or(true, |t| t == target)
                    }
                    Statement::Label {
                        slot: Some(slot), ..
                    } => *slot == selector.name,
                    _ => false,
                }
            }
            FragmentMatch::TargetOf { kind } => statement.target() == Some(kind.as_str()),
        }
    }
}

// ============================================================================
// Consistency issues
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "issue", rename_all = "snake_case")]
pub enum ConsistencyIssue {
    UndeclaredKind { kind: Name, statement: String },
    MultipleParents { kind: Name, parents: Vec<Name> },
    InheritanceCycle { kind: Name },
    ConflictingDefinition { first: String, second: String },
    SlotKindClash { kind: Name, slot: Name },
    UndeclaredSlot { kind: Name, slot: Name },
}

impl fmt::Display for ConsistencyIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsistencyIssue::UndeclaredKind { kind, statement } => {
                write!(f, "`{statement}` refers to undeclared kind `{kind}`")
            }
            ConsistencyIssue::MultipleParents { kind, parents } => {
                write!(f, "kind `{kind}` inherits from several parents: {}", parents.join(", "))
            }
            ConsistencyIssue::InheritanceCycle { kind } => {
                write!(f, "inheritance cycle through `{kind}`")
            }
            ConsistencyIssue::ConflictingDefinition { first, second } => {
                write!(f, "`{second}` conflicts with `{first}`")
            }
            ConsistencyIssue::SlotKindClash { kind, slot } => {
                write!(f, "`{kind}.{slot}` is declared both as property and relation")
            }
            ConsistencyIssue::UndeclaredSlot { kind, slot } => {
                write!(f, "label refers to undeclared slot `{kind}.{slot}`")
            }
        }
    }
}

// ============================================================================
// Document
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDocument {
    statements: Vec<Statement>,
}

impl SchemaDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(text: &str) -> Result<Self, SchemaParseError> {
        Ok(Self {
            statements: parse_schema_text(text)?,
        })
    }

    pub fn from_statements(statements: Vec<Statement>) -> Self {
        Self { statements }
    }

    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    pub fn into_statements(self) -> Vec<Statement> {
        self.statements
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    pub fn contains(&self, statement: &Statement) -> bool {
        self.statements.contains(statement)
    }

    /// Canonical text: one statement per line, newline-terminated.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for statement in &self.statements {
            out.push_str(&statement.to_string());
            out.push('\n');
        }
        out
    }

    /// Merge statements into the document.
    ///
    /// Identical statements are skipped. A label or property statement
    /// replaces the existing one with the same key in place (new text, or a
    /// new type/family for the slot). Returns how many statements were added
    /// or changed.
    pub fn merge<I>(&mut self, statements: I) -> usize
    where
        I: IntoIterator<Item = Statement>,
    {
        let mut changed = 0;
        for statement in statements {
            if self.statements.contains(&statement) {
                continue;
            }
            if matches!(
                statement,
                Statement::Label { .. } | Statement::Property { .. }
            ) {
                let key = statement.key();
                if let Some(existing) = self.statements.iter_mut().find(|s| s.key() == key) {
                    *existing = statement;
                    changed += 1;
                    continue;
                }
            }
            self.statements.push(statement);
            changed += 1;
        }
        changed
    }

    /// Remove every statement matched by any predicate, returning the removed
    /// statements in document order.
    pub fn remove_matching(&mut self, predicates: &[FragmentMatch]) -> Vec<Statement> {
        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.statements)
            .into_iter()
            .partition(|s| predicates.iter().any(|p| p.matches(s)));
        self.statements = kept;
        removed
    }

    /// Declared kinds, in document order.
    pub fn classes(&self) -> Vec<&str> {
        let mut seen = BTreeSet::new();
        self.statements
            .iter()
            .filter_map(|s| match s {
                Statement::Class { kind } if seen.insert(kind.as_str()) => Some(kind.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn parent_of(&self, kind: &str) -> Option<&str> {
        self.statements.iter().find_map(|s| match s {
            Statement::Inherits { kind: k, parent } if k == kind => Some(parent.as_str()),
            _ => None,
        })
    }

    /// Parent chain of `kind` from `inherits` statements, nearest first.
    /// Stops early if the chain loops back on itself.
    pub fn ancestors(&self, kind: &str) -> Vec<Name> {
        let mut chain = Vec::new();
        let mut seen = BTreeSet::from([kind.to_string()]);
        let mut current = kind;
        while let Some(parent) = self.parent_of(current) {
            if !seen.insert(parent.to_string()) {
                break;
            }
            chain.push(parent.to_string());
            current = parent;
        }
        chain
    }

    pub fn label(&self, kind: &str, slot: Option<&str>) -> Option<&str> {
        self.statements.iter().find_map(|s| match s {
            Statement::Label {
                kind: k,
                slot: sl,
                text,
            } if k == kind && sl.as_deref() == slot => Some(text.as_str()),
            _ => None,
        })
    }

    /// Check the whole document; every problem found is reported.
    pub fn check(&self) -> Result<(), Vec<ConsistencyIssue>> {
        let mut issues = Vec::new();
        let classes: BTreeSet<&str> = self.classes().into_iter().collect();

        for statement in &self.statements {
            for kind in statement.referenced_kinds() {
                if !classes.contains(kind) {
                    issues.push(ConsistencyIssue::UndeclaredKind {
                        kind: kind.to_string(),
                        statement: statement.to_string(),
                    });
                }
            }
        }

        // Same key, different content.
        let mut by_key: HashMap<StatementKey, &Statement> = HashMap::new();
        for statement in &self.statements {
            if matches!(statement, Statement::Label { .. }) {
                continue;
            }
            match by_key.entry(statement.key()) {
                Entry::Occupied(first) if *first.get() != statement => {
                    issues.push(ConsistencyIssue::ConflictingDefinition {
                        first: first.get().to_string(),
                        second: statement.to_string(),
                    })
                }
                Entry::Occupied(_) => {}
                Entry::Vacant(slot) => {
                    slot.insert(statement);
                }
            }
        }

        let mut parents: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        let mut properties: BTreeSet<(&str, &str)> = BTreeSet::new();
        let mut relations: BTreeSet<(&str, &str)> = BTreeSet::new();
        for statement in &self.statements {
            match statement {
                Statement::Inherits { kind, parent } => {
                    parents
                        .entry(kind.as_str())
                        .or_default()
                        .insert(parent.as_str());
                }
                Statement::Property { kind, name, .. } => {
                    properties.insert((kind.as_str(), name.as_str()));
                }
                Statement::Relation { kind, name, .. } => {
                    relations.insert((kind.as_str(), name.as_str()));
                }
                _ => {}
            }
        }

        for (kind, set) in &parents {
            if set.len() > 1 {
                issues.push(ConsistencyIssue::MultipleParents {
                    kind: kind.to_string(),
                    parents: set.iter().map(|p| p.to_string()).collect(),
                });
            }
        }

        for kind in parents.keys() {
            if self.has_cycle(kind) {
                issues.push(ConsistencyIssue::InheritanceCycle {
                    kind: kind.to_string(),
                });
            }
        }

        for (kind, slot) in properties.intersection(&relations) {
            issues.push(ConsistencyIssue::SlotKindClash {
                kind: kind.to_string(),
                slot: slot.to_string(),
            });
        }

        for statement in &self.statements {
            if let Statement::Label {
                kind,
                slot: Some(slot),
                ..
            } = statement
            {
                let key = (kind.as_str(), slot.as_str());
                if !properties.contains(&key) && !relations.contains(&key) {
                    issues.push(ConsistencyIssue::UndeclaredSlot {
                        kind: kind.clone(),
                        slot: slot.clone(),
                    });
                }
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(issues)
        }
    }

    fn has_cycle(&self, kind: &str) -> bool {
        let mut seen = BTreeSet::from([kind]);
        let mut current = kind;
        while let Some(parent) = self.parent_of(current) {
            if parent == kind {
                return true;
            }
            if !seen.insert(parent) {
                // Loops further up; reported for the kinds on the loop itself.
                return false;
            }
            current = parent;
        }
        false
    }
}

impl fmt::Display for SchemaDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vocab::{PropertyType, TypeFamily};

    const ZOO: &str = "\
class Animal
class Dog
class Person
inherits Dog Animal
property Dog.name: Optional xsd:string
relation Dog.OWNED_BY: Set -> Person
relation Person.FEEDS: Set -> Dog
label Dog \"A dog\"
label Dog.name \"Call name\"
";

    fn zoo() -> SchemaDocument {
        SchemaDocument::parse(ZOO).unwrap()
    }

    #[test]
    fn render_reproduces_canonical_text() {
        assert_eq!(zoo().render(), ZOO);
        assert!(zoo().check().is_ok());
    }

    #[test]
    fn merge_dedupes_and_upserts_in_place() {
        let mut doc = zoo();
        let changed = doc.merge([
            Statement::Class {
                kind: "Dog".to_string(),
            },
            Statement::Label {
                kind: "Dog".to_string(),
                slot: None,
                text: "A good dog".to_string(),
            },
        ]);
        assert_eq!(changed, 1);
        assert_eq!(doc.len(), zoo().len());
        assert_eq!(doc.label("Dog", None), Some("A good dog"));

        doc.merge([Statement::Property {
            kind: "Dog".to_string(),
            name: "name".to_string(),
            family: TypeFamily::Mandatory,
            ty: PropertyType::String,
        }]);
        assert_eq!(doc.len(), zoo().len());
        assert!(doc
            .render()
            .contains("property Dog.name: Mandatory xsd:string\n"));
        assert!(doc.check().is_ok());
    }

    #[test]
    fn removing_a_slot_takes_its_label() {
        let mut doc = zoo();
        let removed = doc.remove_matching(&[FragmentMatch::Owned {
            kind: "Dog".to_string(),
            slot: Some(SlotSelector::named("name")),
        }]);
        assert_eq!(removed.len(), 2);
        assert_eq!(doc.label("Dog", None), Some("A dog"));
        assert!(doc.check().is_ok());
    }

    #[test]
    fn relation_selector_can_narrow_by_target() {
        let mut doc = zoo();
        let removed = doc.remove_matching(&[FragmentMatch::Owned {
            kind: "Dog".to_string(),
            slot: Some(SlotSelector {
                name: "OWNED_BY".to_string(),
                target: Some("Cat".to_string()),
            }),
        }]);
        assert!(removed.is_empty());
    }

    #[test]
    fn removing_a_kind_without_its_incoming_relations_is_inconsistent() {
        let mut doc = zoo();
        doc.remove_matching(&[FragmentMatch::Owned {
            kind: "Dog".to_string(),
            slot: None,
        }]);
        let issues = doc.check().unwrap_err();
        assert_eq!(
            issues,
            vec![ConsistencyIssue::UndeclaredKind {
                kind: "Dog".to_string(),
                statement: "relation Person.FEEDS: Set -> Dog".to_string(),
            }]
        );

        let mut doc = zoo();
        doc.remove_matching(&[
            FragmentMatch::Owned {
                kind: "Dog".to_string(),
                slot: None,
            },
            FragmentMatch::TargetOf {
                kind: "Dog".to_string(),
            },
        ]);
        assert!(doc.check().is_ok());
        assert_eq!(doc.classes(), vec!["Animal", "Person"]);
    }

    #[test]
    fn check_reports_structural_problems() {
        let doc = SchemaDocument::parse(
            "class A\nclass B\ninherits A B\ninherits B A\n\
             property A.x: Optional xsd:string\nproperty A.x: Mandatory xsd:string\n\
             relation A.x: Set -> B\nlabel B.y \"?\"\n",
        )
        .unwrap();
        let issues = doc.check().unwrap_err();
        assert!(issues.contains(&ConsistencyIssue::InheritanceCycle {
            kind: "A".to_string()
        }));
        assert!(issues.contains(&ConsistencyIssue::SlotKindClash {
            kind: "A".to_string(),
            slot: "x".to_string()
        }));
        assert!(issues.contains(&ConsistencyIssue::UndeclaredSlot {
            kind: "B".to_string(),
            slot: "y".to_string()
        }));
        assert!(issues
            .iter()
            .any(|i| matches!(i, ConsistencyIssue::ConflictingDefinition { .. })));
    }

    #[test]
    fn ancestors_follow_inherits_nearest_first() {
        let doc = SchemaDocument::parse(
            "class A\nclass A1\nclass A2\ninherits A1 A\ninherits A2 A1\n",
        )
        .unwrap();
        assert_eq!(doc.ancestors("A2"), vec!["A1".to_string(), "A".to_string()]);
        assert!(doc.ancestors("A").is_empty());
    }
}
