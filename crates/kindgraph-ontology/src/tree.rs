//! Entity-kind inheritance tree.
//!
//! Kinds live in an arena indexed by [`KindId`]. Each record stores its
//! parent's id, its own properties and a snapshot of the properties it
//! inherited when it was created. Lookups by name and child lists go through
//! two indexes; removing a subtree tombstones the arena slots and drops the
//! index entries, so no id is ever reused.

use kindgraph_dsl::{PropertyType, TypeFamily};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Name of the root kind every tree starts from.
pub const ROOT_KIND: &str = "Kind";

/// System property carried by the root kind (and so inherited by all kinds).
pub const DELETED_PROPERTY: &str = "_deleted";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyDescriptor {
    #[serde(rename = "type")]
    pub ty: PropertyType,
    #[serde(default)]
    pub measurement_unit: String,
    #[serde(default)]
    pub type_family: TypeFamily,
}

impl PropertyDescriptor {
    pub fn new(ty: PropertyType) -> Self {
        Self {
            ty,
            measurement_unit: String::new(),
            type_family: TypeFamily::default(),
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.measurement_unit = unit.into();
        self
    }

    pub fn with_family(mut self, family: TypeFamily) -> Self {
        self.type_family = family;
        self
    }
}

impl Default for PropertyDescriptor {
    fn default() -> Self {
        Self::new(PropertyType::String)
    }
}

impl fmt::Display for PropertyDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.ty)?;
        if self.type_family != TypeFamily::Optional {
            write!(f, " {}", self.type_family)?;
        }
        if !self.measurement_unit.is_empty() {
            write!(f, " [{}]", self.measurement_unit)?;
        }
        Ok(())
    }
}

pub type PropertyMap = BTreeMap<String, PropertyDescriptor>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KindId(usize);

#[derive(Debug, Clone, PartialEq)]
pub struct KindRecord {
    pub name: String,
    pub parent: Option<KindId>,
    pub own: PropertyMap,
    pub inherited: PropertyMap,
}

impl KindRecord {
    /// Inherited properties overlaid by own ones.
    pub fn resolved(&self) -> PropertyMap {
        let mut map = self.inherited.clone();
        map.extend(self.own.iter().map(|(k, v)| (k.clone(), v.clone())));
        map
    }
}

/// Read-only view of one kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityKind {
    pub name: String,
    pub parent: Option<String>,
    pub own_properties: PropertyMap,
    pub properties: PropertyMap,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(into = "Vec<KindEntry>", try_from = "Vec<KindEntry>")]
pub struct KindTree {
    records: Vec<Option<KindRecord>>,
    by_name: BTreeMap<String, KindId>,
    children: BTreeMap<String, Vec<KindId>>,
}

impl KindTree {
    /// A tree holding only the root kind with its system property.
    pub fn with_root() -> Self {
        let mut tree = Self::default();
        let mut own = PropertyMap::new();
        own.insert(
            DELETED_PROPERTY.to_string(),
            PropertyDescriptor::new(PropertyType::Boolean),
        );
        tree.insert(ROOT_KIND, None, own);
        tree
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn id(&self, name: &str) -> Option<KindId> {
        self.by_name.get(name).copied()
    }

    pub fn record(&self, id: KindId) -> Option<&KindRecord> {
        self.records.get(id.0).and_then(Option::as_ref)
    }

    pub fn get(&self, name: &str) -> Option<&KindRecord> {
        self.id(name).and_then(|id| self.record(id))
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut KindRecord> {
        let id = self.id(name)?;
        self.records.get_mut(id.0).and_then(Option::as_mut)
    }

    pub fn parent_name(&self, name: &str) -> Option<&str> {
        let parent = self.get(name)?.parent?;
        self.record(parent).map(|r| r.name.as_str())
    }

    pub fn entity(&self, name: &str) -> Option<EntityKind> {
        let record = self.get(name)?;
        Some(EntityKind {
            name: record.name.clone(),
            parent: self.parent_name(name).map(str::to_string),
            own_properties: record.own.clone(),
            properties: record.resolved(),
        })
    }

    /// Insert a new kind under `parent`, snapshotting the parent's resolved
    /// properties as the inherited map. The name must not exist yet.
    pub fn insert(&mut self, name: &str, parent: Option<KindId>, own: PropertyMap) -> KindId {
        let inherited = parent
            .and_then(|p| self.record(p))
            .map(KindRecord::resolved)
            .unwrap_or_default();
        self.insert_record(KindRecord {
            name: name.to_string(),
            parent,
            own,
            inherited,
        })
    }

    fn insert_record(&mut self, record: KindRecord) -> KindId {
        let id = KindId(self.records.len());
        if let Some(parent_name) = record.parent.and_then(|p| self.record(p)).map(|r| r.name.clone())
        {
            self.children.entry(parent_name).or_default().push(id);
        }
        self.by_name.insert(record.name.clone(), id);
        self.children.entry(record.name.clone()).or_default();
        self.records.push(Some(record));
        id
    }

    pub fn children(&self, name: &str) -> Vec<&KindRecord> {
        self.children
            .get(name)
            .map(|ids| ids.iter().filter_map(|id| self.record(*id)).collect())
            .unwrap_or_default()
    }

    /// Parent chain of `name`, nearest first, ending at the root.
    pub fn ancestors(&self, name: &str) -> Vec<String> {
        let mut chain = Vec::new();
        let mut current = self.get(name).and_then(|r| r.parent);
        while let Some(id) = current {
            match self.record(id) {
                Some(record) => {
                    chain.push(record.name.clone());
                    current = record.parent;
                }
                None => break,
            }
        }
        chain
    }

    /// Every live kind, parents before children, siblings in insertion order.
    pub fn preorder(&self) -> Vec<&KindRecord> {
        self.preorder_with_depth()
            .into_iter()
            .map(|(record, _)| record)
            .collect()
    }

    pub fn preorder_with_depth(&self) -> Vec<(&KindRecord, usize)> {
        let mut out = Vec::with_capacity(self.len());
        let mut stack: Vec<(KindId, usize)> = self
            .records
            .iter()
            .enumerate()
            .filter_map(|(i, r)| match r {
                Some(record) if record.parent.is_none() => Some((KindId(i), 0)),
                _ => None,
            })
            .rev()
            .collect();
        while let Some((id, depth)) = stack.pop() {
            let Some(record) = self.record(id) else {
                continue;
            };
            out.push((record, depth));
            if let Some(kids) = self.children.get(&record.name) {
                stack.extend(kids.iter().rev().map(|kid| (*kid, depth + 1)));
            }
        }
        out
    }

    /// Remove `name` and all its descendants. Returns the removed names,
    /// parents before children; empty if `name` is unknown.
    pub fn remove_subtree(&mut self, name: &str) -> Vec<String> {
        let Some(id) = self.id(name) else {
            return Vec::new();
        };
        let mut removed = Vec::new();
        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            let Some(record) = self.records.get_mut(id.0).and_then(Option::take) else {
                continue;
            };
            if let Some(kids) = self.children.remove(&record.name) {
                stack.extend(kids.into_iter().rev());
            }
            self.by_name.remove(&record.name);
            removed.push(record.name);
        }
        for kids in self.children.values_mut() {
            kids.retain(|kid| *kid != id);
        }
        removed
    }
}

/// Persisted form of one kind; a tree is stored as a pre-order list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KindEntry {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(default)]
    pub properties: PropertyMap,
    #[serde(default)]
    pub inherited: PropertyMap,
}

impl From<KindTree> for Vec<KindEntry> {
    fn from(tree: KindTree) -> Self {
        tree.preorder()
            .into_iter()
            .map(|record| KindEntry {
                name: record.name.clone(),
                parent: record
                    .parent
                    .and_then(|p| tree.record(p))
                    .map(|p| p.name.clone()),
                properties: record.own.clone(),
                inherited: record.inherited.clone(),
            })
            .collect()
    }
}

impl TryFrom<Vec<KindEntry>> for KindTree {
    type Error = String;

    fn try_from(entries: Vec<KindEntry>) -> Result<Self, Self::Error> {
        let mut tree = KindTree::default();
        for entry in entries {
            if tree.contains(&entry.name) {
                return Err(format!("kind `{}` is listed twice", entry.name));
            }
            let parent = match &entry.parent {
                Some(parent) => Some(tree.id(parent).ok_or_else(|| {
                    format!(
                        "kind `{}` appears before its parent `{parent}`",
                        entry.name
                    )
                })?),
                None => None,
            };
            tree.insert_record(KindRecord {
                name: entry.name,
                parent,
                own: entry.properties,
                inherited: entry.inherited,
            });
        }
        Ok(tree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(names: &[(&str, PropertyType)]) -> PropertyMap {
        names
            .iter()
            .map(|(n, ty)| (n.to_string(), PropertyDescriptor::new(*ty)))
            .collect()
    }

    fn sample() -> KindTree {
        let mut tree = KindTree::with_root();
        let root = tree.id(ROOT_KIND).unwrap();
        let animal = tree.insert("Animal", Some(root), props(&[("legs", PropertyType::Integer)]));
        let dog = tree.insert("Dog", Some(animal), props(&[("name", PropertyType::String)]));
        tree.insert("Puppy", Some(dog), PropertyMap::new());
        tree.insert("Cat", Some(animal), PropertyMap::new());
        tree.insert("Person", Some(root), PropertyMap::new());
        tree
    }

    #[test]
    fn resolved_properties_include_the_whole_chain() {
        let tree = sample();
        let puppy = tree.get("Puppy").unwrap().resolved();
        let names: Vec<&str> = puppy.keys().map(String::as_str).collect();
        assert_eq!(names, vec![DELETED_PROPERTY, "legs", "name"]);
        assert_eq!(tree.ancestors("Puppy"), vec!["Dog", "Animal", ROOT_KIND]);
        assert_eq!(tree.parent_name("Cat"), Some("Animal"));
    }

    #[test]
    fn preorder_lists_parents_first() {
        let tree = sample();
        let order: Vec<(&str, usize)> = tree
            .preorder_with_depth()
            .into_iter()
            .map(|(r, d)| (r.name.as_str(), d))
            .collect();
        assert_eq!(
            order,
            vec![
                (ROOT_KIND, 0),
                ("Animal", 1),
                ("Dog", 2),
                ("Puppy", 3),
                ("Cat", 2),
                ("Person", 1)
            ]
        );
    }

    #[test]
    fn removing_a_subtree_tombstones_every_descendant() {
        let mut tree = sample();
        let removed = tree.remove_subtree("Animal");
        assert_eq!(removed, vec!["Animal", "Dog", "Puppy", "Cat"]);
        assert_eq!(tree.len(), 2);
        assert!(tree.get("Puppy").is_none());
        let kids: Vec<&str> = tree
            .children(ROOT_KIND)
            .into_iter()
            .map(|r| r.name.as_str())
            .collect();
        assert_eq!(kids, vec!["Person"]);

        // Ids are never reused.
        let root = tree.id(ROOT_KIND).unwrap();
        let again = tree.insert("Animal", Some(root), PropertyMap::new());
        assert_eq!(again, KindId(6));
    }

    #[test]
    fn inherited_snapshot_survives_persistence() {
        let tree = sample();
        let json = serde_json::to_string(&tree).unwrap();
        let back: KindTree = serde_json::from_str(&json).unwrap();
        assert_eq!(back.preorder(), tree.preorder());
        assert_eq!(back.get("Puppy").unwrap().resolved(), tree.get("Puppy").unwrap().resolved());
    }

    #[test]
    fn persisted_tree_must_list_parents_first() {
        let json = r#"[{"name":"Dog","parent":"Animal"}]"#;
        let err = serde_json::from_str::<KindTree>(json).unwrap_err();
        assert!(err.to_string().contains("before its parent"));
    }
}
