use kindgraph_ontology::{
    MemoryStateStore, OntologyError, PropertyType, PropertyValue, RelationshipModel, StateStore,
    TypeRegistry, ValidationService, DELETED_PROPERTY, ROOT_KIND,
};
use proptest::prelude::*;
use std::sync::Arc;

struct Ontology {
    store: Arc<MemoryStateStore>,
    registry: TypeRegistry,
    model: RelationshipModel,
    validation: ValidationService,
}

fn ontology() -> Ontology {
    let store = Arc::new(MemoryStateStore::new());
    let shared: Arc<dyn StateStore> = store.clone();
    let registry = TypeRegistry::new(shared.clone());
    let model = RelationshipModel::new(shared.clone());
    let validation = ValidationService::new(shared, Arc::new(registry.clone()));
    Ontology {
        store,
        registry,
        model,
        validation,
    }
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn dog_animal_person_scenario() {
    let o = ontology();
    o.registry
        .create_kind("Animal", Some(ROOT_KIND), &[], &[], &[])
        .unwrap();
    o.registry
        .create_kind("Dog", Some("Animal"), &["name"], &[PropertyType::String], &[])
        .unwrap();
    o.registry.create_kind("Person", None, &[], &[], &[]).unwrap();

    let dog = o.registry.get_kind("Dog").unwrap();
    let summary: Vec<(&str, PropertyType)> =
        dog.iter().map(|(n, d)| (n.as_str(), d.ty)).collect();
    assert_eq!(
        summary,
        vec![
            (DELETED_PROPERTY, PropertyType::Boolean),
            ("name", PropertyType::String)
        ]
    );

    o.model
        .create_relationship_kind("Animal", "OWNED_BY", "Person")
        .unwrap();
    let resolved = o
        .validation
        .validate_relationship("Dog", "OWNED_BY", "Person", &[], &[])
        .unwrap();
    assert_eq!(resolved.kind_a, "Animal");
    assert_eq!(resolved.kind_b, "Person");

    o.registry.remove_properties("Dog", &["name"]).unwrap();
    let err = o.registry.remove_properties("Dog", &["name"]).unwrap_err();
    assert!(matches!(err, OntologyError::InvalidArgument(_)));
}

#[test]
fn ancestor_walk_resolves_to_the_registered_pair_every_time() {
    let o = ontology();
    o.registry
        .create_kinds(&["A", "A1", "A2", "B"], &[ROOT_KIND, "A", "A1", ROOT_KIND])
        .unwrap();
    o.model.create_relationship_kind("A", "R", "B").unwrap();
    for _ in 0..5 {
        let resolved = o
            .validation
            .validate_relationship("A2", "R", "B", &[], &[])
            .unwrap();
        assert_eq!((resolved.kind_a.as_str(), resolved.kind_b.as_str()), ("A", "B"));
    }
}

#[test]
fn undeclared_property_is_a_violation() {
    let o = ontology();
    o.registry.create_kind("K", None, &[], &[], &[]).unwrap();
    let err = o
        .validation
        .validate_entity_properties("K", &["ghost"], &[PropertyValue::Integer(1)])
        .unwrap_err();
    assert!(matches!(err, OntologyError::SchemaViolation(_)));
}

#[test]
fn type_mismatch_is_a_violation() {
    let o = ontology();
    o.registry
        .create_kind("Person", None, &["age"], &[PropertyType::Integer], &[])
        .unwrap();
    o.validation
        .validate_entity_properties("Person", &["age"], &[PropertyValue::Integer(30)])
        .unwrap();
    let err = o
        .validation
        .validate_entity_properties(
            "Person",
            &["age"],
            &[PropertyValue::String("thirty".to_string())],
        )
        .unwrap_err();
    assert!(matches!(err, OntologyError::SchemaViolation(_)));
}

#[test]
fn deleting_a_kind_removes_its_subtree() {
    let o = ontology();
    o.registry
        .create_kinds(&["K", "K1", "K2", "Other"], &[ROOT_KIND, "K", "K1", ROOT_KIND])
        .unwrap();
    let removed = o.registry.delete_kind("K").unwrap();
    assert_eq!(removed, vec!["K", "K1", "K2"]);
    for kind in ["K", "K1", "K2"] {
        assert!(o.registry.get_kind(kind).unwrap().is_empty());
        assert!(o.registry.kind(kind).unwrap().is_none());
    }
    assert!(o.registry.kind("Other").unwrap().is_some());
}

#[test]
fn added_properties_are_not_retroactive() {
    let o = ontology();
    o.registry.create_kind("Animal", None, &[], &[], &[]).unwrap();
    o.registry
        .create_kind("Dog", Some("Animal"), &[], &[], &[])
        .unwrap();
    o.registry
        .add_properties("Animal", &["legs"], &[PropertyType::Integer], &[])
        .unwrap();
    assert!(o.registry.get_kind("Animal").unwrap().contains_key("legs"));
    assert!(!o.registry.get_kind("Dog").unwrap().contains_key("legs"));
    o.registry.create_kind("Cat", Some("Animal"), &[], &[], &[]).unwrap();
    assert!(o.registry.get_kind("Cat").unwrap().contains_key("legs"));
}

// ============================================================================
// Properties
// ============================================================================

fn ident() -> impl Strategy<Value = String> {
    proptest::string::string_regex("[A-Z][a-z]{1,6}").unwrap()
}

fn prop_type() -> impl Strategy<Value = PropertyType> {
    prop::sample::select(PropertyType::ALL.to_vec())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn create_kind_is_idempotent(
        kind in ident(),
        parent in ident(),
        props in proptest::collection::btree_map("[a-z]{1,6}", prop_type(), 0..4),
    ) {
        prop_assume!(kind != parent && kind != ROOT_KIND);
        let o = ontology();
        let names: Vec<&str> = props.keys().map(String::as_str).collect();
        let types: Vec<PropertyType> = props.values().copied().collect();

        o.registry.create_kind(&kind, Some(&parent), &names, &types, &[]).unwrap();
        let once = o.store.load_state().unwrap();
        o.registry.create_kind(&kind, Some(&parent), &names, &types, &[]).unwrap();
        let twice = o.store.load_state().unwrap();
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn child_properties_are_a_superset_of_the_parent(
        a_props in proptest::collection::btree_map("[a-z]{1,6}", prop_type(), 0..4),
        b_props in proptest::collection::btree_map("[a-z]{1,6}", prop_type(), 0..4),
    ) {
        let o = ontology();
        let a_names: Vec<&str> = a_props.keys().map(String::as_str).collect();
        let a_types: Vec<PropertyType> = a_props.values().copied().collect();
        let b_names: Vec<&str> = b_props.keys().map(String::as_str).collect();
        let b_types: Vec<PropertyType> = b_props.values().copied().collect();
        o.registry.create_kind("A", None, &a_names, &a_types, &[]).unwrap();
        o.registry.create_kind("B", Some("A"), &b_names, &b_types, &[]).unwrap();

        let root = o.registry.get_kind(ROOT_KIND).unwrap();
        let a = o.registry.get_kind("A").unwrap();
        let b = o.registry.get_kind("B").unwrap();
        for name in root.keys() {
            prop_assert!(a.contains_key(name));
        }
        for (name, desc) in &a {
            prop_assert!(b.contains_key(name));
            if !b_props.contains_key(name) {
                prop_assert_eq!(&b[name], desc);
            }
        }
        for (name, ty) in &b_props {
            prop_assert_eq!(b[name].ty, *ty);
        }
    }
}
