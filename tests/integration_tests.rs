//! Integration tests for the complete Kindgraph stack
//!
//! These tests verify end-to-end functionality across crates:
//! - Registry / data model → JSON files → reopened facade
//! - Facade → schema text file → DSL parser and consistency check
//! - Config file → backend selection
//!
//! Run with: cargo test --test integration_tests

use kindgraph_dsl::{schema_digest, SchemaDocument, Statement, TypeFamily};
use kindgraph_ontology::{OntologyError, PropertyType, PropertyValue, StateStore, ROOT_KIND};
use kindgraph_storage::{Backend, JsonStateStore, StorageConfig, UnifiedOntology};
use tempfile::tempdir;

fn build_fleet(ontology: &UnifiedOntology) {
    ontology
        .create_kind(
            "Vehicle",
            None,
            &["wheels", "registered"],
            &[PropertyType::Integer, PropertyType::Date],
            &["", ""],
        )
        .unwrap();
    ontology
        .create_kind(
            "Truck",
            Some("Vehicle"),
            &["payload"],
            &[PropertyType::Float],
            &["t"],
        )
        .unwrap();
    ontology.create_kind("Driver", None, &[], &[], &[]).unwrap();
    ontology
        .create_relationship_kind("Driver", "DRIVES", "Vehicle")
        .unwrap();
    ontology
        .add_relationship_properties("Driver", "DRIVES", "Vehicle", &["since"], &[PropertyType::Date])
        .unwrap();
}

// ============================================================================
// Structural backend
// ============================================================================

#[test]
fn test_structural_state_survives_reopen() {
    let dir = tempdir().unwrap();
    let config = StorageConfig::rooted_at(dir.path());
    {
        let ontology = UnifiedOntology::open(&config);
        assert_eq!(ontology.backend(), Backend::Structural);
        build_fleet(&ontology);
    }

    assert!(config.hierarchy_path.exists());
    assert!(config.data_model_path.exists());
    assert!(!config.schema_path.exists());

    let ontology = UnifiedOntology::open(&config);
    let truck = ontology.registry().kind("Truck").unwrap().unwrap();
    assert_eq!(truck.parent.as_deref(), Some("Vehicle"));
    assert_eq!(truck.properties["payload"].measurement_unit, "t");
    assert!(truck.properties.contains_key("wheels"));

    let tree = ontology.registry().render_hierarchy(false).unwrap();
    assert_eq!(tree, format!("{ROOT_KIND}\n  Vehicle\n    Truck\n  Driver\n"));

    // Truck inherits the Vehicle pairing.
    let resolved = ontology
        .validate_relationship(
            "Driver",
            "DRIVES",
            "Truck",
            &["since"],
            &[PropertyValue::from_json(&serde_json::json!("2024-03-01"), Some(PropertyType::Date)).unwrap()],
        )
        .unwrap();
    assert_eq!(resolved.kind_b, "Vehicle");
}

#[test]
fn test_structural_delete_purges_pairings_on_disk() {
    let dir = tempdir().unwrap();
    let config = StorageConfig::rooted_at(dir.path());
    let ontology = UnifiedOntology::open(&config);
    build_fleet(&ontology);

    let removed = ontology.delete_kind("Vehicle").unwrap();
    assert_eq!(removed, vec!["Vehicle", "Truck"]);

    let reopened = JsonStateStore::new(&config.hierarchy_path, &config.data_model_path);
    let state = reopened.load_state().unwrap().unwrap();
    assert!(!state.hierarchy.contains("Truck"));
    assert!(state
        .data_model
        .pairings("DRIVES")
        .map(|p| p.is_empty())
        .unwrap_or(true));

    let err = ontology
        .validate_relationship("Driver", "DRIVES", "Truck", &[], &[])
        .unwrap_err();
    assert!(matches!(err, OntologyError::SchemaViolation(_)));
}

#[test]
fn test_entity_validation_with_json_values() {
    let dir = tempdir().unwrap();
    let ontology = UnifiedOntology::open(&StorageConfig::rooted_at(dir.path()));
    build_fleet(&ontology);

    let values = [
        PropertyValue::from_json(&serde_json::json!(6), Some(PropertyType::Integer)).unwrap(),
        PropertyValue::from_json(&serde_json::json!(12.5), Some(PropertyType::Float)).unwrap(),
    ];
    ontology
        .validate_entity_properties("Truck", &["wheels", "payload"], &values)
        .unwrap();

    let err = ontology
        .validate_entity_properties("Truck", &["wheels"], &[PropertyValue::Boolean(true)])
        .unwrap_err();
    assert!(matches!(err, OntologyError::SchemaViolation(_)));
}

// ============================================================================
// Declarative backend
// ============================================================================

#[test]
fn test_declarative_schema_file_is_consistent() {
    let dir = tempdir().unwrap();
    let config = StorageConfig::rooted_at(dir.path()).with_backend(Backend::Declarative);
    let ontology = UnifiedOntology::open(&config);
    build_fleet(&ontology);
    ontology
        .add_properties("Driver", &["licence"], &[PropertyType::String], &[TypeFamily::Mandatory])
        .unwrap();
    ontology
        .update_label("Truck", Some("payload"), "Maximum load in tonnes")
        .unwrap();

    let text = std::fs::read_to_string(&config.schema_path).unwrap();
    let document = SchemaDocument::parse(&text).unwrap();
    document.check().unwrap();
    assert!(document.contains(&Statement::Inherits {
        kind: "Truck".to_string(),
        parent: "Vehicle".to_string(),
    }));
    assert!(text.contains("property Driver.licence: Mandatory xsd:string\n"));
    assert!(text.contains("relation Driver.DRIVES: Set -> Vehicle\n"));
    assert_eq!(
        document.label("Truck", Some("payload")),
        Some("Maximum load in tonnes")
    );

    // Reopening reads the same document back.
    let reopened = UnifiedOntology::open(&config);
    let sync = reopened.schema().unwrap();
    assert_eq!(schema_digest(&sync.document().unwrap()), schema_digest(&document));
}

#[test]
fn test_declarative_delete_keeps_schema_consistent() {
    let dir = tempdir().unwrap();
    let config = StorageConfig::rooted_at(dir.path()).with_backend(Backend::Declarative);
    let ontology = UnifiedOntology::open(&config);
    build_fleet(&ontology);

    ontology.delete_kind("Vehicle").unwrap();
    let text = std::fs::read_to_string(&config.schema_path).unwrap();
    assert_eq!(text, "class Driver\n");
    SchemaDocument::parse(&text).unwrap().check().unwrap();
    assert!(ontology.registry().kind("Truck").unwrap().is_none());
}

// ============================================================================
// Configuration
// ============================================================================

#[test]
fn test_config_file_selects_backend() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("kindgraph.json");
    let schema_path = dir.path().join("custom.kgs");
    std::fs::write(
        &path,
        serde_json::json!({
            "backend": "declarative",
            "schema_path": schema_path,
        })
        .to_string(),
    )
    .unwrap();

    let config = StorageConfig::load(&path).unwrap();
    assert_eq!(config.backend, Backend::Declarative);
    assert_eq!(config.schema_path, schema_path);
    assert_eq!(
        config.hierarchy_path,
        StorageConfig::default().hierarchy_path
    );

    let missing = StorageConfig::load(&dir.path().join("absent.json"));
    assert!(missing.is_err());
}
