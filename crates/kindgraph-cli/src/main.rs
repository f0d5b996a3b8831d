//! Kindgraph CLI
//!
//! Command-line access to an ontology stored on disk:
//! - kinds and their properties (`kind`, `property`)
//! - relationship kinds (`rel`)
//! - instance checks (`validate`)
//! - the declarative schema text (`schema`, declarative backend)

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use kindgraph_ontology::{
    EntityKind, PropertyMap, PropertyType, PropertyValue, ResolvedPair, TypeFamily, ROOT_KIND,
};
use kindgraph_storage::{Backend, StorageConfig, UnifiedOntology};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "kindgraph")]
#[command(author, version, about = "Kindgraph: evolvable ontology consistency engine")]
struct Cli {
    #[command(flatten)]
    storage: StorageArgs,

    /// Raise log verbosity (-v info, -vv debug). `RUST_LOG` overrides.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct StorageArgs {
    /// Directory holding the ontology files
    #[arg(long, global = true, default_value = "./ontology")]
    dir: PathBuf,

    /// JSON storage config (overrides --dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the configured backend (structural|declarative)
    #[arg(long, global = true)]
    backend: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Entity kinds
    Kind {
        #[command(subcommand)]
        command: KindCommands,
    },
    /// Properties of a kind
    Property {
        #[command(subcommand)]
        command: PropertyCommands,
    },
    /// Relationship kinds
    Rel {
        #[command(subcommand)]
        command: RelCommands,
    },
    /// Check instance data against the ontology
    Validate {
        #[command(subcommand)]
        command: ValidateCommands,
    },
    /// Declarative schema text (declarative backend)
    Schema {
        #[command(subcommand)]
        command: SchemaCommands,
    },
}

#[derive(Subcommand)]
enum KindCommands {
    /// Create a kind (missing parents are created under the root)
    Create {
        kind: String,
        #[arg(long)]
        parent: Option<String>,
        /// Property as NAME[:TYPE[:UNIT]], repeatable
        #[arg(long = "prop")]
        props: Vec<String>,
    },
    /// Delete a kind and its subtree
    Delete { kind: String },
    /// Show a kind with own and resolved properties
    Show { kind: String },
    /// List every kind with its parent
    List,
    /// Print the kind hierarchy
    Tree {
        /// Include resolved properties
        #[arg(long)]
        props: bool,
    },
}

#[derive(Subcommand)]
enum PropertyCommands {
    /// Add properties, each NAME[:TYPE[:FAMILY]]
    Add {
        kind: String,
        #[arg(required = true)]
        props: Vec<String>,
    },
    /// Remove own properties (all or nothing)
    Remove {
        kind: String,
        #[arg(required = true)]
        names: Vec<String>,
    },
}

#[derive(Subcommand)]
enum RelCommands {
    /// Allow RELATIONSHIP from KIND_A to KIND_B
    Create {
        kind_a: String,
        relationship: String,
        kind_b: String,
    },
    /// Remove one pairing of a relationship kind
    Delete {
        kind_a: String,
        relationship: String,
        kind_b: String,
    },
    /// Show the pairings of a relationship kind
    Show { relationship: String },
    /// Print the whole data model
    List,
    /// Add properties to a pairing, each NAME[:TYPE]
    AddProps {
        kind_a: String,
        relationship: String,
        kind_b: String,
        #[arg(required = true)]
        props: Vec<String>,
    },
}

#[derive(Subcommand)]
enum ValidateCommands {
    /// Validate entity property values
    Entity {
        kind: String,
        /// NAME=JSON, repeatable (e.g. --set age=30 --set name='"Rex"')
        #[arg(long = "set")]
        values: Vec<String>,
    },
    /// Validate a relationship instance
    Rel {
        kind_a: String,
        relationship: String,
        kind_b: String,
        #[arg(long = "set")]
        values: Vec<String>,
    },
}

#[derive(Subcommand)]
enum SchemaCommands {
    /// Print the schema text
    Show,
    /// Project the structural state into the schema
    Sync,
    /// Set documentation for a kind or one of its slots
    Label {
        kind: String,
        #[arg(long)]
        property: Option<String>,
        text: String,
    },
    /// Remove a whole kind, or only the named slots
    Delete { kind: String, names: Vec<String> },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let ontology = UnifiedOntology::open(&storage_config(&cli.storage)?);

    match cli.command {
        Commands::Kind { command } => cmd_kind(&ontology, command),
        Commands::Property { command } => cmd_property(&ontology, command),
        Commands::Rel { command } => cmd_rel(&ontology, command),
        Commands::Validate { command } => cmd_validate(&ontology, command),
        Commands::Schema { command } => cmd_schema(&ontology, command),
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn storage_config(args: &StorageArgs) -> Result<StorageConfig> {
    let mut config = match &args.config {
        Some(path) => StorageConfig::load(path)?,
        None => StorageConfig::rooted_at(&args.dir),
    };
    if let Some(backend) = &args.backend {
        config.backend = match backend.to_ascii_lowercase().as_str() {
            "structural" => Backend::Structural,
            "declarative" => Backend::Declarative,
            other => bail!("unknown backend `{other}` (expected structural or declarative)"),
        };
    }
    Ok(config)
}

// ============================================================================
// Commands
// ============================================================================

fn cmd_kind(ontology: &UnifiedOntology, command: KindCommands) -> Result<()> {
    match command {
        KindCommands::Create {
            kind,
            parent,
            props,
        } => {
            let specs = parse_specs(&props)?;
            let names: Vec<&str> = specs.iter().map(|s| s.name.as_str()).collect();
            let types: Vec<PropertyType> = specs.iter().map(|s| s.ty).collect();
            let units: Vec<&str> = specs.iter().map(|s| s.extra.as_deref().unwrap_or("")).collect();
            let created =
                ontology.create_kind(&kind, parent.as_deref(), &names, &types, &units)?;
            ok(&format!(
                "kind {} (parent {})",
                created.name.bold(),
                created.parent.as_deref().unwrap_or("-")
            ));
        }
        KindCommands::Delete { kind } => {
            let removed = ontology.delete_kind(&kind)?;
            if removed.is_empty() {
                println!("{} nothing to delete", "note".yellow().bold());
            } else {
                ok(&format!("deleted {}", removed.join(", ")));
            }
        }
        KindCommands::Show { kind } => {
            let entity = ontology
                .registry()
                .kind(&kind)?
                .ok_or_else(|| anyhow!("kind `{kind}` does not exist"))?;
            print_entity(&entity);
        }
        KindCommands::List => {
            for entity in ontology.registry().all_kinds()? {
                match &entity.parent {
                    Some(parent) => println!("{} {} {}", entity.name.bold(), "<".dimmed(), parent),
                    None => println!("{}", entity.name.bold()),
                }
            }
        }
        KindCommands::Tree { props } => {
            print!("{}", ontology.registry().render_hierarchy(props)?);
        }
    }
    Ok(())
}

fn cmd_property(ontology: &UnifiedOntology, command: PropertyCommands) -> Result<()> {
    match command {
        PropertyCommands::Add { kind, props } => {
            let specs = parse_specs(&props)?;
            let names: Vec<&str> = specs.iter().map(|s| s.name.as_str()).collect();
            let types: Vec<PropertyType> = specs.iter().map(|s| s.ty).collect();
            let families = specs
                .iter()
                .map(|s| match &s.extra {
                    Some(family) => family.parse::<TypeFamily>().map_err(anyhow::Error::from),
                    None => Ok(TypeFamily::default()),
                })
                .collect::<Result<Vec<_>>>()?;
            ontology.add_properties(&kind, &names, &types, &families)?;
            ok(&format!("added {} to {}", names.join(", "), kind.bold()));
        }
        PropertyCommands::Remove { kind, names } => {
            let names: Vec<&str> = names.iter().map(String::as_str).collect();
            ontology.remove_properties(&kind, &names)?;
            ok(&format!("removed {} from {}", names.join(", "), kind.bold()));
        }
    }
    Ok(())
}

fn cmd_rel(ontology: &UnifiedOntology, command: RelCommands) -> Result<()> {
    match command {
        RelCommands::Create {
            kind_a,
            relationship,
            kind_b,
        } => {
            if ontology.create_relationship_kind(&kind_a, &relationship, &kind_b)? {
                ok(&format!("({kind_a})-[{relationship}]->({kind_b})"));
            } else {
                println!("{} already registered", "note".yellow().bold());
            }
        }
        RelCommands::Delete {
            kind_a,
            relationship,
            kind_b,
        } => {
            if ontology.delete_relationship_kind(&kind_a, &relationship, &kind_b)? {
                ok(&format!("removed ({kind_a})-[{relationship}]->({kind_b})"));
            } else {
                println!("{} no such pairing", "note".yellow().bold());
            }
        }
        RelCommands::Show { relationship } => {
            let pairings = ontology
                .model()
                .get_relationship_kind(&relationship)?
                .ok_or_else(|| anyhow!("relationship kind `{relationship}` does not exist"))?;
            for pairing in pairings {
                println!(
                    "({})-[{}]->({}) {}",
                    pairing.kind_a,
                    relationship.bold(),
                    pairing.kind_b,
                    format_properties(&pairing.properties).dimmed()
                );
            }
        }
        RelCommands::List => print!("{}", ontology.model().render_data_model()?),
        RelCommands::AddProps {
            kind_a,
            relationship,
            kind_b,
            props,
        } => {
            let specs = parse_specs(&props)?;
            let names: Vec<&str> = specs.iter().map(|s| s.name.as_str()).collect();
            let types: Vec<PropertyType> = specs.iter().map(|s| s.ty).collect();
            ontology.add_relationship_properties(&kind_a, &relationship, &kind_b, &names, &types)?;
            ok(&format!("added {} to {relationship}", names.join(", ")));
        }
    }
    Ok(())
}

fn cmd_validate(ontology: &UnifiedOntology, command: ValidateCommands) -> Result<()> {
    match command {
        ValidateCommands::Entity { kind, values } => {
            let declared = ontology.registry().get_kind(&kind)?;
            let (names, values) = parse_assignments(&values, &declared)?;
            let names: Vec<&str> = names.iter().map(String::as_str).collect();
            ontology.validate_entity_properties(&kind, &names, &values)?;
            ok(&format!("{} instance is valid", kind.bold()));
        }
        ValidateCommands::Rel {
            kind_a,
            relationship,
            kind_b,
            values,
        } => {
            let resolved = validate_rel(ontology, &kind_a, &relationship, &kind_b, &values)?;
            ok(&format!(
                "valid via ({})-[{}]->({})",
                resolved.kind_a, resolved.relationship_kind, resolved.kind_b
            ));
        }
    }
    Ok(())
}

/// Validate a relationship instance given as `NAME=VALUE` assignments.
///
/// Values are decoded against the pairing that validation resolves to, which
/// may sit on ancestors of `kind_a` and `kind_b`.
fn validate_rel(
    ontology: &UnifiedOntology,
    kind_a: &str,
    relationship: &str,
    kind_b: &str,
    raw: &[String],
) -> Result<ResolvedPair> {
    let declared = ontology
        .validate_relationship(kind_a, relationship, kind_b, &[], &[])?
        .properties;
    let (names, values) = parse_assignments(raw, &declared)?;
    let names: Vec<&str> = names.iter().map(String::as_str).collect();
    Ok(ontology.validate_relationship(kind_a, relationship, kind_b, &names, &values)?)
}

fn cmd_schema(ontology: &UnifiedOntology, command: SchemaCommands) -> Result<()> {
    let sync = ontology
        .schema()
        .context("schema commands need the declarative backend (--backend declarative)")?;
    match command {
        SchemaCommands::Show => print!("{}", sync.schema_text()?),
        SchemaCommands::Sync => {
            let receipt = ontology.sync_schema()?;
            ok(&format!(
                "{} statement(s) changed, schema {}",
                receipt.changed, receipt.digest
            ));
        }
        SchemaCommands::Label {
            kind,
            property,
            text,
        } => {
            ontology.update_label(&kind, property.as_deref(), &text)?;
            ok("label updated");
        }
        SchemaCommands::Delete { kind, names } => {
            if kind == ROOT_KIND {
                bail!("the root kind `{ROOT_KIND}` is not part of the schema");
            }
            let names: Vec<&str> = names.iter().map(String::as_str).collect();
            let removed = ontology.delete_schema_fragment(&kind, &names)?;
            for statement in &removed {
                println!("{} {statement}", "-".red());
            }
            ok(&format!("{} statement(s) removed", removed.len()));
        }
    }
    Ok(())
}

// ============================================================================
// Argument parsing and output
// ============================================================================

/// `NAME[:TYPE[:EXTRA]]` where EXTRA is a unit or a family depending on the
/// command.
#[derive(Debug, PartialEq)]
struct PropSpec {
    name: String,
    ty: PropertyType,
    extra: Option<String>,
}

fn parse_spec(raw: &str) -> Result<PropSpec> {
    let mut parts = raw.splitn(3, ':');
    let name = parts.next().unwrap_or_default().trim();
    if name.is_empty() {
        bail!("property argument `{raw}` has no name");
    }
    let ty = match parts.next() {
        Some(ty) if !ty.trim().is_empty() => ty.parse::<PropertyType>()?,
        _ => PropertyType::default(),
    };
    let extra = parts.next().map(|s| s.trim().to_string());
    Ok(PropSpec {
        name: name.to_string(),
        ty,
        extra,
    })
}

fn parse_specs(raw: &[String]) -> Result<Vec<PropSpec>> {
    raw.iter().map(|r| parse_spec(r)).collect()
}

/// `NAME=JSON` pairs, decoded with the declared type as a hint so dates and
/// times can be given as strings. A value that is not valid JSON is taken
/// as a plain string.
fn parse_assignments(
    raw: &[String],
    declared: &PropertyMap,
) -> Result<(Vec<String>, Vec<PropertyValue>)> {
    let mut names = Vec::with_capacity(raw.len());
    let mut values = Vec::with_capacity(raw.len());
    for assignment in raw {
        let (name, value) = assignment
            .split_once('=')
            .ok_or_else(|| anyhow!("expected NAME=VALUE, got `{assignment}`"))?;
        let json = serde_json::from_str(value)
            .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
        let hint = declared.get(name).map(|d| d.ty);
        values.push(PropertyValue::from_json(&json, hint)?);
        names.push(name.to_string());
    }
    Ok((names, values))
}

fn format_properties(properties: &PropertyMap) -> String {
    let parts: Vec<String> = properties
        .iter()
        .map(|(name, desc)| format!("{name}: {desc}"))
        .collect();
    format!("{{{}}}", parts.join(", "))
}

fn print_entity(entity: &EntityKind) {
    println!("{}", entity.name.bold());
    println!("  parent:    {}", entity.parent.as_deref().unwrap_or("-"));
    println!("  own:       {}", format_properties(&entity.own_properties));
    println!("  resolved:  {}", format_properties(&entity.properties));
}

fn ok(message: &str) {
    println!("{} {message}", "ok".green().bold());
}

#[cfg(test)]
mod tests {
    use super::*;
    use kindgraph_ontology::{MemoryStateStore, PropertyDescriptor};
    use std::sync::Arc;

    #[test]
    fn spec_defaults_to_string() {
        assert_eq!(
            parse_spec("name").unwrap(),
            PropSpec {
                name: "name".to_string(),
                ty: PropertyType::String,
                extra: None
            }
        );
        let spec = parse_spec("height:float:cm").unwrap();
        assert_eq!(spec.ty, PropertyType::Float);
        assert_eq!(spec.extra.as_deref(), Some("cm"));
        assert!(parse_spec("x:blob").is_err());
        assert!(parse_spec(":integer").is_err());
    }

    #[test]
    fn rel_values_decode_against_the_inherited_pairing() {
        let ontology = UnifiedOntology::with_stores(Arc::new(MemoryStateStore::new()), None);
        ontology.create_kind("Vehicle", None, &[], &[], &[]).unwrap();
        ontology.create_kind("Truck", Some("Vehicle"), &[], &[], &[]).unwrap();
        ontology.create_kind("Driver", None, &[], &[], &[]).unwrap();
        ontology.create_relationship_kind("Driver", "DRIVES", "Vehicle").unwrap();
        ontology
            .add_relationship_properties(
                "Driver",
                "DRIVES",
                "Vehicle",
                &["since", "hours"],
                &[PropertyType::Date, PropertyType::Float],
            )
            .unwrap();

        let raw = vec!["since=\"2024-03-01\"".to_string(), "hours=8".to_string()];
        let resolved = validate_rel(&ontology, "Driver", "DRIVES", "Truck", &raw).unwrap();
        assert_eq!(resolved.kind_b, "Vehicle");

        let raw = vec!["hours=\"long\"".to_string()];
        assert!(validate_rel(&ontology, "Driver", "DRIVES", "Truck", &raw).is_err());
    }

    #[test]
    fn assignments_use_declared_types() {
        let mut declared = PropertyMap::new();
        declared.insert("born".to_string(), PropertyDescriptor::new(PropertyType::Date));
        let raw = vec![
            "born=\"2020-05-01\"".to_string(),
            "age=3".to_string(),
            "nick=Rex".to_string(),
        ];
        let (names, values) = parse_assignments(&raw, &declared).unwrap();
        assert_eq!(names, vec!["born", "age", "nick"]);
        assert_eq!(values[0].property_type(), PropertyType::Date);
        assert_eq!(values[1], PropertyValue::Integer(3));
        assert_eq!(values[2], PropertyValue::String("Rex".to_string()));
    }

    #[test]
    fn cli_parses_nested_commands() {
        let cli = Cli::try_parse_from([
            "kindgraph",
            "--backend",
            "declarative",
            "kind",
            "create",
            "Dog",
            "--parent",
            "Animal",
            "--prop",
            "age:integer:years",
        ])
        .unwrap();
        assert_eq!(cli.storage.backend.as_deref(), Some("declarative"));
        assert!(matches!(
            cli.command,
            Commands::Kind {
                command: KindCommands::Create { .. }
            }
        ));
    }
}
