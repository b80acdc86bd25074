//! docgraph CLI tool
//!
//! Command-line interface for converting object graphs between encodings.
//!
//! ## Commands
//!
//! - `convert <input> <output>`: Load a STEP, XML or folder model and save it in the format of
//!   the output path
//! - `inspect <input>`: Print entity counts per type and the diagnostics of the load
//! - `overlay`: Print the XML overlay (names and placements) of a schema, optionally after
//!   applying another overlay
//!
//! Every command takes the schema as a TOML definition file (`--schema`).

use clap::{Parser, Subcommand};
use docgraph_core::{
    codec::{load_file, save_file},
    config::TomlConfigProvider,
    schema::{Catalog, SchemaDefinitionFile, SchemaOverlay, SCHEMAS},
};
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::Arc,
};

#[derive(Parser)]
#[command(name = "docgraph")]
#[command(author, version, about = "Convert object graphs between STEP, XML and folder trees", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a model and save it again, the output format following the output path
    Convert {
        /// Schema definition (TOML)
        #[arg(short, long)]
        schema: PathBuf,

        /// Serializer configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// File or folder to read
        input: PathBuf,

        /// File or folder to write; an existing target is replaced
        output: PathBuf,
    },

    /// Load a model and report what it contains
    Inspect {
        /// Schema definition (TOML)
        #[arg(short, long)]
        schema: PathBuf,

        /// Serializer configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// File or folder to read
        input: PathBuf,
    },

    /// Print the XML overlay of a schema
    Overlay {
        /// Schema definition (TOML)
        #[arg(short, long)]
        schema: PathBuf,

        /// Overlay applied before printing
        #[arg(long)]
        cnf: Option<PathBuf>,
    },
}

fn load_schema(path: &Path) -> Result<Arc<Catalog>, Box<dyn std::error::Error>> {
    let catalog = SchemaDefinitionFile::from_path(path)?.build()?;
    tracing::debug!(
        "Loaded schema {} from {:?}",
        catalog.schema_identifier(),
        path
    );
    Ok(SCHEMAS.register(catalog))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Convert {
            schema,
            config,
            input,
            output,
        } => {
            let catalog = load_schema(&schema)?;
            let config = match config {
                Some(path) => TomlConfigProvider::new(path).get_config()?,
                None => Default::default(),
            };
            let loaded = load_file(&input, catalog, &config)?;
            for diagnostic in &loaded.diagnostics {
                eprintln!("warning: {diagnostic}");
            }
            save_file(&output, &loaded.graph, loaded.root, &config)?;
            println!(
                "Converted {} entities: {:?} -> {:?}",
                loaded.graph.len(),
                input,
                output
            );
        }

        Commands::Inspect {
            schema,
            config,
            input,
        } => {
            let catalog = load_schema(&schema)?;
            let config = match config {
                Some(path) => TomlConfigProvider::new(path).get_config()?,
                None => Default::default(),
            };
            let loaded = load_file(&input, catalog, &config)?;

            println!("Format: {:?}", loaded.format);
            if let Some(identifier) = &loaded.schema_identifier {
                match loaded.schema_version {
                    Some(version) => println!("Schema: {identifier} (version {version})"),
                    None => println!("Schema: {identifier}"),
                }
            }
            println!("Root: {}", loaded.graph.type_name(loaded.root)?);

            let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
            for id in loaded.graph.ids() {
                *counts.entry(loaded.graph.type_name(id)?).or_default() += 1;
            }
            println!("Entities: {}", loaded.graph.len());
            for (name, count) in &counts {
                println!("  {name:<32} {count}");
            }

            if loaded.diagnostics.is_empty() {
                println!("No diagnostics");
            } else {
                println!("Diagnostics: {}", loaded.diagnostics.len());
                for diagnostic in &loaded.diagnostics {
                    println!("  {diagnostic}");
                }
            }
        }

        Commands::Overlay { schema, cnf } => {
            let catalog = load_schema(&schema)?;
            let catalog = match cnf {
                Some(path) => {
                    let overlay = SchemaOverlay::from_xml_str(&std::fs::read_to_string(&path)?)?;
                    catalog.with_overlay(&overlay)?
                }
                None => (*catalog).clone(),
            };
            print!("{}", SchemaOverlay::from_catalog(&catalog).to_xml_string()?);
        }
    }

    Ok(())
}
