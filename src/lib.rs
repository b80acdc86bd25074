//! # docgraph-core
//!
//! Schema-driven persistence of cyclic object graphs.
//!
//! ## Overview
//!
//! A [`schema::Catalog`] describes entity types, their ordered fields, enumerations, value types
//! and the back-references (inverses) that mirror forward fields. A [`graph::Graph`] holds
//! objects of those types in an arena, addressed by [`graph::EntityId`] handles, so shared
//! and cyclic structures need no reference counting. The [`codec`] module writes and reads
//! such graphs in three encodings:
//!
//! - **STEP** clear text (`ISO-10303-21;`), positional and compact
//! - **XML**, one element per object with scalar fields as attributes
//! - **Folder trees**, one XML document per nested object so that large models diff well
//!
//! ### Key Features
//!
//! - **Shared objects written once**: a first pass counts references; objects reached more than
//!   once get an id (`#12`, `id="P1"`) and later occurrences only point at it
//! - **Forward references**: readers accept references to objects defined further down, and
//!   report the ones that never resolve instead of failing
//! - **Error tolerance**: unknown types and unknown attributes are skipped with a diagnostic
//! - **Schema overlays**: XML names and placements can be re-mapped without touching the schema
//!
//! ## Architecture
//!
//! - **[`schema`]**: type and field descriptors, the process-wide [`schema::SCHEMAS`] registry,
//!   TOML schema definitions and XML overlays
//! - **[`graph`]**: the object arena, inverse maintenance and structural comparison
//! - **[`codec`]**: the serializers and the identity and forward-reference machinery they share
//! - **[`config`]**: serializer settings ([`config::SerializerConfig`])
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use docgraph_core::{
//!     codec::StepSerializer,
//!     config::SerializerConfig,
//!     graph::{isomorphic, Graph},
//!     schema::{CatalogBuilder, EntityDef, FieldDef, Primitive},
//! };
//!
//! # fn main() -> Result<(), docgraph_core::DocGraphError> {
//! let catalog = Arc::new(
//!     CatalogBuilder::new("SHOP_1_0")
//!         .root("Shop")
//!         .entity(
//!             EntityDef::new("Shop")
//!                 .field(FieldDef::new(0, "Name", Primitive::String).required())
//!                 .field(FieldDef::new(1, "Items", "Item").list()),
//!         )
//!         .entity(EntityDef::new("Item").field(FieldDef::new(0, "Sku", Primitive::String)))
//!         .build()?,
//! );
//!
//! let mut graph = Graph::new(catalog.clone());
//! let shop = graph.create("Shop")?;
//! graph.set_field(shop, "Name", "Corner")?;
//! let item = graph.create("Item")?;
//! graph.set_field(item, "Sku", "A-1")?;
//! graph.add_field(shop, "Items", item)?;
//!
//! let serializer = StepSerializer::new(catalog, &SerializerConfig::default());
//! let text = serializer.write_string(&graph, shop)?;
//! let outcome = serializer.read_str(&text)?;
//! assert!(isomorphic(&graph, shop, &outcome.graph, outcome.root));
//! # Ok(())
//! # }
//! ```
//!
//! Files are usually handled through [`codec::load_file`] and [`codec::save_file`], which pick
//! the encoding from the path.

pub mod codec;
pub mod config;
pub mod error;
pub mod graph;
pub mod schema;
#[cfg(test)]
mod tests;

pub use error::*;
