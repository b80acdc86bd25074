//! Shared test utilities for integration tests.
//!
//! Import from integration test files as:
//! ```ignore
//! mod common;
//! ```

use docgraph_core::{
    graph::{EntityId, Graph, Value},
    schema::{Catalog, CatalogBuilder, EntityDef, FieldDef, Primitive, SchemaDefinitionFile},
};
use std::sync::Arc;

/// A shop whose items point at each other, so every encoding has to cope with cycles.
pub const SHOP_SCHEMA: &str = r#"
schema = "SHOP_SCHEMA_1_2"
root = "Shop"

[[enumerations]]
name = "Size"
variants = [{ name = "Small" }, { name = "Large", alias = "XL" }]

[[entities]]
name = "Shop"
identity = ["Name"]
fields = [
    { order = 0, name = "Name", type = "string", required = true },
    { order = 1, name = "Items", type = "Item", cardinality = "list", folder = { nested = { bucketed = true } } },
    { order = 2, name = "Featured", type = "Item", cardinality = "optional" },
    { order = 3, name = "Blurb", type = "string", cardinality = "optional", xml = "element", folder = { sidecar = { extension = "md" } } },
]

[[entities]]
name = "Item"
identity = ["Sku"]
folder_key = "Sku"
fields = [
    { order = 0, name = "Sku", type = "string" },
    { order = 1, name = "Size", type = "Size", cardinality = "optional" },
    { order = 2, name = "Price", type = "real", cardinality = "optional" },
    { order = 3, name = "Related", type = "Item", cardinality = "list" },
]
inverses = [{ name = "Shop", target = "Shop", forward = "Items", cardinality = "optional" }]
"#;

/// Initialize tracing for tests, respecting RUST_LOG env var.
///
/// Safe to call multiple times; subsequent calls are no-ops.
#[allow(dead_code)]
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

#[allow(dead_code)]
pub fn shop_catalog() -> Arc<Catalog> {
    Arc::new(
        SchemaDefinitionFile::from_toml_str(SHOP_SCHEMA)
            .unwrap()
            .build()
            .unwrap(),
    )
}

/// `Corner` selling `A-100` and `B-200`, which list each other as related; `A-100` is also
/// featured.
#[allow(dead_code)]
pub fn shop_graph(catalog: Arc<Catalog>) -> (Graph, EntityId) {
    let mut g = Graph::new(catalog);
    let shop = g.create("Shop").unwrap();
    g.set_field(shop, "Name", "Corner").unwrap();

    let a = g.create("Item").unwrap();
    g.set_field(a, "Sku", "A-100").unwrap();
    g.set_field(a, "Size", Value::Enum("Small".to_string()))
        .unwrap();
    g.set_field(a, "Price", 1.5).unwrap();

    let b = g.create("Item").unwrap();
    g.set_field(b, "Sku", "B-200").unwrap();
    g.set_field(b, "Price", 20.0).unwrap();

    g.add_field(a, "Related", b).unwrap();
    g.add_field(b, "Related", a).unwrap();
    g.add_field(shop, "Items", a).unwrap();
    g.add_field(shop, "Items", b).unwrap();
    g.set_field(shop, "Featured", a).unwrap();
    g.set_field(shop, "Blurb", "Open daily.\nClosed on holidays.")
        .unwrap();

    g.rebuild_inverses();
    (g, shop)
}

/// A chain whose links each point at the next one and at nothing else.
#[allow(dead_code)]
pub fn chain_catalog() -> Arc<Catalog> {
    Arc::new(
        CatalogBuilder::new("CHAIN_1_0")
            .root("Chain")
            .entity(
                EntityDef::new("Chain")
                    .field(FieldDef::new(0, "Name", Primitive::String).required())
                    .field(FieldDef::new(1, "Head", "Link").optional()),
            )
            .entity(
                EntityDef::new("Link")
                    .field(FieldDef::new(0, "Code", Primitive::String))
                    .field(FieldDef::new(1, "Next", "Link").optional()),
            )
            .build()
            .unwrap(),
    )
}

/// `links` links, each referenced exactly once.
#[allow(dead_code)]
pub fn chain_graph(catalog: Arc<Catalog>, links: usize) -> (Graph, EntityId) {
    let mut g = Graph::new(catalog);
    let chain = g.create("Chain").unwrap();
    g.set_field(chain, "Name", "long").unwrap();
    let mut previous = None;
    for n in 0..links {
        let link = g.create("Link").unwrap();
        g.set_field(link, "Code", format!("L{n}")).unwrap();
        match previous {
            Some(prev) => g.set_field(prev, "Next", link).unwrap(),
            None => g.set_field(chain, "Head", link).unwrap(),
        }
        previous = Some(link);
    }
    (g, chain)
}
