//! Shared test utilities: the widget schema and a populated sample graph

use crate::{
    graph::{EntityId, Graph, Value},
    schema::{
        Catalog, CatalogBuilder, EntityDef, EnumDef, FieldDef, FolderHint, InverseDef, Primitive,
        XmlPlacement,
    },
};
use std::sync::Arc;
use uuid::Uuid;

pub const WIDGET_SCHEMA: &str = "WIDGET_SCHEMA_2_1";
pub const WIDGET_GUID: u128 = 0x0f1e2d3c_4b5a_6978_8796_a5b4c3d2e1f0;

/// Initialize logging for tests
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

/// Widgets own parts (some of them gears), carry text notes and a select-typed measure.
pub fn widget_builder() -> CatalogBuilder {
    CatalogBuilder::new(WIDGET_SCHEMA)
        .root("Widget")
        .enumeration(
            EnumDef::new("Color")
                .variant("Red")
                .variant("Green")
                .variant_with_alias("Blue", "azure"),
        )
        .defined("Label", Primitive::String)
        .defined("Count", Primitive::Integer)
        .entity(
            EntityDef::new("Widget")
                .identity(["GlobalId"])
                .folder_key("Name")
                .field(FieldDef::new(0, "Name", Primitive::String).required())
                .field(FieldDef::new(1, "GlobalId", Primitive::Guid).optional())
                .field(FieldDef::new(2, "Parts", "Part").list().folder(
                    FolderHint::Nested {
                        bucketed: true,
                        leaf: false,
                    },
                ))
                .field(FieldDef::new(3, "Color", "Color").optional())
                .field(FieldDef::new(4, "Sizes", Primitive::Integer).list())
                .field(FieldDef::new(5, "Favorite", "Part").optional())
                .field(
                    FieldDef::new(6, "Notes", Primitive::String)
                        .optional()
                        .xml(XmlPlacement::Element)
                        .folder(FolderHint::Sidecar {
                            extension: "txt".to_string(),
                        }),
                )
                .field(FieldDef::new(7, "Remarks", "Note").list().tagless())
                .field(FieldDef::new(8, "Measure", "Quantity").optional())
                .field(FieldDef::new(9, "Flag", Primitive::Logical).optional())
                .field(FieldDef::new(10, "Blob", Primitive::Binary).optional()),
        )
        .entity(
            EntityDef::new("Part")
                .identity(["Code"])
                .folder_key("Code")
                .field(FieldDef::new(0, "Code", Primitive::String).required())
                .field(FieldDef::new(1, "Weight", Primitive::Real).optional())
                .inverse(InverseDef::new("Owner", "Widget", "Parts").scalar())
                .inverse(InverseDef::new("FavoriteOf", "Widget", "Favorite")),
        )
        .entity(
            EntityDef::new("Gear")
                .base("Part")
                .field(FieldDef::new(0, "Teeth", Primitive::Integer))
                .field(FieldDef::new(1, "Weight", Primitive::Real).optional()),
        )
        .entity(
            EntityDef::new("Note")
                .field(
                    FieldDef::new(0, "Lang", Primitive::String)
                        .optional()
                        .xml(XmlPlacement::Attribute),
                )
                .field(FieldDef::new(1, "Text", Primitive::String).xml(XmlPlacement::Content)),
        )
        .entity(EntityDef::new("Quantity").abstract_type())
}

pub fn widget_catalog() -> Catalog {
    widget_builder()
        .build()
        .expect("widget schema is valid")
}

/// `W1` with parts `[G1 (gear), P1]`, `Favorite = P1` (so P1 is shared) and every other field
/// populated.
pub fn sample_widget(catalog: Arc<Catalog>) -> (Graph, EntityId) {
    let mut g = Graph::new(catalog);
    let widget = g.create("Widget").unwrap();
    g.set_field(widget, "Name", "W1").unwrap();
    g.set_field(widget, "GlobalId", Uuid::from_u128(WIDGET_GUID))
        .unwrap();

    let gear = g.create("Gear").unwrap();
    g.set_field(gear, "Code", "G1").unwrap();
    g.set_field(gear, "Teeth", 12i64).unwrap();
    g.set_field(gear, "Weight", 2.0).unwrap();

    let part = g.create("Part").unwrap();
    g.set_field(part, "Code", "P1").unwrap();
    g.set_field(part, "Weight", 1.5).unwrap();

    g.add_field(widget, "Parts", gear).unwrap();
    g.add_field(widget, "Parts", part).unwrap();
    g.set_field(widget, "Favorite", part).unwrap();
    g.set_field(widget, "Color", Value::Enum("Blue".to_string()))
        .unwrap();
    for size in [1i64, 2, 3] {
        g.add_field(widget, "Sizes", size).unwrap();
    }
    g.set_field(widget, "Notes", "Line one\nLine two").unwrap();

    let note = g.create("Note").unwrap();
    g.set_field(note, "Lang", "en").unwrap();
    g.set_field(note, "Text", "hello & <world>").unwrap();
    g.add_field(widget, "Remarks", note).unwrap();

    g.set_field(widget, "Measure", Value::wrapped("Label", Value::string("tall")))
        .unwrap();
    g.set_field(widget, "Flag", Value::Logical(None)).unwrap();
    g.set_field(widget, "Blob", Value::Binary(vec![0xde, 0xad, 0xbe, 0xef]))
        .unwrap();

    g.rebuild_inverses();
    (g, widget)
}

/// A widget with two parts referenced nowhere else.
pub fn simple_widget(catalog: Arc<Catalog>) -> (Graph, EntityId) {
    let mut g = Graph::new(catalog);
    let widget = g.create("Widget").unwrap();
    g.set_field(widget, "Name", "W1").unwrap();
    for code in ["P1", "P2"] {
        let part = g.create("Part").unwrap();
        g.set_field(part, "Code", code).unwrap();
        g.add_field(widget, "Parts", part).unwrap();
    }
    (g, widget)
}
