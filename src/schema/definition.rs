//! TOML schema definition files.
//!
//! ```toml
//! schema = "WIDGET_SCHEMA_2_1"
//! root = "Widget"
//!
//! [[defined]]
//! name = "Label"
//! primitive = "string"
//!
//! [[enumerations]]
//! name = "Color"
//! variants = [{ name = "Red" }, { name = "Blue", alias = "azure" }]
//!
//! [[entities]]
//! name = "Widget"
//! identity = ["GlobalId"]
//! fields = [
//!     { order = 0, name = "Name", type = "string", required = true },
//!     { order = 1, name = "Parts", type = "Part", cardinality = "list" },
//! ]
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use super::builder::{CatalogBuilder, DefinedDef, EntityDef, EnumDef};
use super::Catalog;
use crate::error::DocGraphError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaDefinitionFile {
    pub schema: String,
    pub root: String,
    #[serde(default)]
    pub defined: Vec<DefinedDef>,
    #[serde(default)]
    pub enumerations: Vec<EnumDef>,
    #[serde(default)]
    pub entities: Vec<EntityDef>,
}

impl SchemaDefinitionFile {
    pub fn from_toml_str(content: &str) -> Result<Self, DocGraphError> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_path(path: &Path) -> Result<Self, DocGraphError> {
        tracing::debug!("[SchemaDefinitionFile] Reading schema from {:?}", path);
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn into_builder(self) -> CatalogBuilder {
        let mut builder = CatalogBuilder::new(self.schema).root(self.root);
        for defined in self.defined {
            builder = builder.defined(defined.name, defined.primitive);
        }
        for enumeration in self.enumerations {
            builder = builder.enumeration(enumeration);
        }
        for entity in self.entities {
            builder = builder.entity(entity);
        }
        builder
    }

    pub fn build(self) -> Result<Catalog, DocGraphError> {
        self.into_builder().build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Cardinality, FolderHint, Primitive, Target, XmlPlacement};

    const DEFINITION: &str = r#"
schema = "SHOP_1_0"
root = "Shop"

[[defined]]
name = "Label"
primitive = "string"

[[enumerations]]
name = "Size"
variants = [{ name = "Small" }, { name = "Large", alias = "XL" }]

[[entities]]
name = "Shop"
identity = ["Name"]
fields = [
    { order = 0, name = "Name", type = "string", required = true },
    { order = 1, name = "Items", type = "Item", cardinality = "list", folder = { nested = { bucketed = true } } },
    { order = 2, name = "Blurb", type = "string", cardinality = "optional", xml = "element", folder = { sidecar = { extension = "md" } } },
]

[[entities]]
name = "Item"
folder_key = "Sku"
fields = [
    { order = 0, name = "Sku", type = "string" },
    { order = 1, name = "Size", type = "Size", cardinality = "optional" },
]
inverses = [{ name = "Shop", target = "Shop", forward = "Items", cardinality = "optional" }]
"#;

    #[test]
    fn test_definition_builds_catalog() {
        let catalog = SchemaDefinitionFile::from_toml_str(DEFINITION)
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(catalog.schema_identifier(), "SHOP_1_0");
        let shop = catalog.root_type();
        assert_eq!(catalog.type_name(shop), "Shop");

        let items = catalog.field(catalog.field_by_name(shop, "Items").unwrap());
        assert_eq!(items.cardinality(), Cardinality::List);
        assert_eq!(
            items.folder_hint(),
            &FolderHint::Nested {
                bucketed: true,
                leaf: false
            }
        );
        let blurb = catalog.field(catalog.field_by_name(shop, "Blurb").unwrap());
        assert_eq!(blurb.xml_placement(), XmlPlacement::Element);
        assert_eq!(blurb.target(), Target::Primitive(Primitive::String));

        let item = catalog.describe_type("Item").unwrap();
        assert!(item.folder_key().is_some());
        let inverse = catalog.field_by_name(item.id(), "Shop").unwrap();
        assert!(catalog.field(inverse).is_inverse());

        let size = catalog.describe_type("Size").unwrap();
        assert_eq!(size.variants()[1].xml_text(), "XL");
        assert_eq!(size.variants()[0].xml_text(), "small");
    }

    #[test]
    fn test_definition_rejects_bad_toml() {
        let result = SchemaDefinitionFile::from_toml_str("schema = 3");
        assert!(matches!(result, Err(DocGraphError::Config(_))));
    }
}
