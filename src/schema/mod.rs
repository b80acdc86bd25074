//! Schema descriptors: the type and field catalog every serializer is driven by.
//!
//! A [`Catalog`] is produced once per schema by [`CatalogBuilder`] (from code or from a TOML
//! [`SchemaDefinitionFile`]) and is read-only afterwards. It answers three questions for the
//! codecs:
//!
//! - which type a textual name refers to ([`Catalog::describe_type`]),
//! - in which order an entity's persisted fields are written ([`Catalog::ordered_fields`]),
//! - which back-reference mirrors a forward field ([`Catalog::inverse_of`]).
//!
//! Process-wide sharing goes through [`SCHEMAS`].

pub mod builder;
pub mod catalog;
pub mod definition;
pub mod overlay;
pub mod registry;
pub mod types;

pub use builder::{
    CatalogBuilder, DefinedDef, EntityDef, EnumDef, EnumVariantDef, FieldDef, InverseDef,
};
pub use catalog::{Catalog, EnumVariant, FieldDescriptor, TypeDescriptor, TypeKind};
pub use definition::SchemaDefinitionFile;
pub use overlay::{AttributeOverlay, EntityOverlay, SchemaOverlay};
pub use registry::{SchemaRegistry, SCHEMAS};
pub use types::{Cardinality, FieldType, FolderHint, Primitive, Target, XmlPlacement};

/// Handle of a type within one [`Catalog`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub(crate) u32);

impl TypeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Handle of a field within one [`Catalog`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldId(pub(crate) u32);

impl FieldId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}
