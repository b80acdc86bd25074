//! Vocabulary shared by schema definitions and the resolved catalog.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::TypeId;

/// Built-in value kinds a field may hold directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Primitive {
    Boolean,
    /// Three-valued boolean (`true`, `false`, `unknown`).
    Logical,
    Integer,
    Real,
    String,
    Binary,
    Guid,
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Primitive::Boolean => "BOOLEAN",
            Primitive::Logical => "LOGICAL",
            Primitive::Integer => "INTEGER",
            Primitive::Real => "REAL",
            Primitive::String => "STRING",
            Primitive::Binary => "BINARY",
            Primitive::Guid => "GUID",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
    #[default]
    Scalar,
    Optional,
    List,
    /// Unordered collection; adding an element already present is a no-op.
    Set,
}

impl Cardinality {
    pub fn is_collection(self) -> bool {
        matches!(self, Cardinality::List | Cardinality::Set)
    }
}

/// Field type as written in a schema definition, before names are resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldType {
    Primitive(Primitive),
    /// An entity, enumeration or defined type declared in the same schema.
    Named(String),
}

impl FieldType {
    pub fn named(name: impl Into<String>) -> Self {
        FieldType::Named(name.into())
    }
}

impl From<Primitive> for FieldType {
    fn from(primitive: Primitive) -> Self {
        FieldType::Primitive(primitive)
    }
}

impl From<&str> for FieldType {
    fn from(name: &str) -> Self {
        FieldType::Named(name.to_string())
    }
}

/// Resolved element type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    Primitive(Primitive),
    Entity(TypeId),
    Enum(TypeId),
    Defined(TypeId),
}

impl Target {
    pub fn is_entity(self) -> bool {
        matches!(self, Target::Entity(_))
    }

    /// Values of this target are written inline as text (attribute or element content).
    pub fn is_value(self) -> bool {
        !self.is_entity()
    }
}

/// Placement of a field in the XML encoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum XmlPlacement {
    /// Attribute for values, double-tag element for entities.
    #[default]
    Default,
    /// Never written.
    Hidden,
    /// `name="value"`; for an entity, the field element carries the entity's content.
    Attribute,
    /// `<name>value</name>` or `<name><Type>...</Type></name>`.
    Element,
    /// Text content of the owning element.
    Content,
}

/// How the folder serializer treats a field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FolderHint {
    #[default]
    None,
    /// Explode an entity collection into one directory per element.
    Nested {
        /// Group elements into single-letter directories keyed by their folder key.
        #[serde(default)]
        bucketed: bool,
        /// Write each element as `<key>.xml` instead of a `<key>/<Type>.xml` folder.
        #[serde(default)]
        leaf: bool,
    },
    /// Write a text-valued field into `<field>.<extension>` next to the owner's file.
    Sidecar { extension: String },
}
