//! The resolved, immutable type and field catalog.

use std::collections::HashMap;

use super::{
    types::{Cardinality, FolderHint, Primitive, Target, XmlPlacement},
    FieldId, TypeId,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumVariant {
    pub name: String,
    pub alias: Option<String>,
}

impl EnumVariant {
    /// XML spelling: the declared alias, else the lower-cased name.
    pub fn xml_text(&self) -> String {
        self.alias
            .clone()
            .unwrap_or_else(|| self.name.to_lowercase())
    }

    pub fn matches(&self, text: &str) -> bool {
        self.name.eq_ignore_ascii_case(text)
            || self
                .alias
                .as_deref()
                .is_some_and(|alias| alias.eq_ignore_ascii_case(text))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeKind {
    Entity { is_abstract: bool },
    Enumeration { variants: Vec<EnumVariant> },
    Defined { primitive: Primitive },
}

#[derive(Debug, Clone)]
pub struct TypeDescriptor {
    pub(crate) id: TypeId,
    pub(crate) name: String,
    pub(crate) kind: TypeKind,
    pub(crate) base: Option<TypeId>,
    pub(crate) ordered: Vec<Option<FieldId>>,
    pub(crate) inverses: Vec<FieldId>,
    pub(crate) identity: Vec<FieldId>,
    pub(crate) folder_key: Option<FieldId>,
}

impl TypeDescriptor {
    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &TypeKind {
        &self.kind
    }

    pub fn base(&self) -> Option<TypeId> {
        self.base
    }

    pub fn is_entity(&self) -> bool {
        matches!(self.kind, TypeKind::Entity { .. })
    }

    pub fn is_abstract(&self) -> bool {
        matches!(self.kind, TypeKind::Entity { is_abstract: true })
    }

    pub fn variants(&self) -> &[EnumVariant] {
        match &self.kind {
            TypeKind::Enumeration { variants } => variants,
            _ => &[],
        }
    }

    pub fn defined_primitive(&self) -> Option<Primitive> {
        match self.kind {
            TypeKind::Defined { primitive } => Some(primitive),
            _ => None,
        }
    }

    /// Fields whose joined values form this type's unique-id reference.
    pub fn identity_fields(&self) -> &[FieldId] {
        &self.identity
    }

    pub fn folder_key(&self) -> Option<FieldId> {
        self.folder_key
    }
}

#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    pub(crate) id: FieldId,
    pub(crate) name: String,
    pub(crate) declaring: TypeId,
    pub(crate) order: Option<usize>,
    pub(crate) target: Target,
    pub(crate) cardinality: Cardinality,
    pub(crate) required: bool,
    pub(crate) xml: XmlPlacement,
    pub(crate) tagless: bool,
    pub(crate) element_name: Option<String>,
    pub(crate) folder: FolderHint,
    /// For inverse fields, the forward field they mirror.
    pub(crate) forward: Option<FieldId>,
}

impl FieldDescriptor {
    pub fn id(&self) -> FieldId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn declaring_type(&self) -> TypeId {
        self.declaring
    }

    /// Declared order index; `None` for inverse fields.
    pub fn order(&self) -> Option<usize> {
        self.order
    }

    pub fn target(&self) -> Target {
        self.target
    }

    pub fn cardinality(&self) -> Cardinality {
        self.cardinality
    }

    pub fn is_collection(&self) -> bool {
        self.cardinality.is_collection()
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn xml_placement(&self) -> XmlPlacement {
        self.xml
    }

    pub fn is_tagless(&self) -> bool {
        self.tagless
    }

    /// Name used for the XML attribute or element of this field.
    pub fn xml_name(&self) -> &str {
        self.element_name.as_deref().unwrap_or(&self.name)
    }

    pub fn folder_hint(&self) -> &FolderHint {
        &self.folder
    }

    pub fn is_inverse(&self) -> bool {
        self.order.is_none()
    }

    pub fn forward_field(&self) -> Option<FieldId> {
        self.forward
    }
}

/// Process-wide description of one schema. Immutable once built.
#[derive(Debug, Clone)]
pub struct Catalog {
    pub(crate) schema_identifier: String,
    pub(crate) root: TypeId,
    pub(crate) types: Vec<TypeDescriptor>,
    pub(crate) fields: Vec<FieldDescriptor>,
    pub(crate) by_name: HashMap<String, TypeId>,
    pub(crate) inverse_map: HashMap<FieldId, Vec<FieldId>>,
}

impl Catalog {
    pub fn schema_identifier(&self) -> &str {
        &self.schema_identifier
    }

    pub fn root_type(&self) -> TypeId {
        self.root
    }

    /// Case-insensitive lookup by type name.
    pub fn describe_type(&self, name: &str) -> Option<&TypeDescriptor> {
        self.by_name
            .get(&name.to_uppercase())
            .map(|id| &self.types[id.index()])
    }

    pub fn type_by_id(&self, id: TypeId) -> &TypeDescriptor {
        &self.types[id.index()]
    }

    pub fn type_name(&self, id: TypeId) -> &str {
        &self.types[id.index()].name
    }

    pub fn field(&self, id: FieldId) -> &FieldDescriptor {
        &self.fields[id.index()]
    }

    /// Forward fields root-to-leaf; `None` marks a slot hidden by a derived type's override.
    pub fn ordered_fields(&self, ty: TypeId) -> &[Option<FieldId>] {
        &self.types[ty.index()].ordered
    }

    /// Visible forward fields, in order.
    pub fn forward_fields(&self, ty: TypeId) -> impl Iterator<Item = FieldId> + '_ {
        self.ordered_fields(ty).iter().flatten().copied()
    }

    pub fn inverse_fields(&self, ty: TypeId) -> &[FieldId] {
        &self.types[ty.index()].inverses
    }

    /// Visible forward fields followed by inverse fields.
    pub fn all_fields(&self, ty: TypeId) -> Vec<FieldId> {
        self.forward_fields(ty)
            .chain(self.inverse_fields(ty).iter().copied())
            .collect()
    }

    /// A visible forward field, else an inverse field, matched by name or XML name. Exact
    /// matches win over case-insensitive ones.
    pub fn field_by_name(&self, ty: TypeId, name: &str) -> Option<FieldId> {
        let candidates = self.all_fields(ty);
        candidates
            .iter()
            .copied()
            .find(|f| {
                let field = self.field(*f);
                field.name == name || field.xml_name() == name
            })
            .or_else(|| {
                candidates.iter().copied().find(|f| {
                    let field = self.field(*f);
                    field.name.eq_ignore_ascii_case(name)
                        || field.xml_name().eq_ignore_ascii_case(name)
                })
            })
    }

    /// The inverse field that mirrors `field` on instances of `concrete`, if any.
    pub fn inverse_of(&self, field: FieldId, concrete: TypeId) -> Option<FieldId> {
        self.inverse_map.get(&field).and_then(|inverses| {
            inverses
                .iter()
                .copied()
                .find(|inverse| self.is_subtype_of(concrete, self.field(*inverse).declaring))
        })
    }

    pub fn is_subtype_of(&self, sub: TypeId, sup: TypeId) -> bool {
        let mut cursor = Some(sub);
        while let Some(current) = cursor {
            if current == sup {
                return true;
            }
            cursor = self.types[current.index()].base;
        }
        false
    }

    /// The field written as element text, if the type has one.
    pub fn text_field(&self, ty: TypeId) -> Option<FieldId> {
        self.forward_fields(ty)
            .find(|f| self.field(*f).xml == XmlPlacement::Content)
    }

    pub fn types(&self) -> impl Iterator<Item = &TypeDescriptor> {
        self.types.iter()
    }

    /// Concrete entity types that are `ty` or derive from it.
    pub fn concrete_subtypes(&self, ty: TypeId) -> Vec<TypeId> {
        self.types
            .iter()
            .filter(|t| t.is_entity() && !t.is_abstract() && self.is_subtype_of(t.id, ty))
            .map(|t| t.id)
            .collect()
    }
}
