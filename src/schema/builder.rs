//! Declarative schema definitions and their validation into a [`Catalog`].
//!
//! A schema is a list of entity, enumeration and defined (single-value) types. Field types may
//! name types declared later in the same builder; names are resolved in [`CatalogBuilder::build`],
//! which is also where every structural rule is checked. A schema that fails validation is a
//! programmer error and is reported as [`DocGraphError::Schema`].

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use super::{
    catalog::{Catalog, EnumVariant, FieldDescriptor, TypeDescriptor, TypeKind},
    types::{Cardinality, FieldType, FolderHint, Primitive, Target, XmlPlacement},
    FieldId, TypeId,
};
use crate::error::DocGraphError;

/// A persisted (forward) field declared on an entity type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    /// Position among the fields declared by the same type; must form `0..N-1`.
    pub order: usize,
    pub name: String,
    #[serde(rename = "type")]
    pub ty: FieldType,
    #[serde(default)]
    pub cardinality: Cardinality,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub xml: XmlPlacement,
    /// Collection items (or a scalar entity) are written without a wrapping field element.
    #[serde(default)]
    pub tagless: bool,
    /// XML element/attribute name when it differs from `name`.
    #[serde(default)]
    pub element_name: Option<String>,
    #[serde(default)]
    pub folder: FolderHint,
}

impl FieldDef {
    pub fn new(order: usize, name: impl Into<String>, ty: impl Into<FieldType>) -> Self {
        FieldDef {
            order,
            name: name.into(),
            ty: ty.into(),
            cardinality: Cardinality::Scalar,
            required: false,
            xml: XmlPlacement::Default,
            tagless: false,
            element_name: None,
            folder: FolderHint::None,
        }
    }

    pub fn optional(mut self) -> Self {
        self.cardinality = Cardinality::Optional;
        self
    }

    pub fn list(mut self) -> Self {
        self.cardinality = Cardinality::List;
        self
    }

    pub fn set(mut self) -> Self {
        self.cardinality = Cardinality::Set;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn xml(mut self, placement: XmlPlacement) -> Self {
        self.xml = placement;
        self
    }

    pub fn tagless(mut self) -> Self {
        self.tagless = true;
        self
    }

    pub fn element_name(mut self, name: impl Into<String>) -> Self {
        self.element_name = Some(name.into());
        self
    }

    pub fn folder(mut self, hint: FolderHint) -> Self {
        self.folder = hint;
        self
    }
}

/// A computed back-reference. `forward` names the field on `target` (or one of its supertypes)
/// whose values point at the declaring type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InverseDef {
    pub name: String,
    pub target: String,
    pub forward: String,
    #[serde(default = "InverseDef::default_cardinality")]
    pub cardinality: Cardinality,
    #[serde(default)]
    pub xml: XmlPlacement,
}

impl InverseDef {
    pub fn new(
        name: impl Into<String>,
        target: impl Into<String>,
        forward: impl Into<String>,
    ) -> Self {
        InverseDef {
            name: name.into(),
            target: target.into(),
            forward: forward.into(),
            cardinality: Self::default_cardinality(),
            xml: XmlPlacement::Default,
        }
    }

    fn default_cardinality() -> Cardinality {
        Cardinality::Set
    }

    pub fn scalar(mut self) -> Self {
        self.cardinality = Cardinality::Optional;
        self
    }

    pub fn list(mut self) -> Self {
        self.cardinality = Cardinality::List;
        self
    }

    pub fn xml(mut self, placement: XmlPlacement) -> Self {
        self.xml = placement;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDef {
    pub name: String,
    #[serde(default)]
    pub base: Option<String>,
    #[serde(default, rename = "abstract")]
    pub is_abstract: bool,
    #[serde(default)]
    pub fields: Vec<FieldDef>,
    #[serde(default)]
    pub inverses: Vec<InverseDef>,
    /// Fields whose values form the unique-id reference. Inherited when absent.
    #[serde(default)]
    pub identity: Option<Vec<String>>,
    /// Field naming the folder or file of an instance. Inherited when absent.
    #[serde(default)]
    pub folder_key: Option<String>,
}

impl EntityDef {
    pub fn new(name: impl Into<String>) -> Self {
        EntityDef {
            name: name.into(),
            base: None,
            is_abstract: false,
            fields: Vec::new(),
            inverses: Vec::new(),
            identity: None,
            folder_key: None,
        }
    }

    pub fn base(mut self, name: impl Into<String>) -> Self {
        self.base = Some(name.into());
        self
    }

    pub fn abstract_type(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    pub fn inverse(mut self, inverse: InverseDef) -> Self {
        self.inverses.push(inverse);
        self
    }

    pub fn identity<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.identity = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn folder_key(mut self, field: impl Into<String>) -> Self {
        self.folder_key = Some(field.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumVariantDef {
    pub name: String,
    #[serde(default)]
    pub alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumDef {
    pub name: String,
    #[serde(default)]
    pub variants: Vec<EnumVariantDef>,
}

impl EnumDef {
    pub fn new(name: impl Into<String>) -> Self {
        EnumDef {
            name: name.into(),
            variants: Vec::new(),
        }
    }

    pub fn variant(mut self, name: impl Into<String>) -> Self {
        self.variants.push(EnumVariantDef {
            name: name.into(),
            alias: None,
        });
        self
    }

    pub fn variant_with_alias(mut self, name: impl Into<String>, alias: impl Into<String>) -> Self {
        self.variants.push(EnumVariantDef {
            name: name.into(),
            alias: Some(alias.into()),
        });
        self
    }
}

/// A value type with a single `Value` member of a primitive kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefinedDef {
    pub name: String,
    pub primitive: Primitive,
}

#[derive(Debug, Clone)]
enum TypeDef {
    Entity(EntityDef),
    Enumeration(EnumDef),
    Defined(DefinedDef),
}

impl TypeDef {
    fn name(&self) -> &str {
        match self {
            TypeDef::Entity(def) => &def.name,
            TypeDef::Enumeration(def) => &def.name,
            TypeDef::Defined(def) => &def.name,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CatalogBuilder {
    schema_identifier: String,
    root: Option<String>,
    defs: Vec<TypeDef>,
}

impl CatalogBuilder {
    pub fn new(schema_identifier: impl Into<String>) -> Self {
        CatalogBuilder {
            schema_identifier: schema_identifier.into(),
            root: None,
            defs: Vec::new(),
        }
    }

    /// The entity type written at the top of every document.
    pub fn root(mut self, name: impl Into<String>) -> Self {
        self.root = Some(name.into());
        self
    }

    pub fn entity(mut self, def: EntityDef) -> Self {
        self.defs.push(TypeDef::Entity(def));
        self
    }

    pub fn enumeration(mut self, def: EnumDef) -> Self {
        self.defs.push(TypeDef::Enumeration(def));
        self
    }

    pub fn defined(mut self, name: impl Into<String>, primitive: Primitive) -> Self {
        self.defs.push(TypeDef::Defined(DefinedDef {
            name: name.into(),
            primitive,
        }));
        self
    }

    pub fn build(self) -> Result<Catalog, DocGraphError> {
        let CatalogBuilder {
            schema_identifier,
            root,
            defs,
        } = self;

        let mut by_name: HashMap<String, TypeId> = HashMap::new();
        for (idx, def) in defs.iter().enumerate() {
            let key = def.name().to_uppercase();
            if by_name.insert(key, TypeId(idx as u32)).is_some() {
                return Err(DocGraphError::Schema(format!(
                    "type '{}' is declared more than once",
                    def.name()
                )));
            }
        }

        let lookup = |name: &str| -> Result<TypeId, DocGraphError> {
            by_name
                .get(&name.to_uppercase())
                .copied()
                .ok_or_else(|| DocGraphError::Schema(format!("unknown type '{name}'")))
        };

        // Kinds and bases first; fields need the full kind table to resolve targets.
        let mut types: Vec<TypeDescriptor> = Vec::with_capacity(defs.len());
        for (idx, def) in defs.iter().enumerate() {
            let (kind, base) = match def {
                TypeDef::Entity(entity) => {
                    let base = entity.base.as_deref().map(lookup).transpose()?;
                    (
                        TypeKind::Entity {
                            is_abstract: entity.is_abstract,
                        },
                        base,
                    )
                }
                TypeDef::Enumeration(enumeration) => (
                    TypeKind::Enumeration {
                        variants: enumeration
                            .variants
                            .iter()
                            .map(|v| EnumVariant {
                                name: v.name.clone(),
                                alias: v.alias.clone(),
                            })
                            .collect(),
                    },
                    None,
                ),
                TypeDef::Defined(defined) => (
                    TypeKind::Defined {
                        primitive: defined.primitive,
                    },
                    None,
                ),
            };
            types.push(TypeDescriptor {
                id: TypeId(idx as u32),
                name: def.name().to_string(),
                kind,
                base,
                ordered: Vec::new(),
                inverses: Vec::new(),
                identity: Vec::new(),
                folder_key: None,
            });
        }

        for ty in types.iter() {
            if let Some(base) = ty.base {
                if !types[base.index()].is_entity() {
                    return Err(DocGraphError::Schema(format!(
                        "'{}' derives from '{}', which is not an entity type",
                        ty.name, types[base.index()].name
                    )));
                }
            }
        }

        // Depth of each entity in its inheritance chain; a chain longer than the type count is a
        // cycle.
        let mut depths = vec![0usize; types.len()];
        for ty in types.iter() {
            let mut depth = 0;
            let mut cursor = ty.base;
            while let Some(base) = cursor {
                depth += 1;
                if depth > types.len() {
                    return Err(DocGraphError::Schema(format!(
                        "inheritance cycle through '{}'",
                        ty.name
                    )));
                }
                cursor = types[base.index()].base;
            }
            depths[ty.id.index()] = depth;
        }
        let mut build_order: Vec<usize> = (0..types.len()).collect();
        build_order.sort_by_key(|idx| (depths[*idx], *idx));

        let resolve_target = |ty: &FieldType| -> Result<Target, DocGraphError> {
            match ty {
                FieldType::Primitive(primitive) => Ok(Target::Primitive(*primitive)),
                FieldType::Named(name) => {
                    let id = lookup(name)?;
                    Ok(match types[id.index()].kind {
                        TypeKind::Entity { .. } => Target::Entity(id),
                        TypeKind::Enumeration { .. } => Target::Enum(id),
                        TypeKind::Defined { .. } => Target::Defined(id),
                    })
                }
            }
        };

        let mut fields: Vec<FieldDescriptor> = Vec::new();
        // (inverse field, target type, forward field name)
        let mut pending_inverses: Vec<(FieldId, TypeId, String)> = Vec::new();
        let mut resolved: Vec<(Vec<Option<FieldId>>, Vec<FieldId>)> =
            vec![(Vec::new(), Vec::new()); types.len()];

        for idx in build_order.iter().copied() {
            let TypeDef::Entity(entity) = &defs[idx] else {
                continue;
            };
            let type_id = TypeId(idx as u32);

            let mut own: Vec<&FieldDef> = entity.fields.iter().collect();
            own.sort_by_key(|f| f.order);
            let mut seen_orders = BTreeSet::new();
            let mut seen_names = BTreeSet::new();
            for field in own.iter() {
                if !seen_orders.insert(field.order) {
                    return Err(DocGraphError::Schema(format!(
                        "order index {} is used twice on '{}'",
                        field.order, entity.name
                    )));
                }
                if !seen_names.insert(field.name.as_str()) {
                    return Err(DocGraphError::Schema(format!(
                        "field '{}' is declared twice on '{}'",
                        field.name, entity.name
                    )));
                }
            }
            if let Some((gap, _)) = seen_orders
                .iter()
                .enumerate()
                .find(|(expected, order)| expected != *order)
            {
                return Err(DocGraphError::Schema(format!(
                    "order index {} is missing on '{}'",
                    gap, entity.name
                )));
            }

            let (mut ordered, mut inverses) = match types[idx].base {
                Some(base) => resolved[base.index()].clone(),
                None => (Vec::new(), Vec::new()),
            };

            for field in own {
                // Redeclaring an inherited name hides the inherited slot; its position is kept.
                for slot in ordered.iter_mut() {
                    if let Some(existing) = slot {
                        if fields[existing.index()].name == field.name {
                            *slot = None;
                        }
                    }
                }
                let id = FieldId(fields.len() as u32);
                fields.push(FieldDescriptor {
                    id,
                    name: field.name.clone(),
                    declaring: type_id,
                    order: Some(field.order),
                    target: resolve_target(&field.ty)?,
                    cardinality: field.cardinality,
                    required: field.required,
                    xml: field.xml,
                    tagless: field.tagless,
                    element_name: field.element_name.clone(),
                    folder: field.folder.clone(),
                    forward: None,
                });
                ordered.push(Some(id));
            }

            for inverse in entity.inverses.iter() {
                let target = resolve_target(&FieldType::named(inverse.target.clone()))?;
                let Target::Entity(target_type) = target else {
                    return Err(DocGraphError::Schema(format!(
                        "inverse '{}.{}' must target an entity type",
                        entity.name, inverse.name
                    )));
                };
                inverses.retain(|f: &FieldId| fields[f.index()].name != inverse.name);
                let id = FieldId(fields.len() as u32);
                fields.push(FieldDescriptor {
                    id,
                    name: inverse.name.clone(),
                    declaring: type_id,
                    order: None,
                    target,
                    cardinality: inverse.cardinality,
                    required: false,
                    xml: inverse.xml,
                    tagless: false,
                    element_name: None,
                    folder: FolderHint::None,
                    forward: None,
                });
                inverses.push(id);
                pending_inverses.push((id, target_type, inverse.forward.clone()));
            }

            resolved[idx] = (ordered, inverses);
        }

        for (idx, (ordered, inverses)) in resolved.into_iter().enumerate() {
            types[idx].ordered = ordered;
            types[idx].inverses = inverses;
        }

        let mut catalog = Catalog {
            schema_identifier,
            root: TypeId(0),
            types,
            fields,
            by_name,
            inverse_map: HashMap::new(),
        };

        for (inverse, target_type, forward_name) in pending_inverses {
            let declaring = catalog.field(inverse).declaring;
            let forward = catalog
                .ordered_fields(target_type)
                .iter()
                .flatten()
                .copied()
                .find(|f| catalog.field(*f).name == forward_name)
                .ok_or_else(|| {
                    DocGraphError::Schema(format!(
                        "inverse '{}.{}' names '{}.{}', which is not a forward field",
                        catalog.type_by_id(declaring).name,
                        catalog.field(inverse).name,
                        catalog.type_by_id(target_type).name,
                        forward_name
                    ))
                })?;
            let Target::Entity(pointee) = catalog.field(forward).target else {
                return Err(DocGraphError::Schema(format!(
                    "forward field '{}' of inverse '{}' does not reference entities",
                    forward_name,
                    catalog.field(inverse).name
                )));
            };
            if !catalog.is_subtype_of(declaring, pointee) && !catalog.is_subtype_of(pointee, declaring)
            {
                return Err(DocGraphError::Schema(format!(
                    "forward field '{}' cannot point at '{}'",
                    forward_name,
                    catalog.type_by_id(declaring).name
                )));
            }
            catalog.fields[inverse.index()].forward = Some(forward);
            catalog.inverse_map.entry(forward).or_default().push(inverse);
        }

        // Identity rules and folder keys are inherited by name so that overrides apply.
        for idx in 0..catalog.types.len() {
            if !catalog.types[idx].is_entity() {
                continue;
            }
            let type_id = TypeId(idx as u32);
            let mut identity_names = None;
            let mut folder_key_name = None;
            let mut cursor = Some(type_id);
            while let Some(current) = cursor {
                if let TypeDef::Entity(def) = &defs[current.index()] {
                    if identity_names.is_none() {
                        identity_names = def.identity.clone();
                    }
                    if folder_key_name.is_none() {
                        folder_key_name = def.folder_key.clone();
                    }
                }
                cursor = catalog.types[current.index()].base;
            }

            let find_forward = |name: &str| -> Result<FieldId, DocGraphError> {
                catalog
                    .ordered_fields(type_id)
                    .iter()
                    .flatten()
                    .copied()
                    .find(|f| catalog.field(*f).name == name)
                    .ok_or_else(|| {
                        DocGraphError::Schema(format!(
                            "'{}' has no field '{}' for its identity or folder key",
                            catalog.types[idx].name, name
                        ))
                    })
            };
            let identity = identity_names
                .unwrap_or_default()
                .iter()
                .map(|name| find_forward(name.as_str()))
                .collect::<Result<Vec<_>, _>>()?;
            let folder_key = folder_key_name.as_deref().map(find_forward).transpose()?;
            catalog.types[idx].identity = identity;
            catalog.types[idx].folder_key = folder_key;
        }

        let root_name =
            root.ok_or_else(|| DocGraphError::Schema("no root type declared".to_string()))?;
        let root_id = lookup_in(&catalog, &root_name)?;
        if !catalog.type_by_id(root_id).is_entity() {
            return Err(DocGraphError::Schema(format!(
                "root type '{root_name}' is not an entity type"
            )));
        }
        catalog.root = root_id;

        tracing::debug!(
            "[CatalogBuilder::build] schema '{}': {} types, {} fields",
            catalog.schema_identifier,
            catalog.types.len(),
            catalog.fields.len()
        );
        Ok(catalog)
    }
}

fn lookup_in(catalog: &Catalog, name: &str) -> Result<TypeId, DocGraphError> {
    catalog
        .describe_type(name)
        .map(|t| t.id())
        .ok_or_else(|| DocGraphError::Schema(format!("unknown type '{name}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> CatalogBuilder {
        CatalogBuilder::new("TEST_1_0").root("Doc").entity(
            EntityDef::new("Doc").field(FieldDef::new(0, "Name", Primitive::String)),
        )
    }

    #[test]
    fn test_order_collision_is_schema_error() {
        let result = minimal()
            .entity(
                EntityDef::new("Bad")
                    .field(FieldDef::new(0, "A", Primitive::String))
                    .field(FieldDef::new(0, "B", Primitive::String)),
            )
            .build();
        assert!(matches!(result, Err(DocGraphError::Schema(msg)) if msg.contains("used twice")));
    }

    #[test]
    fn test_order_gap_is_schema_error() {
        let result = minimal()
            .entity(
                EntityDef::new("Bad")
                    .field(FieldDef::new(0, "A", Primitive::String))
                    .field(FieldDef::new(2, "B", Primitive::String)),
            )
            .build();
        assert!(matches!(result, Err(DocGraphError::Schema(msg)) if msg.contains("missing")));
    }

    #[test]
    fn test_unknown_field_type() {
        let result = minimal()
            .entity(EntityDef::new("Bad").field(FieldDef::new(0, "A", "Nowhere")))
            .build();
        assert!(matches!(result, Err(DocGraphError::Schema(_))));
    }

    #[test]
    fn test_inheritance_cycle() {
        let result = minimal()
            .entity(EntityDef::new("A").base("B"))
            .entity(EntityDef::new("B").base("A"))
            .build();
        assert!(matches!(result, Err(DocGraphError::Schema(msg)) if msg.contains("cycle")));
    }

    #[test]
    fn test_unresolved_inverse() {
        let result = minimal()
            .entity(EntityDef::new("Part").inverse(InverseDef::new("Owner", "Doc", "Parts")))
            .build();
        assert!(matches!(result, Err(DocGraphError::Schema(msg)) if msg.contains("not a forward field")));
    }

    #[test]
    fn test_missing_root() {
        let result = CatalogBuilder::new("X")
            .entity(EntityDef::new("Doc"))
            .build();
        assert!(matches!(result, Err(DocGraphError::Schema(_))));
    }

    #[test]
    fn test_empty_entity_is_valid() {
        let catalog = minimal().entity(EntityDef::new("Empty")).build().unwrap();
        let empty = catalog.describe_type("EMPTY").unwrap();
        assert!(catalog.ordered_fields(empty.id()).is_empty());
    }

    #[test]
    fn test_hidden_slot_keeps_position() {
        let catalog = minimal()
            .entity(
                EntityDef::new("Base")
                    .field(FieldDef::new(0, "x", Primitive::String))
                    .field(FieldDef::new(1, "y", Primitive::Integer)),
            )
            .entity(
                EntityDef::new("Derived")
                    .base("Base")
                    .field(FieldDef::new(0, "x", Primitive::Integer)),
            )
            .build()
            .unwrap();
        let derived = catalog.describe_type("Derived").unwrap().id();
        let ordered = catalog.ordered_fields(derived);
        assert_eq!(ordered.len(), 3);
        assert!(ordered[0].is_none());
        assert_eq!(catalog.field(ordered[1].unwrap()).name(), "y");
        let x = catalog.field(ordered[2].unwrap());
        assert_eq!(x.name(), "x");
        assert_eq!(x.target(), Target::Primitive(Primitive::Integer));
        assert_eq!(catalog.field_by_name(derived, "x"), ordered[2]);
    }
}
