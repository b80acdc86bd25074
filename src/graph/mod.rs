//! The object graph: an arena of entities addressed by [`EntityId`] handles.
//!
//! Every entity of one load or save lives in a single [`Graph`]; cross references are handles
//! into the same arena, so shared ownership and cycles need no reference counting. The arena is
//! freed as a whole when the graph is dropped.
//!
//! Values are checked against the [`Catalog`] when they are assigned: references must point at
//! an entity of a compatible type and primitives must match the declared kind. Inverse fields
//! are never assigned by readers; [`Graph::rebuild_inverses`] recomputes them from the forward
//! side.

pub mod compare;
mod inverse;
pub mod value;

pub use compare::{diff, isomorphic};
pub use value::{Entity, EntityId, Value};

use std::{collections::HashSet, sync::Arc};

use crate::{
    error::DocGraphError,
    schema::{Cardinality, Catalog, FieldId, Primitive, Target, TypeId, TypeKind},
};

#[derive(Debug, Clone)]
pub struct Graph {
    catalog: Arc<Catalog>,
    entities: Vec<Entity>,
}

impl Graph {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Graph {
            catalog,
            entities: Vec::new(),
        }
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = EntityId> {
        (0..self.entities.len() as u32).map(EntityId)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        id.index() < self.entities.len()
    }

    /// Instantiate a concrete entity type by name, with every collection field empty.
    pub fn create(&mut self, type_name: &str) -> Result<EntityId, DocGraphError> {
        let ty = self
            .catalog
            .describe_type(type_name)
            .ok_or_else(|| DocGraphError::Schema(format!("unknown type '{type_name}'")))?
            .id();
        self.create_typed(ty)
    }

    pub fn create_typed(&mut self, ty: TypeId) -> Result<EntityId, DocGraphError> {
        let descriptor = self.catalog.type_by_id(ty);
        match descriptor.kind() {
            TypeKind::Entity { is_abstract: false } => {}
            TypeKind::Entity { is_abstract: true } => {
                return Err(DocGraphError::Schema(format!(
                    "cannot instantiate abstract type '{}'",
                    descriptor.name()
                )))
            }
            _ => {
                return Err(DocGraphError::Schema(format!(
                    "'{}' is not an entity type",
                    descriptor.name()
                )))
            }
        }

        let values = self
            .catalog
            .all_fields(ty)
            .into_iter()
            .filter(|f| self.catalog.field(*f).is_collection())
            .map(|f| (f, Value::List(Vec::new())))
            .collect();
        let id = EntityId(self.entities.len() as u32);
        self.entities.push(Entity {
            type_id: ty,
            values,
        });
        Ok(id)
    }

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(id.index())
    }

    pub fn type_of(&self, id: EntityId) -> Result<TypeId, DocGraphError> {
        self.entity(id)
            .map(|e| e.type_id)
            .ok_or_else(|| DocGraphError::NotFound(format!("entity {id}")))
    }

    pub fn type_name(&self, id: EntityId) -> Result<&str, DocGraphError> {
        Ok(self.catalog.type_name(self.type_of(id)?))
    }

    /// The stored value, `None` when the field was never assigned.
    pub fn get(&self, id: EntityId, field: FieldId) -> Option<&Value> {
        self.entity(id).and_then(|e| e.values.get(&field))
    }

    pub fn get_field(&self, id: EntityId, name: &str) -> Option<&Value> {
        let field = self.field_id(id, name).ok()?;
        self.get(id, field)
    }

    /// Entity handles held by a field.
    pub fn refs(&self, id: EntityId, field: FieldId) -> Vec<EntityId> {
        self.get(id, field).map(Value::refs).unwrap_or_default()
    }

    pub fn field_id(&self, id: EntityId, name: &str) -> Result<FieldId, DocGraphError> {
        let ty = self.type_of(id)?;
        self.catalog.field_by_name(ty, name).ok_or_else(|| {
            DocGraphError::Value(format!(
                "'{}' has no field '{}'",
                self.catalog.type_name(ty),
                name
            ))
        })
    }

    fn check_member(&self, id: EntityId, field: FieldId) -> Result<(), DocGraphError> {
        let ty = self.type_of(id)?;
        if self.catalog.all_fields(ty).contains(&field) {
            Ok(())
        } else {
            Err(DocGraphError::Value(format!(
                "field '{}' is not visible on '{}'",
                self.catalog.field(field).name(),
                self.catalog.type_name(ty)
            )))
        }
    }

    /// Assign a field. Collection fields accept `Value::List` (each element checked) or `Null`.
    pub fn set(&mut self, id: EntityId, field: FieldId, value: Value) -> Result<(), DocGraphError> {
        self.check_member(id, field)?;
        let descriptor = self.catalog.field(field);
        let value = match value {
            Value::Null if descriptor.is_collection() => Value::List(Vec::new()),
            Value::Null => Value::Null,
            Value::List(items) if descriptor.is_collection() => Value::List(
                items
                    .into_iter()
                    .map(|item| self.normalize(descriptor.target(), item))
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            Value::List(_) => {
                return Err(DocGraphError::Value(format!(
                    "cannot assign a list to scalar field '{}'",
                    descriptor.name()
                )))
            }
            other if descriptor.is_collection() => {
                return Err(DocGraphError::Value(format!(
                    "cannot assign {other:?} to collection field '{}'",
                    descriptor.name()
                )))
            }
            other => self.normalize(descriptor.target(), other)?,
        };
        self.store(id, field, value);
        Ok(())
    }

    pub fn set_field(
        &mut self,
        id: EntityId,
        name: &str,
        value: impl Into<Value>,
    ) -> Result<(), DocGraphError> {
        let field = self.field_id(id, name)?;
        self.set(id, field, value.into())
    }

    /// The collection add operation: push for lists, insert-if-absent for sets.
    pub fn add(&mut self, id: EntityId, field: FieldId, item: Value) -> Result<(), DocGraphError> {
        self.check_member(id, field)?;
        let descriptor = self.catalog.field(field);
        if !descriptor.is_collection() {
            return Err(DocGraphError::Value(format!(
                "field '{}' is not a collection",
                descriptor.name()
            )));
        }
        let is_set = descriptor.cardinality() == Cardinality::Set;
        let item = self.normalize(descriptor.target(), item)?;
        let items = self.list_mut(id, field)?;
        if !(is_set && items.contains(&item)) {
            items.push(item);
        }
        Ok(())
    }

    pub fn add_field(
        &mut self,
        id: EntityId,
        name: &str,
        item: impl Into<Value>,
    ) -> Result<(), DocGraphError> {
        let field = self.field_id(id, name)?;
        self.add(id, field, item.into())
    }

    /// Push a `Null` placeholder into a collection and return its index.
    pub(crate) fn reserve_slot(
        &mut self,
        id: EntityId,
        field: FieldId,
    ) -> Result<usize, DocGraphError> {
        self.check_member(id, field)?;
        let items = self.list_mut(id, field)?;
        items.push(Value::Null);
        Ok(items.len() - 1)
    }

    /// Fill a reserved placeholder. A set that already holds the value keeps the placeholder,
    /// which [`Graph::purge_placeholders`] later removes.
    pub(crate) fn fill_slot(
        &mut self,
        id: EntityId,
        field: FieldId,
        slot: usize,
        item: Value,
    ) -> Result<(), DocGraphError> {
        let descriptor = self.catalog.field(field);
        let is_set = descriptor.cardinality() == Cardinality::Set;
        let item = self.normalize(descriptor.target(), item)?;
        let items = self.list_mut(id, field)?;
        if is_set && items.contains(&item) {
            return Ok(());
        }
        match items.get_mut(slot) {
            Some(placeholder) => *placeholder = item,
            None => items.push(item),
        }
        Ok(())
    }

    pub(crate) fn purge_placeholders(&mut self, id: EntityId, field: FieldId) {
        if let Some(Value::List(items)) = self
            .entities
            .get_mut(id.index())
            .and_then(|e| e.values.get_mut(&field))
        {
            items.retain(|item| !item.is_null());
        }
    }

    fn list_mut(&mut self, id: EntityId, field: FieldId) -> Result<&mut Vec<Value>, DocGraphError> {
        let name = self.catalog.field(field).name().to_string();
        let entity = self
            .entities
            .get_mut(id.index())
            .ok_or_else(|| DocGraphError::NotFound(format!("entity {id}")))?;
        let slot = entity
            .values
            .entry(field)
            .or_insert_with(|| Value::List(Vec::new()));
        if slot.is_null() {
            *slot = Value::List(Vec::new());
        }
        match slot {
            Value::List(items) => Ok(items),
            _ => Err(DocGraphError::Value(format!(
                "field '{name}' holds a scalar value"
            ))),
        }
    }

    pub(crate) fn store(&mut self, id: EntityId, field: FieldId, value: Value) {
        if let Some(entity) = self.entities.get_mut(id.index()) {
            entity.values.insert(field, value);
        }
    }

    /// Check `value` against `target`, converting where the encoding is lossless.
    fn normalize(&self, target: Target, value: Value) -> Result<Value, DocGraphError> {
        let mismatch = |value: &Value| {
            DocGraphError::Value(format!("{value:?} does not fit {}", self.describe(target)))
        };
        match (target, value) {
            (_, Value::Null) => Ok(Value::Null),
            (Target::Primitive(primitive), value) => {
                primitive_value(primitive, value).map_err(|v| mismatch(&v))
            }
            (Target::Enum(ty), Value::Enum(text) | Value::String(text)) => self
                .catalog
                .type_by_id(ty)
                .variants()
                .iter()
                .find(|v| v.matches(&text))
                .map(|v| Value::Enum(v.name.clone()))
                .ok_or_else(|| mismatch(&Value::Enum(text))),
            (Target::Defined(ty), Value::Wrapped { type_name, value })
                if self
                    .catalog
                    .describe_type(&type_name)
                    .is_some_and(|t| t.id() == ty) =>
            {
                self.normalize(Target::Defined(ty), *value)
            }
            (Target::Defined(ty), value) => {
                let primitive = self
                    .catalog
                    .type_by_id(ty)
                    .defined_primitive()
                    .ok_or_else(|| mismatch(&value))?;
                primitive_value(primitive, value).map_err(|v| mismatch(&v))
            }
            (Target::Entity(ty), Value::Ref(id)) => {
                let actual = self.type_of(id)?;
                if self.catalog.is_subtype_of(actual, ty) {
                    Ok(Value::Ref(id))
                } else {
                    Err(DocGraphError::Value(format!(
                        "'{}' is not a '{}'",
                        self.catalog.type_name(actual),
                        self.catalog.type_name(ty)
                    )))
                }
            }
            (Target::Entity(_), Value::Wrapped { type_name, value }) => {
                let defined = self
                    .catalog
                    .describe_type(&type_name)
                    .ok_or_else(|| DocGraphError::Value(format!("unknown type '{type_name}'")))?;
                let Some(primitive) = defined.defined_primitive() else {
                    return Err(DocGraphError::Value(format!(
                        "'{type_name}' is not a defined value type"
                    )));
                };
                let inner = primitive_value(primitive, *value).map_err(|v| mismatch(&v))?;
                Ok(Value::wrapped(defined.name(), inner))
            }
            (_, value) => Err(mismatch(&value)),
        }
    }

    fn describe(&self, target: Target) -> String {
        match target {
            Target::Primitive(primitive) => primitive.to_string(),
            Target::Entity(ty) | Target::Enum(ty) | Target::Defined(ty) => {
                self.catalog.type_name(ty).to_string()
            }
        }
    }

    /// Every entity reachable from `root` over forward fields, in first-visit order.
    pub fn reachable(&self, root: EntityId) -> Vec<EntityId> {
        let mut seen = HashSet::new();
        let mut order = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if !self.contains(id) || !seen.insert(id) {
                continue;
            }
            order.push(id);
            let Ok(ty) = self.type_of(id) else { continue };
            let mut children: Vec<EntityId> = self
                .catalog
                .forward_fields(ty)
                .flat_map(|f| self.refs(id, f))
                .collect();
            children.reverse();
            stack.extend(children);
        }
        order
    }

    /// Every reachable entity that is `base` or one of its subtypes.
    pub fn extract_objects(&self, root: EntityId, base: TypeId) -> Vec<EntityId> {
        self.reachable(root)
            .into_iter()
            .filter(|id| {
                self.type_of(*id)
                    .is_ok_and(|ty| self.catalog.is_subtype_of(ty, base))
            })
            .collect()
    }
}

/// Coerce a value into a primitive kind, handing it back unchanged on mismatch.
fn primitive_value(primitive: Primitive, value: Value) -> Result<Value, Value> {
    match (primitive, value) {
        (Primitive::Boolean, Value::Boolean(b)) => Ok(Value::Boolean(b)),
        (Primitive::Logical, Value::Logical(l)) => Ok(Value::Logical(l)),
        (Primitive::Logical, Value::Boolean(b)) => Ok(Value::Logical(Some(b))),
        (Primitive::Integer, Value::Integer(n)) => Ok(Value::Integer(n)),
        (Primitive::Real, Value::Real(n)) => Ok(Value::Real(n)),
        (Primitive::Real, Value::Integer(n)) => Ok(Value::Real(n as f64)),
        (Primitive::String, Value::String(s)) => Ok(Value::String(s)),
        (Primitive::Binary, Value::Binary(b)) => Ok(Value::Binary(b)),
        (Primitive::Guid, Value::Guid(g)) => Ok(Value::Guid(g)),
        (Primitive::Guid, Value::String(s)) => match uuid::Uuid::parse_str(&s) {
            Ok(guid) => Ok(Value::Guid(guid)),
            Err(_) => Err(Value::String(s)),
        },
        (_, other) => Err(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::widget_catalog;

    fn graph() -> Graph {
        Graph::new(Arc::new(widget_catalog()))
    }

    #[test]
    fn test_create_initializes_collections() {
        let mut g = graph();
        let widget = g.create("Widget").unwrap();
        assert_eq!(g.get_field(widget, "Parts"), Some(&Value::List(vec![])));
        assert_eq!(g.get_field(widget, "Name"), None);
    }

    #[test]
    fn test_create_rejects_abstract_and_unknown() {
        let mut g = graph();
        assert!(matches!(g.create("Quantity"), Err(DocGraphError::Schema(_))));
        assert!(matches!(g.create("Color"), Err(DocGraphError::Schema(_))));
        assert!(matches!(g.create("Nope"), Err(DocGraphError::Schema(_))));
    }

    #[test]
    fn test_set_checks_reference_types() {
        let mut g = graph();
        let widget = g.create("Widget").unwrap();
        let other = g.create("Widget").unwrap();
        let gear = g.create("Gear").unwrap();
        g.set_field(widget, "Favorite", gear).unwrap();
        assert!(matches!(
            g.set_field(widget, "Favorite", other),
            Err(DocGraphError::Value(_))
        ));
        assert!(matches!(
            g.set_field(widget, "Name", 3i64),
            Err(DocGraphError::Value(_))
        ));
    }

    #[test]
    fn test_set_add_is_idempotent_for_sets() {
        let mut g = graph();
        let widget = g.create("Widget").unwrap();
        let part = g.create("Part").unwrap();
        let favorite_of = g.field_id(part, "FavoriteOf").unwrap();
        g.add(part, favorite_of, Value::Ref(widget)).unwrap();
        g.add(part, favorite_of, Value::Ref(widget)).unwrap();
        assert_eq!(g.refs(part, favorite_of), vec![widget]);

        // Lists keep duplicates
        g.add_field(widget, "Sizes", 4i64).unwrap();
        g.add_field(widget, "Sizes", 4i64).unwrap();
        assert_eq!(
            g.get_field(widget, "Sizes"),
            Some(&Value::List(vec![Value::Integer(4), Value::Integer(4)]))
        );
    }

    #[test]
    fn test_enum_values_are_canonicalized() {
        let mut g = graph();
        let widget = g.create("Widget").unwrap();
        g.set_field(widget, "Color", Value::Enum("AZURE".to_string()))
            .unwrap();
        assert_eq!(
            g.get_field(widget, "Color"),
            Some(&Value::Enum("Blue".to_string()))
        );
        assert!(g
            .set_field(widget, "Color", Value::Enum("Purple".to_string()))
            .is_err());
    }

    #[test]
    fn test_select_accepts_wrapped_defined_values() {
        let mut g = graph();
        let widget = g.create("Widget").unwrap();
        g.set_field(widget, "Measure", Value::wrapped("label", Value::string("tall")))
            .unwrap();
        assert_eq!(
            g.get_field(widget, "Measure"),
            Some(&Value::wrapped("Label", Value::string("tall")))
        );
        assert!(g
            .set_field(widget, "Measure", Value::wrapped("Label", Value::Integer(1)))
            .is_err());
    }

    #[test]
    fn test_placeholders_keep_order() {
        let mut g = graph();
        let widget = g.create("Widget").unwrap();
        let parts = g.field_id(widget, "Parts").unwrap();
        let first = g.create("Part").unwrap();
        let second = g.create("Part").unwrap();
        let slot = g.reserve_slot(widget, parts).unwrap();
        g.add(widget, parts, Value::Ref(second)).unwrap();
        let dangling = g.reserve_slot(widget, parts).unwrap();
        g.fill_slot(widget, parts, slot, Value::Ref(first)).unwrap();
        assert_eq!(dangling, 2);
        g.purge_placeholders(widget, parts);
        assert_eq!(g.refs(widget, parts), vec![first, second]);
    }

    #[test]
    fn test_extract_objects_includes_subtypes() {
        let mut g = graph();
        let widget = g.create("Widget").unwrap();
        let part = g.create("Part").unwrap();
        let gear = g.create("Gear").unwrap();
        let _orphan = g.create("Part").unwrap();
        g.add_field(widget, "Parts", part).unwrap();
        g.add_field(widget, "Parts", gear).unwrap();

        let part_type = g.catalog().describe_type("Part").unwrap().id();
        assert_eq!(g.extract_objects(widget, part_type), vec![part, gear]);
    }
}
