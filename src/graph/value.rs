use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};
use uuid::Uuid;

use crate::schema::{FieldId, TypeId};

/// Handle of an entity within one [`Graph`](super::Graph) arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub(crate) u32);

impl EntityId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// A field value. Collections are `List` regardless of set or list cardinality.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    /// `None` is the third logical state, unknown.
    Logical(Option<bool>),
    Integer(i64),
    Real(f64),
    String(String),
    Binary(Vec<u8>),
    Guid(Uuid),
    /// Canonical variant name of an enumeration.
    Enum(String),
    /// A defined-type value stored where an entity (select) is expected.
    Wrapped { type_name: String, value: Box<Value> },
    Ref(EntityId),
    List(Vec<Value>),
}

impl Value {
    pub fn string(text: impl Into<String>) -> Self {
        Value::String(text.into())
    }

    pub fn wrapped(type_name: impl Into<String>, value: Value) -> Self {
        Value::Wrapped {
            type_name: type_name.into(),
            value: Box::new(value),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Null, or a collection with no elements.
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Null => true,
            Value::List(items) => items.is_empty(),
            _ => false,
        }
    }

    pub fn as_ref_id(&self) -> Option<EntityId> {
        match self {
            Value::Ref(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(text) | Value::Enum(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Entity handles referenced directly or through a collection.
    pub fn refs(&self) -> Vec<EntityId> {
        match self {
            Value::Ref(id) => vec![*id],
            Value::List(items) => items.iter().filter_map(Value::as_ref_id).collect(),
            _ => Vec::new(),
        }
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Value::String(text.to_string())
    }
}

impl From<String> for Value {
    fn from(text: String) -> Self {
        Value::String(text)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Real(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<EntityId> for Value {
    fn from(id: EntityId) -> Self {
        Value::Ref(id)
    }
}

impl From<Uuid> for Value {
    fn from(guid: Uuid) -> Self {
        Value::Guid(guid)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub(crate) type_id: TypeId,
    pub(crate) values: BTreeMap<FieldId, Value>,
}

impl Entity {
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn values(&self) -> &BTreeMap<FieldId, Value> {
        &self.values
    }
}
