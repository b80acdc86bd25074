//! Text spelling of non-entity values, shared by the XML and folder encodings.

use crate::{
    error::DocGraphError,
    graph::Value,
    schema::{Catalog, Primitive, Target},
};

/// Attribute or element text for a scalar value of a field typed `target`; `None` for nulls
/// and references.
pub fn format_value(catalog: &Catalog, target: Target, value: &Value) -> Option<String> {
    let text = match value {
        Value::Null | Value::Ref(_) | Value::List(_) => return None,
        Value::Boolean(b) => b.to_string(),
        Value::Logical(Some(b)) => b.to_string(),
        Value::Logical(None) => "unknown".to_string(),
        Value::Integer(n) => n.to_string(),
        Value::Real(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Binary(bytes) => hex::encode_upper(bytes),
        Value::Guid(guid) => guid.to_string(),
        Value::Enum(name) => enum_text(catalog, target, name),
        Value::Wrapped { type_name, value } => {
            let inner = catalog
                .describe_type(type_name)
                .map_or(target, |t| Target::Defined(t.id()));
            return format_value(catalog, inner, value);
        }
    };
    Some(text)
}

/// Values of `target` may contain whitespace, so a collection of them cannot be spelled as one
/// space-separated text. Such collections are written one element per item.
pub fn is_free_text(catalog: &Catalog, target: Target) -> bool {
    match target {
        Target::Primitive(primitive) => primitive == Primitive::String,
        Target::Defined(ty) => {
            catalog.type_by_id(ty).defined_primitive() == Some(Primitive::String)
        }
        Target::Enum(_) | Target::Entity(_) => false,
    }
}

/// Space-separated spelling of a collection of values.
pub fn format_list(catalog: &Catalog, target: Target, items: &[Value]) -> String {
    items
        .iter()
        .filter_map(|item| format_value(catalog, target, item))
        .collect::<Vec<_>>()
        .join(" ")
}

fn enum_text(catalog: &Catalog, target: Target, name: &str) -> String {
    let Target::Enum(ty) = target else {
        return name.to_lowercase();
    };
    catalog
        .type_by_id(ty)
        .variants()
        .iter()
        .find(|v| v.name == name)
        .map(|v| v.xml_text())
        .unwrap_or_else(|| name.to_lowercase())
}

pub fn parse_primitive(primitive: Primitive, text: &str) -> Result<Value, DocGraphError> {
    let value = match primitive {
        Primitive::Boolean => Value::Boolean(parse_bool(text)?),
        Primitive::Logical => match text.trim() {
            t if t.eq_ignore_ascii_case("unknown") => Value::Logical(None),
            t => Value::Logical(Some(parse_bool(t)?)),
        },
        Primitive::Integer => Value::Integer(text.trim().parse()?),
        Primitive::Real => Value::Real(text.trim().parse()?),
        Primitive::String => Value::String(text.to_string()),
        Primitive::Binary => Value::Binary(hex::decode(text.trim())?),
        Primitive::Guid => Value::Guid(uuid::Uuid::parse_str(text.trim())?),
    };
    Ok(value)
}

fn parse_bool(text: &str) -> Result<bool, DocGraphError> {
    match text.trim() {
        "true" | "1" | "TRUE" | "True" => Ok(true),
        "false" | "0" | "FALSE" | "False" => Ok(false),
        other => Err(DocGraphError::Value(format!("'{other}' is not a boolean"))),
    }
}

/// Parse text into a value of a non-entity target.
pub fn parse_value(catalog: &Catalog, target: Target, text: &str) -> Result<Value, DocGraphError> {
    match target {
        Target::Primitive(primitive) => parse_primitive(primitive, text),
        Target::Enum(ty) => catalog
            .type_by_id(ty)
            .variants()
            .iter()
            .find(|v| v.matches(text.trim()))
            .map(|v| Value::Enum(v.name.clone()))
            .ok_or_else(|| {
                DocGraphError::Value(format!(
                    "'{}' is not a value of '{}'",
                    text,
                    catalog.type_name(ty)
                ))
            }),
        Target::Defined(ty) => {
            let primitive = catalog.type_by_id(ty).defined_primitive().ok_or_else(|| {
                DocGraphError::Value(format!("'{}' is not a value type", catalog.type_name(ty)))
            })?;
            parse_primitive(primitive, text)
        }
        Target::Entity(ty) => Err(DocGraphError::Value(format!(
            "text cannot stand for an entity of type '{}'",
            catalog.type_name(ty)
        ))),
    }
}

/// Parse a space-separated collection.
pub fn parse_list(catalog: &Catalog, target: Target, text: &str) -> Result<Value, DocGraphError> {
    text.split_whitespace()
        .map(|item| parse_value(catalog, target, item))
        .collect::<Result<Vec<_>, _>>()
        .map(Value::List)
}
