//! Diagnostic types for recoverable read problems.
//!
//! Historical files reference types that later schema revisions removed and occasionally carry
//! references to records that were never written. Neither aborts a load; each produces a
//! [`ReadDiagnostic`] that is logged and handed back to the caller next to the graph.

use crate::graph::EntityId;

/// A reference whose target never appeared before the end of the input.
///
/// The pending assignment is dropped; the owner keeps every other field it was read with.
///
/// # Examples
///
/// ```
/// # use docgraph_core::codec::DanglingReference;
/// let dangling = DanglingReference {
///     id: "#42".to_string(),
///     owner_type: "Widget".to_string(),
///     field: "Parts".to_string(),
///     owner: None,
/// };
/// assert_eq!(dangling.to_string(), "Widget.Parts -> #42");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct DanglingReference {
    /// The textual id as written in the source (`#42`, `i7`, ...)
    pub id: String,

    /// Type name of the entity holding the reference
    pub owner_type: String,

    /// Field that would have received the reference
    pub field: String,

    /// The owner within the loaded graph
    pub owner: Option<EntityId>,
}

impl std::fmt::Display for DanglingReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{} -> {}", self.owner_type, self.field, self.id)
    }
}

/// Diagnostic information produced while reading.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadDiagnostic {
    /// A reference to a record or element that does not exist in the input
    DanglingReference(DanglingReference),

    /// A type name not present in the catalog; the record or element was skipped
    UnknownType {
        name: String,
        /// Record id or element path where the name appeared
        location: String,
    },

    /// A recoverable oddity (argument count mismatch, unknown attribute, ...)
    Warning(String),

    /// An informational message about the read
    Info(String),
}

impl ReadDiagnostic {
    pub fn unknown_type(name: impl Into<String>, location: impl Into<String>) -> Self {
        Self::UnknownType {
            name: name.into(),
            location: location.into(),
        }
    }

    /// Create a warning diagnostic
    pub fn warning(message: impl Into<String>) -> Self {
        Self::Warning(message.into())
    }

    /// Create an info diagnostic
    pub fn info(message: impl Into<String>) -> Self {
        Self::Info(message.into())
    }

    pub fn is_dangling_reference(&self) -> bool {
        matches!(self, Self::DanglingReference(_))
    }

    pub fn as_dangling_reference(&self) -> Option<&DanglingReference> {
        match self {
            Self::DanglingReference(dangling) => Some(dangling),
            _ => None,
        }
    }

    pub fn is_unknown_type(&self) -> bool {
        matches!(self, Self::UnknownType { .. })
    }
}

impl std::fmt::Display for ReadDiagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DanglingReference(dangling) => write!(f, "Dangling reference: {dangling}"),
            Self::UnknownType { name, location } => {
                write!(f, "Unknown type '{name}' at {location}")
            }
            Self::Warning(msg) => write!(f, "Warning: {msg}"),
            Self::Info(msg) => write!(f, "Info: {msg}"),
        }
    }
}
