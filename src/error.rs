use std::{
    fmt, io,
    num::{ParseFloatError, ParseIntError},
};

use quick_xml::{events::attributes::AttrError, Error as XmlError};
use regex::Error as RegexError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
pub enum DocGraphError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("File System error: {0}")]
    Io(String),
    #[error("Item Not Found: {0}")]
    NotFound(String),
    #[error("Malformed input: {0}")]
    Parse(String),
    #[error("You do not have permission to access this resource")]
    PermissionDenied,
    /// A corrupt schema descriptor. Raised immediately; never recovered.
    #[error("Schema descriptor error: {0}")]
    Schema(String),
    #[error("(De)Serialization error: {0}")]
    Serialization(String),
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("Invalid value: {0}")]
    Value(String),
    #[error("Failed to {operation} '{path}': {message}")]
    File {
        path: String,
        operation: String,
        message: String,
    },
}

impl DocGraphError {
    /// Wraps an error into the single top-level, file-scoped failure reported to callers.
    pub fn for_file(self, path: impl AsRef<std::path::Path>, operation: &str) -> Self {
        match self {
            already @ DocGraphError::File { .. } => already,
            other => DocGraphError::File {
                path: path.as_ref().display().to_string(),
                operation: operation.to_string(),
                message: other.to_string(),
            },
        }
    }
}

impl From<io::Error> for DocGraphError {
    fn from(x: io::Error) -> Self {
        match x.kind() {
            io::ErrorKind::NotFound => DocGraphError::NotFound(format!("{x}")),
            io::ErrorKind::PermissionDenied => DocGraphError::PermissionDenied,
            io::ErrorKind::InvalidData => DocGraphError::Parse(format!("{x}")),
            _ => DocGraphError::Io(format!("IOError: {}", x.kind())),
        }
    }
}

impl From<fmt::Error> for DocGraphError {
    fn from(x: fmt::Error) -> Self {
        DocGraphError::Serialization(format!("{x}"))
    }
}

impl From<XmlError> for DocGraphError {
    fn from(x: XmlError) -> Self {
        DocGraphError::Parse(format!("XML error: {x}"))
    }
}

impl From<AttrError> for DocGraphError {
    fn from(x: AttrError) -> Self {
        DocGraphError::Parse(format!("XML attribute error: {x}"))
    }
}

impl From<toml::de::Error> for DocGraphError {
    fn from(src: toml::de::Error) -> DocGraphError {
        DocGraphError::Config(format!("Toml deserialization error: {src}"))
    }
}

impl From<toml::ser::Error> for DocGraphError {
    fn from(src: toml::ser::Error) -> DocGraphError {
        DocGraphError::Config(format!("Toml serialization error: {src}"))
    }
}

impl From<RegexError> for DocGraphError {
    fn from(x: RegexError) -> Self {
        DocGraphError::Serialization(format!("Regex parse failed: {x}"))
    }
}

impl From<uuid::Error> for DocGraphError {
    fn from(src: uuid::Error) -> DocGraphError {
        DocGraphError::Value(format!("UUID conversion failed: {src}"))
    }
}

impl From<hex::FromHexError> for DocGraphError {
    fn from(src: hex::FromHexError) -> DocGraphError {
        DocGraphError::Value(format!("Invalid hex binary: {src}"))
    }
}

impl From<ParseIntError> for DocGraphError {
    fn from(src: ParseIntError) -> DocGraphError {
        DocGraphError::Value(format!("Invalid integer: {src}"))
    }
}

impl From<ParseFloatError> for DocGraphError {
    fn from(src: ParseFloatError) -> DocGraphError {
        DocGraphError::Value(format!("Invalid real: {src}"))
    }
}

impl From<walkdir::Error> for DocGraphError {
    fn from(src: walkdir::Error) -> DocGraphError {
        match src.into_io_error() {
            Some(io_error) => DocGraphError::from(io_error),
            None => DocGraphError::Io("directory walk failed (filesystem loop)".to_string()),
        }
    }
}

impl From<tempfile::PersistError> for DocGraphError {
    fn from(src: tempfile::PersistError) -> DocGraphError {
        DocGraphError::Io(format!("could not replace destination file: {}", src.error))
    }
}
