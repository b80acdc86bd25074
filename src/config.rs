//! Serializer settings shared by the STEP, XML and folder encodings.
//!
//! Settings live in a TOML file read through [`TomlConfigProvider`]. Every field has a default so
//! an empty file (or no file at all) yields a working configuration.

use crate::error::DocGraphError;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs::{read_to_string, write},
    path::{Path, PathBuf},
};

pub const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerializerConfig {
    /// Derive XML ids from each type's identity rule instead of `i<N>` sequence tokens.
    pub use_unique_id_references: bool,
    pub step: StepOptions,
    pub xml: XmlOptions,
    pub folder: FolderOptions,
    pub extensions: ExtensionOptions,
}

impl Default for SerializerConfig {
    fn default() -> Self {
        SerializerConfig {
            use_unique_id_references: true,
            step: StepOptions::default(),
            xml: XmlOptions::default(),
            folder: FolderOptions::default(),
            extensions: ExtensionOptions::default(),
        }
    }
}

impl SerializerConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, DocGraphError> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml_string(&self) -> Result<String, DocGraphError> {
        Ok(toml::to_string(self)?)
    }
}

/// Header fields written into the STEP `HEADER` section.
///
/// `time_stamp` defaults to empty so that writing the same graph twice is byte-identical.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepOptions {
    pub description: Vec<String>,
    pub implementation_level: String,
    pub name: String,
    pub time_stamp: String,
    pub author: String,
    pub organization: String,
    pub generator: String,
    pub generator_version: String,
    pub originating_system: String,
    pub authorization: String,
}

impl Default for StepOptions {
    fn default() -> Self {
        StepOptions {
            description: vec![String::new()],
            implementation_level: "2;1".to_string(),
            name: String::new(),
            time_stamp: String::new(),
            author: String::new(),
            organization: String::new(),
            generator: env!("CARGO_PKG_NAME").to_string(),
            generator_version: env!("CARGO_PKG_VERSION").to_string(),
            originating_system: String::new(),
            authorization: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct XmlOptions {
    /// Default namespace written as `xmlns` on the document root.
    pub namespace: Option<String>,
    pub schema_location: Option<String>,
    /// Namespaces tried in order by `XmlSerializer::read_object_any_namespace`.
    pub namespace_variants: Vec<String>,
    /// Reject documents whose root `xmlns` differs from `namespace`.
    pub strict_namespace: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FolderOptions {
    /// Type name -> prefix stripped from folder keys before bucketing by initial letter.
    pub file_prefixes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtensionOptions {
    pub step: Vec<String>,
    pub xml: Vec<String>,
}

impl Default for ExtensionOptions {
    fn default() -> Self {
        ExtensionOptions {
            step: vec!["step".to_string(), "stp".to_string(), "ifcdoc".to_string()],
            xml: vec!["xml".to_string(), "ifcdocxml".to_string()],
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TomlConfigProvider {
    path: PathBuf,
}

impl TomlConfigProvider {
    pub fn new(path: PathBuf) -> Self {
        TomlConfigProvider { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get_config(&self) -> Result<SerializerConfig, DocGraphError> {
        tracing::debug!("Attempting to read serializer config from: {:?}", &self.path);
        if !self.path.exists() {
            tracing::debug!("Config file not found, using default serializer config.");
            return Ok(SerializerConfig::default());
        }
        let content = read_to_string(&self.path)?;
        SerializerConfig::from_toml_str(&content)
    }

    pub fn set_config(&self, config: &SerializerConfig) -> Result<(), DocGraphError> {
        tracing::debug!("Attempting to write serializer config to: {:?}", &self.path);
        write(&self.path, config.to_toml_string()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = SerializerConfig::from_toml_str("").unwrap();
        assert_eq!(config, SerializerConfig::default());
        assert!(config.use_unique_id_references);
        assert_eq!(config.step.implementation_level, "2;1");
    }

    #[test]
    fn test_partial_config() {
        let config = SerializerConfig::from_toml_str(
            r#"
use_unique_id_references = false

[xml]
namespace = "urn:example:widgets"
namespace_variants = ["urn:example:widgets", "urn:example:widgets-1-0"]

[folder.file_prefixes]
Part = "Prt"
"#,
        )
        .unwrap();
        assert!(!config.use_unique_id_references);
        assert_eq!(config.xml.namespace.as_deref(), Some("urn:example:widgets"));
        assert_eq!(config.xml.namespace_variants.len(), 2);
        assert_eq!(config.folder.file_prefixes.get("Part").unwrap(), "Prt");
        assert_eq!(config.step, StepOptions::default());
    }

    #[test]
    fn test_provider_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let provider = TomlConfigProvider::new(dir.path().join("docgraph.toml"));
        assert_eq!(provider.get_config().unwrap(), SerializerConfig::default());

        let mut config = SerializerConfig::default();
        config.step.generator = "widget-tool".to_string();
        provider.set_config(&config).unwrap();
        assert_eq!(provider.get_config().unwrap(), config);
    }
}
