// Process-wide registry of built catalogs
//
// A catalog is built once per schema identifier and shared read-only afterwards. Downstream
// crates register their own schemas at startup or build them lazily through `get_or_build`.

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::{collections::HashMap, sync::Arc, time::Duration};

use super::Catalog;
use crate::error::DocGraphError;

/// Global singleton catalog registry
pub static SCHEMAS: Lazy<SchemaRegistry> = Lazy::new(SchemaRegistry::create);

/// Thread-safe map from schema identifier to its catalog.
pub struct SchemaRegistry(Arc<RwLock<HashMap<String, Arc<Catalog>>>>);

impl Clone for SchemaRegistry {
    fn clone(&self) -> Self {
        SchemaRegistry(self.0.clone())
    }
}

impl SchemaRegistry {
    pub fn create() -> Self {
        SchemaRegistry(Arc::new(RwLock::new(HashMap::new())))
    }

    /// Register a catalog under its schema identifier.
    ///
    /// If a catalog with this identifier already exists, it will be overwritten and a log message
    /// emitted.
    pub fn register(&self, catalog: Catalog) -> Arc<Catalog> {
        while self.0.is_locked() {
            tracing::info!(
                "[SchemaRegistry::register] Waiting for write access to schema registry"
            );
            std::thread::sleep(Duration::from_millis(100));
        }

        let mut writer = self.0.write();
        let identifier = catalog.schema_identifier().to_string();
        if writer.contains_key(&identifier) {
            tracing::info!(
                "[SchemaRegistry::register] Overwriting existing schema: {}",
                identifier
            );
        }
        let catalog = Arc::new(catalog);
        writer.insert(identifier, catalog.clone());
        catalog
    }

    /// Retrieve a catalog by schema identifier
    ///
    /// Returns a cheap Arc clone if the schema exists.
    pub fn get(&self, identifier: &str) -> Option<Arc<Catalog>> {
        while self.0.is_locked_exclusive() {
            tracing::info!("[SchemaRegistry::get] Waiting for read access to schema registry");
            std::thread::sleep(Duration::from_millis(100));
        }

        let reader = self.0.read();
        reader.get(identifier).cloned()
    }

    /// Return the catalog for `identifier`, building and registering it on first use.
    ///
    /// The build runs under the write lock, so concurrent callers build at most once.
    pub fn get_or_build<F>(&self, identifier: &str, build: F) -> Result<Arc<Catalog>, DocGraphError>
    where
        F: FnOnce() -> Result<Catalog, DocGraphError>,
    {
        if let Some(catalog) = self.get(identifier) {
            return Ok(catalog);
        }

        let mut writer = self.0.write();
        if let Some(catalog) = writer.get(identifier) {
            return Ok(catalog.clone());
        }
        let catalog = build()?;
        if catalog.schema_identifier() != identifier {
            return Err(DocGraphError::Schema(format!(
                "built catalog identifies as '{}', expected '{}'",
                catalog.schema_identifier(),
                identifier
            )));
        }
        tracing::debug!("[SchemaRegistry::get_or_build] Built schema: {}", identifier);
        let catalog = Arc::new(catalog);
        writer.insert(identifier.to_string(), catalog.clone());
        Ok(catalog)
    }

    /// List all registered schema identifiers, sorted.
    pub fn list_schemas(&self) -> Vec<String> {
        while self.0.is_locked_exclusive() {
            tracing::info!(
                "[SchemaRegistry::list_schemas] Waiting for read access to schema registry"
            );
            std::thread::sleep(Duration::from_millis(100));
        }

        let reader = self.0.read();
        let mut names: Vec<String> = reader.keys().cloned().collect();
        names.sort();
        names
    }
}
