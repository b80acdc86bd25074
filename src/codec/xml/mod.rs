//! XML encoding: one element per entity, scalars as attributes, shared objects by `id`/`href`.
//!
//! Field placement comes from the catalog (see [`XmlPlacement`](crate::schema::XmlPlacement)),
//! so the same graph can follow different XML vocabularies by swapping in an overlay.
//!
//! ```text
//! <Widget xmlns:xsi="..." Name="W1" Color="azure">
//!   <Parts>
//!     <Gear Code="G1" Teeth="12"/>
//!     <Part id="P1" Code="P1"/>
//!   </Parts>
//!   <Favorite>
//!     <Part xsi:nil="true" href="P1"/>
//!   </Favorite>
//! </Widget>
//! ```

mod reader;
mod writer;

pub(crate) use reader::{Item, XmlReader};
pub(crate) use writer::XmlWriter;

use std::{
    io::{Read, Write},
    sync::Arc,
};

use super::{ObjectSerializer, ReadOutcome};
use crate::{
    config::{SerializerConfig, XmlOptions},
    error::DocGraphError,
    graph::{EntityId, Graph},
    schema::Catalog,
};

#[derive(Debug, Clone)]
pub struct XmlSerializer {
    catalog: Arc<Catalog>,
    options: XmlOptions,
    use_unique_id_references: bool,
}

impl XmlSerializer {
    pub fn new(catalog: Arc<Catalog>, config: &SerializerConfig) -> Self {
        XmlSerializer {
            catalog,
            options: config.xml.clone(),
            use_unique_id_references: config.use_unique_id_references,
        }
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn read_str(&self, text: &str) -> Result<ReadOutcome, DocGraphError> {
        read_with(self.catalog.clone(), self.options.clone(), text)
    }

    pub fn write_string(&self, graph: &Graph, root: EntityId) -> Result<String, DocGraphError> {
        let mut buffer = Vec::new();
        self.write_object(&mut buffer, graph, root)?;
        String::from_utf8(buffer).map_err(|e| DocGraphError::Serialization(e.to_string()))
    }

    /// Try each namespace in turn with strict checking; the first document that reads wins.
    pub fn read_object_any_namespace(
        &self,
        input: &mut dyn Read,
        namespaces: &[String],
    ) -> Result<ReadOutcome, DocGraphError> {
        let mut text = String::new();
        input.read_to_string(&mut text)?;
        for namespace in namespaces {
            let options = XmlOptions {
                namespace: Some(namespace.clone()),
                strict_namespace: true,
                ..self.options.clone()
            };
            match read_with(self.catalog.clone(), options, &text) {
                Ok(outcome) => {
                    tracing::debug!("[XmlSerializer] Read with namespace '{}'", namespace);
                    return Ok(outcome);
                }
                Err(e) => tracing::debug!(
                    "[XmlSerializer] Namespace '{}' rejected: {}",
                    namespace,
                    e
                ),
            }
        }
        Err(DocGraphError::UnsupportedFormat(format!(
            "document matches none of the namespaces {namespaces:?}"
        )))
    }
}

fn read_with(
    catalog: Arc<Catalog>,
    options: XmlOptions,
    text: &str,
) -> Result<ReadOutcome, DocGraphError> {
    let root_type = catalog.root_type();
    let mut reader = XmlReader::new(catalog.clone(), options);
    let root = reader.read_document(text, Some(root_type))?;
    let actual = reader.graph_mut().type_of(root)?;
    if !catalog.is_subtype_of(actual, root_type) {
        return Err(DocGraphError::Parse(format!(
            "document element is a '{}', expected '{}'",
            catalog.type_name(actual),
            catalog.type_name(root_type)
        )));
    }
    Ok(reader.finish(root))
}

impl ObjectSerializer for XmlSerializer {
    fn read_object(&self, input: &mut dyn Read) -> Result<ReadOutcome, DocGraphError> {
        let mut text = String::new();
        input.read_to_string(&mut text)?;
        self.read_str(&text)
    }

    fn write_object(
        &self,
        output: &mut dyn Write,
        graph: &Graph,
        root: EntityId,
    ) -> Result<(), DocGraphError> {
        let mut writer = XmlWriter::new(graph, self.options.clone(), self.use_unique_id_references);
        writer.discover(root)?;
        writer.write_document(output, root, true)
    }
}
