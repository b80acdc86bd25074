//! Clear-text exchange structure (`ISO-10303-21;` files).
//!
//! Each entity type is written positionally: one argument per ordered field slot, `*` for slots
//! a subtype redeclared and `$` for nulls. Objects referenced once are written in place as
//! `TYPE(args)`; the root and every shared object get a numbered record of their own.

pub mod header;
pub mod lexer;
mod reader;
mod writer;

pub use header::{schema_version, StepHeader};

use std::{
    io::{Read, Write},
    sync::Arc,
};

use super::{ObjectSerializer, ReadOutcome};
use crate::{
    config::{SerializerConfig, StepOptions},
    error::DocGraphError,
    graph::{EntityId, Graph},
    schema::Catalog,
};

#[derive(Debug, Clone)]
pub struct StepSerializer {
    catalog: Arc<Catalog>,
    options: StepOptions,
}

impl StepSerializer {
    pub fn new(catalog: Arc<Catalog>, config: &SerializerConfig) -> Self {
        StepSerializer {
            catalog,
            options: config.step.clone(),
        }
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn read_str(&self, text: &str) -> Result<ReadOutcome, DocGraphError> {
        reader::StepReader::new(self.catalog.clone()).read(text)
    }

    pub fn write_string(&self, graph: &Graph, root: EntityId) -> Result<String, DocGraphError> {
        let mut buffer = Vec::new();
        self.write_object(&mut buffer, graph, root)?;
        String::from_utf8(buffer).map_err(|e| DocGraphError::Serialization(e.to_string()))
    }
}

impl ObjectSerializer for StepSerializer {
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
        let header = StepHeader::from_options(&self.options, self.catalog.schema_identifier());
        writer::StepWriter::new(graph).write(&header, root, output)
    }
}
