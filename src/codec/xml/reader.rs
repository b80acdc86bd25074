//! Event-driven document reader.
//!
//! Elements are handled as the pull parser reports them. A start tag creates its entity,
//! registers its id and assigns its attributes at once; text content is applied when the
//! element closes. Open elements live on an explicit stack, so nesting depth costs heap rather
//! than call stack.

use quick_xml::{
    events::{BytesStart, Event},
    Reader,
};
use std::{collections::BTreeMap, sync::Arc};

use crate::{
    codec::{
        text::{is_free_text, parse_list, parse_value},
        DeferredRefs, ReadDiagnostic, ReadOutcome,
    },
    config::XmlOptions,
    error::DocGraphError,
    graph::{EntityId, Graph, Value},
    schema::{Catalog, FieldId, Target, TypeId, XmlPlacement},
};

/// Suffix of elements carrying a defined-type value inside an entity-typed field.
pub(crate) const WRAPPER_SUFFIX: &str = "-wrapper";

/// Name and attributes of a start tag. Attribute keys keep their prefix (`xsi:type`); the
/// element name does not.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct StartTag {
    pub name: String,
    pub attributes: Vec<(String, String)>,
}

impl StartTag {
    fn parse(start: &BytesStart<'_>) -> Result<Self, DocGraphError> {
        let mut tag = StartTag {
            name: String::from_utf8_lossy(start.local_name().as_ref()).into_owned(),
            attributes: Vec::new(),
        };
        for attr in start.attributes() {
            let attr = attr?;
            tag.attributes.push((
                String::from_utf8_lossy(attr.key.as_ref()).into_owned(),
                attr.unescape_value()?.into_owned(),
            ));
        }
        Ok(tag)
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// `xsi:type` under whatever prefix the document bound it to, without its own prefix.
    pub fn type_attr(&self) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k.rsplit_once(':').is_some_and(|(_, local)| local == "type"))
            .map(|(_, v)| v.rsplit_once(':').map_or(v.as_str(), |(_, local)| local))
    }
}

#[derive(Debug)]
pub(crate) enum Item {
    Value(Value),
    Pending(String),
    Skipped,
}

/// Where the item an element stands for goes once the element closes.
#[derive(Debug, Clone, Copy)]
enum Sink {
    Document,
    Field(EntityId, FieldId),
    Discard,
}

#[derive(Debug)]
enum Subject {
    Entity(EntityId, TypeId),
    /// A defined-type value, parsed from the element text
    Value(TypeId),
    /// Settled by the start tag alone: a reference or a skipped element
    Resolved(Item),
}

/// Character data of an open element.
#[derive(Debug, Default)]
struct Text {
    raw: String,
    nested: bool,
}

impl Text {
    /// Indentation around child elements is dropped.
    fn content(&self) -> &str {
        if self.nested {
            self.raw.trim()
        } else {
            &self.raw
        }
    }
}

/// An open element.
#[derive(Debug)]
enum Frame {
    Object {
        subject: Subject,
        sink: Sink,
        path: String,
        text: Text,
    },
    /// Field element whose children are the items of an entity-typed field
    Items { sink: Sink, path: String },
    /// Field element holding a value as text
    Value {
        owner: EntityId,
        field: FieldId,
        path: String,
        text: Text,
    },
    /// Ignored subtree. Below its top only the element name is kept as the path.
    Skipped { path: String },
}

impl Frame {
    fn path(&self) -> &str {
        match self {
            Frame::Object { path, .. }
            | Frame::Items { path, .. }
            | Frame::Value { path, .. }
            | Frame::Skipped { path } => path,
        }
    }

    fn text_mut(&mut self) -> Option<&mut Text> {
        match self {
            Frame::Object { text, .. } | Frame::Value { text, .. } => Some(text),
            Frame::Items { .. } | Frame::Skipped { .. } => None,
        }
    }
}

/// Reading state shared by every document of one load.
pub(crate) struct XmlReader {
    catalog: Arc<Catalog>,
    options: XmlOptions,
    graph: Graph,
    deferred: DeferredRefs,
    instances: BTreeMap<String, EntityId>,
    diagnostics: Vec<ReadDiagnostic>,
}

impl XmlReader {
    pub fn new(catalog: Arc<Catalog>, options: XmlOptions) -> Self {
        XmlReader {
            graph: Graph::new(catalog.clone()),
            catalog,
            options,
            deferred: DeferredRefs::new(),
            instances: BTreeMap::new(),
            diagnostics: Vec::new(),
        }
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut Graph {
        &mut self.graph
    }

    pub fn diagnose(&mut self, diagnostic: ReadDiagnostic) {
        tracing::warn!("[XmlReader] {}", diagnostic);
        self.diagnostics.push(diagnostic);
    }

    /// Read one document and return the entity of its root element.
    pub fn read_document(
        &mut self,
        text: &str,
        expected: Option<TypeId>,
    ) -> Result<EntityId, DocGraphError> {
        let mut reader = Reader::from_str(text);
        reader.config_mut().trim_text(false);
        let mut stack: Vec<Frame> = Vec::new();
        let mut document_element: Option<String> = None;
        let mut document = None;
        loop {
            match reader.read_event()? {
                Event::Start(start) => {
                    let tag = StartTag::parse(&start)?;
                    let frame = self.open(&mut stack, &tag, expected, &mut document_element)?;
                    stack.push(frame);
                }
                Event::Empty(start) => {
                    let tag = StartTag::parse(&start)?;
                    let frame = self.open(&mut stack, &tag, expected, &mut document_element)?;
                    self.close(frame, &mut document);
                }
                Event::End(_) => {
                    let frame = stack
                        .pop()
                        .ok_or_else(|| DocGraphError::Parse("unbalanced end tag".to_string()))?;
                    self.close(frame, &mut document);
                }
                Event::Text(chars) => {
                    if let Some(open) = stack.last_mut().and_then(Frame::text_mut) {
                        open.raw.push_str(&chars.unescape()?);
                    }
                }
                Event::CData(data) => {
                    if let Some(open) = stack.last_mut().and_then(Frame::text_mut) {
                        open.raw
                            .push_str(&String::from_utf8_lossy(&data.into_inner()));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }
        if let Some(frame) = stack.last() {
            return Err(DocGraphError::Parse(format!(
                "unclosed element '{}'",
                frame.path()
            )));
        }
        match (document, document_element) {
            (Some(Item::Value(Value::Ref(id))), _) => Ok(id),
            (_, Some(name)) => Err(DocGraphError::Parse(format!(
                "document element '{name}' is not an entity"
            ))),
            (_, None) => Err(DocGraphError::Parse(
                "document has no root element".to_string(),
            )),
        }
    }

    fn check_namespace(&self, tag: &StartTag) -> Result<(), DocGraphError> {
        if !self.options.strict_namespace {
            return Ok(());
        }
        let Some(expected) = self.options.namespace.as_deref() else {
            return Ok(());
        };
        match tag.attr("xmlns") {
            Some(actual) if actual == expected => Ok(()),
            actual => Err(DocGraphError::UnsupportedFormat(format!(
                "namespace {:?} does not match '{}'",
                actual, expected
            ))),
        }
    }

    /// The frame for a start tag, given the elements currently open.
    fn open(
        &mut self,
        stack: &mut [Frame],
        tag: &StartTag,
        expected: Option<TypeId>,
        document_element: &mut Option<String>,
    ) -> Result<Frame, DocGraphError> {
        let Some(parent) = stack.last_mut() else {
            let path = format!("/{}", tag.name);
            if document_element.is_some() {
                return Ok(Frame::Skipped { path });
            }
            *document_element = Some(tag.name.clone());
            self.check_namespace(tag)?;
            return Ok(self.open_object(tag, expected, Sink::Document, path));
        };
        if let Some(text) = parent.text_mut() {
            text.nested = true;
        }
        let frame = match parent {
            Frame::Object {
                subject: Subject::Entity(entity, ty),
                path,
                ..
            } => {
                let (entity, ty) = (*entity, *ty);
                let path = format!("{path}/{}", tag.name);
                self.open_member(entity, ty, tag, path)
            }
            // Items inside a field element are named after their own type
            Frame::Items { sink, path } => {
                let sink = *sink;
                let path = format!("{path}/{}", tag.name);
                self.open_object(tag, None, sink, path)
            }
            _ => Frame::Skipped {
                path: tag.name.clone(),
            },
        };
        Ok(frame)
    }

    /// A child element of an entity: one of its fields, or a detached entity.
    fn open_member(&mut self, owner: EntityId, ty: TypeId, tag: &StartTag, path: String) -> Frame {
        let catalog = self.catalog.clone();
        match catalog.field_by_name(ty, &tag.name) {
            Some(field) => self.open_field(owner, field, tag, path),
            None if catalog
                .describe_type(&tag.name)
                .is_some_and(|t| t.is_entity()) =>
            {
                // Written after the children: only reachable through an inverse, or met too
                // deep to be nested
                self.open_object(tag, None, Sink::Discard, path)
            }
            None => {
                self.diagnose(ReadDiagnostic::warning(format!(
                    "{path}: '{}' has no field '{}'",
                    catalog.type_name(ty),
                    tag.name
                )));
                Frame::Skipped { path }
            }
        }
    }

    fn open_field(&mut self, owner: EntityId, field: FieldId, tag: &StartTag, path: String) -> Frame {
        let catalog = self.catalog.clone();
        let descriptor = catalog.field(field);
        let Target::Entity(target_type) = descriptor.target() else {
            return Frame::Value {
                owner,
                field,
                path,
                text: Text::default(),
            };
        };
        // Members of inverse fields are materialized; the links come from rebuild_inverses
        let sink = if descriptor.is_inverse() {
            Sink::Discard
        } else {
            Sink::Field(owner, field)
        };
        let is_item = descriptor.is_tagless()
            || descriptor.xml_placement() == XmlPlacement::Attribute
            || tag.type_attr().is_some()
            || tag.attr("href").is_some();
        if is_item {
            self.open_object(tag, Some(target_type), sink, path)
        } else {
            Frame::Items { sink, path }
        }
    }

    /// Materialize an entity element, or resolve it when it is a reference. `default` is the
    /// type assumed when the element is named after a field rather than a type.
    fn open_object(
        &mut self,
        tag: &StartTag,
        default: Option<TypeId>,
        sink: Sink,
        path: String,
    ) -> Frame {
        let subject = self.subject(tag, default, &path);
        Frame::Object {
            subject,
            sink,
            path,
            text: Text::default(),
        }
    }

    fn subject(&mut self, tag: &StartTag, default: Option<TypeId>, path: &str) -> Subject {
        if let Some(href) = tag.attr("href") {
            return Subject::Resolved(self.reference(href));
        }

        let named = tag.type_attr().unwrap_or(&tag.name);
        let (type_name, wrapper) = match named.strip_suffix(WRAPPER_SUFFIX) {
            Some(inner) => (inner, true),
            None => (named, false),
        };
        let ty = match self.catalog.describe_type(type_name) {
            Some(t) => Some(t.id()),
            None if wrapper || tag.type_attr().is_some() => None,
            None => default,
        };
        let Some(ty) = ty else {
            self.diagnose(ReadDiagnostic::unknown_type(type_name, path));
            return Subject::Resolved(Item::Skipped);
        };

        let catalog = self.catalog.clone();
        if !catalog.type_by_id(ty).is_entity() {
            return Subject::Value(ty);
        }
        if let Some(target) = tag.attr("ref") {
            if catalog.field_by_name(ty, "ref").is_none() {
                return Subject::Resolved(self.reference(target));
            }
        }

        let entity = match self.graph.create_typed(ty) {
            Ok(entity) => entity,
            Err(e) => {
                self.diagnose(ReadDiagnostic::warning(format!("{path}: {e}")));
                return Subject::Resolved(Item::Skipped);
            }
        };
        if let Some(id) = tag.attr("id") {
            self.instances.insert(id.to_string(), entity);
            self.deferred.dequeue(id, entity, &mut self.graph);
        }
        for (key, text) in &tag.attributes {
            if matches!(key.as_str(), "id" | "ref") || key.contains(':') || key == "xmlns" {
                continue;
            }
            self.read_attribute(entity, ty, key, text, path);
        }
        Subject::Entity(entity, ty)
    }

    fn close(&mut self, frame: Frame, document: &mut Option<Item>) {
        match frame {
            Frame::Object {
                subject,
                sink,
                path,
                text,
            } => {
                let item = match subject {
                    Subject::Resolved(item) => item,
                    Subject::Value(ty) => self.defined_value(ty, text.content(), &path),
                    Subject::Entity(entity, ty) => {
                        self.read_content(entity, ty, text.content(), &path);
                        Item::Value(Value::Ref(entity))
                    }
                };
                match sink {
                    Sink::Document => *document = Some(item),
                    Sink::Field(owner, field) => self.assign_item(owner, field, item, &path),
                    Sink::Discard => {}
                }
            }
            Frame::Value {
                owner,
                field,
                path,
                text,
            } => self.read_field_text(owner, field, text.content(), &path),
            Frame::Items { .. } | Frame::Skipped { .. } => {}
        }
    }

    fn defined_value(&mut self, ty: TypeId, content: &str, path: &str) -> Item {
        let catalog = self.catalog.clone();
        match parse_value(&catalog, Target::Defined(ty), content) {
            Ok(value) => Item::Value(Value::wrapped(catalog.type_name(ty), value)),
            Err(e) => {
                self.diagnose(ReadDiagnostic::warning(format!("{path}: {e}")));
                Item::Skipped
            }
        }
    }

    /// Element text of an entity goes to its content field.
    fn read_content(&mut self, entity: EntityId, ty: TypeId, content: &str, path: &str) {
        if content.trim().is_empty() {
            return;
        }
        let catalog = self.catalog.clone();
        match catalog.text_field(ty) {
            Some(field) => {
                let result = parse_value(&catalog, catalog.field(field).target(), content)
                    .and_then(|value| self.graph.set(entity, field, value));
                if let Err(e) = result {
                    self.diagnose(ReadDiagnostic::warning(format!("{path}: {e}")));
                }
            }
            None => self.diagnose(ReadDiagnostic::warning(format!(
                "{path}: '{}' has no text field",
                catalog.type_name(ty)
            ))),
        }
    }

    fn read_field_text(&mut self, owner: EntityId, field: FieldId, content: &str, path: &str) {
        let catalog = self.catalog.clone();
        let descriptor = catalog.field(field);
        let target = descriptor.target();
        let result = if !descriptor.is_collection() {
            parse_value(&catalog, target, content)
                .and_then(|value| self.graph.set(owner, field, value))
        } else if is_free_text(&catalog, target) {
            // One element per item
            parse_value(&catalog, target, content)
                .and_then(|value| self.graph.add(owner, field, value))
        } else {
            parse_list(&catalog, target, content)
                .and_then(|value| self.graph.set(owner, field, value))
        };
        if let Err(e) = result {
            self.diagnose(ReadDiagnostic::warning(format!("{path}: {e}")));
        }
    }

    fn reference(&self, id: &str) -> Item {
        match self.instances.get(id) {
            Some(entity) => Item::Value(Value::Ref(*entity)),
            None => Item::Pending(id.to_string()),
        }
    }

    fn read_attribute(&mut self, entity: EntityId, ty: TypeId, key: &str, text: &str, path: &str) {
        let catalog = self.catalog.clone();
        let Some(field) = catalog.field_by_name(ty, key) else {
            self.diagnose(ReadDiagnostic::warning(format!(
                "{path}: unknown attribute '{key}'"
            )));
            return;
        };
        let descriptor = catalog.field(field);
        let result = if !descriptor.target().is_value() {
            Err(DocGraphError::Value(format!(
                "'{key}' refers to entities and cannot be an attribute"
            )))
        } else if descriptor.is_collection() {
            parse_list(&catalog, descriptor.target(), text)
        } else {
            parse_value(&catalog, descriptor.target(), text)
        };
        if let Err(e) = result.and_then(|value| self.graph.set(entity, field, value)) {
            self.diagnose(ReadDiagnostic::warning(format!("{path}@{key}: {e}")));
        }
    }

    pub fn assign_item(&mut self, owner: EntityId, field: FieldId, item: Item, path: &str) {
        let collection = self.catalog.field(field).is_collection();
        let result = match item {
            Item::Skipped => Ok(()),
            Item::Pending(id) => {
                self.deferred.queue(id, owner, field, &mut self.graph);
                Ok(())
            }
            Item::Value(value) if collection => self.graph.add(owner, field, value),
            Item::Value(value) => self.graph.set(owner, field, value),
        };
        if let Err(e) = result {
            self.diagnose(ReadDiagnostic::warning(format!("{path}: {e}")));
        }
    }

    /// Resolve what is left, rebuild inverses and hand the graph over. The root is also
    /// registered under the empty id.
    pub fn finish(self, root: EntityId) -> ReadOutcome {
        let XmlReader {
            mut graph,
            deferred,
            mut instances,
            mut diagnostics,
            ..
        } = self;
        diagnostics.extend(deferred.finish(&mut graph));
        graph.rebuild_inverses();
        instances.insert(String::new(), root);
        tracing::debug!(
            "[XmlReader] Read {} entities ({} with ids), {} diagnostics",
            graph.len(),
            instances.len(),
            diagnostics.len()
        );
        ReadOutcome {
            graph,
            root,
            instances,
            diagnostics,
            schema_identifier: None,
        }
    }
}
