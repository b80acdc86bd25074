use quick_xml::{
    events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event},
    Writer,
};
use std::{
    collections::HashSet,
    io::{self, Write},
};

use super::reader::WRAPPER_SUFFIX;
use crate::{
    codec::{
        text::{format_list, format_value, is_free_text},
        ObjectStore,
    },
    config::{XmlOptions, XSI_NAMESPACE},
    error::DocGraphError,
    graph::{EntityId, Graph, Value},
    schema::{Catalog, FieldId, Primitive, Target, XmlPlacement},
};

/// Deepest chain of entity elements written inside one another. An object first met below it
/// is referred to by `href` and written after the document element's own children.
const MAX_INLINE_DEPTH: usize = 64;

/// Emission follows discovery, but the folder layout reorders documents; past this the writer
/// gives up instead of overflowing the stack.
const MAX_EMIT_DEPTH: usize = 4 * MAX_INLINE_DEPTH;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    Discover,
    Emit,
}

/// Writes entities as nested elements. One writer may emit several documents (the folder
/// layout does); they share one [`ObjectStore`] so ids stay consistent across files.
pub(crate) struct XmlWriter<'g> {
    graph: &'g Graph,
    catalog: &'g Catalog,
    options: XmlOptions,
    store: ObjectStore,
    inverse_candidates: Vec<EntityId>,
    /// Written after the document element's children: objects only reachable through an
    /// inverse field and objects met too deep to inline
    detached: Vec<EntityId>,
    promoted: HashSet<EntityId>,
    depth: usize,
    /// Fields stored outside the document, e.g. as folder entries or sidecar files
    excluded: HashSet<(EntityId, FieldId)>,
}

impl<'g> XmlWriter<'g> {
    pub fn new(graph: &'g Graph, options: XmlOptions, use_unique_id_references: bool) -> Self {
        XmlWriter {
            graph,
            catalog: graph.catalog(),
            options,
            store: ObjectStore::new(use_unique_id_references),
            inverse_candidates: Vec::new(),
            detached: Vec::new(),
            promoted: HashSet::new(),
            depth: 0,
            excluded: HashSet::new(),
        }
    }

    pub fn store_mut(&mut self) -> &mut ObjectStore {
        &mut self.store
    }

    pub fn store(&self) -> &ObjectStore {
        &self.store
    }

    pub fn exclude(&mut self, obj: EntityId, field: FieldId) {
        self.excluded.insert((obj, field));
    }

    /// Pass 1: count references from `root`, then from every detached object, in the order
    /// emission will write them.
    pub fn discover(&mut self, root: EntityId) -> Result<(), DocGraphError> {
        let mut sink = Writer::new(io::sink());
        let name = self.type_name(root)?;
        self.write_ref(&mut sink, name, root, false, Pass::Discover)?;
        let mut next_detached = 0;
        loop {
            while let Some(obj) = self.detached.get(next_detached).copied() {
                next_detached += 1;
                let name = self.type_name(obj)?;
                self.write_entity(&mut sink, name, obj, false, Pass::Discover, false, false)?;
            }
            if self.inverse_candidates.is_empty() {
                break;
            }
            let candidates = std::mem::take(&mut self.inverse_candidates);
            for obj in candidates {
                if self.store.refcount(obj) == 0 {
                    self.store.log_visit(self.graph, obj);
                    self.detached.push(obj);
                }
            }
        }
        tracing::debug!(
            "[XmlWriter] Discovered {} objects, {} detached ({} nested too deep)",
            self.store.len(),
            self.detached.len(),
            self.promoted.len()
        );
        Ok(())
    }

    /// Pass 2: one document whose element is `obj`. Detached objects are appended under the
    /// document element when `with_detached` is set.
    pub fn write_document<W: Write>(
        &mut self,
        out: W,
        obj: EntityId,
        with_detached: bool,
    ) -> Result<(), DocGraphError> {
        let mut xml = Writer::new_with_indent(out, b' ', 2);
        xml.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
        let name = self.type_name(obj)?;
        self.write_entity(&mut xml, name, obj, false, Pass::Emit, true, with_detached)?;
        xml.into_inner().write_all(b"\n")?;
        Ok(())
    }

    fn type_name(&self, obj: EntityId) -> Result<&'g str, DocGraphError> {
        let ty = self.graph.type_of(obj)?;
        Ok(self.catalog.type_name(ty))
    }

    fn write_ref<W: Write>(
        &mut self,
        xml: &mut Writer<W>,
        name: &str,
        obj: EntityId,
        with_type: bool,
        pass: Pass,
    ) -> Result<(), DocGraphError> {
        match pass {
            Pass::Discover => {
                if self.store.log_visit(self.graph, obj) == 1 {
                    if self.depth >= MAX_INLINE_DEPTH {
                        self.store.share(self.graph, obj);
                        self.promoted.insert(obj);
                        self.detached.push(obj);
                    } else {
                        self.write_entity(xml, name, obj, with_type, pass, false, false)?;
                    }
                }
                Ok(())
            }
            Pass::Emit => {
                let id = match self.store.serialized_id(obj) {
                    Some(id) => Some(id),
                    // Written in full among the detached objects
                    None if self.promoted.contains(&obj) => {
                        self.store.record(obj).map(|r| r.id.as_str())
                    }
                    None => None,
                };
                match id {
                    Some(id) => {
                        let mut reference = BytesStart::new(name);
                        reference.push_attribute(("xsi:nil", "true"));
                        reference.push_attribute(("href", id));
                        xml.write_event(Event::Empty(reference))?;
                        Ok(())
                    }
                    None => self.write_entity(xml, name, obj, with_type, pass, false, false),
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn write_entity<W: Write>(
        &mut self,
        xml: &mut Writer<W>,
        name: &str,
        obj: EntityId,
        with_type: bool,
        pass: Pass,
        document: bool,
        with_detached: bool,
    ) -> Result<(), DocGraphError> {
        if self.depth >= MAX_EMIT_DEPTH {
            return Err(DocGraphError::Serialization(format!(
                "entity {obj} is nested more than {MAX_EMIT_DEPTH} elements deep"
            )));
        }
        self.depth += 1;
        let result =
            self.write_entity_body(xml, name, obj, with_type, pass, document, with_detached);
        self.depth -= 1;
        result
    }

    #[allow(clippy::too_many_arguments)]
    fn write_entity_body<W: Write>(
        &mut self,
        xml: &mut Writer<W>,
        name: &str,
        obj: EntityId,
        with_type: bool,
        pass: Pass,
        document: bool,
        with_detached: bool,
    ) -> Result<(), DocGraphError> {
        let graph = self.graph;
        let catalog = self.catalog;
        let ty = graph.type_of(obj)?;

        let mut start = BytesStart::new(name);
        if document {
            start.push_attribute(("xmlns:xsi", XSI_NAMESPACE));
            if let Some(namespace) = &self.options.namespace {
                start.push_attribute(("xmlns", namespace.as_str()));
            }
            if let Some(location) = &self.options.schema_location {
                start.push_attribute(("xsi:schemaLocation", location.as_str()));
            }
        }
        if pass == Pass::Emit {
            if let Some(id) = self.store.reference_id(obj) {
                start.push_attribute(("id", id.as_str()));
            }
        }
        if with_type {
            start.push_attribute(("xsi:type", catalog.type_name(ty)));
        }

        let mut elements = Vec::new();
        let mut content = None;
        for field in catalog.forward_fields(ty) {
            if self.excluded.contains(&(obj, field)) {
                continue;
            }
            let descriptor = catalog.field(field);
            let target = descriptor.target();
            let value = graph.get(obj, field);
            match descriptor.xml_placement() {
                XmlPlacement::Hidden => {}
                XmlPlacement::Content if target.is_value() => {
                    content = value.and_then(|v| format_value(catalog, target, v));
                }
                XmlPlacement::Default | XmlPlacement::Attribute
                    if target.is_value()
                        && !(descriptor.is_collection() && is_free_text(catalog, target)) =>
                {
                    let text = match value {
                        Some(Value::List(items)) if !items.is_empty() => {
                            Some(format_list(catalog, target, items))
                        }
                        Some(Value::List(_)) => None,
                        Some(v) => format_value(catalog, target, v),
                        None => None,
                    };
                    match text {
                        Some(text) => start.push_attribute((descriptor.xml_name(), text.as_str())),
                        None if descriptor.is_required()
                            && target == Target::Primitive(Primitive::String) =>
                        {
                            start.push_attribute((descriptor.xml_name(), ""))
                        }
                        None => {}
                    }
                }
                _ => {
                    let empty = value.map_or(true, Value::is_empty);
                    if !empty || (descriptor.is_required() && descriptor.is_collection()) {
                        elements.push(field);
                    }
                }
            }
        }
        for field in catalog.inverse_fields(ty) {
            let descriptor = catalog.field(*field);
            if descriptor.xml_placement() == XmlPlacement::Element {
                if !graph.get(obj, *field).map_or(true, Value::is_empty) {
                    elements.push(*field);
                }
            } else if pass == Pass::Discover {
                self.inverse_candidates.extend(graph.refs(obj, *field));
            }
        }
        let detached: Vec<EntityId> = if with_detached {
            self.detached
                .iter()
                .copied()
                .filter(|d| !self.store.is_serialized(*d))
                .collect()
        } else {
            Vec::new()
        };

        if elements.is_empty() && content.is_none() && detached.is_empty() {
            xml.write_event(Event::Empty(start))?;
            return Ok(());
        }
        xml.write_event(Event::Start(start))?;
        if let Some(text) = content {
            xml.write_event(Event::Text(BytesText::new(&text)))?;
        }
        for field in elements {
            self.write_element_field(xml, obj, field, pass)?;
        }
        for obj in detached {
            if self.store.is_serialized(obj) {
                continue;
            }
            let name = self.type_name(obj)?;
            self.write_entity(xml, name, obj, false, pass, false, false)?;
        }
        xml.write_event(Event::End(BytesEnd::new(name)))?;
        Ok(())
    }

    fn write_element_field<W: Write>(
        &mut self,
        xml: &mut Writer<W>,
        obj: EntityId,
        field: FieldId,
        pass: Pass,
    ) -> Result<(), DocGraphError> {
        let graph = self.graph;
        let catalog = self.catalog;
        let descriptor = catalog.field(field);
        let name = descriptor.xml_name();
        let target = descriptor.target();
        let value = graph.get(obj, field);

        if target.is_value() {
            if let Some(Value::List(items)) = value {
                if is_free_text(catalog, target) {
                    for item in items {
                        let text = format_value(catalog, target, item).unwrap_or_default();
                        write_text_element(xml, name, &text)?;
                    }
                    return Ok(());
                }
            }
            let text = match value {
                Some(Value::List(items)) => format_list(catalog, target, items),
                Some(v) => format_value(catalog, target, v).unwrap_or_default(),
                None => String::new(),
            };
            return write_text_element(xml, name, &text);
        }

        let items: Vec<&'g Value> = match value {
            Some(Value::List(items)) => items.iter().collect(),
            Some(Value::Null) | None => Vec::new(),
            Some(v) => vec![v],
        };
        if descriptor.is_tagless() || descriptor.xml_placement() == XmlPlacement::Attribute {
            for item in items {
                self.write_item(xml, Some(name), item, pass)?;
            }
            return Ok(());
        }
        if items.is_empty() {
            xml.write_event(Event::Empty(BytesStart::new(name)))?;
            return Ok(());
        }
        xml.write_event(Event::Start(BytesStart::new(name)))?;
        for item in items {
            self.write_item(xml, None, item, pass)?;
        }
        xml.write_event(Event::End(BytesEnd::new(name)))?;
        Ok(())
    }

    /// An entity or defined value held by an entity-typed field. With `tag` the element is
    /// named after the field and carries `xsi:type`; otherwise it is named after the type.
    fn write_item<W: Write>(
        &mut self,
        xml: &mut Writer<W>,
        tag: Option<&str>,
        item: &'g Value,
        pass: Pass,
    ) -> Result<(), DocGraphError> {
        match item {
            Value::Ref(obj) => {
                let name = match tag {
                    Some(tag) => tag,
                    None => self.type_name(*obj)?,
                };
                self.write_ref(xml, name, *obj, tag.is_some(), pass)
            }
            Value::Wrapped { type_name, value } => {
                let target = self
                    .catalog
                    .describe_type(type_name)
                    .map_or(Target::Primitive(Primitive::String), |t| {
                        Target::Defined(t.id())
                    });
                let text = format_value(self.catalog, target, value).unwrap_or_default();
                match tag {
                    Some(tag) => {
                        let mut start = BytesStart::new(tag);
                        start.push_attribute(("xsi:type", type_name.as_str()));
                        xml.write_event(Event::Start(start))?;
                        xml.write_event(Event::Text(BytesText::new(&text)))?;
                        xml.write_event(Event::End(BytesEnd::new(tag)))?;
                        Ok(())
                    }
                    None => {
                        write_text_element(xml, &format!("{type_name}{WRAPPER_SUFFIX}"), &text)
                    }
                }
            }
            _ => Ok(()),
        }
    }
}

fn write_text_element<W: Write>(
    xml: &mut Writer<W>,
    name: &str,
    text: &str,
) -> Result<(), DocGraphError> {
    if text.is_empty() {
        xml.write_event(Event::Empty(BytesStart::new(name)))?;
    } else {
        xml.write_event(Event::Start(BytesStart::new(name)))?;
        xml.write_event(Event::Text(BytesText::new(text)))?;
        xml.write_event(Event::End(BytesEnd::new(name)))?;
    }
    Ok(())
}
