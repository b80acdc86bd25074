//! Two-pass exchange-structure writer.
//!
//! Pass 1 runs the record traversal against a sink to count references. Numbers are then
//! allocated in visitation order for the root, every shared object and every object only
//! reachable through an inverse field. Pass 2 runs the same traversal for real: numbered
//! objects become `#n` references and their own lines, everything else is written inline.
//!
//! Inline nesting is capped at [`MAX_INLINE_DEPTH`]: an object first met below that depth is
//! numbered and traversed again from the top, so long single-reference chains come out as a
//! series of records instead of one ever deeper line.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    io::{self, Write},
};

use super::{
    header::StepHeader,
    lexer::{encode_string, format_real},
};
use crate::{
    codec::ObjectStore,
    error::DocGraphError,
    graph::{EntityId, Graph, Value},
    schema::{Catalog, FieldId, Target},
};

/// Deepest chain of objects written inside one record.
pub(crate) const MAX_INLINE_DEPTH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    Discover,
    Emit,
}

pub(crate) struct StepWriter<'g> {
    graph: &'g Graph,
    catalog: &'g Catalog,
    store: ObjectStore,
    visited: Vec<EntityId>,
    inverse_candidates: Vec<EntityId>,
    inverse_only: HashSet<EntityId>,
    /// Objects met too deep to inline, in the order they were met
    promoted: Vec<EntityId>,
    depth: usize,
    numbers: HashMap<EntityId, u64>,
    queue: VecDeque<EntityId>,
    queued: HashSet<EntityId>,
}

impl<'g> StepWriter<'g> {
    pub fn new(graph: &'g Graph) -> Self {
        StepWriter {
            graph,
            catalog: graph.catalog(),
            store: ObjectStore::new(false),
            visited: Vec::new(),
            inverse_candidates: Vec::new(),
            inverse_only: HashSet::new(),
            promoted: Vec::new(),
            depth: 0,
            numbers: HashMap::new(),
            queue: VecDeque::new(),
            queued: HashSet::new(),
        }
    }

    pub fn write(
        mut self,
        header: &StepHeader,
        root: EntityId,
        out: &mut dyn Write,
    ) -> Result<(), DocGraphError> {
        self.discover(root)?;
        self.allocate_numbers(root);
        tracing::debug!(
            "[StepWriter] {} objects visited, {} numbered",
            self.visited.len(),
            self.numbers.len()
        );

        header.write(out)?;
        writeln!(out, "DATA;")?;
        self.enqueue(root);
        loop {
            while let Some(obj) = self.queue.pop_front() {
                self.write_line(obj, out)?;
            }
            // Numbered objects the root's lines never mention
            let mut rest: Vec<(u64, EntityId)> = self
                .numbers
                .iter()
                .filter(|(obj, _)| !self.queued.contains(*obj))
                .map(|(obj, n)| (*n, *obj))
                .collect();
            if rest.is_empty() {
                break;
            }
            rest.sort();
            for (_, obj) in rest {
                self.enqueue(obj);
            }
        }
        writeln!(out, "ENDSEC;")?;
        writeln!(out, "END-ISO-10303-21;")?;
        Ok(())
    }

    fn discover(&mut self, root: EntityId) -> Result<(), DocGraphError> {
        let mut sink = io::sink();
        self.visit(root, &mut sink)?;
        let mut next_promoted = 0;
        loop {
            while let Some(obj) = self.promoted.get(next_promoted).copied() {
                next_promoted += 1;
                self.traverse(obj, &mut sink, 1)?;
            }
            if self.inverse_candidates.is_empty() {
                break;
            }
            let candidates = std::mem::take(&mut self.inverse_candidates);
            for obj in candidates {
                if self.store.refcount(obj) == 0 {
                    self.inverse_only.insert(obj);
                    self.visit(obj, &mut sink)?;
                }
            }
        }
        if !self.promoted.is_empty() {
            tracing::debug!(
                "[StepWriter] {} objects nested deeper than {} got records of their own",
                self.promoted.len(),
                MAX_INLINE_DEPTH
            );
        }
        Ok(())
    }

    fn visit(&mut self, obj: EntityId, sink: &mut dyn Write) -> Result<(), DocGraphError> {
        if self.store.log_visit(self.graph, obj) == 1 {
            self.visited.push(obj);
            if self.depth >= MAX_INLINE_DEPTH {
                self.promoted.push(obj);
            } else {
                self.traverse(obj, sink, self.depth + 1)?;
            }
        }
        Ok(())
    }

    /// Discovery of `obj`'s arguments, `obj` itself sitting at `depth`.
    fn traverse(
        &mut self,
        obj: EntityId,
        sink: &mut dyn Write,
        depth: usize,
    ) -> Result<(), DocGraphError> {
        let outer = std::mem::replace(&mut self.depth, depth);
        let result = self.write_entity(obj, sink, Pass::Discover);
        self.depth = outer;
        result
    }

    fn allocate_numbers(&mut self, root: EntityId) {
        let promoted: HashSet<EntityId> = self.promoted.iter().copied().collect();
        let mut next = 1;
        for obj in &self.visited {
            if *obj == root
                || self.store.refcount(*obj) > 1
                || self.inverse_only.contains(obj)
                || promoted.contains(obj)
            {
                self.numbers.insert(*obj, next);
                next += 1;
            }
        }
    }

    fn enqueue(&mut self, obj: EntityId) {
        if self.queued.insert(obj) {
            self.queue.push_back(obj);
        }
    }

    fn write_line(&mut self, obj: EntityId, out: &mut dyn Write) -> Result<(), DocGraphError> {
        let number = self.numbers.get(&obj).copied().ok_or_else(|| {
            DocGraphError::Serialization(format!("entity {obj} has no record number"))
        })?;
        self.store.reference_id(obj);
        write!(out, "#{number}=")?;
        self.write_entity(obj, out, Pass::Emit)?;
        writeln!(out, ";")?;
        Ok(())
    }

    /// `TYPE(args)`. Shared by both passes.
    fn write_entity(
        &mut self,
        obj: EntityId,
        out: &mut dyn Write,
        pass: Pass,
    ) -> Result<(), DocGraphError> {
        let graph = self.graph;
        let catalog = self.catalog;
        let ty = graph.type_of(obj)?;
        write!(out, "{}(", catalog.type_name(ty).to_uppercase())?;
        for (i, slot) in catalog.ordered_fields(ty).iter().enumerate() {
            if i > 0 {
                write!(out, ",")?;
            }
            match slot {
                None => write!(out, "*")?,
                Some(field) => self.write_field(obj, *field, out, pass)?,
            }
        }
        write!(out, ")")?;

        if pass == Pass::Discover {
            for field in catalog.inverse_fields(ty) {
                self.inverse_candidates.extend(graph.refs(obj, *field));
            }
        }
        Ok(())
    }

    fn write_field(
        &mut self,
        obj: EntityId,
        field: FieldId,
        out: &mut dyn Write,
        pass: Pass,
    ) -> Result<(), DocGraphError> {
        let graph = self.graph;
        let descriptor = self.catalog.field(field);
        match graph.get(obj, field) {
            None | Some(Value::Null) if descriptor.is_collection() => write!(out, "()")?,
            None | Some(Value::Null) => write!(out, "$")?,
            Some(value) => self.write_value(descriptor.target(), value, out, pass)?,
        }
        Ok(())
    }

    fn write_value(
        &mut self,
        target: Target,
        value: &'g Value,
        out: &mut dyn Write,
        pass: Pass,
    ) -> Result<(), DocGraphError> {
        match value {
            Value::Null => write!(out, "$")?,
            Value::Boolean(true) | Value::Logical(Some(true)) => write!(out, ".T.")?,
            Value::Boolean(false) | Value::Logical(Some(false)) => write!(out, ".F.")?,
            Value::Logical(None) => write!(out, ".U.")?,
            Value::Integer(n) => write!(out, "{n}")?,
            Value::Real(n) => write!(out, "{}", format_real(*n))?,
            Value::String(s) => write!(out, "{}", encode_string(s))?,
            Value::Binary(bytes) => write!(out, "\"0{}\"", hex::encode_upper(bytes))?,
            Value::Guid(guid) => write!(out, "{}", encode_string(&guid.to_string()))?,
            Value::Enum(name) => write!(out, ".{}.", name.to_uppercase())?,
            Value::Wrapped { type_name, value } => {
                let inner = self
                    .catalog
                    .describe_type(type_name)
                    .map_or(target, |t| Target::Defined(t.id()));
                write!(out, "{}(", type_name.to_uppercase())?;
                self.write_value(inner, value, out, pass)?;
                write!(out, ")")?;
            }
            Value::Ref(obj) => self.write_ref(*obj, out, pass)?,
            Value::List(items) => {
                write!(out, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(out, ",")?;
                    }
                    self.write_value(target, item, out, pass)?;
                }
                write!(out, ")")?;
            }
        }
        Ok(())
    }

    fn write_ref(
        &mut self,
        obj: EntityId,
        out: &mut dyn Write,
        pass: Pass,
    ) -> Result<(), DocGraphError> {
        match pass {
            Pass::Discover => self.visit(obj, out),
            Pass::Emit => match self.numbers.get(&obj).copied() {
                Some(number) => {
                    write!(out, "#{number}")?;
                    self.enqueue(obj);
                    Ok(())
                }
                None => {
                    self.store.reference_id(obj);
                    self.write_entity(obj, out, Pass::Emit)
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::StepOptions,
        tests::{sample_widget, widget_catalog},
    };
    use std::sync::Arc;

    fn write(graph: &Graph, root: EntityId) -> String {
        let header = StepHeader::from_options(&StepOptions::default(), "WIDGET_SCHEMA_2_1");
        let mut buffer = Vec::new();
        StepWriter::new(graph)
            .write(&header, root, &mut buffer)
            .unwrap();
        String::from_utf8(buffer).unwrap()
    }

    fn data_lines(text: &str) -> Vec<&str> {
        text.lines().filter(|l| l.starts_with('#')).collect()
    }

    #[test]
    fn test_shared_objects_get_lines_single_refs_inline() {
        let (g, root) = sample_widget(Arc::new(widget_catalog()));
        let text = write(&g, root);
        let lines = data_lines(&text);
        assert_eq!(lines.len(), 2, "{text}");
        assert!(lines[0].starts_with("#1=WIDGET('W1',"));
        // The gear is referenced once and written in place, its hidden slot as `*`
        assert!(lines[0].contains("(GEAR('G1',*,12,2.),#2)"), "{}", lines[0]);
        assert!(lines[0].contains(",.BLUE.,(1,2,3),#2,"));
        assert!(lines[0].contains("LABEL('tall'),.U.,\"0DEADBEEF\");"));
        assert!(lines[0].contains("'Line one\\X2\\000A\\X0\\Line two'"));
        assert_eq!(lines[1], "#2=PART('P1',1.5);");
        assert!(text.ends_with("ENDSEC;\nEND-ISO-10303-21;\n"));
    }

    #[test]
    fn test_inverse_only_objects_are_written() {
        let (mut g, root) = sample_widget(Arc::new(widget_catalog()));
        let p1 = g.get_field(root, "Favorite").unwrap().as_ref_id().unwrap();
        let admirer = g.create("Widget").unwrap();
        g.set_field(admirer, "Name", "W2").unwrap();
        g.set_field(admirer, "Favorite", p1).unwrap();
        g.rebuild_inverses();

        let text = write(&g, root);
        let lines = data_lines(&text);
        assert_eq!(lines.len(), 3, "{text}");
        assert!(lines[2].starts_with("#3=WIDGET('W2',$,(),$,(),#2,"), "{}", lines[2]);
    }

    #[test]
    fn test_writing_twice_is_identical() {
        let (g, root) = sample_widget(Arc::new(widget_catalog()));
        assert_eq!(write(&g, root), write(&g, root));
    }
}
