//! Per-operation object identity bookkeeping shared by the two writer passes.
//!
//! The discovery pass calls [`ObjectStore::log_visit`] once per reference to count how often
//! each entity is reachable. The emission pass then asks [`ObjectStore::reference_id`] at every
//! point of use: the first call inlines the entity, later calls get its id. Records are keyed by
//! [`EntityId`], so both passes agree on every id without hashing entity contents.

use std::collections::{HashMap, HashSet};

use crate::graph::{EntityId, Graph, Value};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityRecord {
    /// Visitation order, starting at 1
    pub sequence: usize,
    pub id: String,
    pub refcount: u32,
    pub serialized: bool,
}

#[derive(Debug, Default)]
pub struct ObjectStore {
    use_unique_id_references: bool,
    records: HashMap<EntityId, IdentityRecord>,
    taken: HashSet<String>,
}

impl ObjectStore {
    pub fn new(use_unique_id_references: bool) -> Self {
        ObjectStore {
            use_unique_id_references,
            records: HashMap::new(),
            taken: HashSet::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Count one more reference to `obj` and return the new count.
    pub fn log_visit(&mut self, graph: &Graph, obj: EntityId) -> u32 {
        if let Some(record) = self.records.get_mut(&obj) {
            record.refcount += 1;
            return record.refcount;
        }
        self.insert(graph, obj, 1, false);
        1
    }

    pub fn record(&self, obj: EntityId) -> Option<&IdentityRecord> {
        self.records.get(&obj)
    }

    /// Zero for objects never visited.
    pub fn refcount(&self, obj: EntityId) -> u32 {
        self.records.get(&obj).map_or(0, |r| r.refcount)
    }

    pub fn sequence(&self, obj: EntityId) -> Option<usize> {
        self.records.get(&obj).map(|r| r.sequence)
    }

    /// The id of a shared object that has already been written once.
    pub fn serialized_id(&self, obj: EntityId) -> Option<&str> {
        self.records
            .get(&obj)
            .filter(|r| r.refcount > 1 && r.serialized)
            .map(|r| r.id.as_str())
    }

    /// Mark `obj` serialized and return its id if it is shared. Unvisited objects get `None`.
    pub fn reference_id(&mut self, obj: EntityId) -> Option<String> {
        let record = self.records.get_mut(&obj)?;
        record.serialized = true;
        (record.refcount > 1).then(|| record.id.clone())
    }

    pub fn is_serialized(&self, obj: EntityId) -> bool {
        self.records.get(&obj).is_some_and(|r| r.serialized)
    }

    /// Unseen objects are recorded as shared so that later occurrences refer to them by id.
    pub fn mark_serialized(&mut self, graph: &Graph, obj: EntityId) {
        self.set_serialized(graph, obj, true);
    }

    pub fn unmark_serialized(&mut self, graph: &Graph, obj: EntityId) {
        self.set_serialized(graph, obj, false);
    }

    /// Treat `obj` as shared even if discovery saw it only once, so that it is written with an
    /// id and referred to by it.
    pub fn share(&mut self, graph: &Graph, obj: EntityId) {
        match self.records.get_mut(&obj) {
            Some(record) => record.refcount = record.refcount.max(2),
            None => self.insert(graph, obj, 2, false),
        }
    }

    fn set_serialized(&mut self, graph: &Graph, obj: EntityId, serialized: bool) {
        match self.records.get_mut(&obj) {
            Some(record) => record.serialized = serialized,
            None => self.insert(graph, obj, 2, serialized),
        }
    }

    fn insert(&mut self, graph: &Graph, obj: EntityId, refcount: u32, serialized: bool) {
        let sequence = self.records.len() + 1;
        let fallback = format!("i{sequence}");
        let mut id = if self.use_unique_id_references {
            identity_value(graph, obj)
                .and_then(|raw| sanitize_id(&raw))
                .unwrap_or(fallback)
        } else {
            fallback
        };
        if self.taken.contains(&id) {
            let duplicate = id.clone();
            id = format!("{id}_{sequence}");
            tracing::debug!(
                "[ObjectStore] Id '{}' is already taken, using '{}'",
                duplicate,
                id
            );
        }
        self.taken.insert(id.clone());
        self.records.insert(
            obj,
            IdentityRecord {
                sequence,
                id,
                refcount,
                serialized,
            },
        );
    }
}

/// The entity's identity-rule fields as text, joined with `_`. `None` when all are empty.
pub fn identity_value(graph: &Graph, obj: EntityId) -> Option<String> {
    let ty = graph.type_of(obj).ok()?;
    let parts: Vec<String> = graph
        .catalog()
        .type_by_id(ty)
        .identity_fields()
        .iter()
        .filter_map(|f| graph.get(obj, *f))
        .filter_map(identity_text)
        .filter(|text| !text.is_empty())
        .collect();
    (!parts.is_empty()).then(|| parts.join("_"))
}

fn identity_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) | Value::Enum(s) => Some(s.clone()),
        Value::Guid(g) => Some(g.to_string()),
        Value::Integer(n) => Some(n.to_string()),
        Value::Wrapped { value, .. } => identity_text(value),
        _ => None,
    }
}

/// Reduce free text to an XML-safe identifier: whitespace runs become `_`, anything outside
/// `[0-9A-Za-z_]` is dropped, and a leading digit or `$`, `-`, `.` gets an `x` prefix.
pub fn sanitize_id(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let mut out = String::with_capacity(trimmed.len());
    let mut in_space = false;
    for c in trimmed.chars() {
        if c.is_whitespace() {
            if !in_space {
                out.push('_');
            }
            in_space = true;
            continue;
        }
        in_space = false;
        if c.is_ascii_alphanumeric() || c == '_' {
            out.push(c);
        }
    }
    if out.is_empty() {
        return None;
    }
    let reserved = trimmed.starts_with(['$', '-', '.']);
    if reserved || out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, 'x');
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{sample_widget, widget_catalog};
    use std::sync::Arc;

    #[test]
    fn test_sanitize_id() {
        assert_eq!(sanitize_id("P1").as_deref(), Some("P1"));
        assert_eq!(sanitize_id("  Wall  Type ").as_deref(), Some("Wall_Type"));
        assert_eq!(sanitize_id("3rd:item").as_deref(), Some("x3rditem"));
        assert_eq!(sanitize_id("$ref").as_deref(), Some("xref"));
        assert_eq!(sanitize_id("-12").as_deref(), Some("x12"));
        assert_eq!(sanitize_id("!!!"), None);
    }

    #[test]
    fn test_log_visit_counts_and_ids() {
        let (g, widget) = sample_widget(Arc::new(widget_catalog()));
        let parts = g.get_field(widget, "Parts").unwrap().refs();
        let mut store = ObjectStore::new(true);

        assert_eq!(store.log_visit(&g, widget), 1);
        assert_eq!(store.log_visit(&g, parts[1]), 1);
        assert_eq!(store.log_visit(&g, parts[1]), 2);
        assert_eq!(store.record(parts[1]).unwrap().id, "P1");
        assert_eq!(store.sequence(parts[1]), Some(2));
        // GUID text starts with a digit once the hyphens are stripped
        assert!(store.record(widget).unwrap().id.starts_with("x0f1e2d3c"));

        let mut plain = ObjectStore::new(false);
        plain.log_visit(&g, widget);
        plain.log_visit(&g, parts[1]);
        assert_eq!(plain.record(parts[1]).unwrap().id, "i2");
    }

    #[test]
    fn test_reference_id_inlines_first_then_refers() {
        let (g, widget) = sample_widget(Arc::new(widget_catalog()));
        let parts = g.get_field(widget, "Parts").unwrap().refs();
        let mut store = ObjectStore::new(true);
        store.log_visit(&g, widget);
        store.log_visit(&g, parts[0]);
        store.log_visit(&g, parts[1]);
        store.log_visit(&g, parts[1]);

        // Single-reference objects never get an id
        assert_eq!(store.reference_id(parts[0]), None);
        assert!(store.is_serialized(parts[0]));

        assert_eq!(store.serialized_id(parts[1]), None);
        assert_eq!(store.reference_id(parts[1]).as_deref(), Some("P1"));
        assert_eq!(store.serialized_id(parts[1]), Some("P1"));
    }

    #[test]
    fn test_unvisited_object_is_not_serialized() {
        let (g, widget) = sample_widget(Arc::new(widget_catalog()));
        let mut store = ObjectStore::new(true);
        assert_eq!(store.reference_id(widget), None);
        assert_eq!(store.serialized_id(widget), None);
        assert_eq!(store.refcount(widget), 0);
        assert!(store.is_empty());

        store.mark_serialized(&g, widget);
        assert_eq!(store.refcount(widget), 2);
        assert!(store.serialized_id(widget).is_some());
        store.unmark_serialized(&g, widget);
        assert!(!store.is_serialized(widget));
    }

    #[test]
    fn test_share_gives_single_references_an_id() {
        let (g, widget) = sample_widget(Arc::new(widget_catalog()));
        let parts = g.get_field(widget, "Parts").unwrap().refs();
        let mut store = ObjectStore::new(true);
        store.log_visit(&g, parts[1]);
        store.share(&g, parts[1]);
        assert_eq!(store.refcount(parts[1]), 2);
        assert_eq!(store.reference_id(parts[1]).as_deref(), Some("P1"));

        // Counts above two are left alone
        for _ in 0..3 {
            store.log_visit(&g, parts[0]);
        }
        store.share(&g, parts[0]);
        assert_eq!(store.refcount(parts[0]), 3);
    }

    #[test]
    fn test_duplicate_ids_are_disambiguated() {
        let mut g = crate::graph::Graph::new(Arc::new(widget_catalog()));
        let a = g.create("Part").unwrap();
        let b = g.create("Part").unwrap();
        g.set_field(a, "Code", "P1").unwrap();
        g.set_field(b, "Code", "P1").unwrap();
        let mut store = ObjectStore::new(true);
        store.log_visit(&g, a);
        store.log_visit(&g, b);
        assert_eq!(store.record(a).unwrap().id, "P1");
        assert_eq!(store.record(b).unwrap().id, "P1_2");
    }
}
