//! Forward-reference resolution for readers.
//!
//! A reader that meets a reference to an id it has not yet materialized queues the owning
//! (entity, field) under that id. Once the referenced entity is read, [`DeferredRefs::dequeue`]
//! replays every pending assignment. Collection fields reserve a placeholder slot at queue time
//! so the final element order matches the input.

use std::collections::{BTreeMap, BTreeSet};

use super::diagnostic::{DanglingReference, ReadDiagnostic};
use crate::{
    graph::{EntityId, Graph, Value},
    schema::FieldId,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRef {
    pub owner: EntityId,
    pub field: FieldId,
    /// Placeholder index for collection fields
    pub slot: Option<usize>,
}

#[derive(Debug, Default)]
pub struct DeferredRefs {
    pending: BTreeMap<String, Vec<PendingRef>>,
    /// Collections holding at least one placeholder
    reserved: BTreeSet<(EntityId, FieldId)>,
    diagnostics: Vec<ReadDiagnostic>,
}

impl DeferredRefs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `owner.field` refers to the not-yet-seen `id`. For collection fields a
    /// placeholder is reserved in the graph and its index kept with the entry.
    pub fn queue(
        &mut self,
        id: impl Into<String>,
        owner: EntityId,
        field: FieldId,
        graph: &mut Graph,
    ) {
        let id = id.into();
        let slot = if graph.catalog().field(field).is_collection() {
            match graph.reserve_slot(owner, field) {
                Ok(slot) => {
                    self.reserved.insert((owner, field));
                    Some(slot)
                }
                Err(e) => {
                    self.diagnostics
                        .push(ReadDiagnostic::warning(format!("cannot queue '{id}': {e}")));
                    return;
                }
            }
        } else {
            None
        };
        tracing::trace!("[DeferredRefs::queue] {} <- {} (slot {:?})", id, owner, slot);
        self.pending
            .entry(id)
            .or_default()
            .push(PendingRef { owner, field, slot });
    }

    pub fn is_pending(&self, id: &str) -> bool {
        self.pending.contains_key(id)
    }

    /// Number of (owner, field) pairs still waiting.
    pub fn pending_count(&self) -> usize {
        self.pending.values().map(Vec::len).sum()
    }

    /// Apply every assignment waiting on `id` and forget the id. Returns how many were applied.
    pub fn dequeue(&mut self, id: &str, target: EntityId, graph: &mut Graph) -> usize {
        let Some(entries) = self.pending.remove(id) else {
            return 0;
        };
        let mut applied = 0;
        for entry in entries {
            let result = match entry.slot {
                Some(slot) => graph.fill_slot(entry.owner, entry.field, slot, Value::Ref(target)),
                None => graph.set(entry.owner, entry.field, Value::Ref(target)),
            };
            match result {
                Ok(()) => applied += 1,
                Err(e) => {
                    tracing::warn!("[DeferredRefs::dequeue] Dropping reference to '{}': {}", id, e);
                    self.diagnostics.push(ReadDiagnostic::warning(format!(
                        "reference to '{id}' dropped: {e}"
                    )));
                }
            }
        }
        applied
    }

    /// Drop what is still pending, remove unfilled placeholders and report each dropped
    /// assignment as a dangling reference.
    pub fn finish(self, graph: &mut Graph) -> Vec<ReadDiagnostic> {
        let DeferredRefs {
            pending,
            reserved,
            mut diagnostics,
        } = self;
        for (id, entries) in pending {
            tracing::warn!(
                "[DeferredRefs::finish] Dangling reference '{}' ({} pending)",
                id,
                entries.len()
            );
            for entry in entries {
                let owner_type = graph
                    .type_name(entry.owner)
                    .map(str::to_string)
                    .unwrap_or_default();
                let field = graph.catalog().field(entry.field).name().to_string();
                diagnostics.push(ReadDiagnostic::DanglingReference(DanglingReference {
                    id: id.clone(),
                    owner_type,
                    field,
                    owner: Some(entry.owner),
                }));
            }
        }
        // Also covers slots whose fill was rejected or was a duplicate set member
        for (owner, field) in reserved {
            graph.purge_placeholders(owner, field);
        }
        diagnostics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::widget_catalog;
    use std::sync::Arc;

    #[test]
    fn test_multiple_owners_resolve_in_order() {
        let mut g = Graph::new(Arc::new(widget_catalog()));
        let w1 = g.create("Widget").unwrap();
        let w2 = g.create("Widget").unwrap();
        let parts = g.field_id(w1, "Parts").unwrap();
        let favorite = g.field_id(w1, "Favorite").unwrap();
        let early = g.create("Part").unwrap();

        let mut deferred = DeferredRefs::new();
        deferred.queue("#9", w1, parts, &mut g);
        g.add(w1, parts, Value::Ref(early)).unwrap();
        deferred.queue("#9", w2, favorite, &mut g);
        assert_eq!(deferred.pending_count(), 2);

        let late = g.create("Part").unwrap();
        assert_eq!(deferred.dequeue("#9", late, &mut g), 2);
        assert!(!deferred.is_pending("#9"));
        assert_eq!(g.refs(w1, parts), vec![late, early]);
        assert_eq!(g.get(w2, favorite), Some(&Value::Ref(late)));

        // A second dequeue of the same id is a no-op
        assert_eq!(deferred.dequeue("#9", early, &mut g), 0);
        assert!(deferred.finish(&mut g).is_empty());
    }

    #[test]
    fn test_finish_reports_and_purges_dangling() {
        let mut g = Graph::new(Arc::new(widget_catalog()));
        let widget = g.create("Widget").unwrap();
        let parts = g.field_id(widget, "Parts").unwrap();
        let part = g.create("Part").unwrap();

        let mut deferred = DeferredRefs::new();
        deferred.queue("#404", widget, parts, &mut g);
        g.add(widget, parts, Value::Ref(part)).unwrap();

        let diagnostics = deferred.finish(&mut g);
        assert_eq!(diagnostics.len(), 1);
        let dangling = diagnostics[0].as_dangling_reference().unwrap();
        assert_eq!(dangling.id, "#404");
        assert_eq!(dangling.field, "Parts");
        assert_eq!(g.refs(widget, parts), vec![part]);
        assert_eq!(g.get(widget, parts).unwrap().as_list().unwrap().len(), 1);
    }

    #[test]
    fn test_type_mismatch_is_reported_not_fatal() {
        let mut g = Graph::new(Arc::new(widget_catalog()));
        let widget = g.create("Widget").unwrap();
        let favorite = g.field_id(widget, "Favorite").unwrap();
        let mut deferred = DeferredRefs::new();
        deferred.queue("i3", widget, favorite, &mut g);
        let not_a_part = g.create("Note").unwrap();
        assert_eq!(deferred.dequeue("i3", not_a_part, &mut g), 0);
        assert_eq!(g.get(widget, favorite), None);
        assert_eq!(deferred.finish(&mut g).len(), 1);
    }

    #[test]
    fn test_rejected_fill_leaves_no_placeholder() {
        let mut g = Graph::new(Arc::new(widget_catalog()));
        let widget = g.create("Widget").unwrap();
        let parts = g.field_id(widget, "Parts").unwrap();
        let mut deferred = DeferredRefs::new();
        deferred.queue("i2", widget, parts, &mut g);
        let not_a_part = g.create("Note").unwrap();
        assert_eq!(deferred.dequeue("i2", not_a_part, &mut g), 0);
        assert_eq!(deferred.finish(&mut g).len(), 1);
        assert_eq!(g.get(widget, parts), Some(&Value::List(vec![])));
    }
}
