use super::{EntityId, Graph, Value};
use crate::schema::{Cardinality, FieldId};

impl Graph {
    /// Clear every inverse field and recompute it from the forward fields that point at it.
    ///
    /// Owners are visited in arena order and their forward fields in declaration order, so the
    /// contents of list-valued inverses are deterministic.
    pub fn rebuild_inverses(&mut self) {
        let catalog = self.catalog.clone();
        for entity in self.entities.iter_mut() {
            for inverse in catalog.inverse_fields(entity.type_id) {
                if catalog.field(*inverse).is_collection() {
                    entity.values.insert(*inverse, Value::List(Vec::new()));
                } else {
                    entity.values.remove(inverse);
                }
            }
        }

        let mut links: Vec<(EntityId, FieldId, EntityId)> = Vec::new();
        for owner in self.ids() {
            let Ok(ty) = self.type_of(owner) else {
                continue;
            };
            for forward in catalog.forward_fields(ty) {
                if !catalog.field(forward).target().is_entity() {
                    continue;
                }
                for target in self.refs(owner, forward) {
                    let Ok(target_type) = self.type_of(target) else {
                        continue;
                    };
                    if let Some(inverse) = catalog.inverse_of(forward, target_type) {
                        links.push((target, inverse, owner));
                    }
                }
            }
        }

        let count = links.len();
        for (target, inverse, owner) in links {
            self.link_inverse(target, inverse, owner);
        }
        tracing::debug!("[Graph::rebuild_inverses] Linked {} back-references", count);
    }

    fn link_inverse(&mut self, target: EntityId, inverse: FieldId, owner: EntityId) {
        let cardinality = self.catalog.field(inverse).cardinality();
        let Some(entity) = self.entities.get_mut(target.index()) else {
            return;
        };
        match cardinality {
            Cardinality::Set | Cardinality::List => {
                let slot = entity
                    .values
                    .entry(inverse)
                    .or_insert_with(|| Value::List(Vec::new()));
                if let Value::List(items) = slot {
                    let item = Value::Ref(owner);
                    if cardinality == Cardinality::List || !items.contains(&item) {
                        items.push(item);
                    }
                }
            }
            Cardinality::Scalar | Cardinality::Optional => {
                entity.values.insert(inverse, Value::Ref(owner));
            }
        }
    }
}
