//! Structural comparison of two graphs.
//!
//! Entities are matched pairwise starting from the two roots and following forward fields; a
//! bijection between handles is maintained so that shared objects and cycles must line up on both
//! sides. Inverse fields are ignored since they are recomputed on load. Fields are matched by
//! name, so the two graphs may use different (but compatible) catalogs.

use std::collections::{HashMap, VecDeque};

use super::{EntityId, Graph, Value};

/// `true` when the graphs reachable from the two roots are isomorphic.
pub fn isomorphic(a: &Graph, root_a: EntityId, b: &Graph, root_b: EntityId) -> bool {
    diff(a, root_a, b, root_b).is_none()
}

/// The first difference found, described for test output; `None` when isomorphic.
pub fn diff(a: &Graph, root_a: EntityId, b: &Graph, root_b: EntityId) -> Option<String> {
    let mut forward: HashMap<EntityId, EntityId> = HashMap::new();
    let mut backward: HashMap<EntityId, EntityId> = HashMap::new();
    let mut queue = VecDeque::new();
    forward.insert(root_a, root_b);
    backward.insert(root_b, root_a);
    queue.push_back((root_a, root_b));

    while let Some((x, y)) = queue.pop_front() {
        let (Ok(type_x), Ok(type_y)) = (a.type_name(x), b.type_name(y)) else {
            return Some(format!("dangling handle {x} or {y}"));
        };
        if !type_x.eq_ignore_ascii_case(type_y) {
            return Some(format!("{x} is '{type_x}' but {y} is '{type_y}'"));
        }
        let Ok(ty) = a.type_of(x) else {
            return Some(format!("dangling handle {x}"));
        };

        for field in a.catalog().forward_fields(ty) {
            let name = a.catalog().field(field).name();
            let left = a.get(x, field).unwrap_or(&Value::Null);
            let right = b.get_field(y, name).unwrap_or(&Value::Null);
            let mut pairs = Vec::new();
            if let Some(reason) = compare_values(left, right, &mut pairs) {
                return Some(format!("{type_x}.{name}: {reason}"));
            }
            for (left_id, right_id) in pairs {
                match (forward.get(&left_id), backward.get(&right_id)) {
                    (None, None) => {
                        forward.insert(left_id, right_id);
                        backward.insert(right_id, left_id);
                        queue.push_back((left_id, right_id));
                    }
                    (Some(mapped), _) if *mapped != right_id => {
                        return Some(format!(
                            "{type_x}.{name}: {left_id} already matched {mapped}, not {right_id}"
                        ));
                    }
                    (_, Some(mapped)) if *mapped != left_id => {
                        return Some(format!(
                            "{type_x}.{name}: {right_id} already matched {mapped}, not {left_id}"
                        ));
                    }
                    _ => {}
                }
            }
        }
    }
    None
}

fn compare_values(
    left: &Value,
    right: &Value,
    pairs: &mut Vec<(EntityId, EntityId)>,
) -> Option<String> {
    if left.is_empty() && right.is_empty() {
        return None;
    }
    match (left, right) {
        (Value::Ref(l), Value::Ref(r)) => {
            pairs.push((*l, *r));
            None
        }
        (Value::List(l), Value::List(r)) => {
            if l.len() != r.len() {
                return Some(format!("{} items vs {}", l.len(), r.len()));
            }
            l.iter()
                .zip(r.iter())
                .enumerate()
                .find_map(|(idx, (li, ri))| {
                    compare_values(li, ri, pairs).map(|reason| format!("[{idx}] {reason}"))
                })
        }
        (
            Value::Wrapped {
                type_name: lt,
                value: lv,
            },
            Value::Wrapped {
                type_name: rt,
                value: rv,
            },
        ) if lt.eq_ignore_ascii_case(rt) => compare_values(lv, rv, pairs),
        (l, r) if l == r => None,
        (l, r) => Some(format!("{l:?} vs {r:?}")),
    }
}
