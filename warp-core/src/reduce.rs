//! Join reducer: folds a stream of patches into a `State`.
//!
//! `State` is the materialized view handed to readers — it knows nothing
//! about commits or trees, only about dots, tombstones and registers, so it
//! can be built once from a checkpoint and then advanced incrementally.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::Digest;

use crate::lww::LwwRegister;
use crate::model::{DotRef, EdgeKey, EventId, NodeId, Op, Patch, PropKey, PropMap, Sha, ValueRef};
use crate::orset::OrSet;
use crate::vv::VersionVector;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct State {
    pub node_alive: OrSet<NodeId>,
    pub edge_alive: OrSet<EdgeKey>,
    pub prop: PropMap,
    pub observed_frontier: VersionVector,
    /// Greatest add event seen so far per edge (spec: "record if not present
    /// or new eventId is greater"), kept so a later `EdgeTombstone` can tell
    /// whether it is tombstoning the edge it actually observed being born.
    pub edge_birth_event: BTreeMap<EdgeKey, EventId>,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_node(&self, node: &NodeId) -> bool {
        self.node_alive.contains(node)
    }

    pub fn has_edge(&self, edge: &EdgeKey) -> bool {
        self.edge_alive.contains(edge)
    }

    pub fn prop_value(&self, key: &PropKey) -> Option<&ValueRef> {
        self.prop.get(key).map(|reg| &reg.value)
    }

    /// Applies one op from `patch`, whose ops are positioned at `op_index`.
    /// `event_id` is precomputed by the caller (`reduce`/the writer session)
    /// from `(patch.lamport, patch.writer, patch_sha, op_index)`.
    pub fn apply_op(&mut self, patch: &Patch, patch_sha: &Sha, op_index: u32, op: &Op) {
        let event_id = EventId {
            lamport: patch.lamport,
            writer: patch.writer.clone(),
            patch_sha: patch_sha.clone(),
            op_index,
        };
        match op {
            Op::NodeAdd { node, seq } => {
                self.node_alive
                    .add(node.clone(), DotRef::new(patch.writer.clone(), *seq));
                self.observed_frontier.raise(&patch.writer, *seq);
            }
            Op::NodeTombstone { node: _, observed } => {
                self.node_alive.remove_observed(observed);
            }
            Op::EdgeAdd { edge, seq } => {
                let dot = DotRef::new(patch.writer.clone(), *seq);
                self.edge_alive.add(edge.clone(), dot);
                self.edge_birth_event
                    .entry(edge.clone())
                    .and_modify(|existing| {
                        if event_id > *existing {
                            *existing = event_id.clone();
                        }
                    })
                    .or_insert_with(|| event_id.clone());
                self.observed_frontier.raise(&patch.writer, *seq);
            }
            Op::EdgeTombstone { edge: _, observed } => {
                self.edge_alive.remove_observed(observed);
            }
            Op::PropSet { target, key, value } => {
                let prop_key = PropKey {
                    target: target.clone(),
                    key: key.clone(),
                };
                let current = self.prop.get(&prop_key).cloned();
                let updated = LwwRegister::set(current, event_id, value.clone());
                self.prop.insert(prop_key, updated);
            }
        }
    }

    /// Folds every op of `patch` (identified by `patch_sha`) into this state.
    /// After all ops are applied, absorbs `patch.context` into
    /// `observed_frontier` too — a patch with no adds of its own (pure
    /// removes or property sets) still carries forward the causal
    /// dependencies it was built on.
    pub fn apply_patch(&mut self, patch: &Patch, patch_sha: &Sha) {
        for (index, op) in patch.ops.iter().enumerate() {
            self.apply_op(patch, patch_sha, index as u32, op);
        }
        self.observed_frontier.merge_in_place(&patch.context);
    }

    /// Elementwise join of two states: union of each CRDT component.
    /// Commutative and associative because every component is.
    pub fn join(&self, other: &State) -> State {
        let mut prop = self.prop.clone();
        for (key, reg) in &other.prop {
            let merged = match prop.remove(key) {
                Some(existing) => LwwRegister::set(Some(existing), reg.event_id.clone(), reg.value.clone()),
                None => reg.clone(),
            };
            prop.insert(key.clone(), merged);
        }

        let mut edge_birth_event = self.edge_birth_event.clone();
        for (edge, event) in &other.edge_birth_event {
            edge_birth_event
                .entry(edge.clone())
                .and_modify(|existing| {
                    if *event > *existing {
                        *existing = event.clone();
                    }
                })
                .or_insert_with(|| event.clone());
        }

        State {
            node_alive: self.node_alive.join(&other.node_alive),
            edge_alive: self.edge_alive.join(&other.edge_alive),
            prop,
            observed_frontier: self.observed_frontier.merge(&other.observed_frontier),
            edge_birth_event,
        }
    }
}

/// Replays `patches` (each paired with its blob sha) in order into a fresh
/// `State`. Order only matters for the frontier raise, which is monotonic
/// anyway, so replaying the same set in any order reaches the same state —
/// see `reduce_is_order_independent` below.
pub fn reduce<'a>(patches: impl IntoIterator<Item = (&'a Sha, &'a Patch)>) -> State {
    let mut state = State::new();
    for (sha, patch) in patches {
        state.apply_patch(patch, sha);
    }
    state
}

/// SHA-256 over the canonical CBOR encoding of `state`. Every component of
/// `State` is `BTreeMap`/`BTreeSet`-backed, so two materializations of the
/// same patch set encode to identical bytes and therefore hash equal,
/// regardless of replay order.
pub fn state_hash(state: &State) -> crate::error::Result<String> {
    let mut buf = Vec::new();
    ciborium::into_writer(state, &mut buf).map_err(|e| crate::error::Error::Codec(e.to_string()))?;
    let digest = sha2::Sha256::digest(buf);
    Ok(digest.iter().map(|b| format!("{b:02x}")).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PropTarget, ValueRef};
    use crate::vv::VersionVector;

    fn patch(writer: &str, lamport: u64, ops: Vec<Op>) -> Patch {
        Patch {
            schema: 2,
            writer: writer.into(),
            lamport,
            context: VersionVector::new(),
            ops,
            reads: None,
            writes: None,
        }
    }

    #[test]
    fn node_add_then_prop_set_then_tombstone() {
        let p1 = patch("A", 1, vec![Op::NodeAdd { node: "n1".into(), seq: 1 }]);
        let p2 = patch(
            "A",
            2,
            vec![Op::PropSet {
                target: PropTarget::Node("n1".into()),
                key: "color".into(),
                value: ValueRef::Inline(crate::model::CborValue::Text("red".into())),
            }],
        );
        let mut state = State::new();
        state.apply_patch(&p1, &"sha1".to_string());
        state.apply_patch(&p2, &"sha2".to_string());

        assert!(state.has_node(&"n1".to_string()));
        let key = PropKey::node("n1", "color");
        assert!(matches!(
            state.prop_value(&key),
            Some(ValueRef::Inline(crate::model::CborValue::Text(t))) if t == "red"
        ));

        let p3 = patch(
            "A",
            3,
            vec![Op::NodeTombstone {
                node: "n1".into(),
                observed: vec![DotRef::new("A", 1)],
            }],
        );
        state.apply_patch(&p3, &"sha3".to_string());
        assert!(!state.has_node(&"n1".to_string()));
    }

    #[test]
    fn reduce_is_order_independent() {
        let p1 = patch("A", 1, vec![Op::NodeAdd { node: "n1".into(), seq: 1 }]);
        let p2 = patch("B", 1, vec![Op::NodeAdd { node: "n2".into(), seq: 1 }]);

        let forward = reduce(vec![(&"sha1".to_string(), &p1), (&"sha2".to_string(), &p2)]);
        let backward = reduce(vec![(&"sha2".to_string(), &p2), (&"sha1".to_string(), &p1)]);

        assert_eq!(
            forward.node_alive.elements().collect::<Vec<_>>(),
            backward.node_alive.elements().collect::<Vec<_>>()
        );
        assert_eq!(forward.observed_frontier, backward.observed_frontier);
        assert_eq!(state_hash(&forward).unwrap(), state_hash(&backward).unwrap());
    }

    #[test]
    fn join_is_commutative() {
        let p1 = patch("A", 1, vec![Op::NodeAdd { node: "n1".into(), seq: 1 }]);
        let p2 = patch("B", 1, vec![Op::NodeAdd { node: "n2".into(), seq: 1 }]);

        let mut left = State::new();
        left.apply_patch(&p1, &"sha1".to_string());
        let mut right = State::new();
        right.apply_patch(&p2, &"sha2".to_string());

        assert_eq!(left.join(&right), right.join(&left));
    }
}
