//! Provenance index: entity name -> the patch shas that have
//! touched it, maintained incrementally as patches are folded in.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::model::{Op, Patch, PropTarget, Sha};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProvenanceIndex {
    entries: BTreeMap<String, BTreeSet<Sha>>,
}

impl ProvenanceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn patches_for(&self, entity: &str) -> impl Iterator<Item = &Sha> {
        self.entries.get(entity).into_iter().flatten()
    }

    /// Whether any patch has ever been indexed against `entity`.
    pub fn has(&self, entity: &str) -> bool {
        self.entries.contains_key(entity)
    }

    /// Number of distinct entities with at least one indexed patch.
    pub fn size(&self) -> usize {
        self.entries.len()
    }

    /// Iterates `(entity, patch shas)` pairs in entity order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &BTreeSet<Sha>)> {
        self.entries.iter()
    }

    fn record(&mut self, entity: String, sha: &Sha) {
        self.entries.entry(entity).or_default().insert(sha.clone());
    }

    /// Scans every op in `patch` and records `sha` against every entity it
    /// names — nodes, edges (recorded under both a node-pair key and each
    /// endpoint), and any `reads`/`writes` hints the patch declared.
    pub fn index_patch(&mut self, sha: &Sha, patch: &Patch) {
        for op in &patch.ops {
            match op {
                Op::NodeAdd { node, .. } | Op::NodeTombstone { node, .. } => {
                    self.record(node.clone(), sha);
                }
                Op::EdgeAdd { edge, .. } | Op::EdgeTombstone { edge, .. } => {
                    self.record(edge_key(edge), sha);
                    self.record(edge.from.clone(), sha);
                    self.record(edge.to.clone(), sha);
                }
                Op::PropSet { target, .. } => match target {
                    PropTarget::Node(node) => self.record(node.clone(), sha),
                    PropTarget::Edge(edge) => {
                        self.record(edge_key(edge), sha);
                        self.record(edge.from.clone(), sha);
                        self.record(edge.to.clone(), sha);
                    }
                },
            }
        }
        for hint in patch.reads.iter().flatten().chain(patch.writes.iter().flatten()) {
            self.record(hint.clone(), sha);
        }
    }

    /// Unions another index's entries into this one — used when merging
    /// provenance built independently across a materialization's delta.
    pub fn merge(&mut self, other: &ProvenanceIndex) {
        for (entity, shas) in &other.entries {
            self.entries
                .entry(entity.clone())
                .or_default()
                .extend(shas.iter().cloned());
        }
    }
}

fn edge_key(edge: &crate::model::EdgeKey) -> String {
    format!("{}->{}:{}", edge.from, edge.to, edge.label)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EdgeKey;
    use crate::vv::VersionVector;

    fn patch(ops: Vec<Op>) -> Patch {
        Patch {
            schema: 2,
            writer: "A".into(),
            lamport: 1,
            context: VersionVector::new(),
            ops,
            reads: None,
            writes: None,
        }
    }

    #[test]
    fn node_and_edge_ops_are_indexed() {
        let mut index = ProvenanceIndex::new();
        let p1 = patch(vec![Op::NodeAdd {
            node: "n1".into(),
            seq: 1,
        }]);
        index.index_patch(&"sha1".to_string(), &p1);

        let p2 = patch(vec![Op::EdgeAdd {
            edge: EdgeKey::new("n1", "n2", "knows"),
            seq: 1,
        }]);
        index.index_patch(&"sha2".to_string(), &p2);

        assert_eq!(index.patches_for("n1").collect::<Vec<_>>(), vec![&"sha1".to_string(), &"sha2".to_string()]);
        assert_eq!(index.patches_for("n2").collect::<Vec<_>>(), vec![&"sha2".to_string()]);
    }

    #[test]
    fn has_size_and_iter_reflect_indexed_entities() {
        let mut index = ProvenanceIndex::new();
        assert!(!index.has("n1"));
        assert_eq!(index.size(), 0);

        index.record("n1".to_string(), &"sha1".to_string());
        assert!(index.has("n1"));
        assert_eq!(index.size(), 1);
        assert_eq!(index.iter().count(), 1);
    }

    #[test]
    fn merge_unions_entries() {
        let mut a = ProvenanceIndex::new();
        a.record("n1".to_string(), &"sha1".to_string());
        let mut b = ProvenanceIndex::new();
        b.record("n1".to_string(), &"sha2".to_string());

        a.merge(&b);
        assert_eq!(
            a.patches_for("n1").collect::<Vec<_>>(),
            vec![&"sha1".to_string(), &"sha2".to_string()]
        );
    }
}
