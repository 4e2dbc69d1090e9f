//! Identifiers, values, operations and the patch envelope.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::vv::VersionVector;

pub type NodeId = String;
pub type WriterId = String;
pub type Sha = String;

/// `(from, to, label)` — directed, multi-labeled edges.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EdgeKey {
    pub from: NodeId,
    pub to: NodeId,
    pub label: String,
}

impl EdgeKey {
    pub fn new(from: impl Into<NodeId>, to: impl Into<NodeId>, label: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            label: label.into(),
        }
    }
}

/// Target of a `PropSet`: either a node or an edge triple.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PropTarget {
    Node(NodeId),
    Edge(EdgeKey),
}

/// `(nodeId|edge, key)` flattened into one sortable tuple so a single map
/// can hold both node and edge properties.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PropKey {
    pub target: PropTarget,
    pub key: String,
}

impl PropKey {
    pub fn node(node: impl Into<NodeId>, key: impl Into<String>) -> Self {
        Self {
            target: PropTarget::Node(node.into()),
            key: key.into(),
        }
    }

    pub fn edge(edge: EdgeKey, key: impl Into<String>) -> Self {
        Self {
            target: PropTarget::Edge(edge),
            key: key.into(),
        }
    }
}

/// Unique identifier of a single add: `(writerId, seq)`.
/// Ops inside a patch only carry `seq` — the writer half comes from the
/// patch's own `writer` field — so a fully-qualified dot crossing patch
/// boundaries (as stored inside a `State`) is this `DotRef`.
/// `State` (which may hold dots from many writers at once).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DotRef {
    pub writer: WriterId,
    pub seq: u64,
}

impl DotRef {
    pub fn new(writer: impl Into<WriterId>, seq: u64) -> Self {
        Self {
            writer: writer.into(),
            seq,
        }
    }

    pub fn canonical(&self) -> String {
        format!("{}:{}", self.writer, self.seq)
    }
}

/// `(lamport, writerId, patchSha, opIndex)`, compared lexicographically.
/// Gives a deterministic tie-break for concurrent writes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId {
    pub lamport: u64,
    pub writer: WriterId,
    pub patch_sha: Sha,
    pub op_index: u32,
}

impl PartialOrd for EventId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EventId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.lamport
            .cmp(&other.lamport)
            .then_with(|| self.writer.cmp(&other.writer))
            .then_with(|| self.patch_sha.cmp(&other.patch_sha))
            .then_with(|| self.op_index.cmp(&other.op_index))
    }
}

/// A schema-free CBOR value. Used both for property values and for the
/// canonical CBOR encoding of the whole patch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CborValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Array(Vec<CborValue>),
    /// Ordered pairs, not a map, so canonical encoding can sort
    /// deterministically without silently collapsing duplicate keys.
    Map(Vec<(CborValue, CborValue)>),
}

/// `{ inline(CBOR value) | blob(oid) }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ValueRef {
    Inline(CborValue),
    Blob(Sha),
}

/// The seven operation variants, plus the schema-v3
/// `EdgePropSet` alias which is canonically identical to `PropSet` with an
/// edge target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Op {
    NodeAdd {
        node: NodeId,
        seq: u64,
    },
    NodeTombstone {
        node: NodeId,
        observed: Vec<DotRef>,
    },
    EdgeAdd {
        edge: EdgeKey,
        seq: u64,
    },
    EdgeTombstone {
        edge: EdgeKey,
        observed: Vec<DotRef>,
    },
    PropSet {
        target: PropTarget,
        key: String,
        value: ValueRef,
    },
}

impl Op {
    /// The minimum patch schema that can encode this op.
    pub fn min_schema(&self) -> u32 {
        match self {
            Op::PropSet { target, .. } if matches!(target, PropTarget::Edge(_)) => 3,
            _ => 2,
        }
    }
}

/// Maximum patch schema this reader supports.
pub const MAX_SUPPORTED_SCHEMA: u32 = 3;

/// Atomic batch of ops with causal context and writer metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    pub schema: u32,
    pub writer: WriterId,
    pub lamport: u64,
    pub context: VersionVector,
    pub ops: Vec<Op>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reads: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub writes: Option<Vec<String>>,
}

impl Patch {
    /// The highest schema any op in this patch actually requires.
    pub fn required_schema(&self) -> u32 {
        self.ops.iter().map(Op::min_schema).max().unwrap_or(2)
    }
}

/// `[A-Za-z0-9_.-]+`, length 1..128.
pub fn is_valid_name(name: &str) -> bool {
    if name.is_empty() || name.len() > 128 {
        return false;
    }
    name.bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b'-'))
}

pub type PropMap = BTreeMap<PropKey, crate::lww::LwwRegister>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_id_orders_by_lamport_then_writer_then_sha_then_index() {
        let a = EventId {
            lamport: 5,
            writer: "A".into(),
            patch_sha: "aaa".into(),
            op_index: 0,
        };
        let b = EventId {
            lamport: 5,
            writer: "B".into(),
            patch_sha: "aaa".into(),
            op_index: 0,
        };
        assert!(a < b);
    }

    #[test]
    fn name_validation_rejects_empty_and_long_and_bad_chars() {
        assert!(is_valid_name("graph-1.test_A"));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name(&"x".repeat(129)));
        assert!(!is_valid_name("bad/name"));
        assert!(!is_valid_name("bad name"));
    }

    #[test]
    fn min_schema_is_3_only_for_edge_prop_set() {
        let node_prop = Op::PropSet {
            target: PropTarget::Node("n".into()),
            key: "k".into(),
            value: ValueRef::Inline(CborValue::Null),
        };
        assert_eq!(node_prop.min_schema(), 2);

        let edge_prop = Op::PropSet {
            target: PropTarget::Edge(EdgeKey::new("a", "b", "knows")),
            key: "k".into(),
            value: ValueRef::Inline(CborValue::Null),
        };
        assert_eq!(edge_prop.min_schema(), 3);
    }
}
