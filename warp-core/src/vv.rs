//! Version vectors: `writerId -> highest contiguous seq observed`,
//! totally ordered by `<=` pointwise.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::DotRef;

/// `BTreeMap` rather than `HashMap` so serialization (and therefore
/// checkpoint hashing) is deterministic without an explicit sort pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionVector(BTreeMap<String, u64>);

impl VersionVector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, writer: &str) -> u64 {
        self.0.get(writer).copied().unwrap_or(0)
    }

    pub fn set(&mut self, writer: impl Into<String>, seq: u64) {
        self.0.insert(writer.into(), seq);
    }

    /// Raises `writer`'s entry to `seq` if `seq` is higher than what is
    /// already recorded; never lowers it.
    pub fn raise(&mut self, writer: &str, seq: u64) {
        let entry = self.0.entry(writer.to_string()).or_insert(0);
        if seq > *entry {
            *entry = seq;
        }
    }

    pub fn increment(&mut self, writer: &str) -> u64 {
        let entry = self.0.entry(writer.to_string()).or_insert(0);
        *entry += 1;
        *entry
    }

    /// Pointwise maximum of two vectors.
    pub fn merge(&self, other: &VersionVector) -> VersionVector {
        let mut out = self.clone();
        for (writer, seq) in &other.0 {
            out.raise(writer, *seq);
        }
        out
    }

    pub fn merge_in_place(&mut self, other: &VersionVector) {
        for (writer, seq) in &other.0 {
            self.raise(writer, *seq);
        }
    }

    pub fn contains(&self, dot: &DotRef) -> bool {
        self.get(&dot.writer) >= dot.seq
    }

    /// `self <= other` pointwise.
    pub fn leq(&self, other: &VersionVector) -> bool {
        self.0.iter().all(|(writer, seq)| other.get(writer) >= *seq)
    }

    pub fn partial_cmp_causal(&self, other: &VersionVector) -> Option<Ordering> {
        if self == other {
            Some(Ordering::Equal)
        } else if self.leq(other) {
            Some(Ordering::Less)
        } else if other.leq(self) {
            Some(Ordering::Greater)
        } else {
            None
        }
    }

    pub fn writers(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &u64)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Highest seq recorded for any writer, or 0 if empty.
    pub fn max_value(&self) -> u64 {
        self.0.values().copied().max().unwrap_or(0)
    }

    pub fn as_map(&self) -> &BTreeMap<String, u64> {
        &self.0
    }

    pub fn from_map(map: BTreeMap<String, u64>) -> Self {
        Self(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_is_pointwise_max() {
        let mut a = VersionVector::new();
        a.set("A", 3);
        a.set("B", 1);
        let mut b = VersionVector::new();
        b.set("A", 2);
        b.set("B", 5);
        b.set("C", 1);

        let merged = a.merge(&b);
        assert_eq!(merged.get("A"), 3);
        assert_eq!(merged.get("B"), 5);
        assert_eq!(merged.get("C"), 1);
    }

    #[test]
    fn contains_checks_seq_leq_tracked_max() {
        let mut vv = VersionVector::new();
        vv.set("A", 5);
        assert!(vv.contains(&DotRef::new("A", 3)));
        assert!(vv.contains(&DotRef::new("A", 5)));
        assert!(!vv.contains(&DotRef::new("A", 6)));
        assert!(!vv.contains(&DotRef::new("B", 1)));
    }

    #[test]
    fn leq_is_pointwise() {
        let mut a = VersionVector::new();
        a.set("A", 1);
        let mut b = VersionVector::new();
        b.set("A", 2);
        b.set("B", 1);
        assert!(a.leq(&b));
        assert!(!b.leq(&a));
    }

    #[test]
    fn raise_never_lowers() {
        let mut vv = VersionVector::new();
        vv.set("A", 5);
        vv.raise("A", 2);
        assert_eq!(vv.get("A"), 5);
        vv.raise("A", 9);
        assert_eq!(vv.get("A"), 9);
    }
}
