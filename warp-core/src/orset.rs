//! Observed-remove set. Tracks the dots of every add; a remove
//! only tombstones the observed dots, so a concurrent add (with a dot the
//! remover never saw) always wins.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::model::DotRef;
use crate::vv::VersionVector;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrSet<E: Ord + Clone> {
    entries: BTreeMap<E, BTreeSet<DotRef>>,
    tombstones: BTreeSet<DotRef>,
}

impl<E: Ord + Clone> OrSet<E> {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            tombstones: BTreeSet::new(),
        }
    }

    /// `orsetAdd(e, dot)`.
    pub fn add(&mut self, element: E, dot: DotRef) {
        self.entries.entry(element).or_default().insert(dot);
    }

    /// `orsetRemove(observedDots)` — moves dots into the tombstone set but
    /// leaves them in `entries` so a later concurrent add is still visible
    /// as a distinct, non-tombstoned dot (invariant 1).
    pub fn remove_observed(&mut self, observed: &[DotRef]) {
        for dot in observed {
            self.tombstones.insert(dot.clone());
        }
    }

    /// `orsetContains(e)`: at least one dot for `e` that isn't tombstoned.
    pub fn contains(&self, element: &E) -> bool {
        self.entries
            .get(element)
            .is_some_and(|dots| dots.iter().any(|d| !self.tombstones.contains(d)))
    }

    /// Alive elements in lexicographic order.
    pub fn elements(&self) -> impl Iterator<Item = &E> {
        self.entries.keys().filter(move |e| self.contains(e))
    }

    pub fn len(&self) -> usize {
        self.elements().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dots_for(&self, element: &E) -> Option<&BTreeSet<DotRef>> {
        self.entries.get(element)
    }

    /// Removes any tombstoned dot whose seq is already covered by `vv` for
    /// that writer — safe because every future patch from that writer has
    /// a strictly higher seq, so no future concurrent add can reference it.
    pub fn compact(&mut self, vv: &VersionVector) {
        let safe: BTreeSet<DotRef> = self
            .tombstones
            .iter()
            .filter(|dot| vv.get(&dot.writer) >= dot.seq)
            .cloned()
            .collect();
        for dot in &safe {
            self.tombstones.remove(dot);
        }
        self.entries.retain(|_, dots| {
            dots.retain(|dot| !safe.contains(dot));
            !dots.is_empty()
        });
    }

    /// Elementwise union of entries and tombstones — associative,
    /// commutative, idempotent.
    pub fn join(&self, other: &OrSet<E>) -> OrSet<E> {
        let mut entries = self.entries.clone();
        for (element, dots) in &other.entries {
            entries.entry(element.clone()).or_default().extend(dots.iter().cloned());
        }
        let mut tombstones = self.tombstones.clone();
        tombstones.extend(other.tombstones.iter().cloned());
        OrSet { entries, tombstones }
    }

    pub fn tombstones(&self) -> &BTreeSet<DotRef> {
        &self.tombstones
    }

    pub fn entries(&self) -> &BTreeMap<E, BTreeSet<DotRef>> {
        &self.entries
    }
}
