//! Garbage collection: compacting tombstones once no future add
//! can reference them lets long-lived graphs shed dead weight from their
//! materialized `State` without touching the immutable patch history.
//!
//! `GcPolicy`/`should_run_gc` take a struct of raw counters in and return a
//! small report of *why* a pass is warranted, rather than a bare boolean a
//! caller would have to re-derive the reason for.

use crate::reduce::State;
use crate::vv::VersionVector;

/// One reason `should_run_gc` decided to recommend a compaction pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GcReason {
    /// `tombstones / total_entries` exceeded `ratio_threshold`.
    TombstoneRatio,
    /// Total entries exceeded `entry_threshold` and at least
    /// `patches_since_threshold` patches have landed since the last pass.
    EntryCountAndPatchVolume,
    /// At least `hours_since_threshold` hours have elapsed since the last
    /// pass, regardless of ratio or volume.
    TimeElapsed,
}

/// Decision inputs and thresholds for whether a reader should run a
/// compaction pass. Defaults: ratio > 0.3, or entries > 50k with >= 1000
/// patches since the last pass, or >= 24h elapsed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GcPolicy {
    pub ratio_threshold: f64,
    pub entry_threshold: usize,
    pub patches_since_threshold: u64,
    pub hours_since_threshold: f64,
}

impl Default for GcPolicy {
    fn default() -> Self {
        Self {
            ratio_threshold: 0.3,
            entry_threshold: 50_000,
            patches_since_threshold: 1000,
            hours_since_threshold: 24.0,
        }
    }
}

/// `{should_run, reasons}` — every threshold this pass crossed, not just
/// the first, so an operator dashboard can show all of them at once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GcDecision {
    pub should_run: bool,
    pub reasons: Vec<GcReason>,
}

impl GcPolicy {
    pub fn should_run_gc(
        &self,
        tombstones: usize,
        total_entries: usize,
        patches_since_last: u64,
        hours_since_last: f64,
    ) -> GcDecision {
        let mut reasons = Vec::new();

        let ratio = if total_entries == 0 {
            0.0
        } else {
            tombstones as f64 / total_entries as f64
        };
        if ratio > self.ratio_threshold {
            reasons.push(GcReason::TombstoneRatio);
        }
        if total_entries > self.entry_threshold && patches_since_last >= self.patches_since_threshold {
            reasons.push(GcReason::EntryCountAndPatchVolume);
        }
        if hours_since_last >= self.hours_since_threshold {
            reasons.push(GcReason::TimeElapsed);
        }

        if !reasons.is_empty() {
            tracing::debug!(?reasons, tombstones, total_entries, "gc recommended");
        }
        GcDecision {
            should_run: !reasons.is_empty(),
            reasons,
        }
    }
}

/// Compacts both OR-Sets against `observed`, the version vector of every
/// dot any currently-reachable patch could still reference. A tombstone is
/// only ever dropped once `observed` covers its dot — dropping one whose
/// seq hasn't been observed yet would let a late-arriving add for that same
/// dot resurrect an element nobody asked to resurrect.
pub fn compact(state: &mut State, observed: &VersionVector) {
    state.node_alive.compact(observed);
    state.edge_alive.compact(observed);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DotRef;

    #[test]
    fn ratio_above_threshold_triggers_gc() {
        let policy = GcPolicy::default();
        let decision = policy.should_run_gc(40, 100, 0, 0.0);
        assert!(decision.should_run);
        assert_eq!(decision.reasons, vec![GcReason::TombstoneRatio]);
    }

    #[test]
    fn entry_count_needs_patch_volume_too() {
        let policy = GcPolicy::default();
        let under_volume = policy.should_run_gc(0, 60_000, 500, 0.0);
        assert!(!under_volume.should_run);

        let over_volume = policy.should_run_gc(0, 60_000, 1500, 0.0);
        assert!(over_volume.should_run);
        assert_eq!(over_volume.reasons, vec![GcReason::EntryCountAndPatchVolume]);
    }

    #[test]
    fn time_elapsed_triggers_regardless_of_ratio_or_volume() {
        let policy = GcPolicy::default();
        let decision = policy.should_run_gc(0, 10, 0, 25.0);
        assert!(decision.should_run);
        assert_eq!(decision.reasons, vec![GcReason::TimeElapsed]);
    }

    #[test]
    fn multiple_reasons_all_reported() {
        let policy = GcPolicy::default();
        let decision = policy.should_run_gc(40, 100, 0, 25.0);
        assert_eq!(
            decision.reasons,
            vec![GcReason::TombstoneRatio, GcReason::TimeElapsed]
        );
    }

    #[test]
    fn nothing_triggers_returns_empty_reasons() {
        let policy = GcPolicy::default();
        let decision = policy.should_run_gc(0, 10, 0, 0.0);
        assert!(!decision.should_run);
        assert!(decision.reasons.is_empty());
    }

    #[test]
    fn compact_drops_safe_tombstones_but_keeps_live_elements() {
        let mut state = State::new();
        state.node_alive.add("n1".to_string(), DotRef::new("A", 1));
        state.node_alive.add("n2".to_string(), DotRef::new("A", 2));
        state
            .node_alive
            .remove_observed(&[DotRef::new("A", 1)]);

        let mut vv = VersionVector::new();
        vv.raise("A", 5);
        compact(&mut state, &vv);

        assert!(state.node_alive.tombstones().is_empty());
        assert!(!state.has_node(&"n1".to_string()));
        assert!(state.has_node(&"n2".to_string()));
    }
}
