//! Graph handle: the single stateful object a caller holds to work with one
//! graph. Per spec §9 — "a graph handle owns its cached state, last
//! frontier, patch-counter since checkpoint, and optional provenance
//! index. Handles are created through an `open` factory that takes the
//! persistence port and policy settings; construction is idempotent and
//! inspectable." Everything it does is a thin orchestration over the free
//! functions in `frontier`/`checkpoint`/`gc` — it holds no logic of its
//! own beyond "when do I call which one."

use crate::checkpoint::{self, CheckpointPolicy};
use crate::error::Result;
use crate::frontier::{self, Frontier};
use crate::gc::{self, GcPolicy};
use crate::port::PersistencePort;
use crate::provenance::ProvenanceIndex;
use crate::reduce::State;

/// Policy settings a handle is opened with. Each has a spec-mandated
/// default (`CheckpointPolicy::default()`, `GcPolicy::default()`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HandlePolicy {
    pub checkpoint: CheckpointPolicy,
    pub gc: GcPolicy,
}

impl Default for HandlePolicy {
    fn default() -> Self {
        Self {
            checkpoint: CheckpointPolicy::default(),
            gc: GcPolicy::default(),
        }
    }
}

/// A graph handle: cached `State`, the frontier it was materialized up to,
/// a provenance index kept in lockstep with that state, and the patch
/// count accrued since the last checkpoint. Private to one caller — never
/// shared across concurrent tasks (spec §5's "cached materialized state
/// and last-seen frontier are private to a graph handle").
pub struct GraphHandle<'p> {
    port: &'p dyn PersistencePort,
    graph: String,
    policy: HandlePolicy,
    state: State,
    frontier: Frontier,
    provenance: ProvenanceIndex,
    patches_since_checkpoint: u64,
    hours_since_gc: f64,
}

impl<'p> GraphHandle<'p> {
    /// Opens (or re-opens) a handle: loads the latest checkpoint if one
    /// exists, then replays every writer's delta since it. Idempotent —
    /// calling `open` twice against an unchanged repository produces two
    /// handles with equal `state()`/`frontier()`.
    pub fn open(port: &'p dyn PersistencePort, graph: impl Into<String>, policy: HandlePolicy) -> Result<Self> {
        let graph = graph.into();
        let (base_state, mut provenance, base_frontier) = checkpoint::load_checkpoint(port, &graph)?
            .unwrap_or_else(|| (State::new(), ProvenanceIndex::new(), Frontier::new()));

        let target = frontier::current_frontier(port, &graph)?;
        let state = frontier::materialize(
            port,
            &target,
            Some((&base_state, &base_frontier)),
            Some(&mut provenance),
        )?;
        let patches_since_checkpoint = delta_patch_count(&base_frontier, &target);

        Ok(Self {
            port,
            graph,
            policy,
            state,
            frontier: target,
            provenance,
            patches_since_checkpoint,
            hours_since_gc: 0.0,
        })
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn frontier(&self) -> &Frontier {
        &self.frontier
    }

    pub fn provenance(&self) -> &ProvenanceIndex {
        &self.provenance
    }

    pub fn graph_name(&self) -> &str {
        &self.graph
    }

    /// Cheap check for whether a re-materialize would do anything, without
    /// paying for it — mirrors spec §4.6's `hasFrontierChanged`.
    pub fn has_pending_writes(&self) -> Result<bool> {
        let current = frontier::current_frontier(self.port, &self.graph)?;
        Ok(frontier::has_frontier_changed(&self.frontier, &current))
    }

    /// Re-reads the writer refs and folds in whatever is new. Returns
    /// `false` (no-op) if the frontier hasn't moved.
    pub fn refresh(&mut self) -> Result<bool> {
        let current = frontier::current_frontier(self.port, &self.graph)?;
        if !frontier::has_frontier_changed(&self.frontier, &current) {
            return Ok(false);
        }
        let delta = delta_patch_count(&self.frontier, &current);
        self.state = frontier::materialize(
            self.port,
            &current,
            Some((&self.state, &self.frontier)),
            Some(&mut self.provenance),
        )?;
        self.frontier = current;
        self.patches_since_checkpoint += delta;
        Ok(true)
    }

    /// Replays only the patches the provenance index recorded against
    /// `entity`, without touching the cached full `state()`.
    pub fn materialize_slice(&self, entity: &str) -> Result<State> {
        frontier::materialize_slice(self.port, &self.provenance, entity)
    }

    /// Cuts a checkpoint if `policy.checkpoint` recommends one given the
    /// patches accrued since the last one, resetting the counter on
    /// success.
    pub fn maybe_checkpoint(&mut self) -> Result<bool> {
        if !self.policy.checkpoint.should_checkpoint(self.patches_since_checkpoint) {
            return Ok(false);
        }
        checkpoint::create_checkpoint(self.port, &self.graph, &self.frontier, &self.state, &self.provenance)?;
        self.patches_since_checkpoint = 0;
        Ok(true)
    }

    /// Whether `policy.gc` recommends a compaction pass right now, given
    /// `hours_since_gc` (the caller's wall-clock bookkeeping — this handle
    /// has no clock of its own).
    pub fn gc_decision(&self, hours_since_gc: f64) -> gc::GcDecision {
        let (tombstones, total) = tombstone_counts(&self.state);
        self.policy
            .gc
            .should_run_gc(tombstones, total, self.patches_since_checkpoint, hours_since_gc)
    }

    /// Compacts tombstones safely superseded by the current observed
    /// frontier.
    pub fn compact(&mut self) {
        let observed = self.state.observed_frontier.clone();
        gc::compact(&mut self.state, &observed);
    }
}

fn delta_patch_count(base: &Frontier, target: &Frontier) -> u64 {
    target
        .iter()
        .filter(|(writer, tip)| base.get(*writer) != Some(*tip))
        .count() as u64
}

fn tombstone_counts(state: &State) -> (usize, usize) {
    let tombstones = state.node_alive.tombstones().len() + state.edge_alive.tombstones().len();
    let total = state.node_alive.entries().len() + state.edge_alive.entries().len();
    (tombstones, total)
}
