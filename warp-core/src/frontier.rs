//! Frontier tracking and materialization: walks each writer's
//! chain from the last checkpoint up to (or past) a target ref and folds
//! the intervening patches into a `State` via [`crate::reduce`].

use std::collections::BTreeMap;

use crate::codec::{decode_patch, CommitEnvelope};
use crate::error::{Error, Result};
use crate::model::WriterId;
use crate::port::{PersistencePort, Sha};
use crate::provenance::ProvenanceIndex;
use crate::reduce::{reduce, State};

/// `writerId -> tip sha` — what a reader has already materialized.
pub type Frontier = BTreeMap<WriterId, Sha>;

/// True if any entry in `current` differs from `previous`, including a
/// writer appearing for the first time. Readers call this before paying
/// for a full `materialize` to skip no-op refreshes.
pub fn has_frontier_changed(previous: &Frontier, current: &Frontier) -> bool {
    previous != current
}

/// Reads every `refs/warp/<graph>/writers/*` tip and returns them as a frontier.
pub fn current_frontier(port: &dyn PersistencePort, graph: &str) -> Result<Frontier> {
    let prefix = format!("refs/warp/{graph}/writers/");
    let mut frontier = Frontier::new();
    for reference in port.list_refs(&prefix)? {
        let writer = reference
            .strip_prefix(&prefix)
            .ok_or_else(|| Error::Corrupt(format!("unexpected ref shape: {reference}")))?;
        if let Some(sha) = port.read_ref(&reference)? {
            frontier.insert(writer.to_string(), sha);
        }
    }
    Ok(frontier)
}

/// Walks one writer's patch-commit chain from `stop_before` (exclusive, may
/// be `None` to walk to the root) up to and including `tip`, returning
/// `(patch_sha, patch)` pairs oldest-first. Shared by materialization and
/// by `warp-sync`'s server handler, which loads the same kind of range per
/// writer to answer a sync request.
pub fn load_patch_range(
    port: &dyn PersistencePort,
    writer: &str,
    tip: &Sha,
    stop_before: Option<&Sha>,
) -> Result<Vec<(Sha, crate::model::Patch)>> {
    let mut chain = Vec::new();
    let mut cursor = Some(tip.clone());
    let mut reached_stop = stop_before.is_none();
    while let Some(sha) = cursor {
        if stop_before.is_some_and(|stop| stop == &sha) {
            reached_stop = true;
            break;
        }
        let message = port.show_commit(&sha)?;
        let envelope = CommitEnvelope::parse(&message)?;
        if envelope.trailer("eg-writer") != Some(writer) {
            return Err(Error::SyncDivergence {
                writer: writer.to_string(),
                from_sha: sha,
            });
        }
        let patch_oid = envelope
            .trailer("eg-patch-oid")
            .ok_or_else(|| Error::TrailerMissing("eg-patch-oid"))?;
        let bytes = port.read_blob(&patch_oid.to_string())?;
        let patch = decode_patch(&bytes)?;
        chain.push((sha.clone(), patch));

        let info = port.get_node_info(&sha)?;
        cursor = info.parents.first().cloned();
    }
    // `stop_before` names a checkpoint's recorded tip for this writer: if the
    // walk ran off the root without ever meeting it, the chain was rewritten
    // out from under the checkpoint (a write-side invariant violation).
    if !reached_stop {
        return Err(Error::SyncDivergence {
            writer: writer.to_string(),
            from_sha: stop_before.cloned().unwrap_or_default(),
        });
    }
    chain.reverse();
    Ok(chain)
}

/// Materializes the full state reachable from `target`, which maps each
/// writer to the tip it should be read up to.
/// `checkpoint` seeds both the starting state and the per-writer cursors
/// already folded into it, so only the delta since the checkpoint is
/// replayed. When `provenance` is given, every patch folded in along the
/// way is indexed into it too, so the index stays in lockstep with the
/// state it describes rather than needing a separate pass.
pub fn materialize(
    port: &dyn PersistencePort,
    target: &Frontier,
    checkpoint: Option<(&State, &Frontier)>,
    mut provenance: Option<&mut ProvenanceIndex>,
) -> Result<State> {
    let (mut state, base_frontier) = match checkpoint {
        Some((state, frontier)) => (state.clone(), frontier.clone()),
        None => (State::new(), Frontier::new()),
    };

    for (writer, tip) in target {
        let stop_before = base_frontier.get(writer);
        if stop_before == Some(tip) {
            continue;
        }
        let chain = load_patch_range(port, writer, tip, stop_before)?;
        if let Some(index) = provenance.as_deref_mut() {
            for (sha, patch) in &chain {
                index.index_patch(sha, patch);
            }
        }
        let shared: Vec<(&Sha, &crate::model::Patch)> =
            chain.iter().map(|(sha, patch)| (sha, patch)).collect();
        let delta = reduce(shared);
        state = state.join(&delta);
    }
    Ok(state)
}

pub(crate) fn load_patch_by_commit_sha(port: &dyn PersistencePort, sha: &Sha) -> Result<crate::model::Patch> {
    let message = port.show_commit(sha)?;
    let envelope = CommitEnvelope::parse(&message)?;
    let patch_oid = envelope
        .trailer("eg-patch-oid")
        .ok_or_else(|| Error::TrailerMissing("eg-patch-oid"))?;
    let bytes = port.read_blob(&patch_oid.to_string())?;
    decode_patch(&bytes)
}

/// Materializes only the patches the provenance index says ever touched
/// `entity`, skipping every writer's unrelated history. `provenance`
/// stores commit shas (the same identity `EventId::patch_sha` uses), so
/// each one is re-resolved to its patch blob via the commit's
/// `eg-patch-oid` trailer rather than read directly as a blob oid. Folded
/// in `(lamport, writer)` order, which is sufficient because `apply_patch`
/// only needs a total order over adds sharing a dot's writer, not a strict
/// causal replay — the same guarantee `reduce` relies on for its full-chain
/// counterpart.
pub fn materialize_slice(
    port: &dyn PersistencePort,
    provenance: &ProvenanceIndex,
    entity: &str,
) -> Result<State> {
    let mut loaded: Vec<(Sha, crate::model::Patch)> = Vec::new();
    for sha in provenance.patches_for(entity) {
        let patch = load_patch_by_commit_sha(port, sha)?;
        loaded.push((sha.clone(), patch));
    }
    loaded.sort_by(|a, b| (a.1.lamport, &a.1.writer).cmp(&(b.1.lamport, &b.1.writer)));
    let shared: Vec<(&Sha, &crate::model::Patch)> =
        loaded.iter().map(|(sha, patch)| (sha, patch)).collect();
    Ok(reduce(shared))
}
