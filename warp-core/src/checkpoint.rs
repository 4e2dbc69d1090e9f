//! Checkpoints: a `(State, ProvenanceIndex, Frontier)` snapshot
//! written as three blobs under a `warp:checkpoint` commit so materialization
//! can resume from it instead of replaying every writer's chain from the
//! root.

use serde::{Deserialize, Serialize};

use crate::codec::CommitEnvelope;
use crate::error::{Error, Result};
use crate::frontier::Frontier;
use crate::port::{PersistencePort, Sha};
use crate::provenance::ProvenanceIndex;
use crate::reduce::State;

const STATE_FILENAME: &str = "state.cbor";
const PROVENANCE_FILENAME: &str = "provenance.cbor";
const MANIFEST_FILENAME: &str = "manifest.json";

const MANIFEST_VERSION: u32 = 1;

fn ref_name(graph: &str) -> String {
    format!("refs/warp/{graph}/checkpoints/head")
}

/// When a reader should cut a new checkpoint rather than keep replaying
/// deltas from the last one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckpointPolicy {
    /// Cut a new checkpoint once more than this many patches separate the
    /// target frontier from the last checkpoint's frontier, summed across
    /// writers.
    pub max_delta_patches: u64,
}

impl Default for CheckpointPolicy {
    fn default() -> Self {
        Self {
            max_delta_patches: 500,
        }
    }
}

impl CheckpointPolicy {
    pub fn should_checkpoint(&self, delta_patch_count: u64) -> bool {
        delta_patch_count > self.max_delta_patches
    }
}

/// Cheap summary stats carried in `manifest.json` alongside the frontier, so
/// a reader can sanity-check a checkpoint without decoding `state.cbor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointStats {
    pub nodes: usize,
    pub edges: usize,
    pub properties: usize,
}

impl CheckpointStats {
    fn from_state(state: &State) -> Self {
        Self {
            nodes: state.node_alive.elements().count(),
            edges: state.edge_alive.elements().count(),
            properties: state.prop.len(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CheckpointManifest {
    version: u32,
    seq: u64,
    created_at: String,
    frontier: Frontier,
    stats: CheckpointStats,
}

/// Writes `state`/`provenance`/`frontier` as a `warp:checkpoint` commit and
/// moves `refs/warp/<graph>/checkpoints/head` to it unconditionally —
/// readers detect staleness via [`crate::frontier::has_frontier_changed`],
/// not CAS.
pub fn create_checkpoint(
    port: &dyn PersistencePort,
    graph: &str,
    frontier: &Frontier,
    state: &State,
    provenance: &ProvenanceIndex,
) -> Result<Sha> {
    let parent = port.read_ref(&ref_name(graph))?;
    let seq = match &parent {
        Some(sha) => previous_manifest(port, sha)?.seq + 1,
        None => 0,
    };

    let mut state_bytes = Vec::new();
    ciborium::into_writer(state, &mut state_bytes).map_err(|e| Error::Codec(e.to_string()))?;
    let state_oid = port.write_blob(&state_bytes)?;

    let mut provenance_bytes = Vec::new();
    ciborium::into_writer(provenance, &mut provenance_bytes).map_err(|e| Error::Codec(e.to_string()))?;
    let provenance_oid = port.write_blob(&provenance_bytes)?;

    let manifest = CheckpointManifest {
        version: MANIFEST_VERSION,
        seq,
        created_at: now_rfc3339()?,
        frontier: frontier.clone(),
        stats: CheckpointStats::from_state(state),
    };
    let manifest_bytes = serde_json::to_vec(&manifest).map_err(|e| Error::Codec(e.to_string()))?;
    let manifest_oid = port.write_blob(&manifest_bytes)?;

    let tree_entries = [
        format!("100644 blob {state_oid}\t{STATE_FILENAME}"),
        format!("100644 blob {provenance_oid}\t{PROVENANCE_FILENAME}"),
        format!("100644 blob {manifest_oid}\t{MANIFEST_FILENAME}"),
    ];
    let tree_oid = port.write_tree(&tree_entries)?;

    let envelope = CommitEnvelope::checkpoint(graph, seq)?;
    let parents: Vec<String> = parent.into_iter().collect();
    let commit_sha = port.commit(&envelope.render(), &parents, Some(&tree_oid), false)?;
    port.update_ref(&ref_name(graph), &commit_sha)?;
    tracing::info!(graph, seq, commit = %commit_sha, "checkpoint created");
    Ok(commit_sha)
}

/// Loads the most recent checkpoint for `graph`, if one exists.
pub fn load_checkpoint(
    port: &dyn PersistencePort,
    graph: &str,
) -> Result<Option<(State, ProvenanceIndex, Frontier)>> {
    let Some(sha) = port.read_ref(&ref_name(graph))? else {
        return Ok(None);
    };
    let (state, provenance, manifest) = read_checkpoint_commit(port, &sha)?;
    let _ = manifest.version;
    Ok(Some((state, provenance, manifest.frontier)))
}

fn previous_manifest(port: &dyn PersistencePort, sha: &Sha) -> Result<CheckpointManifest> {
    let info = port.get_node_info(sha)?;
    let tree_oid = info
        .tree_oid
        .ok_or_else(|| Error::Corrupt(format!("checkpoint commit {sha} has no tree")))?;
    let manifest_oid = tree_lookup(port, &tree_oid, MANIFEST_FILENAME)?;
    let bytes = port.read_blob(&manifest_oid)?;
    serde_json::from_slice(&bytes).map_err(|e| Error::Codec(e.to_string()))
}

fn read_checkpoint_commit(
    port: &dyn PersistencePort,
    sha: &Sha,
) -> Result<(State, ProvenanceIndex, CheckpointManifest)> {
    let message = port.show_commit(sha)?;
    let envelope = CommitEnvelope::parse(&message)?;
    if envelope.trailer("eg-graph").is_none() {
        return Err(Error::TrailerMissing("eg-graph"));
    }

    let info = port.get_node_info(sha)?;
    let tree_oid = info
        .tree_oid
        .ok_or_else(|| Error::Corrupt(format!("checkpoint commit {sha} has no tree")))?;

    let state_oid = tree_lookup(port, &tree_oid, STATE_FILENAME)?;
    let state_bytes = port.read_blob(&state_oid)?;
    let state: State =
        ciborium::from_reader(state_bytes.as_slice()).map_err(|e| Error::Codec(e.to_string()))?;

    let provenance_oid = tree_lookup(port, &tree_oid, PROVENANCE_FILENAME)?;
    let provenance_bytes = port.read_blob(&provenance_oid)?;
    let provenance: ProvenanceIndex =
        ciborium::from_reader(provenance_bytes.as_slice()).map_err(|e| Error::Codec(e.to_string()))?;

    let manifest_oid = tree_lookup(port, &tree_oid, MANIFEST_FILENAME)?;
    let manifest_bytes = port.read_blob(&manifest_oid)?;
    let manifest: CheckpointManifest =
        serde_json::from_slice(&manifest_bytes).map_err(|e| Error::Codec(e.to_string()))?;

    Ok((state, provenance, manifest))
}

fn tree_lookup(port: &dyn PersistencePort, tree_oid: &str, name: &str) -> Result<String> {
    port.read_tree(&tree_oid.to_string())?
        .into_iter()
        .find(|(path, _)| path == name)
        .map(|(_, oid)| oid)
        .ok_or_else(|| Error::Corrupt(format!("checkpoint tree missing {name}")))
}

pub(crate) fn now_rfc3339() -> Result<String> {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .map_err(|e| Error::Codec(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontier::current_frontier;
    use crate::frontier::materialize;
    use crate::port::memory::MemoryPort;
    use crate::writer::WriterSession;

    #[test]
    fn checkpoint_round_trips_state_provenance_and_frontier() {
        let port = MemoryPort::new();
        let mut session =
            WriterSession::open(&port, "g1", "A", &crate::vv::VersionVector::new()).unwrap();
        session.add_node("n1");
        session.commit().unwrap();

        let frontier = current_frontier(&port, "g1").unwrap();
        let state = materialize(&port, &frontier, None, None).unwrap();
        let mut provenance = ProvenanceIndex::new();
        provenance.index_patch(&"sha1".to_string(), &sample_patch());
        create_checkpoint(&port, "g1", &frontier, &state, &provenance).unwrap();

        let (loaded_state, loaded_provenance, loaded_frontier) =
            load_checkpoint(&port, "g1").unwrap().unwrap();
        assert_eq!(loaded_frontier, frontier);
        assert!(loaded_state.has_node(&"n1".to_string()));
        assert_eq!(
            loaded_provenance.patches_for("n1").collect::<Vec<_>>(),
            vec![&"sha1".to_string()]
        );
    }

    #[test]
    fn missing_checkpoint_returns_none() {
        let port = MemoryPort::new();
        assert!(load_checkpoint(&port, "nonexistent").unwrap().is_none());
    }

    #[test]
    fn successive_checkpoints_advance_the_sequence_number() {
        let port = MemoryPort::new();
        let mut session =
            WriterSession::open(&port, "g1", "A", &crate::vv::VersionVector::new()).unwrap();
        session.add_node("n1");
        session.commit().unwrap();
        let frontier = current_frontier(&port, "g1").unwrap();
        let state = materialize(&port, &frontier, None, None).unwrap();
        let provenance = ProvenanceIndex::new();

        let first = create_checkpoint(&port, "g1", &frontier, &state, &provenance).unwrap();
        let second = create_checkpoint(&port, "g1", &frontier, &state, &provenance).unwrap();
        assert_ne!(first, second);

        let manifest = previous_manifest(&port, &second).unwrap();
        assert_eq!(manifest.seq, 1);
    }

    #[test]
    fn policy_triggers_past_threshold() {
        let policy = CheckpointPolicy {
            max_delta_patches: 10,
        };
        assert!(!policy.should_checkpoint(5));
        assert!(policy.should_checkpoint(11));
    }

    fn sample_patch() -> crate::model::Patch {
        crate::model::Patch {
            schema: 2,
            writer: "A".into(),
            lamport: 1,
            context: crate::vv::VersionVector::new(),
            ops: vec![crate::model::Op::NodeAdd {
                node: "n1".into(),
                seq: 1,
            }],
            reads: None,
            writes: None,
        }
    }
}
