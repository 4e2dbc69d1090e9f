//! Wormholes: a compressible, replayable range of one
//! writer's patch chain, and the boundary transition record (BTR) a reader
//! hands out to prove where a wormhole starts and ends.

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::codec::CommitEnvelope;
use crate::error::{Error, Result};
use crate::model::{Patch, Sha as ModelSha, WriterId};
use crate::port::{PersistencePort, Sha};

type HmacSha256 = Hmac<Sha256>;

/// A single writer's contiguous patch range `[from_sha, to_sha]`, replayable
/// on its own without the rest of the writer's history. `patch_shas` holds
/// *commit* shas, not patch blob oids — that's the identity
/// `materialize`/`provenance`/`EventId::patch_sha` all use, so a
/// wormhole-replayed state's EventIds (and thus its LWW registers and
/// `edge_birth_event`) match the canonically materialized one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WormholeEdge {
    pub writer: WriterId,
    pub from_sha: Sha,
    pub to_sha: Sha,
    pub patch_shas: Vec<ModelSha>,
}

/// Boundary transition record: `(hIn, hOut, U0, P, t, κ)` — binds the
/// input state hash, the output state hash, the serialized initial state,
/// the replayable payload, a timestamp, and an HMAC tag `κ` over the
/// canonical encoding of the other five fields. Any single-byte tamper in
/// `h_in`/`h_out`/`initial_state`/`payload`/`timestamp` invalidates `tag`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundaryTransitionRecord {
    pub h_in: String,
    pub h_out: String,
    pub initial_state: Vec<u8>,
    pub payload: WormholeEdge,
    pub timestamp: String,
    pub tag: Vec<u8>,
}

fn canonical_payload_bytes(edge: &WormholeEdge) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(edge, &mut buf).map_err(|e| Error::Codec(e.to_string()))?;
    Ok(buf)
}

fn mac_input(h_in: &str, h_out: &str, initial_state: &[u8], payload_bytes: &[u8], timestamp: &str) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(h_in.as_bytes());
    buf.extend_from_slice(h_out.as_bytes());
    buf.extend_from_slice(initial_state);
    buf.extend_from_slice(payload_bytes);
    buf.extend_from_slice(timestamp.as_bytes());
    buf
}

impl BoundaryTransitionRecord {
    /// Seals `payload` against `initial_state` (`U0`): replays it into a
    /// clone of `initial_state` to compute `h_out`, then tags the canonical
    /// encoding of every field but `tag` itself with `key`.
    pub fn seal(
        port: &dyn PersistencePort,
        initial_state: &crate::reduce::State,
        payload: WormholeEdge,
        key: &[u8],
    ) -> Result<Self> {
        let h_in = crate::reduce::state_hash(initial_state)?;
        let mut out_state = initial_state.clone();
        replay(port, &payload, &mut out_state)?;
        let h_out = crate::reduce::state_hash(&out_state)?;

        let mut initial_state_bytes = Vec::new();
        ciborium::into_writer(initial_state, &mut initial_state_bytes)
            .map_err(|e| Error::Codec(e.to_string()))?;
        let timestamp = crate::checkpoint::now_rfc3339()?;
        let payload_bytes = canonical_payload_bytes(&payload)?;

        let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
        mac.update(&mac_input(&h_in, &h_out, &initial_state_bytes, &payload_bytes, &timestamp));
        let tag = mac.finalize().into_bytes().to_vec();

        Ok(Self {
            h_in,
            h_out,
            initial_state: initial_state_bytes,
            payload,
            timestamp,
            tag,
        })
    }

    /// Recomputes `tag` from the record's own fields and compares —
    /// catches tampering in any field without touching the repository.
    pub fn verify(&self, key: &[u8]) -> Result<bool> {
        let payload_bytes = canonical_payload_bytes(&self.payload)?;
        let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
        mac.update(&mac_input(
            &self.h_in,
            &self.h_out,
            &self.initial_state,
            &payload_bytes,
            &self.timestamp,
        ));
        Ok(mac.verify_slice(&self.tag).is_ok())
    }

    /// Full verification: checks `tag`, then re-replays `payload` against
    /// the deserialized `initial_state` and confirms the result hashes to
    /// `h_out` — catches a forged `h_out` whose tag was honestly computed
    /// over a payload that doesn't actually produce it.
    pub fn verify_replay(&self, port: &dyn PersistencePort, key: &[u8]) -> Result<bool> {
        if !self.verify(key)? {
            return Ok(false);
        }
        let mut state: crate::reduce::State = ciborium::from_reader(self.initial_state.as_slice())
            .map_err(|e| Error::Codec(e.to_string()))?;
        if crate::reduce::state_hash(&state)? != self.h_in {
            return Ok(false);
        }
        replay(port, &self.payload, &mut state)?;
        Ok(crate::reduce::state_hash(&state)? == self.h_out)
    }
}

/// Builds a wormhole edge spanning `from_sha` (exclusive, may be `None` for
/// the writer's root) to `to_sha` (inclusive). Fails with
/// `E_WORMHOLE_MULTI_WRITER` if the chain crosses writers, and
/// `E_WORMHOLE_NOT_PATCH` if any commit in range isn't a `warp:patch`
/// commit (an audit/checkpoint commit can't be replayed as a delta).
pub fn build(
    port: &dyn PersistencePort,
    writer: &str,
    from_sha: Option<&Sha>,
    to_sha: &Sha,
) -> Result<WormholeEdge> {
    let mut patch_shas = Vec::new();
    let mut cursor = Some(to_sha.clone());
    while let Some(sha) = cursor {
        if from_sha.is_some_and(|stop| stop == &sha) {
            break;
        }
        let message = port
            .show_commit(&sha)
            .map_err(|_| Error::WormholeShaNotFound(sha.clone()))?;
        let envelope = CommitEnvelope::parse(&message).map_err(|_| Error::WormholeNotPatch(sha.clone()))?;
        if envelope.trailer("eg-kind") != Some("patch") {
            return Err(Error::WormholeNotPatch(sha.clone()));
        }
        if envelope.trailer("eg-writer") != Some(writer) {
            return Err(Error::WormholeMultiWriter);
        }
        // `eg-patch-oid` must be present for this to be a replayable patch
        // commit, but the stored identity is the commit sha itself (see
        // `WormholeEdge::patch_shas`'s doc comment).
        envelope
            .trailer("eg-patch-oid")
            .ok_or_else(|| Error::TrailerMissing("eg-patch-oid"))?;
        patch_shas.push(sha.clone());

        let info = port.get_node_info(&sha)?;
        cursor = info.parents.first().cloned();
    }
    if from_sha.is_some() && cursor.is_none() {
        return Err(Error::WormholeInvalidRange);
    }
    patch_shas.reverse();
    Ok(WormholeEdge {
        writer: writer.to_string(),
        from_sha: from_sha.cloned().unwrap_or_default(),
        to_sha: to_sha.clone(),
        patch_shas,
    })
}

/// Concatenates two consecutive, same-writer wormholes into one spanning
/// both ranges: `a` covers `(a.from_sha, a.to_sha]` and `b` must pick up
/// exactly where `a` left off, i.e. `b.from_sha == a.to_sha`. Fails with
/// `E_WORMHOLE_MULTI_WRITER` if the writers differ and
/// `E_WORMHOLE_INVALID_RANGE` if the ranges don't actually abut.
pub fn compose(a: &WormholeEdge, b: &WormholeEdge) -> Result<WormholeEdge> {
    if a.writer != b.writer {
        return Err(Error::WormholeMultiWriter);
    }
    if b.from_sha != a.to_sha {
        return Err(Error::WormholeInvalidRange);
    }
    let mut patch_shas = a.patch_shas.clone();
    patch_shas.extend(b.patch_shas.iter().cloned());
    Ok(WormholeEdge {
        writer: a.writer.clone(),
        from_sha: a.from_sha.clone(),
        to_sha: b.to_sha.clone(),
        patch_shas,
    })
}

/// Replays every patch named by `edge` into `state`, re-resolving each
/// commit sha to its patch blob via `eg-patch-oid` rather than trusting
/// cached bytes — the point of a wormhole is that the caller only holds
/// `edge` plus access to blob storage, not a live `State`. Applying with
/// the commit sha (not the blob oid) as `EventId.patch_sha` is what keeps a
/// replayed state's EventIds consistent with the canonical materializer.
pub fn replay(
    port: &dyn PersistencePort,
    edge: &WormholeEdge,
    state: &mut crate::reduce::State,
) -> Result<()> {
    for commit_sha in &edge.patch_shas {
        let patch: Patch = crate::frontier::load_patch_by_commit_sha(port, commit_sha)?;
        state.apply_patch(&patch, commit_sha);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::memory::MemoryPort;
    use crate::reduce::State;
    use crate::writer::WriterSession;

    #[test]
    fn build_then_replay_matches_direct_materialization() {
        let port = MemoryPort::new();
        let mut session = WriterSession::open(&port, "g1", "A", &crate::vv::VersionVector::new()).unwrap();
        session.add_node("n1");
        session.add_node("n2");
        session.commit().unwrap();
        session.add_edge(crate::model::EdgeKey::new("n1", "n2", "knows"));
        session.set_property("n1", "color", crate::model::CborValue::Text("red".into()));
        let tip = session.commit().unwrap();

        let edge = build(&port, "A", None, &tip).unwrap();
        assert_eq!(edge.patch_shas.len(), 2);

        let mut state = State::new();
        replay(&port, &edge, &mut state).unwrap();
        assert!(state.has_node(&"n1".to_string()));
        assert!(state.has_node(&"n2".to_string()));

        // The wormhole's whole contract is reproducing the canonically
        // materialized state for the range — `has_node` alone can't tell a
        // blob-oid-keyed EventId apart from a commit-sha-keyed one, but the
        // PropSet/EdgeAdd above give the LWW register and `edge_birth_event`
        // something to disagree on if the identities ever diverge again.
        let target = crate::frontier::current_frontier(&port, "g1").unwrap();
        let direct = crate::frontier::materialize(&port, &target, None, None).unwrap();
        assert_eq!(crate::reduce::state_hash(&state).unwrap(), crate::reduce::state_hash(&direct).unwrap());
    }

    #[test]
    fn compose_concatenates_two_consecutive_wormholes() {
        let port = MemoryPort::new();
        let mut session = WriterSession::open(&port, "g1", "A", &crate::vv::VersionVector::new()).unwrap();
        session.add_node("n1");
        session.commit().unwrap();
        session.add_node("n2");
        session.add_node("n3");
        let p3 = session.commit().unwrap();
        session.add_node("n4");
        session.add_node("n5");
        session.add_node("n6");
        let p6 = session.commit().unwrap();

        let wormhole_1 = build(&port, "A", None, &p3).unwrap();
        let wormhole_2 = build(&port, "A", Some(&p3), &p6).unwrap();
        let combined = compose(&wormhole_1, &wormhole_2).unwrap();

        assert_eq!(combined.from_sha, wormhole_1.from_sha);
        assert_eq!(combined.to_sha, p6);
        assert_eq!(combined.patch_shas.len(), 6);

        let direct = build(&port, "A", None, &p6).unwrap();
        let mut via_compose = State::new();
        replay(&port, &combined, &mut via_compose).unwrap();
        let mut via_direct = State::new();
        replay(&port, &direct, &mut via_direct).unwrap();
        assert_eq!(via_compose, via_direct);
    }

    #[test]
    fn compose_rejects_non_abutting_ranges() {
        let port = MemoryPort::new();
        let mut session = WriterSession::open(&port, "g1", "A", &crate::vv::VersionVector::new()).unwrap();
        session.add_node("n1");
        let p1 = session.commit().unwrap();
        session.add_node("n2");
        let p2 = session.commit().unwrap();
        session.add_node("n3");
        let p3 = session.commit().unwrap();

        let wormhole_1 = build(&port, "A", None, &p1).unwrap();
        let wormhole_2 = build(&port, "A", Some(&p2), &p3).unwrap();
        let err = compose(&wormhole_1, &wormhole_2).unwrap_err();
        assert_eq!(err.code(), "E_WORMHOLE_INVALID_RANGE");
    }

    #[test]
    fn btr_tag_detects_tampering_in_any_field() {
        let port = MemoryPort::new();
        let mut session = WriterSession::open(&port, "g1", "A", &crate::vv::VersionVector::new()).unwrap();
        session.add_node("n1");
        let tip = session.commit().unwrap();

        let edge = build(&port, "A", None, &tip).unwrap();
        let initial_state = State::new();
        let btr = BoundaryTransitionRecord::seal(&port, &initial_state, edge, b"secret-key").unwrap();
        assert!(btr.verify(b"secret-key").unwrap());
        assert!(btr.verify_replay(&port, b"secret-key").unwrap());

        let mut bad_h_in = btr.clone();
        bad_h_in.h_in.push('0');
        assert!(!bad_h_in.verify(b"secret-key").unwrap());

        let mut bad_h_out = btr.clone();
        bad_h_out.h_out.push('0');
        assert!(!bad_h_out.verify(b"secret-key").unwrap());

        let mut bad_timestamp = btr.clone();
        bad_timestamp.timestamp.push('Z');
        assert!(!bad_timestamp.verify(b"secret-key").unwrap());

        let mut bad_payload = btr.clone();
        bad_payload.payload.patch_shas.push("forged".into());
        assert!(!bad_payload.verify(b"secret-key").unwrap());

        let mut bad_tag = btr.clone();
        bad_tag.tag[0] ^= 0xff;
        assert!(!bad_tag.verify(b"secret-key").unwrap());
    }

    #[test]
    fn btr_replay_verification_rejects_forged_h_out_with_honest_tag() {
        let port = MemoryPort::new();
        let mut session = WriterSession::open(&port, "g1", "A", &crate::vv::VersionVector::new()).unwrap();
        session.add_node("n1");
        let tip = session.commit().unwrap();

        let edge = build(&port, "A", None, &tip).unwrap();
        let initial_state = State::new();
        let mut btr = BoundaryTransitionRecord::seal(&port, &initial_state, edge, b"secret-key").unwrap();
        // Forge h_out and re-tag honestly over the forged value — the tag
        // alone can't catch this, only a re-replay can.
        btr.h_out = "0".repeat(64);
        let payload_bytes = canonical_payload_bytes(&btr.payload).unwrap();
        let mut mac = HmacSha256::new_from_slice(b"secret-key").unwrap();
        mac.update(&mac_input(&btr.h_in, &btr.h_out, &btr.initial_state, &payload_bytes, &btr.timestamp));
        btr.tag = mac.finalize().into_bytes().to_vec();

        assert!(btr.verify(b"secret-key").unwrap());
        assert!(!btr.verify_replay(&port, b"secret-key").unwrap());
    }

    #[test]
    fn cross_writer_range_is_rejected() {
        let port = MemoryPort::new();
        let mut session_a = WriterSession::open(&port, "g1", "A", &crate::vv::VersionVector::new()).unwrap();
        session_a.add_node("n1");
        let tip_a = session_a.commit().unwrap();

        let err = build(&port, "B", None, &tip_a).unwrap_err();
        assert_eq!(err.code(), "E_WORMHOLE_MULTI_WRITER");
    }
}
