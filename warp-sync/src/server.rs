//! `processSyncRequest`: answers a requester's sync request by
//! loading exactly the patch ranges `computeSyncDelta` says it's missing.

use warp_core::frontier::{current_frontier, load_patch_range};
use warp_core::port::PersistencePort;
use warp_core::Error;

use crate::delta::compute_sync_delta;
use crate::messages::{PatchEntry, SyncRequest, SyncResponse};

/// Treats `request.frontier` as the "local" side of the symmetric delta
/// computation and `graph`'s own current frontier as "remote" — i.e. from
/// the server's point of view, it is answering "what does the requester
/// need from me". Divergence on any one writer is skipped silently — the
/// caller may reconcile it out-of-band — rather than failing the whole
/// response.
pub fn process_sync_request(
    port: &dyn PersistencePort,
    graph: &str,
    request: &SyncRequest,
) -> Result<SyncResponse, Error> {
    let server_frontier = current_frontier(port, graph)?;
    let delta = compute_sync_delta(&request.frontier, &server_frontier);

    let mut patches = Vec::new();
    for range in &delta.need_from_remote {
        match load_patch_range(port, &range.writer, &range.to, range.from.as_ref()) {
            Ok(chain) => {
                for (sha, patch) in chain {
                    patches.push(PatchEntry {
                        writer_id: range.writer.clone(),
                        sha,
                        patch,
                    });
                }
            }
            Err(Error::SyncDivergence { .. }) => {
                tracing::warn!(writer = %range.writer, "skipping diverged writer in sync response");
            }
            Err(other) => return Err(other),
        }
    }

    Ok(SyncResponse::new(server_frontier, patches))
}

#[cfg(test)]
mod tests {
    use super::*;
    use warp_core::port::memory::MemoryPort;
    use warp_core::WriterSession;

    #[test]
    fn responds_with_full_chain_for_unknown_writer() {
        let port = MemoryPort::new();
        let mut session = WriterSession::open(&port, "g1", "A", &warp_core::VersionVector::new()).unwrap();
        session.add_node("n1");
        session.commit().unwrap();

        let request = SyncRequest::new(Default::default());
        let response = process_sync_request(&port, "g1", &request).unwrap();
        assert_eq!(response.patches.len(), 1);
        assert_eq!(response.frontier.len(), 1);
    }

    #[test]
    fn responds_with_nothing_when_frontiers_match() {
        let port = MemoryPort::new();
        let mut session = WriterSession::open(&port, "g1", "A", &warp_core::VersionVector::new()).unwrap();
        session.add_node("n1");
        session.commit().unwrap();

        let frontier = warp_core::frontier::current_frontier(&port, "g1").unwrap();
        let request = SyncRequest::new(frontier);
        let response = process_sync_request(&port, "g1", &request).unwrap();
        assert!(response.patches.is_empty());
    }
}
