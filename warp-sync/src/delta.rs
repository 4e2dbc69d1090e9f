//! `computeSyncDelta`: a pure function comparing two frontiers,
//! no I/O, so it's trivially unit-testable.

use warp_core::frontier::Frontier;
use warp_core::{Sha, WriterId};

/// One writer's requested patch range: `from` exclusive (`None` = root),
/// `to` inclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRange {
    pub writer: WriterId,
    pub from: Option<Sha>,
    pub to: Sha,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SyncDelta {
    /// Ranges the local side should fetch from the remote side.
    pub need_from_remote: Vec<SyncRange>,
    /// Ranges the remote side should fetch from the local side.
    pub need_from_local: Vec<SyncRange>,
    pub new_writers_for_local: Vec<WriterId>,
    pub new_writers_for_remote: Vec<WriterId>,
}

/// Compares `local` and `remote` frontiers and reports exactly what each
/// side needs from the other, without performing any I/O.
pub fn compute_sync_delta(local: &Frontier, remote: &Frontier) -> SyncDelta {
    let mut delta = SyncDelta::default();

    for (writer, remote_tip) in remote {
        match local.get(writer) {
            None => {
                delta.need_from_remote.push(SyncRange {
                    writer: writer.clone(),
                    from: None,
                    to: remote_tip.clone(),
                });
                delta.new_writers_for_local.push(writer.clone());
            }
            Some(local_tip) if local_tip != remote_tip => {
                delta.need_from_remote.push(SyncRange {
                    writer: writer.clone(),
                    from: Some(local_tip.clone()),
                    to: remote_tip.clone(),
                });
            }
            _ => {}
        }
    }

    for (writer, local_tip) in local {
        match remote.get(writer) {
            None => {
                delta.need_from_local.push(SyncRange {
                    writer: writer.clone(),
                    from: None,
                    to: local_tip.clone(),
                });
                delta.new_writers_for_remote.push(writer.clone());
            }
            Some(remote_tip) if remote_tip != local_tip => {
                delta.need_from_local.push(SyncRange {
                    writer: writer.clone(),
                    from: Some(remote_tip.clone()),
                    to: local_tip.clone(),
                });
            }
            _ => {}
        }
    }

    delta
}

/// `syncNeeded(a, b)`: fast size+entry equality check.
pub fn sync_needed(a: &Frontier, b: &Frontier) -> bool {
    a != b
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frontier(pairs: &[(&str, &str)]) -> Frontier {
        pairs.iter().map(|(w, s)| (w.to_string(), s.to_string())).collect()
    }

    #[test]
    fn new_writer_requests_full_chain() {
        let local = frontier(&[]);
        let remote = frontier(&[("A", "sha-a")]);
        let delta = compute_sync_delta(&local, &remote);
        assert_eq!(delta.need_from_remote.len(), 1);
        assert_eq!(delta.need_from_remote[0].from, None);
        assert_eq!(delta.new_writers_for_local, vec!["A".to_string()]);
    }

    #[test]
    fn diverging_tip_requests_partial_range() {
        let local = frontier(&[("A", "sha-1")]);
        let remote = frontier(&[("A", "sha-2")]);
        let delta = compute_sync_delta(&local, &remote);
        assert_eq!(
            delta.need_from_remote[0],
            SyncRange {
                writer: "A".into(),
                from: Some("sha-1".into()),
                to: "sha-2".into(),
            }
        );
    }

    #[test]
    fn identical_frontiers_need_nothing() {
        let local = frontier(&[("A", "sha-1")]);
        let remote = local.clone();
        let delta = compute_sync_delta(&local, &remote);
        assert!(delta.need_from_remote.is_empty());
        assert!(delta.need_from_local.is_empty());
        assert!(!sync_needed(&local, &remote));
    }

    #[test]
    fn mirrors_in_both_directions() {
        let local = frontier(&[("A", "sha-a"), ("B", "sha-b")]);
        let remote = frontier(&[("A", "sha-a"), ("C", "sha-c")]);
        let delta = compute_sync_delta(&local, &remote);
        assert_eq!(delta.new_writers_for_local, vec!["C".to_string()]);
        assert_eq!(delta.new_writers_for_remote, vec!["B".to_string()]);
    }
}
