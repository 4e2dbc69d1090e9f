//! `rebuild(ref)`: walks every commit reachable from a ref,
//! assigns a dense id per sha, and shards the forward/reverse adjacency by
//! the first two hex chars of each sha.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use warp_core::error::{Error, Result};
use warp_core::port::{PersistencePort, Sha};

use crate::shard::{
    forward_filename, meta_filename, reverse_filename, shard_key, Manifest, ShardAdjacency,
    ShardMeta, MANIFEST_FILENAME,
};
use roaring::RoaringBitmap;

/// Index ref for `graph`, rooted at a commit whose tree holds the manifest
/// plus every shard's three files.
pub fn index_ref(graph: &str) -> String {
    format!("refs/warp/{graph}/index")
}

struct BuildState {
    id_of: BTreeMap<Sha, u32>,
    id_to_sha: Vec<Sha>,
    forward: BTreeMap<u32, RoaringBitmap>,
    reverse: BTreeMap<u32, RoaringBitmap>,
}

/// Rebuilds the bitmap index for every commit reachable (by parent edges)
/// from `start_ref`, and persists it as a commit under
/// `refs/warp/<graph>/index`. Returns the new index commit sha.
///
/// Ids are assigned in topological order — every parent gets a lower id
/// than any of its children — by a first discovery pass over the reachable
/// set followed by Kahn's algorithm over the resulting parent/child
/// relation. This is what lets a linear chain `N0 -> N1 -> ... -> N99`
/// come out with `lookupId(N0) == 0`: discovering ids in plain BFS order
/// from `start_ref`'s tip would instead number the tip itself `0` and the
/// chain's root last.
pub fn rebuild(port: &dyn PersistencePort, graph: &str, start_ref: &str) -> Result<Sha> {
    let Some(root) = port.read_ref(start_ref)? else {
        return Err(Error::NotFound(format!("ref {start_ref}")));
    };

    let mut parents_of: BTreeMap<Sha, Vec<Sha>> = BTreeMap::new();
    let mut visited: BTreeSet<Sha> = BTreeSet::new();
    let mut queue: VecDeque<Sha> = VecDeque::new();
    queue.push_back(root);
    while let Some(sha) = queue.pop_front() {
        if !visited.insert(sha.clone()) {
            continue;
        }
        let info = port.get_node_info(&sha)?;
        for parent in &info.parents {
            if !visited.contains(parent) {
                queue.push_back(parent.clone());
            }
        }
        parents_of.insert(sha, info.parents);
    }

    let mut children_of: BTreeMap<Sha, Vec<Sha>> = BTreeMap::new();
    let mut remaining_parents: BTreeMap<Sha, usize> = BTreeMap::new();
    for (sha, parents) in &parents_of {
        let present: Vec<&Sha> = parents.iter().filter(|p| visited.contains(*p)).collect();
        remaining_parents.insert(sha.clone(), present.len());
        for parent in present {
            children_of.entry(parent.clone()).or_default().push(sha.clone());
        }
    }

    let mut id_of: BTreeMap<Sha, u32> = BTreeMap::new();
    let mut id_to_sha: Vec<Sha> = Vec::new();
    let mut ready: Vec<Sha> = remaining_parents
        .iter()
        .filter(|(_, count)| **count == 0)
        .map(|(sha, _)| sha.clone())
        .collect();
    ready.sort();
    let mut ready: VecDeque<Sha> = ready.into();

    while let Some(sha) = ready.pop_front() {
        let id = id_to_sha.len() as u32;
        id_of.insert(sha.clone(), id);
        id_to_sha.push(sha.clone());

        let mut newly_ready = Vec::new();
        if let Some(children) = children_of.get(&sha) {
            for child in children {
                let counter = remaining_parents.get_mut(child).expect("child was discovered");
                *counter -= 1;
                if *counter == 0 {
                    newly_ready.push(child.clone());
                }
            }
        }
        newly_ready.sort();
        ready.extend(newly_ready);
    }

    if id_to_sha.len() != parents_of.len() {
        return Err(Error::Corrupt(
            "commit DAG has a cycle; cannot assign topological ids".into(),
        ));
    }

    let mut forward: BTreeMap<u32, RoaringBitmap> = BTreeMap::new();
    let mut reverse: BTreeMap<u32, RoaringBitmap> = BTreeMap::new();
    for (sha, parents) in &parents_of {
        let child_id = id_of[sha];
        for parent in parents {
            let Some(&parent_id) = id_of.get(parent) else {
                continue;
            };
            forward.entry(parent_id).or_insert_with(RoaringBitmap::new).insert(child_id);
            reverse.entry(child_id).or_insert_with(RoaringBitmap::new).insert(parent_id);
        }
    }

    let state = BuildState {
        id_of,
        id_to_sha,
        forward,
        reverse,
    };
    persist(port, graph, &state)
}

fn persist(port: &dyn PersistencePort, graph: &str, state: &BuildState) -> Result<Sha> {
    let mut shards: BTreeMap<String, (ShardMeta, BTreeMap<u32, RoaringBitmap>, BTreeMap<u32, RoaringBitmap>)> =
        BTreeMap::new();

    for (sha, &id) in &state.id_of {
        let key = shard_key(sha);
        let entry = shards.entry(key).or_insert_with(|| {
            (ShardMeta::default(), BTreeMap::new(), BTreeMap::new())
        });
        entry.0 .0.insert(sha.clone(), id);
        if let Some(fwd) = state.forward.get(&id) {
            entry.1.insert(id, fwd.clone());
        }
        if let Some(rev) = state.reverse.get(&id) {
            entry.2.insert(id, rev.clone());
        }
    }

    let mut tree_entries = Vec::new();

    let manifest = Manifest {
        id_to_sha: state.id_to_sha.clone(),
    };
    let manifest_bytes = serde_json::to_vec(&manifest).map_err(|e| Error::Codec(e.to_string()))?;
    let manifest_oid = port.write_blob(&manifest_bytes)?;
    tree_entries.push(format!("100644 blob {manifest_oid}\t{MANIFEST_FILENAME}"));

    for (shard, (meta, fwd, rev)) in &shards {
        let meta_bytes = serde_json::to_vec(meta).map_err(|e| Error::Codec(e.to_string()))?;
        let meta_oid = port.write_blob(&meta_bytes)?;
        tree_entries.push(format!("100644 blob {meta_oid}\t{}", meta_filename(shard)));

        let fwd_adjacency = ShardAdjacency::encode(fwd)?;
        let fwd_bytes = serde_json::to_vec(&fwd_adjacency).map_err(|e| Error::Codec(e.to_string()))?;
        let fwd_oid = port.write_blob(&fwd_bytes)?;
        tree_entries.push(format!("100644 blob {fwd_oid}\t{}", forward_filename(shard)));

        let rev_adjacency = ShardAdjacency::encode(rev)?;
        let rev_bytes = serde_json::to_vec(&rev_adjacency).map_err(|e| Error::Codec(e.to_string()))?;
        let rev_oid = port.write_blob(&rev_bytes)?;
        tree_entries.push(format!("100644 blob {rev_oid}\t{}", reverse_filename(shard)));
    }

    let tree_oid = port.write_tree(&tree_entries)?;
    let ref_name = index_ref(graph);
    let parent = port.read_ref(&ref_name)?;
    let parents: Vec<String> = parent.into_iter().collect();
    let message = format!("warp:index\n\neg-graph: {graph}\neg-shards: {}\n", shards.len());
    let commit_sha = port.commit(&message, &parents, Some(&tree_oid), false)?;
    port.update_ref(&ref_name, &commit_sha)?;
    tracing::info!(
        graph,
        shards = shards.len(),
        commits = state.id_to_sha.len(),
        commit = %commit_sha,
        "bitmap index rebuilt"
    );
    Ok(commit_sha)
}

#[cfg(test)]
mod tests {
    use super::*;
    use warp_core::port::memory::MemoryPort;

    #[test]
    fn rebuild_over_a_chain_of_100_commits() {
        let port = MemoryPort::new();
        let mut parents = Vec::new();
        let mut tip = None;
        for i in 0..100 {
            let sha = port
                .commit(&format!("commit {i}"), &parents, None, false)
                .unwrap();
            parents = vec![sha.clone()];
            tip = Some(sha);
        }
        port.update_ref("refs/heads/main", tip.as_ref().unwrap()).unwrap();

        let index_sha = rebuild(&port, "g1", "refs/heads/main").unwrap();
        assert!(port.show_commit(&index_sha).is_ok());
    }
}
