//! Lazy, shard-caching reader API: `lookup_id`, `get_parents`,
//! `get_children`, each O(1) amortized once the relevant shard (and the
//! global manifest) has been loaded once.

use std::collections::BTreeMap;
use std::sync::RwLock;

use warp_core::error::{Error, Result};
use warp_core::port::{PersistencePort, Sha};

use crate::builder::index_ref;
use crate::shard::{forward_filename, meta_filename, reverse_filename, Manifest, ShardAdjacency, ShardMeta, MANIFEST_FILENAME};

#[derive(Default)]
struct Cache {
    manifest: Option<Manifest>,
    meta: BTreeMap<String, ShardMeta>,
    forward: BTreeMap<String, ShardAdjacency>,
    reverse: BTreeMap<String, ShardAdjacency>,
}

/// Holds the index commit's tree listing (cheap to keep resident) and a
/// lazily-populated cache of whichever shard files a caller has actually
/// asked about.
pub struct BitmapIndex<'p> {
    port: &'p dyn PersistencePort,
    tree: BTreeMap<String, String>,
    cache: RwLock<Cache>,
}

impl<'p> BitmapIndex<'p> {
    /// Opens the most recent index commit for `graph`. Only reads the tree
    /// listing; no shard content is loaded until a query touches it.
    pub fn open(port: &'p dyn PersistencePort, graph: &str) -> Result<Self> {
        let ref_name = index_ref(graph);
        let sha = port
            .read_ref(&ref_name)?
            .ok_or_else(|| Error::NotFound(format!("index for {graph}")))?;
        let info = port.get_node_info(&sha)?;
        let tree_oid = info
            .tree_oid
            .ok_or_else(|| Error::Corrupt(format!("index commit {sha} has no tree")))?;
        let entries = port.read_tree(&tree_oid)?;
        let tree = entries.into_iter().collect();
        Ok(Self {
            port,
            tree,
            cache: RwLock::new(Cache::default()),
        })
    }

    fn blob_by_name(&self, name: &str) -> Result<Vec<u8>> {
        let oid = self
            .tree
            .get(name)
            .ok_or_else(|| Error::NotFound(format!("index file {name}")))?;
        self.port.read_blob(oid)
    }

    fn manifest(&self) -> Result<Manifest> {
        if let Some(manifest) = self.cache.read().unwrap().manifest.clone() {
            return Ok(manifest);
        }
        let bytes = self.blob_by_name(MANIFEST_FILENAME)?;
        let manifest: Manifest = serde_json::from_slice(&bytes).map_err(|e| Error::Corrupt(e.to_string()))?;
        self.cache.write().unwrap().manifest = Some(manifest.clone());
        Ok(manifest)
    }

    fn meta_for_shard(&self, shard: &str) -> Result<ShardMeta> {
        if let Some(meta) = self.cache.read().unwrap().meta.get(shard).cloned() {
            return Ok(meta);
        }
        let bytes = self.blob_by_name(&meta_filename(shard))?;
        let meta: ShardMeta = serde_json::from_slice(&bytes).map_err(|e| Error::Corrupt(e.to_string()))?;
        self.cache
            .write()
            .unwrap()
            .meta
            .insert(shard.to_string(), meta.clone());
        Ok(meta)
    }

    fn forward_for_shard(&self, shard: &str) -> Result<ShardAdjacency> {
        if let Some(adj) = self.cache.read().unwrap().forward.get(shard).cloned() {
            return Ok(adj);
        }
        let bytes = self.blob_by_name(&forward_filename(shard))?;
        let adj: ShardAdjacency = serde_json::from_slice(&bytes).map_err(|e| Error::Corrupt(e.to_string()))?;
        self.cache
            .write()
            .unwrap()
            .forward
            .insert(shard.to_string(), adj.clone());
        Ok(adj)
    }

    fn reverse_for_shard(&self, shard: &str) -> Result<ShardAdjacency> {
        if let Some(adj) = self.cache.read().unwrap().reverse.get(shard).cloned() {
            return Ok(adj);
        }
        let bytes = self.blob_by_name(&reverse_filename(shard))?;
        let adj: ShardAdjacency = serde_json::from_slice(&bytes).map_err(|e| Error::Corrupt(e.to_string()))?;
        self.cache
            .write()
            .unwrap()
            .reverse
            .insert(shard.to_string(), adj.clone());
        Ok(adj)
    }

    pub fn lookup_id(&self, sha: &Sha) -> Result<Option<u32>> {
        let shard = crate::shard::shard_key(sha);
        let meta = self.meta_for_shard(&shard)?;
        Ok(meta.0.get(sha).copied())
    }

    fn resolve_ids(&self, ids: impl IntoIterator<Item = u32>) -> Result<Vec<Sha>> {
        let manifest = self.manifest()?;
        ids.into_iter()
            .map(|id| {
                manifest
                    .id_to_sha
                    .get(id as usize)
                    .cloned()
                    .ok_or_else(|| Error::Corrupt(format!("dangling index id {id}")))
            })
            .collect()
    }

    pub fn get_children(&self, sha: &Sha) -> Result<Vec<Sha>> {
        let Some(id) = self.lookup_id(sha)? else {
            return Ok(Vec::new());
        };
        let shard = crate::shard::shard_key(sha);
        let forward = self.forward_for_shard(&shard)?;
        let Some(bitmap) = forward.decode_one(id)? else {
            return Ok(Vec::new());
        };
        self.resolve_ids(bitmap.iter())
    }

    pub fn get_parents(&self, sha: &Sha) -> Result<Vec<Sha>> {
        let Some(id) = self.lookup_id(sha)? else {
            return Ok(Vec::new());
        };
        let shard = crate::shard::shard_key(sha);
        let reverse = self.reverse_for_shard(&shard)?;
        let Some(bitmap) = reverse.decode_one(id)? else {
            return Ok(Vec::new());
        };
        self.resolve_ids(bitmap.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::rebuild;
    use warp_core::port::memory::MemoryPort;

    #[test]
    fn round_trip_over_a_chain_of_100() {
        let port = MemoryPort::new();
        let mut parents = Vec::new();
        let mut shas = Vec::new();
        for i in 0..100 {
            let sha = port
                .commit(&format!("commit {i}"), &parents, None, false)
                .unwrap();
            parents = vec![sha.clone()];
            shas.push(sha);
        }
        port.update_ref("refs/heads/main", shas.last().unwrap()).unwrap();
        rebuild(&port, "g1", "refs/heads/main").unwrap();

        let index = BitmapIndex::open(&port, "g1").unwrap();
        assert_eq!(index.lookup_id(&shas[0]).unwrap(), Some(0));
        assert_eq!(index.get_parents(&shas[50]).unwrap(), vec![shas[49].clone()]);
        assert_eq!(index.get_children(&shas[50]).unwrap(), vec![shas[51].clone()]);
        assert!(index.get_parents(&shas[0]).unwrap().is_empty());
    }
}
