//! In-memory reference implementation of [`PersistencePort`], used by the
//! rest of this crate's test suite and by `warp-sync`/`warp-index`/
//! `warp-traversal`'s tests. Several independent maps behind
//! `Arc<RwLock<_>>` rather than one lock around a monolithic struct, so
//! readers and writers of unrelated object kinds never contend.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, RwLock};

use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::port::{CommitInfo, Oid, PersistencePort, Sha, TreeEntryLine};

#[derive(Debug, Clone)]
struct StoredCommit {
    message: String,
    parents: Vec<Sha>,
    tree_oid: Option<Oid>,
    author: String,
    date: String,
}

#[derive(Debug, Default)]
pub struct MemoryPort {
    commits: Arc<RwLock<BTreeMap<Sha, StoredCommit>>>,
    blobs: Arc<RwLock<BTreeMap<Oid, Vec<u8>>>>,
    trees: Arc<RwLock<BTreeMap<Oid, Vec<(String, Oid)>>>>,
    refs: Arc<RwLock<BTreeMap<String, Sha>>>,
    config: Arc<RwLock<BTreeMap<String, String>>>,
    clock: AtomicU64,
}

impl MemoryPort {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_date(&self) -> String {
        let tick = self.clock.fetch_add(1, AtomicOrdering::Relaxed);
        format!("1970-01-01T00:00:{tick:02}Z")
    }

    fn content_sha(bytes: &[u8]) -> String {
        let digest = Sha256::digest(bytes);
        digest.iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl PersistencePort for MemoryPort {
    fn commit(
        &self,
        message: &str,
        parents: &[Sha],
        tree_oid: Option<&Oid>,
        _sign: bool,
    ) -> Result<Sha> {
        let date = self.next_date();
        let mut hasher_input = message.as_bytes().to_vec();
        for parent in parents {
            hasher_input.extend_from_slice(parent.as_bytes());
        }
        if let Some(tree) = tree_oid {
            hasher_input.extend_from_slice(tree.as_bytes());
        }
        hasher_input.extend_from_slice(date.as_bytes());
        let sha = Self::content_sha(&hasher_input);

        self.commits.write().unwrap().insert(
            sha.clone(),
            StoredCommit {
                message: message.to_string(),
                parents: parents.to_vec(),
                tree_oid: tree_oid.cloned(),
                author: "warp".to_string(),
                date,
            },
        );
        Ok(sha)
    }

    fn show_commit(&self, sha: &Sha) -> Result<String> {
        self.commits
            .read()
            .unwrap()
            .get(sha)
            .map(|c| c.message.clone())
            .ok_or_else(|| Error::NotFound(format!("commit {sha}")))
    }

    fn get_node_info(&self, sha: &Sha) -> Result<CommitInfo> {
        let commits = self.commits.read().unwrap();
        let commit = commits
            .get(sha)
            .ok_or_else(|| Error::NotFound(format!("commit {sha}")))?;
        Ok(CommitInfo {
            sha: sha.clone(),
            message: commit.message.clone(),
            author: commit.author.clone(),
            date: commit.date.clone(),
            parents: commit.parents.clone(),
            tree_oid: commit.tree_oid.clone(),
        })
    }

    fn log_stream(&self, start_ref: &str, limit: usize) -> Result<Vec<Sha>> {
        let Some(mut cursor) = self.read_ref(start_ref)? else {
            return Ok(Vec::new());
        };
        let commits = self.commits.read().unwrap();
        let mut out = Vec::new();
        loop {
            if limit > 0 && out.len() >= limit {
                break;
            }
            let Some(commit) = commits.get(&cursor) else {
                break;
            };
            out.push(cursor.clone());
            match commit.parents.first() {
                Some(parent) => cursor = parent.clone(),
                None => break,
            }
        }
        Ok(out)
    }

    fn write_blob(&self, bytes: &[u8]) -> Result<Oid> {
        let oid = Self::content_sha(bytes);
        self.blobs.write().unwrap().insert(oid.clone(), bytes.to_vec());
        Ok(oid)
    }

    fn read_blob(&self, oid: &Oid) -> Result<Vec<u8>> {
        self.blobs
            .read()
            .unwrap()
            .get(oid)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("blob {oid}")))
    }

    fn write_tree(&self, entries: &[TreeEntryLine]) -> Result<Oid> {
        let mut parsed = Vec::with_capacity(entries.len());
        for line in entries {
            let (oid_part, path) = line
                .split_once('\t')
                .ok_or_else(|| Error::Corrupt(format!("malformed tree entry: {line}")))?;
            let oid = oid_part
                .rsplit(' ')
                .next()
                .ok_or_else(|| Error::Corrupt(format!("malformed tree entry: {line}")))?;
            parsed.push((path.to_string(), oid.to_string()));
        }
        parsed.sort();
        let oid = Self::content_sha(entries.join("\n").as_bytes());
        self.trees.write().unwrap().insert(oid.clone(), parsed);
        Ok(oid)
    }

    fn read_tree(&self, tree_oid: &Oid) -> Result<Vec<(String, Oid)>> {
        self.trees
            .read()
            .unwrap()
            .get(tree_oid)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("tree {tree_oid}")))
    }

    fn update_ref(&self, reference: &str, oid: &Sha) -> Result<()> {
        self.refs
            .write()
            .unwrap()
            .insert(reference.to_string(), oid.clone());
        Ok(())
    }

    fn compare_and_swap_ref(
        &self,
        reference: &str,
        expected: Option<&Sha>,
        new: &Sha,
    ) -> Result<()> {
        let mut refs = self.refs.write().unwrap();
        let actual = refs.get(reference).cloned();
        if actual.as_deref() != expected.map(String::as_str) {
            return Err(Error::WriterCasConflict {
                expected_sha: expected.cloned().unwrap_or_default(),
                actual_sha: actual.unwrap_or_default(),
            });
        }
        refs.insert(reference.to_string(), new.clone());
        Ok(())
    }

    fn read_ref(&self, reference: &str) -> Result<Option<Sha>> {
        Ok(self.refs.read().unwrap().get(reference).cloned())
    }

    fn delete_ref(&self, reference: &str) -> Result<()> {
        self.refs.write().unwrap().remove(reference);
        Ok(())
    }

    fn list_refs(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .refs
            .read()
            .unwrap()
            .keys()
            .filter(|r| r.starts_with(prefix))
            .cloned()
            .collect())
    }

    fn ping(&self) -> Result<()> {
        Ok(())
    }

    fn count_nodes(&self, start_ref: &str) -> Result<usize> {
        self.log_stream(start_ref, 0).map(|v| v.len())
    }

    fn get_config(&self, key: &str) -> Result<Option<String>> {
        Ok(self.config.read().unwrap().get(key).cloned())
    }

    fn set_config(&self, key: &str, value: &str) -> Result<()> {
        self.config
            .write()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cas_conflict_reports_expected_and_actual() {
        let port = MemoryPort::new();
        port.compare_and_swap_ref("refs/x", None, &"sha1".to_string())
            .unwrap();

        let err = port
            .compare_and_swap_ref("refs/x", None, &"sha2".to_string())
            .unwrap_err();
        assert_eq!(err.code(), "WRITER_CAS_CONFLICT");
    }

    #[test]
    fn blob_and_tree_round_trip() {
        let port = MemoryPort::new();
        let oid = port.write_blob(b"hello").unwrap();
        assert_eq!(port.read_blob(&oid).unwrap(), b"hello");

        let tree_oid = port
            .write_tree(&[format!("100644 blob {oid}\tpatch.cbor")])
            .unwrap();
        let entries = port.read_tree(&tree_oid).unwrap();
        assert_eq!(entries, vec![("patch.cbor".to_string(), oid)]);
    }

    #[test]
    fn log_stream_walks_first_parent_chain() {
        let port = MemoryPort::new();
        let c1 = port.commit("c1", &[], None, false).unwrap();
        let c2 = port.commit("c2", &[c1.clone()], None, false).unwrap();
        let c3 = port.commit("c3", &[c2.clone()], None, false).unwrap();
        port.update_ref("refs/head", &c3).unwrap();

        let log = port.log_stream("refs/head", 0).unwrap();
        assert_eq!(log, vec![c3, c2, c1]);
    }
}
