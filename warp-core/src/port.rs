//! The persistence port — the single seam between this engine
//! and the underlying content-addressed object store. The core depends
//! only on this trait; it never assumes a specific backing implementation.
//!
//! This port is synchronous rather than `async fn` — there is no async
//! runtime anywhere in this workspace. A "suspension point" here is a call
//! that may block inside the port implementation, not an `.await` point.

pub mod memory;

use crate::error::Result;

pub type Oid = String;
pub type Sha = String;

/// One entry as passed to [`PersistencePort::write_tree`]:
/// `"100644 blob <oid>\t<path>"`.
pub type TreeEntryLine = String;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    pub sha: Sha,
    pub message: String,
    pub author: String,
    pub date: String,
    pub parents: Vec<Sha>,
    pub tree_oid: Option<Oid>,
}

/// Narrow contract for commit/blob/tree/ref primitives. Every
/// method that can fail returns `crate::error::Result`; there is no
/// silent-default behavior on a missing object.
pub trait PersistencePort: Send + Sync {
    fn commit(
        &self,
        message: &str,
        parents: &[Sha],
        tree_oid: Option<&Oid>,
        sign: bool,
    ) -> Result<Sha>;

    fn show_commit(&self, sha: &Sha) -> Result<String>;

    fn get_node_info(&self, sha: &Sha) -> Result<CommitInfo>;

    /// Walks first-parent history from `start_ref`, most recent first,
    /// stopping after `limit` commits (or at the root if `limit` is 0).
    fn log_stream(&self, start_ref: &str, limit: usize) -> Result<Vec<Sha>>;

    fn write_blob(&self, bytes: &[u8]) -> Result<Oid>;

    fn read_blob(&self, oid: &Oid) -> Result<Vec<u8>>;

    fn write_tree(&self, entries: &[TreeEntryLine]) -> Result<Oid>;

    fn read_tree(&self, tree_oid: &Oid) -> Result<Vec<(String, Oid)>>;

    /// Unconditional ref update — used for checkpoint/index refs, which
    /// readers re-check via `hasFrontierChanged` rather than CAS.
    fn update_ref(&self, reference: &str, oid: &Sha) -> Result<()>;

    /// Writer-ref compare-and-swap: fails with
    /// `WRITER_CAS_CONFLICT` if the ref's current value doesn't match
    /// `expected` (`None` means "ref must not exist yet").
    fn compare_and_swap_ref(
        &self,
        reference: &str,
        expected: Option<&Sha>,
        new: &Sha,
    ) -> Result<()>;

    fn read_ref(&self, reference: &str) -> Result<Option<Sha>>;

    fn delete_ref(&self, reference: &str) -> Result<()>;

    fn list_refs(&self, prefix: &str) -> Result<Vec<String>>;

    fn ping(&self) -> Result<()>;

    fn count_nodes(&self, start_ref: &str) -> Result<usize>;

    fn get_config(&self, key: &str) -> Result<Option<String>>;

    fn set_config(&self, key: &str, value: &str) -> Result<()>;
}
