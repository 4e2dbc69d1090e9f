//! Bookmarks: a named pointer under
//! `refs/warp/<graph>/bookmarks/<name>` to a commit a reader wants to return
//! to later — a sync cursor, a pinned frontier, a tagged release. Unlike a
//! writer ref, a bookmark has no CAS discipline: any caller holding the
//! graph can move or delete it.

use crate::error::{Error, Result};
use crate::model::is_valid_name;
use crate::port::{PersistencePort, Sha};

fn ref_name(graph: &str, name: &str) -> String {
    format!("refs/warp/{graph}/bookmarks/{name}")
}

/// Points `name` at `sha`, creating or overwriting it unconditionally.
pub fn set(port: &dyn PersistencePort, graph: &str, name: &str, sha: &Sha) -> Result<()> {
    if !is_valid_name(graph) || !is_valid_name(name) {
        return Err(Error::InvalidName(format!("{graph}/{name}")));
    }
    port.update_ref(&ref_name(graph, name), sha)
}

/// Reads the commit `name` currently points at, if it exists.
pub fn get(port: &dyn PersistencePort, graph: &str, name: &str) -> Result<Option<Sha>> {
    port.read_ref(&ref_name(graph, name))
}

/// Removes `name`. A no-op if it doesn't exist.
pub fn delete(port: &dyn PersistencePort, graph: &str, name: &str) -> Result<()> {
    port.delete_ref(&ref_name(graph, name))
}

/// Lists every bookmark name set for `graph`.
pub fn list(port: &dyn PersistencePort, graph: &str) -> Result<Vec<String>> {
    let prefix = format!("refs/warp/{graph}/bookmarks/");
    port.list_refs(&prefix)?
        .into_iter()
        .map(|reference| {
            reference
                .strip_prefix(&prefix)
                .map(str::to_string)
                .ok_or_else(|| Error::Corrupt(format!("unexpected ref shape: {reference}")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::memory::MemoryPort;
    use crate::writer::WriterSession;

    #[test]
    fn set_get_and_delete_round_trip() {
        let port = MemoryPort::new();
        let mut session =
            WriterSession::open(&port, "g1", "A", &crate::vv::VersionVector::new()).unwrap();
        session.add_node("n1");
        let tip = session.commit().unwrap();

        set(&port, "g1", "stable", &tip).unwrap();
        assert_eq!(get(&port, "g1", "stable").unwrap(), Some(tip.clone()));
        assert_eq!(list(&port, "g1").unwrap(), vec!["stable".to_string()]);

        delete(&port, "g1", "stable").unwrap();
        assert_eq!(get(&port, "g1", "stable").unwrap(), None);
    }

    #[test]
    fn invalid_name_rejected() {
        let port = MemoryPort::new();
        let err = set(&port, "g1", "bad name", &"sha".to_string()).unwrap_err();
        assert_eq!(err.code(), "E_INVALID_NAME");
    }
}
