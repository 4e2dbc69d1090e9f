//! Shared traversal plumbing: node/depth
//! bounds and a cooperative abort signal checked periodically rather than
//! on every single expansion.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use warp_core::error::{Error, Result};

/// How often (in expansions) an abort signal is re-checked.
pub const ABORT_CHECK_INTERVAL: usize = 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub max_nodes: usize,
    pub max_depth: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_nodes: 100_000,
            max_depth: 1_000,
        }
    }
}

/// A cheap, clonable cancellation flag. Traversal loops check it every
/// [`ABORT_CHECK_INTERVAL`] expansions and before each port call that may
/// block, "cancellation flows through an abort signal".
#[derive(Debug, Clone, Default)]
pub struct AbortSignal(Arc<AtomicBool>);

impl AbortSignal {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn fire(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_fired(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Returns `OPERATION_ABORTED` if this signal has fired, tagging the
    /// error with `operation` for diagnostics.
    pub fn check(&self, operation: &str) -> Result<()> {
        if self.is_fired() {
            tracing::debug!(operation, "traversal aborted");
            return Err(Error::aborted(operation));
        }
        Ok(())
    }
}

/// Result shape for traversal queries that have a not-found outcome:
/// callers get `{found: false, length: -1}` rather than an error for
/// routine not-found cases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathResult<T> {
    pub found: bool,
    pub path: Vec<T>,
    pub length: i64,
}

impl<T> PathResult<T> {
    pub fn not_found() -> Self {
        Self {
            found: false,
            path: Vec::new(),
            length: -1,
        }
    }

    pub fn found(path: Vec<T>) -> Self {
        let length = path.len() as i64;
        Self {
            found: true,
            path,
            length,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abort_signal_fires_across_clones() {
        let signal = AbortSignal::new();
        let cloned = signal.clone();
        assert!(signal.check("traverse").is_ok());
        cloned.fire();
        let err = signal.check("traverse").unwrap_err();
        assert_eq!(err.code(), "OPERATION_ABORTED");
    }

    #[test]
    fn not_found_has_negative_length() {
        let result: PathResult<String> = PathResult::not_found();
        assert!(!result.found);
        assert_eq!(result.length, -1);
    }
}
