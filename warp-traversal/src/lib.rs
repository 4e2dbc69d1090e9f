//! Graph traversal over two distinct surfaces: logical traversal of a
//! materialized [`warp_core::reduce::State`] (neighbors, BFS/DFS, shortest
//! path, connected components) and commit-DAG traversal over a
//! [`warp_index::BitmapIndex`] (ancestors/descendants, weighted pathfinding,
//! topological sort), sharing one set of limits, abort-signal, and
//! not-found-result plumbing.

pub mod common;
pub mod dag;
pub mod logical;

pub use common::{AbortSignal, Limits, PathResult, ABORT_CHECK_INTERVAL};
pub use logical::Direction;
