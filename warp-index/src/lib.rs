//! Sharded roaring-bitmap index over the commit DAG: O(1) amortized
//! parent/child lookups independent of the graph-data CRDT layer, used for
//! DAG traversal and time-travel queries.

pub mod builder;
pub mod reader;
pub mod shard;

pub use builder::{index_ref, rebuild};
pub use reader::BitmapIndex;
pub use shard::shard_key;
