//! Multi-writer CRDT graph engine: patch model, CRDT join semantics,
//! materialization, checkpoints, garbage collection, provenance and
//! wormhole replay, all built atop the abstract [`port::PersistencePort`]
//! seam to a content-addressed commit/blob/tree object store.

pub mod bookmark;
pub mod checkpoint;
pub mod codec;
pub mod error;
pub mod frontier;
pub mod gc;
pub mod handle;
pub mod lww;
pub mod model;
pub mod orset;
pub mod port;
pub mod provenance;
pub mod reduce;
pub mod vv;
pub mod wormhole;
pub mod writer;

pub use error::{Error, Result};
pub use handle::{GraphHandle, HandlePolicy};
pub use model::{
    CborValue, DotRef, EdgeKey, EventId, NodeId, Op, Patch, PropKey, PropTarget, Sha, ValueRef,
    WriterId, MAX_SUPPORTED_SCHEMA,
};
pub use port::PersistencePort;
pub use reduce::State;
pub use vv::VersionVector;
pub use writer::WriterSession;
