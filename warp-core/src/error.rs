//! Shared error taxonomy for the replicated state engine.
//!
//! Every variant carries a machine-readable [`Error::code`] plus whatever
//! typed diagnostic fields that variant needs (an expected/actual sha, a
//! writer name, a cycle size). Downstream crates (`warp-sync`, `warp-index`,
//! `warp-traversal`) reuse this type rather than minting their own, so a
//! caller driving the whole engine only ever matches on one `Error`.

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("patch has no operations")]
    EmptyPatch,

    #[error("writer ref moved: expected {expected_sha}, found {actual_sha}")]
    WriterCasConflict {
        expected_sha: String,
        actual_sha: String,
    },

    #[error("patch schema {found} is newer than the reader's max supported schema {max}")]
    SchemaUnsupported { found: u32, max: u32 },

    #[error("required trailer missing: {0}")]
    TrailerMissing(&'static str),

    #[error("duplicate trailer: {0}")]
    TrailerDuplicate(String),

    #[error("invalid graph or writer name: {0}")]
    InvalidName(String),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("chain walk for writer {writer} could not reach {from_sha}")]
    SyncDivergence { writer: String, from_sha: String },

    #[error("sync protocol error: {0}")]
    SyncProtocol(String),

    #[error("remote sync failure: {0}")]
    SyncRemote(String),

    #[error("sync request timed out after {0}ms")]
    SyncTimeout(u64),

    #[error("sync network error: {0}")]
    SyncNetwork(String),

    #[error("wormhole spans more than one writer")]
    WormholeMultiWriter,

    #[error("wormhole range is not a valid ancestor chain")]
    WormholeInvalidRange,

    #[error("wormhole sha not found: {0}")]
    WormholeShaNotFound(String),

    #[error("commit {0} is not a patch commit")]
    WormholeNotPatch(String),

    #[error("cycle detected during topological sort (size {cycle_size})")]
    CycleDetected { cycle_size: usize },

    #[error("operation {operation} was aborted")]
    OperationAborted { operation: String },

    #[error("object not found: {0}")]
    NotFound(String),

    #[error("corrupt object: {0}")]
    Corrupt(String),
}

impl Error {
    /// Machine-readable error code, stable across releases.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Io(_) => "E_IO",
            Error::EmptyPatch => "E_EMPTY_PATCH",
            Error::WriterCasConflict { .. } => "WRITER_CAS_CONFLICT",
            Error::SchemaUnsupported { .. } => "E_SCHEMA_UNSUPPORTED",
            Error::TrailerMissing(_) => "E_TRAILER_MISSING",
            Error::TrailerDuplicate(_) => "E_TRAILER_DUPLICATE",
            Error::InvalidName(_) => "E_INVALID_NAME",
            Error::Codec(_) => "E_CODEC",
            Error::SyncDivergence { .. } => "E_SYNC_DIVERGENCE",
            Error::SyncProtocol(_) => "E_SYNC_PROTOCOL",
            Error::SyncRemote(_) => "E_SYNC_REMOTE",
            Error::SyncTimeout(_) => "E_SYNC_TIMEOUT",
            Error::SyncNetwork(_) => "E_SYNC_NETWORK",
            Error::WormholeMultiWriter => "E_WORMHOLE_MULTI_WRITER",
            Error::WormholeInvalidRange => "E_WORMHOLE_INVALID_RANGE",
            Error::WormholeShaNotFound(_) => "E_WORMHOLE_SHA_NOT_FOUND",
            Error::WormholeNotPatch(_) => "E_WORMHOLE_NOT_PATCH",
            Error::CycleDetected { .. } => "CYCLE_DETECTED",
            Error::OperationAborted { .. } => "OPERATION_ABORTED",
            Error::NotFound(_) => "E_NOT_FOUND",
            Error::Corrupt(_) => "E_CORRUPT",
        }
    }

    /// Whether a sync driver should retry this error with backoff.
    pub fn is_retryable_sync_error(&self) -> bool {
        matches!(
            self,
            Error::SyncRemote(_) | Error::SyncTimeout(_) | Error::SyncNetwork(_)
        )
    }

    pub fn aborted(operation: impl Into<String>) -> Self {
        Error::OperationAborted {
            operation: operation.into(),
        }
    }
}
