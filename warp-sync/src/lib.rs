//! Frontier-based sync protocol: wire messages, delta computation, the
//! server/client handlers, and a retry/backoff scheduler, all built atop
//! `warp-core`'s persistence port and CRDT state.

pub mod client;
pub mod delta;
pub mod messages;
pub mod retry;
pub mod server;

pub use client::{apply_sync_response, ApplyResult};
pub use delta::{compute_sync_delta, sync_needed, SyncDelta, SyncRange};
pub use messages::{PatchEntry, SyncRequest, SyncResponse};
pub use retry::{BackoffPolicy, RetryDecision};
pub use server::process_sync_request;
