//! Wire types for the sync protocol.

use serde::{Deserialize, Serialize};

use warp_core::frontier::Frontier;
use warp_core::{Patch, Sha, WriterId};

fn sync_request_tag() -> String {
    "sync-request".to_string()
}

fn sync_response_tag() -> String {
    "sync-response".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRequest {
    #[serde(rename = "type", default = "sync_request_tag")]
    pub kind: String,
    pub frontier: Frontier,
}

impl SyncRequest {
    pub fn new(frontier: Frontier) -> Self {
        Self {
            kind: sync_request_tag(),
            frontier,
        }
    }
}

/// One patch as carried on the wire, paired with the writer and blob sha it
/// was loaded under so the client can fold it straight into provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchEntry {
    pub writer_id: WriterId,
    pub sha: Sha,
    pub patch: Patch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncResponse {
    #[serde(rename = "type", default = "sync_response_tag")]
    pub kind: String,
    pub frontier: Frontier,
    pub patches: Vec<PatchEntry>,
}

impl SyncResponse {
    pub fn new(frontier: Frontier, patches: Vec<PatchEntry>) -> Self {
        Self {
            kind: sync_response_tag(),
            frontier,
            patches,
        }
    }
}
