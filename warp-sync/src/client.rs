//! `applySyncResponse`: folds a response into a fresh
//! `(state, frontier)` pair without mutating the caller's inputs.

use std::collections::BTreeMap;

use warp_core::frontier::Frontier;
use warp_core::reduce::State;
use warp_core::Error;

use crate::messages::SyncResponse;

#[derive(Debug, Clone, PartialEq)]
pub struct ApplyResult {
    pub state: State,
    pub frontier: Frontier,
    pub applied: usize,
}

/// Groups `response.patches` by writer, checks each against
/// `reader_max_schema`, joins them into a clone of `state`, and advances
/// `frontier` to the last sha seen per writer. Idempotent: re-applying the
/// same response twice is safe because every op's dots are already
/// reflected in `observed_frontier` after the first application, so the
/// OR-Set/LWW joins are no-ops the second time.
pub fn apply_sync_response(
    state: &State,
    frontier: &Frontier,
    response: &SyncResponse,
    reader_max_schema: u32,
) -> Result<ApplyResult, Error> {
    let mut next_state = state.clone();
    let mut next_frontier = frontier.clone();
    let mut applied = 0usize;

    let mut by_writer: BTreeMap<&str, Vec<&crate::messages::PatchEntry>> = BTreeMap::new();
    for entry in &response.patches {
        by_writer.entry(entry.writer_id.as_str()).or_default().push(entry);
    }

    for (writer, entries) in by_writer {
        for entry in entries {
            if entry.patch.schema > reader_max_schema {
                return Err(Error::SchemaUnsupported {
                    found: entry.patch.schema,
                    max: reader_max_schema,
                });
            }
            next_state.apply_patch(&entry.patch, &entry.sha);
            next_frontier.insert(writer.to_string(), entry.sha.clone());
            applied += 1;
        }
    }

    Ok(ApplyResult {
        state: next_state,
        frontier: next_frontier,
        applied,
    })
}
