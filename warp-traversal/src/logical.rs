//! Logical traversal over a materialized [`warp_core::reduce::State`]
//!: neighbors, BFS, DFS, shortest path, connected
//! components, all with optional edge-label filters.

use std::collections::{BTreeSet, VecDeque};

use warp_core::error::Result;
use warp_core::model::{EdgeKey, NodeId};
use warp_core::reduce::State;

use crate::common::{AbortSignal, Limits, PathResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Out,
    In,
    Both,
}

/// Every visible edge touching `node` in `direction`, optionally filtered
/// to a single `label`.
pub fn neighbors(state: &State, node: &NodeId, direction: Direction, label: Option<&str>) -> Vec<NodeId> {
    if !state.has_node(node) {
        return Vec::new();
    }
    let mut out = Vec::new();
    for edge in edges_matching(state, label) {
        let forward = edge.from == *node && matches!(direction, Direction::Out | Direction::Both);
        let backward = edge.to == *node && matches!(direction, Direction::In | Direction::Both);
        if forward && state.has_node(&edge.to) {
            out.push(edge.to.clone());
        }
        if backward && state.has_node(&edge.from) {
            out.push(edge.from.clone());
        }
    }
    out.sort();
    out.dedup();
    out
}

/// Every currently visible edge, optionally filtered to a single label.
/// Visibility is "alive in the edge OR-Set and both endpoints visible" —
/// checked by the caller, since a filtered edge iterator here has no
/// opinion on direction.
fn edges_matching<'a>(state: &'a State, label: Option<&str>) -> impl Iterator<Item = &'a EdgeKey> {
    state
        .edge_alive
        .elements()
        .filter(move |edge| label.is_none_or(|l| edge.label == l))
}

/// Visits reachable nodes breadth-first from `start`, bounded by `limits`
/// and cancellable via `abort`. Only edges where both endpoints are
/// currently visible are walked.
pub fn bfs(
    state: &State,
    start: &NodeId,
    direction: Direction,
    label: Option<&str>,
    limits: Limits,
    abort: &AbortSignal,
) -> Result<Vec<NodeId>> {
    if !state.has_node(start) {
        return Ok(Vec::new());
    }
    let mut visited = BTreeSet::new();
    visited.insert(start.clone());
    let mut order = vec![start.clone()];
    let mut queue = VecDeque::new();
    queue.push_back((start.clone(), 0usize));
    let mut expansions = 0usize;

    while let Some((node, depth)) = queue.pop_front() {
        if depth >= limits.max_depth || order.len() >= limits.max_nodes {
            continue;
        }
        expansions += 1;
        if expansions % crate::common::ABORT_CHECK_INTERVAL == 0 {
            abort.check("bfs")?;
        }
        for next in neighbors(state, &node, direction, label) {
            if visited.insert(next.clone()) {
                order.push(next.clone());
                if order.len() >= limits.max_nodes {
                    break;
                }
                queue.push_back((next, depth + 1));
            }
        }
    }
    Ok(order)
}

/// Depth-first visit order from `start`.
pub fn dfs(
    state: &State,
    start: &NodeId,
    direction: Direction,
    label: Option<&str>,
    limits: Limits,
    abort: &AbortSignal,
) -> Result<Vec<NodeId>> {
    if !state.has_node(start) {
        return Ok(Vec::new());
    }
    let mut visited = BTreeSet::new();
    let mut order = Vec::new();
    let mut stack = vec![(start.clone(), 0usize)];
    let mut expansions = 0usize;

    while let Some((node, depth)) = stack.pop() {
        if !visited.insert(node.clone()) {
            continue;
        }
        order.push(node.clone());
        if order.len() >= limits.max_nodes || depth >= limits.max_depth {
            continue;
        }
        expansions += 1;
        if expansions % crate::common::ABORT_CHECK_INTERVAL == 0 {
            abort.check("dfs")?;
        }
        for next in neighbors(state, &node, direction, label).into_iter().rev() {
            if !visited.contains(&next) {
                stack.push((next, depth + 1));
            }
        }
    }
    Ok(order)
}

/// Unweighted shortest path via BFS, reconstructed from a predecessor map.
pub fn shortest_path(
    state: &State,
    from: &NodeId,
    to: &NodeId,
    direction: Direction,
    label: Option<&str>,
    limits: Limits,
    abort: &AbortSignal,
) -> Result<PathResult<NodeId>> {
    if !state.has_node(from) || !state.has_node(to) {
        return Ok(PathResult::not_found());
    }
    if from == to {
        return Ok(PathResult::found(vec![from.clone()]));
    }

    let mut visited = BTreeSet::new();
    visited.insert(from.clone());
    let mut predecessor = std::collections::BTreeMap::new();
    let mut queue = VecDeque::new();
    queue.push_back((from.clone(), 0usize));
    let mut expansions = 0usize;

    while let Some((node, depth)) = queue.pop_front() {
        if depth >= limits.max_depth || visited.len() >= limits.max_nodes {
            continue;
        }
        expansions += 1;
        if expansions % crate::common::ABORT_CHECK_INTERVAL == 0 {
            abort.check("shortest_path")?;
        }
        for next in neighbors(state, &node, direction, label) {
            if visited.insert(next.clone()) {
                predecessor.insert(next.clone(), node.clone());
                if next == *to {
                    let mut path = vec![to.clone()];
                    let mut cursor = to.clone();
                    while let Some(prev) = predecessor.get(&cursor) {
                        path.push(prev.clone());
                        cursor = prev.clone();
                        if cursor == *from {
                            break;
                        }
                    }
                    path.reverse();
                    return Ok(PathResult::found(path));
                }
                queue.push_back((next, depth + 1));
            }
        }
    }
    Ok(PathResult::not_found())
}

/// The set of nodes reachable from `start` treating every visible edge as
/// undirected.
pub fn connected_component(
    state: &State,
    start: &NodeId,
    limits: Limits,
    abort: &AbortSignal,
) -> Result<Vec<NodeId>> {
    bfs(state, start, Direction::Both, None, limits, abort)
}

#[cfg(test)]
mod tests {
    use super::*;
    use warp_core::model::{EdgeKey, Op, Patch};
    use warp_core::VersionVector;

    fn build_state() -> State {
        let mut state = State::new();
        let patch = Patch {
            schema: 2,
            writer: "A".into(),
            lamport: 1,
            context: VersionVector::new(),
            ops: vec![
                Op::NodeAdd { node: "a".into(), seq: 1 },
                Op::NodeAdd { node: "b".into(), seq: 2 },
                Op::NodeAdd { node: "c".into(), seq: 3 },
                Op::EdgeAdd {
                    edge: EdgeKey::new("a", "b", "knows"),
                    seq: 4,
                },
                Op::EdgeAdd {
                    edge: EdgeKey::new("b", "c", "knows"),
                    seq: 5,
                },
            ],
            reads: None,
            writes: None,
        };
        state.apply_patch(&patch, &"sha1".to_string());
        state
    }

    #[test]
    fn bfs_reaches_all_connected_nodes() {
        let state = build_state();
        let abort = AbortSignal::new();
        let order = bfs(&state, &"a".to_string(), Direction::Out, None, Limits::default(), &abort).unwrap();
        assert_eq!(order, vec!["a".to_string(), "b".to_string(), "c".to_string()]);
    }

    #[test]
    fn shortest_path_finds_minimal_hop_route() {
        let state = build_state();
        let abort = AbortSignal::new();
        let result = shortest_path(
            &state,
            &"a".to_string(),
            &"c".to_string(),
            Direction::Out,
            None,
            Limits::default(),
            &abort,
        )
        .unwrap();
        assert!(result.found);
        assert_eq!(result.path, vec!["a".to_string(), "b".to_string(), "c".to_string()]);
    }

    #[test]
    fn shortest_path_to_unreachable_node_reports_not_found() {
        let state = build_state();
        let abort = AbortSignal::new();
        let result = shortest_path(
            &state,
            &"c".to_string(),
            &"a".to_string(),
            Direction::Out,
            None,
            Limits::default(),
            &abort,
        )
        .unwrap();
        assert!(!result.found);
        assert_eq!(result.length, -1);
    }

    #[test]
    fn label_filter_excludes_non_matching_edges() {
        let state = build_state();
        let neighbors_with_wrong_label = neighbors(&state, &"a".to_string(), Direction::Out, Some("dislikes"));
        assert!(neighbors_with_wrong_label.is_empty());
    }
}
