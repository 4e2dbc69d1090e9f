//! Commit-DAG traversal over the bitmap index: BFS/DFS,
//! ancestors/descendants, `find_path`, bidirectional `shortest_path`,
//! `is_reachable`, `common_ancestors`, `topological_sort` via Kahn's
//! algorithm, and weighted Dijkstra/A*/bidirectional A*.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap, VecDeque};

use warp_core::error::{Error, Result};
use warp_core::port::Sha;
use warp_index::BitmapIndex;

use crate::common::{AbortSignal, Limits, PathResult};

fn check_budget(visited: usize, depth: usize, limits: &Limits) -> bool {
    visited < limits.max_nodes && depth < limits.max_depth
}

/// Breadth-first visit order over child edges from `start`.
pub fn bfs(index: &BitmapIndex, start: &Sha, limits: Limits, abort: &AbortSignal) -> Result<Vec<Sha>> {
    walk(index, start, limits, abort, true)
}

/// Depth-first visit order over child edges from `start`.
pub fn dfs(index: &BitmapIndex, start: &Sha, limits: Limits, abort: &AbortSignal) -> Result<Vec<Sha>> {
    walk(index, start, limits, abort, false)
}

fn walk(index: &BitmapIndex, start: &Sha, limits: Limits, abort: &AbortSignal, breadth_first: bool) -> Result<Vec<Sha>> {
    let mut visited = BTreeSet::new();
    visited.insert(start.clone());
    let mut order = vec![start.clone()];
    let mut frontier: VecDeque<(Sha, usize)> = VecDeque::new();
    frontier.push_back((start.clone(), 0));
    let mut expansions = 0usize;

    while let Some((node, depth)) = if breadth_first { frontier.pop_front() } else { frontier.pop_back() } {
        if !check_budget(order.len(), depth, &limits) {
            continue;
        }
        expansions += 1;
        if expansions % crate::common::ABORT_CHECK_INTERVAL == 0 {
            abort.check("dag-walk")?;
        }
        for child in index.get_children(&node)? {
            if visited.insert(child.clone()) {
                order.push(child.clone());
                if order.len() >= limits.max_nodes {
                    break;
                }
                frontier.push_back((child, depth + 1));
            }
        }
    }
    Ok(order)
}

/// All commits reachable by repeatedly following parent edges from
/// `start` (exclusive of a not-yet-decided convention on `start` itself —
/// `start` is included, matching `descendants`' symmetric treatment).
pub fn ancestors(index: &BitmapIndex, start: &Sha, limits: Limits, abort: &AbortSignal) -> Result<Vec<Sha>> {
    walk_generic(index, start, limits, abort, Direction::Backward)
}

pub fn descendants(index: &BitmapIndex, start: &Sha, limits: Limits, abort: &AbortSignal) -> Result<Vec<Sha>> {
    walk_generic(index, start, limits, abort, Direction::Forward)
}

#[derive(Clone, Copy)]
enum Direction {
    Forward,
    Backward,
}

fn walk_generic(index: &BitmapIndex, start: &Sha, limits: Limits, abort: &AbortSignal, dir: Direction) -> Result<Vec<Sha>> {
    let mut visited = BTreeSet::new();
    visited.insert(start.clone());
    let mut order = vec![start.clone()];
    let mut queue = VecDeque::new();
    queue.push_back((start.clone(), 0usize));
    let mut expansions = 0usize;

    while let Some((node, depth)) = queue.pop_front() {
        if !check_budget(order.len(), depth, &limits) {
            continue;
        }
        expansions += 1;
        if expansions % crate::common::ABORT_CHECK_INTERVAL == 0 {
            abort.check("dag-walk")?;
        }
        let next_nodes = match dir {
            Direction::Forward => index.get_children(&node)?,
            Direction::Backward => index.get_parents(&node)?,
        };
        for next in next_nodes {
            if visited.insert(next.clone()) {
                order.push(next.clone());
                queue.push_back((next, depth + 1));
            }
        }
    }
    Ok(order)
}

/// BFS-based path existence check from `from` to `to` over child edges.
pub fn find_path(index: &BitmapIndex, from: &Sha, to: &Sha, limits: Limits, abort: &AbortSignal) -> Result<PathResult<Sha>> {
    if from == to {
        return Ok(PathResult::found(vec![from.clone()]));
    }
    let mut visited = BTreeSet::new();
    visited.insert(from.clone());
    let mut predecessor: BTreeMap<Sha, Sha> = BTreeMap::new();
    let mut queue = VecDeque::new();
    queue.push_back((from.clone(), 0usize));
    let mut expansions = 0usize;

    while let Some((node, depth)) = queue.pop_front() {
        if !check_budget(visited.len(), depth, &limits) {
            continue;
        }
        expansions += 1;
        if expansions % crate::common::ABORT_CHECK_INTERVAL == 0 {
            abort.check("find_path")?;
        }
        for child in index.get_children(&node)? {
            if visited.insert(child.clone()) {
                predecessor.insert(child.clone(), node.clone());
                if child == *to {
                    return Ok(PathResult::found(reconstruct(&predecessor, from, to)));
                }
                queue.push_back((child, depth + 1));
            }
        }
    }
    Ok(PathResult::not_found())
}

fn reconstruct(predecessor: &BTreeMap<Sha, Sha>, from: &Sha, to: &Sha) -> Vec<Sha> {
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
    path
}

/// Unweighted shortest path via bidirectional BFS: alternately expands the
/// smaller of the two frontiers until they meet, which is asymptotically
/// cheaper than a one-sided BFS over a DAG with high branching factor.
pub fn shortest_path(index: &BitmapIndex, from: &Sha, to: &Sha, limits: Limits, abort: &AbortSignal) -> Result<PathResult<Sha>> {
    if from == to {
        return Ok(PathResult::found(vec![from.clone()]));
    }

    let mut forward_pred: BTreeMap<Sha, Sha> = BTreeMap::new();
    let mut backward_pred: BTreeMap<Sha, Sha> = BTreeMap::new();
    let mut forward_visited = BTreeSet::new();
    let mut backward_visited = BTreeSet::new();
    forward_visited.insert(from.clone());
    backward_visited.insert(to.clone());
    let mut forward_frontier = vec![from.clone()];
    let mut backward_frontier = vec![to.clone()];
    let mut expansions = 0usize;
    let mut depth = 0usize;

    while !forward_frontier.is_empty() && !backward_frontier.is_empty() {
        if depth >= limits.max_depth || forward_visited.len() + backward_visited.len() >= limits.max_nodes {
            break;
        }
        depth += 1;
        expansions += 1;
        if expansions % crate::common::ABORT_CHECK_INTERVAL == 0 {
            abort.check("shortest_path")?;
        }

        let (expand_forward, frontier, visited, other_visited, pred, neighbor_fn): (
            bool,
            &mut Vec<Sha>,
            &mut BTreeSet<Sha>,
            &BTreeSet<Sha>,
            &mut BTreeMap<Sha, Sha>,
            fn(&BitmapIndex, &Sha) -> Result<Vec<Sha>>,
        ) = if forward_frontier.len() <= backward_frontier.len() {
            (
                true,
                &mut forward_frontier,
                &mut forward_visited,
                &backward_visited,
                &mut forward_pred,
                |idx, n| idx.get_children(n),
            )
        } else {
            (
                false,
                &mut backward_frontier,
                &mut backward_visited,
                &forward_visited,
                &mut backward_pred,
                |idx, n| idx.get_parents(n),
            )
        };

        let mut next_frontier = Vec::new();
        for node in frontier.iter() {
            for neighbor in neighbor_fn(index, node)? {
                if other_visited.contains(&neighbor) {
                    pred.insert(neighbor.clone(), node.clone());
                    let meeting = neighbor.clone();
                    let mut forward_path = reconstruct(&forward_pred, from, &meeting);
                    let backward_path = reconstruct_backward(&backward_pred, to, &meeting);
                    forward_path.pop();
                    forward_path.extend(backward_path);
                    return Ok(PathResult::found(forward_path));
                }
                if visited.insert(neighbor.clone()) {
                    pred.insert(neighbor.clone(), node.clone());
                    next_frontier.push(neighbor);
                }
            }
        }
        *frontier = next_frontier;
    }
    Ok(PathResult::not_found())
}

fn reconstruct_backward(predecessor: &BTreeMap<Sha, Sha>, to: &Sha, meeting: &Sha) -> Vec<Sha> {
    let mut path = vec![meeting.clone()];
    let mut cursor = meeting.clone();
    while let Some(next) = predecessor.get(&cursor) {
        path.push(next.clone());
        cursor = next.clone();
        if cursor == *to {
            break;
        }
    }
    path
}

pub fn is_reachable(index: &BitmapIndex, from: &Sha, to: &Sha, limits: Limits, abort: &AbortSignal) -> Result<bool> {
    Ok(find_path(index, from, to, limits, abort)?.found)
}

/// Intersection of `ancestors(a)` and `ancestors(b)` (both inclusive).
pub fn common_ancestors(index: &BitmapIndex, a: &Sha, b: &Sha, limits: Limits, abort: &AbortSignal) -> Result<Vec<Sha>> {
    let ancestors_a: BTreeSet<Sha> = ancestors(index, a, limits, abort)?.into_iter().collect();
    let ancestors_b: BTreeSet<Sha> = ancestors(index, b, limits, abort)?.into_iter().collect();
    Ok(ancestors_a.intersection(&ancestors_b).cloned().collect())
}

/// Kahn's algorithm over the subgraph induced by `nodes`. If `throw_on_cycle`
/// and a cycle remains after all zero-in-degree nodes are exhausted, raises
/// `CYCLE_DETECTED` with the size of the unresolved remainder.
pub fn topological_sort(index: &BitmapIndex, nodes: &[Sha], throw_on_cycle: bool) -> Result<Vec<Sha>> {
    let node_set: BTreeSet<&Sha> = nodes.iter().collect();
    let mut in_degree: BTreeMap<Sha, usize> = nodes.iter().map(|n| (n.clone(), 0)).collect();
    let mut forward: BTreeMap<Sha, Vec<Sha>> = BTreeMap::new();

    for node in nodes {
        for child in index.get_children(node)? {
            if node_set.contains(&child) {
                forward.entry(node.clone()).or_default().push(child.clone());
                *in_degree.get_mut(&child).unwrap() += 1;
            }
        }
    }

    let mut queue: VecDeque<Sha> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(n, _)| n.clone())
        .collect();
    let mut order = Vec::new();

    while let Some(node) = queue.pop_front() {
        order.push(node.clone());
        for child in forward.get(&node).into_iter().flatten() {
            let degree = in_degree.get_mut(child).unwrap();
            *degree -= 1;
            if *degree == 0 {
                queue.push_back(child.clone());
            }
        }
    }

    if order.len() != nodes.len() {
        let cycle_size = nodes.len() - order.len();
        if throw_on_cycle {
            return Err(Error::CycleDetected { cycle_size });
        }
    }
    Ok(order)
}

/// `weight(from, to)` — callers supply this since the bitmap index itself
/// carries no edge weights.
pub trait EdgeWeight {
    fn weight(&self, from: &Sha, to: &Sha) -> f64;
}

impl<F: Fn(&Sha, &Sha) -> f64> EdgeWeight for F {
    fn weight(&self, from: &Sha, to: &Sha) -> f64 {
        self(from, to)
    }
}

#[derive(Debug, Clone, PartialEq)]
struct HeapEntry {
    priority: f64,
    node: Sha,
}

impl Eq for HeapEntry {}
impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .partial_cmp(&self.priority)
            .unwrap_or(Ordering::Equal)
    }
}
impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Weighted shortest path via Dijkstra over child edges.
pub fn dijkstra(
    index: &BitmapIndex,
    from: &Sha,
    to: &Sha,
    weight: &dyn EdgeWeight,
    limits: Limits,
    abort: &AbortSignal,
) -> Result<PathResult<Sha>> {
    a_star(index, from, to, &|_: &Sha| 0.0, weight, 0.0, limits, abort)
}

/// A* with an admissible `heuristic` and epsilon tie-breaking: among equal
/// `f`, the node with greater committed cost `g` is preferred, implemented
/// by subtracting `epsilon * g` from the priority.
pub fn a_star(
    index: &BitmapIndex,
    from: &Sha,
    to: &Sha,
    heuristic: &dyn Fn(&Sha) -> f64,
    weight: &dyn EdgeWeight,
    epsilon: f64,
    limits: Limits,
    abort: &AbortSignal,
) -> Result<PathResult<Sha>> {
    let mut best_cost: BTreeMap<Sha, f64> = BTreeMap::new();
    let mut predecessor: BTreeMap<Sha, Sha> = BTreeMap::new();
    best_cost.insert(from.clone(), 0.0);
    let mut open = BinaryHeap::new();
    open.push(HeapEntry {
        priority: heuristic(from),
        node: from.clone(),
    });
    let mut expansions = 0usize;
    let mut expanded = 0usize;

    while let Some(HeapEntry { node, .. }) = open.pop() {
        if node == *to {
            return Ok(PathResult::found(reconstruct(&predecessor, from, to)));
        }
        if expanded >= limits.max_nodes {
            break;
        }
        expanded += 1;
        expansions += 1;
        if expansions % crate::common::ABORT_CHECK_INTERVAL == 0 {
            abort.check("a_star")?;
        }
        let g = *best_cost.get(&node).unwrap_or(&f64::INFINITY);
        for child in index.get_children(&node)? {
            let tentative = g + weight.weight(&node, &child);
            if tentative < *best_cost.get(&child).unwrap_or(&f64::INFINITY) {
                best_cost.insert(child.clone(), tentative);
                predecessor.insert(child.clone(), node.clone());
                let f = tentative + heuristic(&child);
                let priority = f - epsilon * tentative;
                open.push(HeapEntry {
                    priority,
                    node: child,
                });
            }
        }
    }
    Ok(PathResult::not_found())
}

/// Bidirectional A*: maintains the best confirmed meeting cost `mu` and
/// stops once both frontiers' minimum `f` is at least `mu`.
pub fn bidirectional_a_star(
    index: &BitmapIndex,
    from: &Sha,
    to: &Sha,
    heuristic: &dyn Fn(&Sha, &Sha) -> f64,
    weight: &dyn EdgeWeight,
    limits: Limits,
    abort: &AbortSignal,
) -> Result<PathResult<Sha>> {
    if from == to {
        return Ok(PathResult::found(vec![from.clone()]));
    }

    let mut forward_cost: BTreeMap<Sha, f64> = BTreeMap::from([(from.clone(), 0.0)]);
    let mut backward_cost: BTreeMap<Sha, f64> = BTreeMap::from([(to.clone(), 0.0)]);
    let mut forward_pred: BTreeMap<Sha, Sha> = BTreeMap::new();
    let mut backward_pred: BTreeMap<Sha, Sha> = BTreeMap::new();

    let mut forward_open = BinaryHeap::new();
    forward_open.push(HeapEntry {
        priority: heuristic(from, to),
        node: from.clone(),
    });
    let mut backward_open = BinaryHeap::new();
    backward_open.push(HeapEntry {
        priority: heuristic(to, from),
        node: to.clone(),
    });

    let mut mu = f64::INFINITY;
    let mut meeting_node: Option<Sha> = None;
    let mut expansions = 0usize;
    let mut expanded = 0usize;

    while !forward_open.is_empty() && !backward_open.is_empty() {
        let forward_min = forward_open.peek().map(|e| e.priority).unwrap_or(f64::INFINITY);
        let backward_min = backward_open.peek().map(|e| e.priority).unwrap_or(f64::INFINITY);
        if forward_min >= mu && backward_min >= mu {
            break;
        }
        if expanded >= limits.max_nodes {
            break;
        }
        expanded += 1;
        expansions += 1;
        if expansions % crate::common::ABORT_CHECK_INTERVAL == 0 {
            abort.check("bidirectional_a_star")?;
        }

        if forward_min <= backward_min {
            let HeapEntry { node, .. } = forward_open.pop().unwrap();
            let g = *forward_cost.get(&node).unwrap_or(&f64::INFINITY);
            for child in index.get_children(&node)? {
                let tentative = g + weight.weight(&node, &child);
                if tentative < *forward_cost.get(&child).unwrap_or(&f64::INFINITY) {
                    forward_cost.insert(child.clone(), tentative);
                    forward_pred.insert(child.clone(), node.clone());
                    forward_open.push(HeapEntry {
                        priority: tentative + heuristic(&child, to),
                        node: child.clone(),
                    });
                    if let Some(&back) = backward_cost.get(&child) {
                        let total = tentative + back;
                        if total < mu {
                            mu = total;
                            meeting_node = Some(child);
                        }
                    }
                }
            }
        } else {
            let HeapEntry { node, .. } = backward_open.pop().unwrap();
            let g = *backward_cost.get(&node).unwrap_or(&f64::INFINITY);
            for parent in index.get_parents(&node)? {
                let tentative = g + weight.weight(&parent, &node);
                if tentative < *backward_cost.get(&parent).unwrap_or(&f64::INFINITY) {
                    backward_cost.insert(parent.clone(), tentative);
                    backward_pred.insert(parent.clone(), node.clone());
                    backward_open.push(HeapEntry {
                        priority: tentative + heuristic(&parent, from),
                        node: parent.clone(),
                    });
                    if let Some(&fwd) = forward_cost.get(&parent) {
                        let total = tentative + fwd;
                        if total < mu {
                            mu = total;
                            meeting_node = Some(parent);
                        }
                    }
                }
            }
        }
    }

    let Some(meeting) = meeting_node else {
        return Ok(PathResult::not_found());
    };
    let mut forward_path = reconstruct(&forward_pred, from, &meeting);
    let backward_path = reconstruct_backward(&backward_pred, to, &meeting);
    forward_path.pop();
    forward_path.extend(backward_path);
    Ok(PathResult::found(forward_path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use warp_core::port::memory::MemoryPort;
    use warp_index::rebuild;

    fn build_chain(len: usize) -> (MemoryPort, Vec<Sha>) {
        let port = MemoryPort::new();
        let mut parents = Vec::new();
        let mut shas = Vec::new();
        for i in 0..len {
            let sha = port.commit(&format!("c{i}"), &parents, None, false).unwrap();
            parents = vec![sha.clone()];
            shas.push(sha);
        }
        port.update_ref("refs/heads/main", shas.last().unwrap()).unwrap();
        rebuild(&port, "g1", "refs/heads/main").unwrap();
        (port, shas)
    }

    #[test]
    fn bfs_dfs_visit_every_descendant() {
        let (port, shas) = build_chain(10);
        let index = BitmapIndex::open(&port, "g1").unwrap();
        let abort = AbortSignal::new();
        let order = bfs(&index, &shas[0], Limits::default(), &abort).unwrap();
        assert_eq!(order.len(), 10);
    }

    #[test]
    fn topological_sort_respects_edge_order() {
        let (port, shas) = build_chain(5);
        let index = BitmapIndex::open(&port, "g1").unwrap();
        let order = topological_sort(&index, &shas, false).unwrap();
        let position: BTreeMap<&Sha, usize> = order.iter().enumerate().map(|(i, s)| (s, i)).collect();
        for i in 0..shas.len() - 1 {
            assert!(position[&shas[i]] < position[&shas[i + 1]]);
        }
    }

    #[test]
    fn dijkstra_matches_bfs_hop_count_with_unit_weights() {
        let (port, shas) = build_chain(6);
        let index = BitmapIndex::open(&port, "g1").unwrap();
        let abort = AbortSignal::new();
        let weight = |_: &Sha, _: &Sha| 1.0;
        let result = dijkstra(&index, &shas[0], &shas[5], &weight, Limits::default(), &abort).unwrap();
        assert!(result.found);
        assert_eq!(result.path.len(), 6);
    }

    #[test]
    fn a_star_with_zero_heuristic_matches_dijkstra_cost() {
        let (port, shas) = build_chain(6);
        let index = BitmapIndex::open(&port, "g1").unwrap();
        let abort = AbortSignal::new();
        let weight = |_: &Sha, _: &Sha| 1.0;
        let zero_heuristic = |_: &Sha| 0.0;
        let result = a_star(&index, &shas[0], &shas[5], &zero_heuristic, &weight, 0.0, Limits::default(), &abort).unwrap();
        assert!(result.found);
        assert_eq!(result.path.len(), 6);
    }

    #[test]
    fn is_reachable_is_false_against_the_grain() {
        let (port, shas) = build_chain(3);
        let index = BitmapIndex::open(&port, "g1").unwrap();
        let abort = AbortSignal::new();
        assert!(!is_reachable(&index, &shas[2], &shas[0], Limits::default(), &abort).unwrap());
        assert!(is_reachable(&index, &shas[0], &shas[2], Limits::default(), &abort).unwrap());
    }
}
