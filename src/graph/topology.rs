//! Graph algorithms over dependency edges: cycle search, knot membership,
//! topological ordering and level grouping.
//!
//! Edges point from a node to its dependencies. Every function here only
//! walks the part of the graph reachable from its inputs.

use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, VecDeque};

use hashbrown::{HashMap, HashSet};

use super::DependencyGraph;
use crate::model::NodeId;
use crate::{Error, Result};

/// Finds a cycle that passes through `start`, following dependencies.
///
/// Iterative DFS; a node fully explored without getting back to `start` is
/// never entered again. The returned path starts at its smallest id.
pub(crate) fn find_cycle(graph: &DependencyGraph, start: NodeId) -> Option<Vec<NodeId>> {
    let mut dead: HashSet<NodeId> = HashSet::new();
    let mut on_path: HashSet<NodeId> = HashSet::new();
    let mut stack: Vec<(NodeId, usize)> = vec![(start, 0)];
    on_path.insert(start);

    while let Some(&(node, idx)) = stack.last() {
        let deps = graph.dependency_slice(node);
        if idx < deps.len() {
            if let Some(top) = stack.last_mut() {
                top.1 += 1;
            }
            let next = deps[idx];
            if next == start {
                let path: Vec<NodeId> = stack.iter().map(|(n, _)| *n).collect();
                return Some(canonical(path));
            }
            if on_path.contains(&next) || dead.contains(&next) {
                continue;
            }
            on_path.insert(next);
            stack.push((next, 0));
        } else {
            stack.pop();
            on_path.remove(&node);
            dead.insert(node);
        }
    }
    None
}

/// Rotate a cycle so it starts at its smallest id.
fn canonical(mut path: Vec<NodeId>) -> Vec<NodeId> {
    if let Some(pos) = path.iter().enumerate().min_by_key(|(_, id)| **id).map(|(i, _)| i) {
        path.rotate_left(pos);
    }
    path
}

/// Every node in the strongly connected knot containing `start`, ascending.
///
/// Forward reachability from `start` intersected with backward reachability
/// restricted to the forward set.
pub(crate) fn knot_members(graph: &DependencyGraph, start: NodeId) -> Vec<NodeId> {
    let mut forward: HashSet<NodeId> = HashSet::new();
    let mut queue: VecDeque<NodeId> = VecDeque::from([start]);
    while let Some(n) = queue.pop_front() {
        if forward.insert(n) {
            queue.extend(graph.dependency_slice(n).iter().copied());
        }
    }

    let mut members: BTreeSet<NodeId> = BTreeSet::new();
    queue.push_back(start);
    while let Some(n) = queue.pop_front() {
        if !members.insert(n) {
            continue;
        }
        if let Some(dependents) = graph.dependent_set(n) {
            queue.extend(dependents.iter().copied().filter(|d| forward.contains(d)));
        }
    }
    members.into_iter().collect()
}

/// Kahn's algorithm over `subset`, dependencies first. Circular nodes and
/// unknown ids are dropped from the subset. Ready nodes are emitted in
/// ascending id order, so the result is deterministic.
///
/// Fails with `CircularDependency` listing the nodes that could not be
/// ordered if the subset still contains a cycle.
pub(crate) fn topological_order(graph: &DependencyGraph, subset: &[NodeId]) -> Result<Vec<NodeId>> {
    let members: HashSet<NodeId> = subset
        .iter()
        .copied()
        .filter(|id| graph.node(*id).is_some_and(|n| !n.is_circular()))
        .collect();

    let mut indegree: HashMap<NodeId, usize> = HashMap::with_capacity(members.len());
    let mut ready: BinaryHeap<Reverse<NodeId>> = BinaryHeap::new();
    for &id in &members {
        let degree = graph
            .dependency_slice(id)
            .iter()
            .filter(|d| members.contains(*d))
            .count();
        indegree.insert(id, degree);
        if degree == 0 {
            ready.push(Reverse(id));
        }
    }

    let mut order = Vec::with_capacity(members.len());
    while let Some(Reverse(id)) = ready.pop() {
        order.push(id);
        let Some(dependents) = graph.dependent_set(id) else {
            continue;
        };
        for dependent in dependents {
            if let Some(degree) = indegree.get_mut(dependent) {
                *degree -= 1;
                if *degree == 0 {
                    ready.push(Reverse(*dependent));
                }
            }
        }
    }

    if order.len() < members.len() {
        let placed: HashSet<NodeId> = order.iter().copied().collect();
        let mut stuck: Vec<NodeId> = members.difference(&placed).copied().collect();
        stuck.sort_unstable();
        return Err(Error::CircularDependency { cycle: stuck });
    }
    Ok(order)
}

/// Group a topological order into levels: every node's dependencies inside
/// the order sit in strictly earlier levels, so nodes within one level are
/// mutually independent.
pub(crate) fn levels(graph: &DependencyGraph, order: &[NodeId]) -> Vec<Vec<NodeId>> {
    let mut level_of: HashMap<NodeId, usize> = HashMap::with_capacity(order.len());
    let mut levels: Vec<Vec<NodeId>> = Vec::new();
    for &id in order {
        let level = graph
            .dependency_slice(id)
            .iter()
            .filter_map(|d| level_of.get(d))
            .map(|l| l + 1)
            .max()
            .unwrap_or(0);
        level_of.insert(id, level);
        if levels.len() <= level {
            levels.resize_with(level + 1, Vec::new);
        }
        levels[level].push(id);
    }
    levels
}
