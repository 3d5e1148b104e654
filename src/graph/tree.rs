//! Dependency tree rendering.

use hashbrown::HashSet;

use super::DependencyGraph;
use crate::api::{DependencyTree, NodeValue};
use crate::model::{NodeId, Payload};
use crate::{Error, Result};

pub(crate) fn build(graph: &DependencyGraph, root: NodeId, max_depth: usize) -> Result<DependencyTree> {
    if !graph.contains(root) {
        return Err(Error::NotFound(format!("node {root}")));
    }
    let mut path = HashSet::new();
    Ok(subtree(graph, root, 0, max_depth, &mut path))
}

fn subtree(
    graph: &DependencyGraph,
    id: NodeId,
    depth: usize,
    max_depth: usize,
    path: &mut HashSet<NodeId>,
) -> DependencyTree {
    let Some(node) = graph.node(id) else {
        // Edges never point at missing nodes; render defensively anyway.
        return DependencyTree::missing(id);
    };
    let deps = graph.dependency_slice(id);
    let mut tree = DependencyTree {
        node_id: id,
        name: node.name.clone(),
        node_type: node.node_type(),
        status: node.status(),
        expression: match &node.payload {
            Payload::Expression { source } => Some(source.clone()),
            _ => None,
        },
        value: NodeValue::of(node),
        error: node.computation_error.clone(),
        dependencies: Vec::new(),
        truncated: false,
        repeated: false,
    };

    if path.contains(&id) {
        tree.repeated = true;
        return tree;
    }
    if deps.is_empty() {
        return tree;
    }
    if depth >= max_depth {
        tree.truncated = true;
        return tree;
    }

    path.insert(id);
    tree.dependencies = deps
        .iter()
        .map(|&d| subtree(graph, d, depth + 1, max_depth, path))
        .collect();
    path.remove(&id);
    tree
}
