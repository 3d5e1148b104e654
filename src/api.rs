//! Request/response DTOs returned by [`Workspace`](crate::Workspace).
//!
//! Every number that crosses this boundary travels with its unit symbol.

use serde::{Deserialize, Serialize};

use crate::model::{ComputationStatus, NodeId, NodeType, ValueNode};
use crate::units::Quantity;

/// Result of checking a formula without storing it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    /// Reference tokens without `#`, in order of first appearance.
    pub references: Vec<String>,
    pub error: Option<String>,
    /// Byte offset of the error.
    pub position: Option<usize>,
}

/// A value with its unit symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeValue {
    pub value: f64,
    pub unit_symbol: String,
}

impl NodeValue {
    pub fn from_quantity(q: &Quantity) -> Self {
        Self { value: q.value, unit_symbol: q.unit_symbol() }
    }

    /// The node's cached value, if it is valid.
    pub fn of(node: &ValueNode) -> Option<Self> {
        node.value().map(|q| Self::from_quantity(&q))
    }
}

/// Result of recalculating one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecalculationResult {
    pub node_id: NodeId,
    pub success: bool,
    pub status: ComputationStatus,
    pub value: Option<f64>,
    pub unit_symbol: Option<String>,
    pub error: Option<String>,
    /// Size of the subgraph the pass evaluated.
    pub nodes_recalculated: usize,
}

impl RecalculationResult {
    pub(crate) fn from_node(node: &ValueNode, nodes_recalculated: usize) -> Self {
        let value = NodeValue::of(node);
        Self {
            node_id: node.id,
            success: value.is_some(),
            status: node.status(),
            value: value.as_ref().map(|v| v.value),
            unit_symbol: value.map(|v| v.unit_symbol),
            error: node.computation_error.clone(),
            nodes_recalculated,
        }
    }
}

/// One failed node in a bulk recalculation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeFailure {
    pub node_id: NodeId,
    pub error: String,
}

/// Result of recalculating several nodes in one pass.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BulkRecalculationResult {
    /// Number of requested nodes.
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub errors: Vec<NodeFailure>,
    /// Size of the subgraph the pass evaluated.
    pub nodes_recalculated: usize,
    pub cancelled: bool,
}

/// A node and, recursively, what it depends on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyTree {
    pub node_id: NodeId,
    pub name: Option<String>,
    pub node_type: NodeType,
    pub status: ComputationStatus,
    pub expression: Option<String>,
    pub value: Option<NodeValue>,
    pub error: Option<String>,
    pub dependencies: Vec<DependencyTree>,
    /// Children exist but were cut off by the depth limit.
    pub truncated: bool,
    /// Already on the path from the root (a cycle); not expanded again.
    pub repeated: bool,
}

impl DependencyTree {
    pub(crate) fn missing(id: NodeId) -> Self {
        Self {
            node_id: id,
            name: None,
            node_type: NodeType::TableLookup,
            status: ComputationStatus::Error,
            expression: None,
            value: None,
            error: Some(format!("node {id} does not exist")),
            dependencies: Vec::new(),
            truncated: false,
            repeated: false,
        }
    }

    /// Number of nodes in the rendered tree, root included.
    pub fn size(&self) -> usize {
        1 + self.dependencies.iter().map(DependencyTree::size).sum::<usize>()
    }
}
