//! Value node: a literal, expression or reference plus its cached result.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::status::{ComputationStatus, Cycle, ErrorKind};
use crate::formula::Expr;
use crate::units::{ComputedUnit, Quantity, UnitId};

/// Opaque node identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a node holds. Edges in the dependency graph derive from this alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node_type", rename_all = "snake_case")]
pub enum Payload {
    /// A number with an optional unit (absent means dimensionless `1`).
    Literal { value: f64, unit_id: Option<UnitId> },
    /// A formula string.
    Expression { source: String },
    /// Mirrors another node's value and unit.
    Reference { target: NodeId },
    /// Reserved; evaluating it fails with `Unsupported`.
    TableLookup,
}

impl Payload {
    pub fn literal(value: f64, unit_id: Option<UnitId>) -> Self {
        Payload::Literal { value, unit_id }
    }

    pub fn expression(source: impl Into<String>) -> Self {
        Payload::Expression { source: source.into() }
    }

    pub fn reference(target: NodeId) -> Self {
        Payload::Reference { target }
    }

    pub fn node_type(&self) -> NodeType {
        match self {
            Payload::Literal { .. } => NodeType::Literal,
            Payload::Expression { .. } => NodeType::Expression,
            Payload::Reference { .. } => NodeType::Reference,
            Payload::TableLookup => NodeType::TableLookup,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Literal,
    Expression,
    Reference,
    TableLookup,
}

/// A node in the value graph.
///
/// `computed_value` and `computed_unit` are present iff the status is
/// `valid`; `computation_error` is present iff it is `error` or `circular`.
/// The status setters below are the only way these fields change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueNode {
    pub id: NodeId,
    pub name: Option<String>,
    pub description: Option<String>,
    pub payload: Payload,
    /// Bumped on every payload write; starts at 1.
    pub version: u64,
    pub computed_value: Option<f64>,
    pub computed_unit: Option<ComputedUnit>,
    pub computation_status: ComputationStatus,
    pub computation_error: Option<String>,
    pub error_kind: Option<ErrorKind>,
    pub cycle: Option<Cycle>,
    pub last_computed: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    /// Parsed form of an expression payload.
    #[serde(skip)]
    pub(crate) ast: Option<Arc<Expr>>,
    /// Set when a cascade delete removed one of this node's inputs. Kept as
    /// the evaluation error until the payload is edited or the name rebinds.
    #[serde(skip)]
    pub(crate) orphaned_by: Option<String>,
}

impl ValueNode {
    pub(crate) fn new(
        id: NodeId,
        name: Option<String>,
        description: Option<String>,
        payload: Payload,
        ast: Option<Arc<Expr>>,
    ) -> Self {
        Self {
            id,
            name,
            description,
            payload,
            version: 1,
            computed_value: None,
            computed_unit: None,
            computation_status: ComputationStatus::Pending,
            computation_error: None,
            error_kind: None,
            cycle: None,
            last_computed: None,
            created_at: Utc::now(),
            ast,
            orphaned_by: None,
        }
    }

    pub fn node_type(&self) -> NodeType {
        self.payload.node_type()
    }

    pub fn status(&self) -> ComputationStatus {
        self.computation_status
    }

    pub fn is_valid(&self) -> bool {
        self.computation_status == ComputationStatus::Valid
    }

    pub fn is_circular(&self) -> bool {
        self.computation_status == ComputationStatus::Circular
    }

    /// The cached result, if valid.
    pub fn value(&self) -> Option<Quantity> {
        match (&self.computed_value, &self.computed_unit) {
            (Some(v), Some(u)) if self.is_valid() => Some(Quantity::new(*v, u.clone())),
            _ => None,
        }
    }

    /// The parsed expression, for expression nodes.
    pub fn expression(&self) -> Option<&Expr> {
        self.ast.as_deref()
    }

    /// `#name` if named, otherwise the numeric id.
    pub fn label(&self) -> String {
        match &self.name {
            Some(name) => format!("#{name}"),
            None => format!("node {}", self.id),
        }
    }

    // ========================================================================
    // Status transitions
    // ========================================================================

    pub(crate) fn set_valid(&mut self, quantity: Quantity, at: DateTime<Utc>) {
        self.computed_value = Some(quantity.value);
        self.computed_unit = Some(quantity.unit);
        self.computation_status = ComputationStatus::Valid;
        self.computation_error = None;
        self.error_kind = None;
        self.cycle = None;
        self.last_computed = Some(at);
    }

    pub(crate) fn set_error(&mut self, kind: ErrorKind, message: String, at: DateTime<Utc>) {
        self.clear_result();
        self.computation_status = ComputationStatus::Error;
        self.computation_error = Some(message);
        self.error_kind = Some(kind);
        self.cycle = None;
        self.last_computed = Some(at);
    }

    pub(crate) fn set_circular(&mut self, cycle: Cycle) {
        self.clear_result();
        self.computation_status = ComputationStatus::Circular;
        self.computation_error = Some(cycle.describe());
        self.error_kind = Some(ErrorKind::CircularDependency);
        self.cycle = Some(cycle);
    }

    /// `valid`/`error` → `stale`. Returns false for nodes it leaves alone
    /// (already stale, pending or circular).
    pub(crate) fn mark_stale(&mut self) -> bool {
        match self.computation_status {
            ComputationStatus::Valid | ComputationStatus::Error => {
                self.clear_result();
                self.computation_error = None;
                self.error_kind = None;
                self.computation_status = ComputationStatus::Stale;
                true
            }
            _ => false,
        }
    }

    /// Back to `pending`, as after creation or after leaving a cycle.
    pub(crate) fn mark_pending(&mut self) {
        self.clear_result();
        self.computation_status = ComputationStatus::Pending;
        self.computation_error = None;
        self.error_kind = None;
        self.cycle = None;
    }

    fn clear_result(&mut self) {
        self.computed_value = None;
        self.computed_unit = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn literal_node() -> ValueNode {
        ValueNode::new(NodeId(1), Some("mass".into()), None, Payload::literal(5.0, None), None)
    }

    #[test]
    fn test_new_node_is_pending() {
        let n = literal_node();
        assert_eq!(n.status(), ComputationStatus::Pending);
        assert_eq!(n.version, 1);
        assert_eq!(n.value(), None);
        assert_eq!(n.node_type(), NodeType::Literal);
        assert_eq!(n.label(), "#mass");
    }

    #[test]
    fn test_valid_then_stale_clears_value() {
        let mut n = literal_node();
        n.set_valid(Quantity::dimensionless(5.0), Utc::now());
        assert_eq!(n.value(), Some(Quantity::dimensionless(5.0)));
        assert!(n.mark_stale());
        assert_eq!(n.status(), ComputationStatus::Stale);
        assert_eq!(n.computed_value, None);
        assert!(!n.mark_stale());
    }

    #[test]
    fn test_error_carries_message_and_kind() {
        let mut n = literal_node();
        n.set_error(ErrorKind::DivisionByZero, "Division by zero".into(), Utc::now());
        assert_eq!(n.status(), ComputationStatus::Error);
        assert_eq!(n.error_kind, Some(ErrorKind::DivisionByZero));
        assert!(n.computed_value.is_none());
        assert!(n.computation_error.is_some());
    }

    #[test]
    fn test_pending_is_not_marked_stale() {
        let mut n = literal_node();
        assert!(!n.mark_stale());
        assert_eq!(n.status(), ComputationStatus::Pending);
    }

    #[test]
    fn test_payload_serializes_with_node_type_tag() {
        let json = serde_json::to_value(Payload::expression("#a * 2")).unwrap();
        assert_eq!(json["node_type"], "expression");
        assert_eq!(json["source"], "#a * 2");
    }
}
