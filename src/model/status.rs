//! Computation status, error kinds and cycle records.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::node::NodeId;

/// Lifecycle of a node's cached result.
///
/// `pending → {valid, error, circular}`, `{valid, error} → stale` when a
/// dependency changes, `stale → {valid, error}` on re-evaluation. `circular`
/// holds until an edit breaks the cycle, then the node returns to `pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComputationStatus {
    Pending,
    Valid,
    Stale,
    Error,
    Circular,
}

impl ComputationStatus {
    /// Valid, error and circular are where a pass leaves a node.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ComputationStatus::Valid | ComputationStatus::Error | ComputationStatus::Circular
        )
    }

    /// Needs evaluation before its value can be read.
    pub fn needs_evaluation(self) -> bool {
        matches!(self, ComputationStatus::Pending | ComputationStatus::Stale)
    }
}

impl fmt::Display for ComputationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ComputationStatus::Pending => "pending",
            ComputationStatus::Valid => "valid",
            ComputationStatus::Stale => "stale",
            ComputationStatus::Error => "error",
            ComputationStatus::Circular => "circular",
        })
    }
}

/// Typed cause of a node's last failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Parse,
    UnresolvedReference,
    DimensionMismatch,
    NonDimensionlessExponent,
    DivisionByZero,
    UnitConversion,
    NonFiniteResult,
    CircularDependency,
    Unsupported,
    Other,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Parse => "parse",
            ErrorKind::UnresolvedReference => "unresolved_reference",
            ErrorKind::DimensionMismatch => "dimension_mismatch",
            ErrorKind::NonDimensionlessExponent => "non_dimensionless_exponent",
            ErrorKind::DivisionByZero => "division_by_zero",
            ErrorKind::UnitConversion => "unit_conversion",
            ErrorKind::NonFiniteResult => "non_finite_result",
            ErrorKind::CircularDependency => "circular_dependency",
            ErrorKind::Unsupported => "unsupported",
            ErrorKind::Other => "other",
        };
        f.write_str(s)
    }
}

/// A dependency cycle, shared by every member of the knot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cycle {
    /// One cycle through the knot, starting at its smallest id. The edge from
    /// the last element back to the first closes it.
    pub path: Vec<NodeId>,
    /// Every node in the strongly connected knot, ascending.
    pub members: Vec<NodeId>,
}

impl Cycle {
    pub fn describe(&self) -> String {
        format!("Circular dependency: {}", format_path(&self.path))
    }
}

/// `1 → 2 → 3 → 1`.
pub fn format_path(path: &[NodeId]) -> String {
    let mut parts: Vec<String> = path.iter().map(|id| id.to_string()).collect();
    if let Some(first) = path.first() {
        parts.push(first.to_string());
    }
    parts.join(" → ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(ComputationStatus::Valid.is_terminal());
        assert!(ComputationStatus::Circular.is_terminal());
        assert!(!ComputationStatus::Stale.is_terminal());
        assert!(ComputationStatus::Pending.needs_evaluation());
    }

    #[test]
    fn test_format_path_closes_loop() {
        assert_eq!(format_path(&[NodeId(1), NodeId(2)]), "1 → 2 → 1");
        assert_eq!(format_path(&[NodeId(7)]), "7 → 7");
        assert_eq!(format_path(&[]), "");
    }

    #[test]
    fn test_status_serde() {
        assert_eq!(serde_json::to_string(&ComputationStatus::Circular).unwrap(), "\"circular\"");
        assert_eq!(ErrorKind::DivisionByZero.to_string(), "division_by_zero");
    }
}
