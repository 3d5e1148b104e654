//! # unitgraph: Unit-Aware Value Computation
//!
//! A graph of engineering values. Each node is a literal with a unit, a
//! formula over other nodes (`#force / #area`), or a reference to another
//! node. Every computed value carries its unit; the engine checks dimensions,
//! tracks dependencies, detects cycles and recomputes only what a change
//! makes stale.
//!
//! ## Design Principles
//!
//! 1. **Parser owns nothing**: formula → AST is a pure function
//! 2. **Edges come from payloads**: the graph derives dependencies, callers never wire them
//! 3. **Evaluation is pure**: the evaluator reads the graph; passes write outcomes back
//! 4. **Units travel with values**: no number crosses the API without its symbol
//!
//! ## Quick Start
//!
//! ```rust
//! use unitgraph::Workspace;
//!
//! # fn example() -> unitgraph::Result<()> {
//! let ws = Workspace::new();
//! let m = ws.units().by_symbol("m").map(|u| u.id);
//! let s = ws.units().by_symbol("s").map(|u| u.id);
//!
//! ws.create_literal(5.0, m, Some("distance"), None)?;
//! ws.create_literal(2.0, s, Some("time"), None)?;
//! let speed = ws.create_expression("#distance / #time", Some("speed"), None)?;
//!
//! let result = ws.recalculate(speed.id)?;
//! assert_eq!(result.value, Some(2.5));
//! assert_eq!(result.unit_symbol.as_deref(), Some("m/s"));
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```
//!
//! ## Features
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `parallel` | yes | Evaluate wide recompute levels on the rayon pool |

// ============================================================================
// Modules
// ============================================================================

pub mod api;
pub mod config;
pub mod eval;
pub mod formula;
pub mod graph;
pub mod model;
pub mod recalc;
pub mod resolver;
pub mod units;
pub mod workspace;

// ============================================================================
// Re-exports: Model
// ============================================================================

pub use model::{
    ComputationStatus, Cycle, ErrorKind, NodeId, NodeType, Payload, PropertyFormula, ValueNode,
};

// ============================================================================
// Re-exports: Units and formulas
// ============================================================================

pub use formula::{extract_references, Expr};
pub use units::{ComputedUnit, Dimensions, Quantity, Unit, UnitId, UnitRegistry};

// ============================================================================
// Re-exports: Engine
// ============================================================================

pub use api::{
    BulkRecalculationResult, DependencyTree, NodeFailure, NodeValue, RecalculationResult,
    ValidationReport,
};
pub use config::{ConstantConfig, EngineConfig};
pub use eval::{EvaluationOutcome, Evaluator};
pub use graph::{DeletePolicy, DependencyGraph};
pub use recalc::{CancellationToken, PassReport};
pub use resolver::{ComponentProperty, ConstantRegistry, PropertySnapshot, PropertySource};
pub use workspace::Workspace;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Formula syntax error at position {position}: {message}")]
    Parse { position: usize, message: String },

    #[error("Unresolved reference '#{token}': {reason}")]
    UnresolvedReference { token: String, reason: String },

    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("Exponent must be dimensionless: {0}")]
    NonDimensionlessExponent(String),

    #[error("Division by zero: {0}")]
    DivisionByZero(String),

    #[error("Unit conversion error: {0}")]
    UnitConversion(String),

    #[error("Non-finite result: {0}")]
    NonFiniteResult(String),

    #[error("Circular dependency: {}", model::format_path(cycle))]
    CircularDependency { cycle: Vec<NodeId> },

    #[error("Version conflict on node {node}: expected {expected}, found {actual}")]
    Conflict { node: NodeId, expected: u64, actual: u64 },

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Recompute pass cancelled")]
    Cancelled,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// The kind recorded on a node that failed with this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Parse { .. } => ErrorKind::Parse,
            Error::UnresolvedReference { .. } => ErrorKind::UnresolvedReference,
            Error::DimensionMismatch(_) => ErrorKind::DimensionMismatch,
            Error::NonDimensionlessExponent(_) => ErrorKind::NonDimensionlessExponent,
            Error::DivisionByZero(_) => ErrorKind::DivisionByZero,
            Error::UnitConversion(_) => ErrorKind::UnitConversion,
            Error::NonFiniteResult(_) => ErrorKind::NonFiniteResult,
            Error::CircularDependency { .. } => ErrorKind::CircularDependency,
            Error::Unsupported(_) => ErrorKind::Unsupported,
            Error::Conflict { .. }
            | Error::NotFound(_)
            | Error::ConstraintViolation(_)
            | Error::Config(_)
            | Error::Cancelled
            | Error::Json(_) => ErrorKind::Other,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
