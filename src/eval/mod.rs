//! # Evaluator
//!
//! Computes one node's value from its payload and the cached values of its
//! dependencies. Evaluation is pure: it reads the graph and writes nothing.
//! Callers apply the [`EvaluationOutcome`] to the node.
//!
//! Unit rules:
//!
//! | Operation | Requirement | Result unit |
//! |-----------|-------------|-------------|
//! | `a + b`, `a - b` | equal dimensions | unit of `a` (`b` converted) |
//! | `a * b`, `a / b` | none | product / quotient |
//! | `a ^ n` | `n` dimensionless; integer if `a` has dimensions | `unit(a)ⁿ` |
//! | `f(a)` | `a` dimensionless | dimensionless |

use serde::Serialize;
use tracing::debug;

use crate::formula::{BinaryOp, Expr, Reference, UnaryOp};
use crate::graph::DependencyGraph;
use crate::model::{
    ComputationStatus, ErrorKind, NodeId, Payload, PropertyFormula, ReferenceKind, ValueNode,
};
use crate::resolver::{ConstantRegistry, PropertySnapshot, ReferenceResolver, ResolvedSource};
use crate::units::{ComputedUnit, Quantity, UnitRegistry};
use crate::{Error, Result};

/// Largest exponent magnitude applied to a dimensioned base.
const MAX_UNIT_EXPONENT: f64 = 64.0;

/// The result of evaluating one node.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EvaluationOutcome {
    Valid(Quantity),
    Error { kind: ErrorKind, message: String },
    Circular { cycle: Vec<NodeId> },
}

impl EvaluationOutcome {
    pub fn from_result(result: Result<Quantity>) -> Self {
        match result {
            Ok(q) => EvaluationOutcome::Valid(q),
            Err(Error::CircularDependency { cycle }) => EvaluationOutcome::Circular { cycle },
            Err(e) => EvaluationOutcome::Error { kind: e.kind(), message: e.to_string() },
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, EvaluationOutcome::Valid(_))
    }

    pub fn quantity(&self) -> Option<&Quantity> {
        match self {
            EvaluationOutcome::Valid(q) => Some(q),
            _ => None,
        }
    }

    /// Write this outcome into the node's cache fields.
    pub(crate) fn apply_to(self, node: &mut ValueNode, at: chrono::DateTime<chrono::Utc>) {
        match self {
            EvaluationOutcome::Valid(q) => node.set_valid(q, at),
            EvaluationOutcome::Error { kind, message } => node.set_error(kind, message, at),
            // Circular status is owned by the graph; a circular outcome leaves it as is.
            EvaluationOutcome::Circular { .. } => {}
        }
    }
}

/// Supplies the value behind a `#reference`.
pub trait OperandSource {
    fn operand(&self, reference: &Reference) -> Result<Quantity>;
}

// ============================================================================
// Evaluator
// ============================================================================

/// Evaluates nodes against one immutable view of the graph and its inputs.
#[derive(Clone, Copy)]
pub struct Evaluator<'a> {
    graph: &'a DependencyGraph,
    units: &'a UnitRegistry,
    constants: &'a ConstantRegistry,
    properties: &'a PropertySnapshot,
}

impl<'a> Evaluator<'a> {
    pub fn new(
        graph: &'a DependencyGraph,
        units: &'a UnitRegistry,
        constants: &'a ConstantRegistry,
        properties: &'a PropertySnapshot,
    ) -> Self {
        Self { graph, units, constants, properties }
    }

    fn resolver(&self) -> ReferenceResolver<'a> {
        ReferenceResolver::new(self.graph, self.constants, self.properties)
    }

    /// Evaluate node `id`. Never panics; failures come back as outcomes.
    pub fn evaluate(&self, id: NodeId) -> EvaluationOutcome {
        let orphaned = self.graph.node(id).and_then(|n| n.orphaned_by.clone());
        let outcome = match orphaned {
            Some(message) => EvaluationOutcome::Error { kind: ErrorKind::UnresolvedReference, message },
            None => EvaluationOutcome::from_result(self.evaluate_node(id)),
        };
        debug!(node = %id, valid = outcome.is_valid(), "evaluated node");
        outcome
    }

    fn evaluate_node(&self, id: NodeId) -> Result<Quantity> {
        let node = self
            .graph
            .node(id)
            .ok_or_else(|| Error::NotFound(format!("node {id}")))?;
        if let Some(cycle) = &node.cycle {
            return Err(Error::CircularDependency { cycle: cycle.path.clone() });
        }
        let quantity = match &node.payload {
            Payload::Literal { value, unit_id } => self.literal(*value, *unit_id)?,
            Payload::Expression { source } => {
                let expr = node.expression().ok_or_else(|| Error::Parse {
                    position: 0,
                    message: format!("expression '{source}' was never parsed"),
                })?;
                self.evaluate_expr(expr, self)?
            }
            Payload::Reference { target } => self.node_quantity(*target, &target.to_string())?,
            Payload::TableLookup => {
                return Err(Error::Unsupported("table lookup nodes are not evaluated".into()));
            }
        };
        finite(quantity, "result")
    }

    fn literal(&self, value: f64, unit_id: Option<crate::units::UnitId>) -> Result<Quantity> {
        let unit = match unit_id {
            None => ComputedUnit::dimensionless(),
            Some(uid) => {
                let unit = self
                    .units
                    .get(uid)
                    .ok_or_else(|| Error::UnitConversion(format!("unknown unit {uid}")))?;
                ComputedUnit::from_unit(unit)
            }
        };
        Ok(Quantity::new(value, unit))
    }

    /// The cached value of a dependency, which must be valid.
    fn node_quantity(&self, id: NodeId, token: &str) -> Result<Quantity> {
        let node = self.graph.node(id).ok_or_else(|| Error::UnresolvedReference {
            token: token.to_string(),
            reason: format!("node {id} does not exist"),
        })?;
        match node.status() {
            ComputationStatus::Valid => node.value().ok_or_else(|| Error::UnresolvedReference {
                token: token.to_string(),
                reason: format!("node {id} has no cached value"),
            }),
            status => {
                let detail = node
                    .computation_error
                    .as_deref()
                    .map(|e| format!(": {e}"))
                    .unwrap_or_default();
                Err(Error::UnresolvedReference {
                    token: token.to_string(),
                    reason: format!("{} is {status}{detail}", node.label()),
                })
            }
        }
    }

    /// Evaluate a property formula using only its bound references.
    pub fn evaluate_formula(&self, formula: &PropertyFormula) -> EvaluationOutcome {
        EvaluationOutcome::from_result(self.formula_quantity(formula))
    }

    pub fn formula_quantity(&self, formula: &PropertyFormula) -> Result<Quantity> {
        let bound = BoundOperands { formula, constants: self.constants, properties: self.properties };
        let expr = formula.expr().ok_or_else(|| Error::Parse {
            position: 0,
            message: format!("formula '{}' was never compiled", formula.name),
        })?;
        finite(self.evaluate_expr(expr, &bound)?, "result")
    }

    // ========================================================================
    // Expressions
    // ========================================================================

    /// Evaluate an expression tree, looking references up in `source`.
    pub fn evaluate_expr(&self, expr: &Expr, source: &dyn OperandSource) -> Result<Quantity> {
        match expr {
            Expr::Number(v) => Ok(Quantity::dimensionless(*v)),
            Expr::Reference(r) => source.operand(r),
            Expr::Unary { op: UnaryOp::Negate, expr } => {
                let q = self.evaluate_expr(expr, source)?;
                Ok(Quantity::new(-q.value, q.unit))
            }
            Expr::Binary { left, op, right } => {
                let l = self.evaluate_expr(left, source)?;
                let r = self.evaluate_expr(right, source)?;
                let q = self.binary(*op, l, r)?;
                finite(q, op.symbol())
            }
            Expr::Function { func, arg } => {
                let q = self.evaluate_expr(arg, source)?;
                if !q.unit.is_dimensionless() {
                    return Err(Error::DimensionMismatch(format!(
                        "{}() needs a dimensionless argument, got {} ({})",
                        func.name(),
                        q.unit,
                        q.unit.dimensions
                    )));
                }
                let value = func.apply(self.plain_value(&q)?);
                finite(Quantity::dimensionless(value), func.name())
            }
        }
    }

    fn binary(&self, op: BinaryOp, l: Quantity, r: Quantity) -> Result<Quantity> {
        match op {
            BinaryOp::Add | BinaryOp::Sub => {
                if l.unit.dimensions != r.unit.dimensions {
                    return Err(Error::DimensionMismatch(format!(
                        "cannot {} {} ({}) and {} ({})",
                        if op == BinaryOp::Add { "add" } else { "subtract" },
                        l.unit,
                        l.unit.dimensions,
                        r.unit,
                        r.unit.dimensions
                    )));
                }
                let rv = self.convert_into(&r, &l.unit)?;
                let value = if op == BinaryOp::Add { l.value + rv } else { l.value - rv };
                Ok(Quantity::new(value, l.unit))
            }
            BinaryOp::Mul => Ok(Quantity::new(l.value * r.value, l.unit.multiply(&r.unit))),
            BinaryOp::Div => {
                if r.value == 0.0 {
                    return Err(Error::DivisionByZero(format!("{l} / {r}")));
                }
                Ok(Quantity::new(l.value / r.value, l.unit.divide(&r.unit)))
            }
            BinaryOp::Pow => self.power(l, r),
        }
    }

    fn power(&self, base: Quantity, exponent: Quantity) -> Result<Quantity> {
        if !exponent.unit.is_dimensionless() {
            return Err(Error::NonDimensionlessExponent(format!(
                "{} ({})",
                exponent.unit, exponent.unit.dimensions
            )));
        }
        let n = self.plain_value(&exponent)?;
        if base.unit.is_plain() {
            return Ok(Quantity::dimensionless(base.value.powf(n)));
        }
        if n.fract() != 0.0 || n.abs() > MAX_UNIT_EXPONENT {
            return Err(Error::DimensionMismatch(format!(
                "exponent {n} on {} must be an integer (|n| ≤ {MAX_UNIT_EXPONENT})",
                base.unit
            )));
        }
        let n = n as i32;
        Ok(Quantity::new(base.value.powi(n), base.unit.powi(n)))
    }

    /// `q` as a bare number, converting dimensionless units like `%` to `1`.
    fn plain_value(&self, q: &Quantity) -> Result<f64> {
        if q.unit.is_plain() {
            return Ok(q.value);
        }
        self.convert_into(q, &ComputedUnit::dimensionless())
    }

    /// `q`'s value expressed in `target`. Dimensions must already match.
    fn convert_into(&self, q: &Quantity, target: &ComputedUnit) -> Result<f64> {
        self.units.convert_computed(q.value, &q.unit, target)
    }
}

impl OperandSource for Evaluator<'_> {
    fn operand(&self, reference: &Reference) -> Result<Quantity> {
        match self.resolver().resolve(reference)? {
            ResolvedSource::Node(id) => self.node_quantity(id, &reference.token()),
            ResolvedSource::ComponentProperty { quantity, .. }
            | ResolvedSource::Constant { quantity, .. } => Ok(quantity),
        }
    }
}

/// Operands of a compiled property formula.
struct BoundOperands<'a> {
    formula: &'a PropertyFormula,
    constants: &'a ConstantRegistry,
    properties: &'a PropertySnapshot,
}

impl OperandSource for BoundOperands<'_> {
    fn operand(&self, reference: &Reference) -> Result<Quantity> {
        let token = reference.token();
        let unresolved = |reason: String| Error::UnresolvedReference { token: token.clone(), reason };
        let bound = self
            .formula
            .reference(&token)
            .ok_or_else(|| unresolved(format!("not bound in formula '{}'", self.formula.name)))?;
        match &bound.kind {
            ReferenceKind::ComponentProperty { component, property } => self
                .properties
                .get(component, property)
                .cloned()
                .ok_or_else(|| unresolved(format!("no value for {component}.{property}"))),
            ReferenceKind::SystemConstant { symbol } => self
                .constants
                .get(symbol)
                .map(|c| c.quantity())
                .ok_or_else(|| unresolved(format!("system constant '{symbol}' is not defined"))),
            ReferenceKind::LiteralValue { .. } | ReferenceKind::FunctionCall { .. } => {
                Err(unresolved("not a reference".into()))
            }
        }
    }
}

fn finite(q: Quantity, what: &str) -> Result<Quantity> {
    if q.value.is_finite() {
        Ok(q)
    } else {
        Err(Error::NonFiniteResult(format!("{what} produced {}", q.value)))
    }
}
