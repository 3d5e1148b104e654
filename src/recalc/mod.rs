//! # Staleness Propagation and Recompute Passes
//!
//! A change marks its node and everything downstream `stale`. A pass then
//! orders the affected subgraph topologically, splits it into levels of
//! mutually independent nodes, and evaluates level by level. Wide levels go
//! to the rayon pool when the `parallel` feature is on; outcomes are always
//! written back on the calling thread.
//!
//! Circular nodes are never part of a pass. Nodes a cancelled pass did not
//! reach keep their `stale`/`pending` status.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info};

use crate::eval::{EvaluationOutcome, Evaluator};
use crate::graph::DependencyGraph;
use crate::model::NodeId;
use crate::resolver::{ConstantRegistry, PropertySnapshot};
use crate::units::UnitRegistry;
use crate::Result;

// ============================================================================
// Cancellation
// ============================================================================

/// Cooperative cancellation flag shared between a caller and a pass.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

// ============================================================================
// Staleness
// ============================================================================

/// Mark `roots` and their transitive dependents stale. Returns every affected
/// node, including pending ones that were left as they are. Circular nodes
/// are skipped.
pub fn mark_stale(
    graph: &mut DependencyGraph,
    roots: impl IntoIterator<Item = NodeId>,
) -> BTreeSet<NodeId> {
    let affected = graph.transitive_dependents(roots);
    let mut marked = 0usize;
    for id in &affected {
        if graph.node_mut(*id).is_some_and(|n| n.mark_stale()) {
            marked += 1;
        }
    }
    debug!(affected = affected.len(), marked, "propagated staleness");
    affected
}

// ============================================================================
// Passes
// ============================================================================

/// Summary of one recompute pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PassReport {
    /// Non-circular nodes in the pass.
    pub affected: usize,
    pub evaluated: usize,
    pub successful: usize,
    pub failed: usize,
    /// Requested nodes left out because they sit on a cycle.
    pub circular: usize,
    pub levels: usize,
    pub cancelled: bool,
}

/// Runs recompute passes against fixed registries and one property snapshot.
pub struct Recalculator<'a> {
    units: &'a UnitRegistry,
    constants: &'a ConstantRegistry,
    properties: &'a PropertySnapshot,
    parallel: bool,
    parallel_threshold: usize,
    token: Option<&'a CancellationToken>,
}

impl<'a> Recalculator<'a> {
    pub fn new(
        units: &'a UnitRegistry,
        constants: &'a ConstantRegistry,
        properties: &'a PropertySnapshot,
    ) -> Self {
        Self {
            units,
            constants,
            properties,
            parallel: false,
            parallel_threshold: usize::MAX,
            token: None,
        }
    }

    /// Evaluate levels at least `threshold` wide in parallel.
    pub fn parallel(mut self, enabled: bool, threshold: usize) -> Self {
        self.parallel = enabled;
        self.parallel_threshold = threshold.max(1);
        self
    }

    pub fn with_token(mut self, token: Option<&'a CancellationToken>) -> Self {
        self.token = token;
        self
    }

    fn cancelled(&self) -> bool {
        self.token.is_some_and(|t| t.is_cancelled())
    }

    /// Evaluate `subset` in dependency order and write the outcomes back.
    pub fn run(&self, graph: &mut DependencyGraph, subset: &BTreeSet<NodeId>) -> Result<PassReport> {
        let started = Instant::now();
        let ids: Vec<NodeId> = subset.iter().copied().collect();
        let order = graph.topological_order(&ids)?;
        let levels = graph.levels(&order);

        let mut report = PassReport {
            affected: order.len(),
            circular: ids
                .iter()
                .filter(|id| graph.node(**id).is_some_and(|n| n.is_circular()))
                .count(),
            levels: levels.len(),
            ..PassReport::default()
        };

        for level in &levels {
            if self.cancelled() {
                report.cancelled = true;
                break;
            }
            if self.parallel && level.len() >= self.parallel_threshold {
                let outcomes = self.evaluate_level(graph, level);
                for (id, outcome) in outcomes {
                    if self.cancelled() {
                        report.cancelled = true;
                        break;
                    }
                    Self::write_back(graph, id, outcome, &mut report);
                }
            } else {
                for &id in level {
                    if self.cancelled() {
                        report.cancelled = true;
                        break;
                    }
                    let outcome = self.evaluator(graph).evaluate(id);
                    Self::write_back(graph, id, outcome, &mut report);
                }
            }
            if report.cancelled {
                break;
            }
        }

        info!(
            affected = report.affected,
            evaluated = report.evaluated,
            failed = report.failed,
            levels = report.levels,
            cancelled = report.cancelled,
            elapsed_us = started.elapsed().as_micros() as u64,
            "recompute pass finished"
        );
        Ok(report)
    }

    fn evaluator<'g>(&self, graph: &'g DependencyGraph) -> Evaluator<'g>
    where
        'a: 'g,
    {
        Evaluator::new(graph, self.units, self.constants, self.properties)
    }

    #[cfg(feature = "parallel")]
    fn evaluate_level(&self, graph: &DependencyGraph, level: &[NodeId]) -> Vec<(NodeId, EvaluationOutcome)> {
        use rayon::prelude::*;

        let evaluator = self.evaluator(graph);
        debug!(width = level.len(), "evaluating level in parallel");
        level.par_iter().map(|&id| (id, evaluator.evaluate(id))).collect()
    }

    #[cfg(not(feature = "parallel"))]
    fn evaluate_level(&self, graph: &DependencyGraph, level: &[NodeId]) -> Vec<(NodeId, EvaluationOutcome)> {
        let evaluator = self.evaluator(graph);
        level.iter().map(|&id| (id, evaluator.evaluate(id))).collect()
    }

    fn write_back(graph: &mut DependencyGraph, id: NodeId, outcome: EvaluationOutcome, report: &mut PassReport) {
        let Some(node) = graph.node_mut(id) else { return };
        report.evaluated += 1;
        if outcome.is_valid() {
            report.successful += 1;
        } else {
            report.failed += 1;
        }
        outcome.apply_to(node, Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ComputationStatus, Payload};

    struct Env {
        graph: DependencyGraph,
        units: UnitRegistry,
        constants: ConstantRegistry,
        properties: PropertySnapshot,
    }

    impl Env {
        fn new() -> Self {
            Self {
                graph: DependencyGraph::new(),
                units: UnitRegistry::with_si_defaults(),
                constants: ConstantRegistry::with_defaults(),
                properties: PropertySnapshot::new(),
            }
        }

        fn lit(&mut self, name: &str, v: f64) -> NodeId {
            self.graph.insert(Some(name.into()), None, Payload::literal(v, None)).unwrap().node
        }

        fn expr(&mut self, name: &str, src: &str) -> NodeId {
            self.graph.insert(Some(name.into()), None, Payload::expression(src)).unwrap().node
        }

        fn run(&mut self, subset: &BTreeSet<NodeId>, token: Option<&CancellationToken>) -> PassReport {
            Recalculator::new(&self.units, &self.constants, &self.properties)
                .parallel(true, 2)
                .with_token(token)
                .run(&mut self.graph, subset)
                .unwrap()
        }

        fn all(&self) -> BTreeSet<NodeId> {
            self.graph.ids().into_iter().collect()
        }

        fn value(&self, id: NodeId) -> Option<f64> {
            self.graph.node(id).unwrap().computed_value
        }
    }

    #[test]
    fn test_pass_evaluates_in_order() {
        let mut env = Env::new();
        let a = env.lit("a", 2.0);
        let b = env.expr("b", "#a * 3");
        let c = env.expr("c", "#a + 1");
        let d = env.expr("d", "#b + #c");
        let report = env.run(&env.all(), None);
        assert_eq!(report.affected, 4);
        assert_eq!(report.successful, 4);
        assert_eq!(report.levels, 3);
        assert_eq!(env.value(b), Some(6.0));
        assert_eq!(env.value(c), Some(3.0));
        assert_eq!(env.value(d), Some(9.0));
        assert!(env.graph.node(a).unwrap().is_valid());
    }

    #[test]
    fn test_mark_stale_then_recompute() {
        let mut env = Env::new();
        let a = env.lit("a", 2.0);
        let b = env.expr("b", "#a * 3");
        let unrelated = env.lit("u", 1.0);
        env.run(&env.all(), None);

        env.graph.set_payload(a, Payload::literal(5.0, None), None).unwrap();
        let affected = mark_stale(&mut env.graph, [a]);
        assert_eq!(affected, BTreeSet::from([a, b]));
        assert_eq!(env.graph.node(b).unwrap().status(), ComputationStatus::Stale);
        assert!(env.graph.node(unrelated).unwrap().is_valid());

        let report = env.run(&affected, None);
        assert_eq!(report.affected, 2);
        assert_eq!(env.value(b), Some(15.0));
    }

    #[test]
    fn test_errors_propagate_as_unresolved() {
        let mut env = Env::new();
        env.lit("zero", 0.0);
        let q = env.expr("q", "1 / #zero");
        let r = env.expr("r", "#q + 1");
        let report = env.run(&env.all(), None);
        assert_eq!(report.failed, 2);
        let rn = env.graph.node(r).unwrap();
        assert_eq!(rn.status(), ComputationStatus::Error);
        assert_eq!(rn.error_kind, Some(crate::model::ErrorKind::UnresolvedReference));
        assert_eq!(
            env.graph.node(q).unwrap().error_kind,
            Some(crate::model::ErrorKind::DivisionByZero)
        );
    }

    #[test]
    fn test_circular_nodes_left_out() {
        let mut env = Env::new();
        let me = env.expr("me", "#me + 1");
        let ok = env.lit("ok", 1.0);
        let report = env.run(&env.all(), None);
        assert_eq!(report.circular, 1);
        assert_eq!(report.affected, 1);
        assert!(env.graph.node(me).unwrap().is_circular());
        assert!(env.graph.node(ok).unwrap().is_valid());
    }

    #[test]
    fn test_cancelled_pass_leaves_nodes_untouched() {
        let mut env = Env::new();
        let a = env.lit("a", 1.0);
        let b = env.expr("b", "#a + 1");
        let token = CancellationToken::new();
        token.cancel();
        let report = env.run(&env.all(), Some(&token));
        assert!(report.cancelled);
        assert_eq!(report.evaluated, 0);
        assert_eq!(env.graph.node(a).unwrap().status(), ComputationStatus::Pending);
        assert_eq!(env.graph.node(b).unwrap().status(), ComputationStatus::Pending);
    }

    #[test]
    fn test_wide_level_matches_serial() {
        let mut env = Env::new();
        let base = env.lit("base", 2.0);
        let ids: Vec<NodeId> = (0..10).map(|i| env.expr(&format!("n{i}"), &format!("#base * {i}"))).collect();
        let report = env.run(&env.all(), None);
        assert_eq!(report.levels, 2);
        assert_eq!(report.successful, 11);
        for (i, id) in ids.iter().enumerate() {
            assert_eq!(env.value(*id), Some(2.0 * i as f64));
        }
        assert_eq!(env.value(base), Some(2.0));
    }
}
