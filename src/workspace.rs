//! # Workspace
//!
//! The public entry point. A `Workspace` owns one [`DependencyGraph`] behind
//! a `parking_lot::RwLock` and shares the unit registry, system constants and
//! the current component property snapshot with every pass.
//!
//! Mutations validate, apply, then mark what they touched stale. Nothing is
//! recomputed until a `recalculate*` call, unless `auto_recalculate` is set.
//!
//! Lock order: the property lock is never held while taking the graph lock.

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::api::{
    BulkRecalculationResult, DependencyTree, NodeFailure, NodeValue, RecalculationResult,
    ValidationReport,
};
use crate::config::EngineConfig;
use crate::eval::Evaluator;
use crate::formula;
use crate::graph::{DeletePolicy, DependencyGraph, Mutation};
use crate::model::{NodeId, Payload, PropertyFormula, ValueNode};
use crate::recalc::{self, CancellationToken, PassReport, Recalculator};
use crate::resolver::properties::property_quantity;
use crate::resolver::{ComponentProperty, ConstantRegistry, PropertySnapshot, PropertySource};
use crate::units::{UnitId, UnitRegistry};
use crate::{Error, Result};

// ============================================================================
// Workspace
// ============================================================================

/// A value graph plus the services it computes against. Cheap to clone;
/// clones share state.
#[derive(Clone)]
pub struct Workspace {
    inner: Arc<WorkspaceInner>,
}

struct WorkspaceInner {
    graph: RwLock<DependencyGraph>,
    units: Arc<UnitRegistry>,
    constants: Arc<ConstantRegistry>,
    properties: RwLock<Arc<PropertySnapshot>>,
    config: EngineConfig,
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new()
    }
}

impl Workspace {
    /// SI units, default constants, default configuration.
    pub fn new() -> Self {
        Self::assemble(
            Arc::new(UnitRegistry::with_si_defaults()),
            ConstantRegistry::with_defaults(),
            EngineConfig::default(),
        )
    }

    /// Build against a shared unit registry. Configured constants must use
    /// units known to `units`.
    pub fn with_config(config: EngineConfig, units: Arc<UnitRegistry>) -> Result<Self> {
        config.validate()?;
        let constants = ConstantRegistry::from_config(&config.constants, &units)?;
        Ok(Self::assemble(units, constants, config))
    }

    fn assemble(units: Arc<UnitRegistry>, constants: ConstantRegistry, config: EngineConfig) -> Self {
        let graph = DependencyGraph::with_reserved_names(constants.symbols());
        Self {
            inner: Arc::new(WorkspaceInner {
                graph: RwLock::new(graph),
                units,
                constants: Arc::new(constants),
                properties: RwLock::new(Arc::new(PropertySnapshot::new())),
                config,
            }),
        }
    }

    pub fn units(&self) -> &UnitRegistry {
        &self.inner.units
    }

    pub fn constants(&self) -> &ConstantRegistry {
        &self.inner.constants
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// The property snapshot the next pass will see.
    pub fn properties(&self) -> Arc<PropertySnapshot> {
        self.inner.properties.read().clone()
    }

    // ========================================================================
    // Node creation
    // ========================================================================

    pub fn create_literal(
        &self,
        value: f64,
        unit_id: Option<UnitId>,
        name: Option<&str>,
        description: Option<&str>,
    ) -> Result<ValueNode> {
        self.check_unit(unit_id)?;
        self.create(Payload::literal(value, unit_id), name, description)
    }

    /// Create a formula node. A syntax error rejects the node.
    pub fn create_expression(
        &self,
        expression: &str,
        name: Option<&str>,
        description: Option<&str>,
    ) -> Result<ValueNode> {
        self.create(Payload::expression(expression), name, description)
    }

    /// Create a node mirroring `target`'s value and unit.
    pub fn create_reference(
        &self,
        target: NodeId,
        name: Option<&str>,
        description: Option<&str>,
    ) -> Result<ValueNode> {
        self.create(Payload::reference(target), name, description)
    }

    fn create(&self, payload: Payload, name: Option<&str>, description: Option<&str>) -> Result<ValueNode> {
        let mut graph = self.inner.graph.write();
        let mutation = graph.insert(name.map(str::to_string), description.map(str::to_string), payload)?;
        self.after_mutation(&mut graph, &mutation)?;
        Self::snapshot(&graph, mutation.node)
    }

    // ========================================================================
    // Node updates
    // ========================================================================

    pub fn update_literal(
        &self,
        id: NodeId,
        value: f64,
        unit_id: Option<UnitId>,
        expected_version: Option<u64>,
    ) -> Result<ValueNode> {
        self.check_unit(unit_id)?;
        self.update(id, Payload::literal(value, unit_id), expected_version)
    }

    pub fn update_expression(
        &self,
        id: NodeId,
        expression: &str,
        expected_version: Option<u64>,
    ) -> Result<ValueNode> {
        self.update(id, Payload::expression(expression), expected_version)
    }

    pub fn update_reference(
        &self,
        id: NodeId,
        target: NodeId,
        expected_version: Option<u64>,
    ) -> Result<ValueNode> {
        self.update(id, Payload::reference(target), expected_version)
    }

    fn update(&self, id: NodeId, payload: Payload, expected_version: Option<u64>) -> Result<ValueNode> {
        let mut graph = self.inner.graph.write();
        let mutation = graph.set_payload(id, payload, expected_version)?;
        self.after_mutation(&mut graph, &mutation)?;
        Self::snapshot(&graph, id)
    }

    /// Delete a node. With [`DeletePolicy::Reject`] this fails while other
    /// nodes reference it; with `Cascade` the direct dependents go to
    /// `error` and everything below them goes stale.
    pub fn delete_node(&self, id: NodeId, policy: DeletePolicy) -> Result<ValueNode> {
        let mut graph = self.inner.graph.write();
        let removal = graph.remove(id, policy)?;

        let mut roots: BTreeSet<NodeId> = removal
            .orphaned
            .iter()
            .flat_map(|o| graph.dependents_of(*o))
            .collect();
        roots.extend(removal.released.iter().copied());
        for orphan in &removal.orphaned {
            roots.remove(orphan);
        }
        let affected = recalc::mark_stale(&mut graph, roots);
        if self.inner.config.auto_recalculate && !affected.is_empty() {
            self.pass(&mut graph, &affected, None)?;
        }
        info!(node = %id, orphaned = removal.orphaned.len(), stale = affected.len(), "deleted node");
        Ok(removal.removed)
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub fn node(&self, id: NodeId) -> Option<ValueNode> {
        self.inner.graph.read().node(id).cloned()
    }

    pub fn node_by_name(&self, name: &str) -> Option<ValueNode> {
        self.inner.graph.read().node_by_name(name).cloned()
    }

    /// Every node, ascending by id.
    pub fn nodes(&self) -> Vec<ValueNode> {
        self.inner.graph.read().nodes().into_iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.graph.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.graph.read().is_empty()
    }

    /// The node's cached value with its unit symbol, if valid.
    pub fn value(&self, id: NodeId) -> Option<NodeValue> {
        self.inner.graph.read().node(id).and_then(NodeValue::of)
    }

    /// Syntax check and reference extraction. Creates nothing.
    pub fn validate_expression(&self, expression: &str) -> ValidationReport {
        formula::validate(expression)
    }

    /// Dependency tree below `id`. Depth defaults to `max_tree_depth`.
    pub fn dependency_tree(&self, id: NodeId, max_depth: Option<usize>) -> Result<DependencyTree> {
        let depth = max_depth.unwrap_or(self.inner.config.max_tree_depth);
        self.inner.graph.read().dependency_tree(id, depth)
    }

    // ========================================================================
    // Recalculation
    // ========================================================================

    /// Recompute `id`, its unevaluated dependencies and everything downstream.
    pub fn recalculate(&self, id: NodeId) -> Result<RecalculationResult> {
        self.recalculate_with_token(id, None)
    }

    pub fn recalculate_with_token(
        &self,
        id: NodeId,
        token: Option<&CancellationToken>,
    ) -> Result<RecalculationResult> {
        let mut graph = self.inner.graph.write();
        if !graph.contains(id) {
            return Err(Error::NotFound(format!("node {id}")));
        }
        let subset = Self::recompute_set(&mut graph, [id]);
        let report = self.pass(&mut graph, &subset, token)?;
        if report.cancelled {
            return Err(Error::Cancelled);
        }
        let node = graph.node(id).ok_or_else(|| Error::NotFound(format!("node {id}")))?;
        Ok(RecalculationResult::from_node(node, report.affected))
    }

    /// Recompute several nodes in one pass. Unknown ids count as failures.
    pub fn bulk_recalculate(&self, ids: &[NodeId]) -> Result<BulkRecalculationResult> {
        self.bulk_recalculate_with_token(ids, None)
    }

    pub fn bulk_recalculate_with_token(
        &self,
        ids: &[NodeId],
        token: Option<&CancellationToken>,
    ) -> Result<BulkRecalculationResult> {
        let mut graph = self.inner.graph.write();
        let known: Vec<NodeId> = ids.iter().copied().filter(|id| graph.contains(*id)).collect();
        let subset = Self::recompute_set(&mut graph, known);
        let report = self.pass(&mut graph, &subset, token)?;
        Ok(Self::summarize(&graph, ids, &report))
    }

    /// Recompute every `pending` or `stale` node.
    pub fn recalculate_stale(&self) -> Result<BulkRecalculationResult> {
        let mut graph = self.inner.graph.write();
        let ids: Vec<NodeId> = graph
            .nodes()
            .into_iter()
            .filter(|n| n.status().needs_evaluation())
            .map(|n| n.id)
            .collect();
        let subset: BTreeSet<NodeId> = ids.iter().copied().collect();
        let report = self.pass(&mut graph, &subset, None)?;
        Ok(Self::summarize(&graph, &ids, &report))
    }

    /// `roots`, their unevaluated upstream and everything downstream, with
    /// the roots and downstream forced stale.
    fn recompute_set(graph: &mut DependencyGraph, roots: impl IntoIterator<Item = NodeId>) -> BTreeSet<NodeId> {
        let roots: Vec<NodeId> = roots.into_iter().collect();
        let mut subset = recalc::mark_stale(graph, roots.iter().copied());
        for id in &roots {
            subset.extend(graph.unevaluated_dependencies(*id));
        }
        // Circular roots are excluded by mark_stale but still reported on.
        subset.extend(roots);
        subset
    }

    fn summarize(graph: &DependencyGraph, ids: &[NodeId], report: &PassReport) -> BulkRecalculationResult {
        let mut result = BulkRecalculationResult {
            total: ids.len(),
            nodes_recalculated: report.affected,
            cancelled: report.cancelled,
            ..BulkRecalculationResult::default()
        };
        for id in ids {
            match graph.node(*id) {
                Some(node) if node.is_valid() => result.successful += 1,
                Some(node) => {
                    result.failed += 1;
                    result.errors.push(NodeFailure {
                        node_id: *id,
                        error: node
                            .computation_error
                            .clone()
                            .unwrap_or_else(|| format!("node is {}", node.status())),
                    });
                }
                None => {
                    result.failed += 1;
                    result.errors.push(NodeFailure { node_id: *id, error: format!("node {id} not found") });
                }
            }
        }
        result
    }

    // ========================================================================
    // Component properties
    // ========================================================================

    /// Set one component property and mark the nodes that read it stale.
    /// Returns the stale nodes.
    pub fn set_component_property(
        &self,
        component: &str,
        property: &str,
        value: f64,
        unit: Option<&str>,
    ) -> Result<Vec<NodeId>> {
        let quantity = property_quantity(
            &ComponentProperty::new(component, property, value, unit),
            &self.inner.units,
        )?;
        {
            let mut current = self.inner.properties.write();
            Arc::make_mut(&mut *current).insert(component, property, quantity);
        }
        self.invalidate_components([component.to_string()])
    }

    /// Replace the property snapshot with what `source` supplies. Returns the
    /// `(component, property)` pairs that changed.
    pub async fn refresh_properties(&self, source: &dyn PropertySource) -> Result<Vec<(String, String)>> {
        let fetched = source.fetch_properties().await?;
        let snapshot = PropertySnapshot::from_properties(&fetched, &self.inner.units)?;

        let changed = {
            let mut current = self.inner.properties.write();
            let changed = current.changed(&snapshot);
            *current = Arc::new(snapshot);
            changed
        };
        let components: BTreeSet<String> = changed.iter().map(|(c, _)| c.clone()).collect();
        let stale = self.invalidate_components(components)?;
        info!(properties = fetched.len(), changed = changed.len(), stale = stale.len(), "refreshed properties");
        Ok(changed)
    }

    fn invalidate_components(&self, components: impl IntoIterator<Item = String>) -> Result<Vec<NodeId>> {
        let mut graph = self.inner.graph.write();
        let roots: BTreeSet<NodeId> = components
            .into_iter()
            .flat_map(|c| graph.waiting_on(&c))
            .collect();
        let affected = recalc::mark_stale(&mut graph, roots);
        if self.inner.config.auto_recalculate && !affected.is_empty() {
            self.pass(&mut graph, &affected, None)?;
        }
        Ok(affected.into_iter().collect())
    }

    /// Bind a formula for `component.property`. References must be
    /// component properties or system constants.
    pub fn compile_property_formula(
        &self,
        name: &str,
        component: &str,
        property: &str,
        expression: &str,
    ) -> Result<PropertyFormula> {
        PropertyFormula::compile(name, component, property, expression, &self.inner.constants)
    }

    /// Evaluate a compiled formula against the current property snapshot.
    pub fn evaluate_property_formula(&self, formula: &PropertyFormula) -> Result<NodeValue> {
        let properties = self.properties();
        let graph = self.inner.graph.read();
        let evaluator = Evaluator::new(&graph, &self.inner.units, &self.inner.constants, &properties);
        let quantity = evaluator.formula_quantity(formula)?;
        Ok(NodeValue::from_quantity(&quantity))
    }

    /// Convert between two registered units.
    pub fn convert(&self, value: f64, from: &str, to: &str) -> Result<NodeValue> {
        let converted = self.inner.units.convert_symbols(value, from, to)?;
        Ok(NodeValue { value: converted, unit_symbol: to.to_string() })
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn check_unit(&self, unit_id: Option<UnitId>) -> Result<()> {
        match unit_id {
            Some(id) if self.inner.units.get(id).is_none() => Err(Error::NotFound(format!("unit {id}"))),
            _ => Ok(()),
        }
    }

    fn after_mutation(&self, graph: &mut DependencyGraph, mutation: &Mutation) -> Result<()> {
        let affected = recalc::mark_stale(graph, mutation.touched.iter().copied());
        if let Some(cycle) = &mutation.cycle {
            warn!(node = %mutation.node, members = cycle.members.len(), "mutation closed a cycle");
        }
        debug!(node = %mutation.node, stale = affected.len(), "applied mutation");
        if self.inner.config.auto_recalculate && !affected.is_empty() {
            self.pass(graph, &affected, None)?;
        }
        Ok(())
    }

    fn pass(
        &self,
        graph: &mut DependencyGraph,
        subset: &BTreeSet<NodeId>,
        token: Option<&CancellationToken>,
    ) -> Result<PassReport> {
        let properties = self.properties();
        Recalculator::new(&self.inner.units, &self.inner.constants, &properties)
            .parallel(self.inner.config.parallel, self.inner.config.parallel_threshold)
            .with_token(token)
            .run(graph, subset)
    }

    fn snapshot(graph: &DependencyGraph, id: NodeId) -> Result<ValueNode> {
        graph.node(id).cloned().ok_or_else(|| Error::NotFound(format!("node {id}")))
    }
}
