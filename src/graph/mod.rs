//! # Dependency Graph
//!
//! Owns every [`ValueNode`] and the edges between them. Edges are derived
//! from payloads and nothing else:
//!
//! - an expression depends on each `#name` that names a node;
//! - a reference node depends on its target;
//! - literals and table lookups have no dependencies.
//!
//! Tokens that name no node (constants, component properties, names not yet
//! created) are indexed by their head identifier. Creating a node with that
//! name later rewires the waiting nodes onto it.
//!
//! After every payload write the mutated node is checked for cycles. A cycle
//! marks the whole strongly connected knot `circular` with one shared path.

mod topology;
mod tree;

use std::collections::BTreeSet;
use std::sync::Arc;

use hashbrown::{HashMap, HashSet};
use smallvec::SmallVec;
use tracing::{debug, warn};

use crate::api::DependencyTree;
use crate::formula::{self, Expr};
use crate::model::{Cycle, ErrorKind, NodeId, Payload, ValueNode};
use crate::{Error, Result};

/// What to do with dependents when deleting a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletePolicy {
    /// Refuse while any other node references it.
    #[default]
    Reject,
    /// Delete, and put direct dependents into `error` naming the deleted node.
    Cascade,
}

/// Outcome of an insert or payload write.
#[derive(Debug, Clone, PartialEq)]
pub struct Mutation {
    pub node: NodeId,
    /// Nodes whose inputs changed: the mutated node, nodes rewired onto it,
    /// and former cycle members released back to `pending`.
    pub touched: BTreeSet<NodeId>,
    /// Set if the mutation closed a cycle.
    pub cycle: Option<Cycle>,
}

/// Outcome of a delete.
#[derive(Debug, Clone, PartialEq)]
pub struct Removal {
    pub removed: ValueNode,
    /// Direct dependents now in `error` because their input is gone.
    pub orphaned: Vec<NodeId>,
    /// Former cycle members released back to `pending`.
    pub released: Vec<NodeId>,
}

/// The value graph.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    nodes: HashMap<NodeId, ValueNode>,
    names: HashMap<String, NodeId>,
    dependencies: HashMap<NodeId, SmallVec<[NodeId; 4]>>,
    dependents: HashMap<NodeId, BTreeSet<NodeId>>,
    /// Head identifier → nodes whose formulas mention it without it naming a node.
    waiting: HashMap<String, BTreeSet<NodeId>>,
    waiting_on: HashMap<NodeId, SmallVec<[String; 2]>>,
    /// Names nodes may not take (system constants).
    reserved: HashSet<String>,
    next_id: u64,
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            names: HashMap::new(),
            dependencies: HashMap::new(),
            dependents: HashMap::new(),
            waiting: HashMap::new(),
            waiting_on: HashMap::new(),
            reserved: HashSet::new(),
            next_id: 1,
        }
    }

    /// A graph where the given names (system constants) can't be node names.
    pub fn with_reserved_names<S: AsRef<str>>(names: impl IntoIterator<Item = S>) -> Self {
        let mut g = Self::new();
        g.reserved = names.into_iter().map(|s| s.as_ref().to_string()).collect();
        g
    }

    // ========================================================================
    // Lookups
    // ========================================================================

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn node(&self, id: NodeId) -> Option<&ValueNode> {
        self.nodes.get(&id)
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Option<&mut ValueNode> {
        self.nodes.get_mut(&id)
    }

    pub fn id_by_name(&self, name: &str) -> Option<NodeId> {
        self.names.get(name).copied()
    }

    pub fn node_by_name(&self, name: &str) -> Option<&ValueNode> {
        self.id_by_name(name).and_then(|id| self.node(id))
    }

    /// All nodes, ascending by id.
    pub fn nodes(&self) -> Vec<&ValueNode> {
        let mut out: Vec<&ValueNode> = self.nodes.values().collect();
        out.sort_unstable_by_key(|n| n.id);
        out
    }

    pub fn ids(&self) -> Vec<NodeId> {
        let mut out: Vec<NodeId> = self.nodes.keys().copied().collect();
        out.sort_unstable();
        out
    }

    /// Direct dependencies in order of first appearance in the payload.
    pub fn dependencies_of(&self, id: NodeId) -> Vec<NodeId> {
        self.dependency_slice(id).to_vec()
    }

    /// Direct dependents, ascending by id.
    pub fn dependents_of(&self, id: NodeId) -> Vec<NodeId> {
        self.dependent_set(id)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Nodes whose formulas mention `head` (as `#head` or `#head.field`)
    /// without it naming a node.
    pub fn waiting_on(&self, head: &str) -> Vec<NodeId> {
        self.waiting
            .get(head)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }

    pub(crate) fn dependency_slice(&self, id: NodeId) -> &[NodeId] {
        self.dependencies.get(&id).map(|d| d.as_slice()).unwrap_or(&[])
    }

    pub(crate) fn dependent_set(&self, id: NodeId) -> Option<&BTreeSet<NodeId>> {
        self.dependents.get(&id)
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Add a node. Names must be unique identifiers and may not shadow a
    /// system constant; expression payloads must parse; reference targets
    /// must exist.
    pub fn insert(
        &mut self,
        name: Option<String>,
        description: Option<String>,
        payload: Payload,
    ) -> Result<Mutation> {
        if let Some(name) = &name {
            self.check_name(name)?;
        }
        let ast = self.check_payload(&payload, None)?;

        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(id, ValueNode::new(id, name.clone(), description, payload, ast));

        let mut touched = BTreeSet::from([id]);
        if let Some(name) = name {
            self.names.insert(name.clone(), id);
            // Register the name before deriving edges so `#self` sees itself.
            self.rewire(id);
            for waiting in self.waiting.remove(&name).unwrap_or_default() {
                if let Some(node) = self.nodes.get_mut(&waiting) {
                    node.orphaned_by = None;
                }
                self.rewire(waiting);
                touched.insert(waiting);
            }
        } else {
            self.rewire(id);
        }

        debug!(node = %id, rewired = touched.len() - 1, "inserted value node");
        let cycle = self.check_cycle(id);
        Ok(Mutation { node: id, touched, cycle })
    }

    /// Replace a node's payload. With `expected_version`, the write is
    /// rejected with `Conflict` unless it matches the node's current version.
    ///
    /// The node goes `stale` (or `pending` if never evaluated) and its edges
    /// are re-derived. If it was part of a cycle that this write breaks, the
    /// other former members go back to `pending`.
    pub fn set_payload(
        &mut self,
        id: NodeId,
        payload: Payload,
        expected_version: Option<u64>,
    ) -> Result<Mutation> {
        let node = self.nodes.get(&id).ok_or_else(|| Error::NotFound(format!("node {id}")))?;
        if let Some(expected) = expected_version {
            if node.version != expected {
                warn!(node = %id, expected, actual = node.version, "version conflict");
                return Err(Error::Conflict { node: id, expected, actual: node.version });
            }
        }
        let former = node.cycle.as_ref().map(|c| c.members.clone()).unwrap_or_default();
        let ast = self.check_payload(&payload, Some(id))?;

        if let Some(node) = self.nodes.get_mut(&id) {
            node.payload = payload;
            node.ast = ast;
            node.orphaned_by = None;
            node.version += 1;
            if node.is_circular() {
                node.mark_pending();
            } else {
                node.mark_stale();
            }
        }
        self.rewire(id);

        let cycle = self.check_cycle(id);
        let mut touched = BTreeSet::from([id]);
        touched.extend(self.recheck_former_members(&former, id));
        debug!(node = %id, circular = cycle.is_some(), "payload updated");
        Ok(Mutation { node: id, touched, cycle })
    }

    /// Delete a node according to `policy`.
    pub fn remove(&mut self, id: NodeId, policy: DeletePolicy) -> Result<Removal> {
        if !self.contains(id) {
            return Err(Error::NotFound(format!("node {id}")));
        }
        let dependents: Vec<NodeId> = self
            .dependents_of(id)
            .into_iter()
            .filter(|d| *d != id)
            .collect();
        if policy == DeletePolicy::Reject && !dependents.is_empty() {
            let list: Vec<String> = dependents.iter().map(|d| d.to_string()).collect();
            return Err(Error::ConstraintViolation(format!(
                "node {id} is referenced by node(s) {}",
                list.join(", ")
            )));
        }

        let Some(removed) = self.nodes.remove(&id) else {
            return Err(Error::NotFound(format!("node {id}")));
        };
        for dep in self.dependencies.remove(&id).unwrap_or_default() {
            if let Some(set) = self.dependents.get_mut(&dep) {
                set.remove(&id);
            }
        }
        self.unwait(id);
        self.dependents.remove(&id);
        if let Some(name) = &removed.name {
            self.names.remove(name);
        }

        let former = removed.cycle.as_ref().map(|c| c.members.clone()).unwrap_or_default();
        let released = self.recheck_former_members(&former, id);

        let message = format!("Dependency {} (node {id}) was deleted", removed.label());
        let now = chrono::Utc::now();
        let mut orphaned = Vec::new();
        for dep in dependents {
            self.rewire(dep);
            if let Some(node) = self.nodes.get_mut(&dep) {
                if !node.is_circular() {
                    node.set_error(ErrorKind::UnresolvedReference, message.clone(), now);
                    node.orphaned_by = Some(message.clone());
                    orphaned.push(dep);
                }
            }
        }
        if !orphaned.is_empty() {
            warn!(node = %id, orphaned = orphaned.len(), "cascaded delete into dependents");
        }
        debug!(node = %id, "removed value node");
        Ok(Removal { removed, orphaned, released })
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// A cycle through `from`, if one exists, starting at its smallest id.
    pub fn detect_cycle(&self, from: NodeId) -> Option<Vec<NodeId>> {
        topology::find_cycle(self, from)
    }

    /// Dependencies-first order of `subset`, circular nodes excluded.
    pub fn topological_order(&self, subset: &[NodeId]) -> Result<Vec<NodeId>> {
        topology::topological_order(self, subset)
    }

    /// Split a topological order into mutually independent levels.
    pub fn levels(&self, order: &[NodeId]) -> Vec<Vec<NodeId>> {
        topology::levels(self, order)
    }

    /// `roots` plus everything downstream of them. Circular nodes are walked
    /// through but left out, so a node fed by a cycle is still reached.
    pub fn transitive_dependents(&self, roots: impl IntoIterator<Item = NodeId>) -> BTreeSet<NodeId> {
        let mut seen = BTreeSet::new();
        let mut stack: Vec<NodeId> = roots.into_iter().collect();
        while let Some(id) = stack.pop() {
            if !self.nodes.contains_key(&id) || !seen.insert(id) {
                continue;
            }
            if let Some(dependents) = self.dependents.get(&id) {
                stack.extend(dependents.iter().copied());
            }
        }
        seen.retain(|id| self.nodes.get(id).is_some_and(|n| !n.is_circular()));
        seen
    }

    /// Upstream nodes of `id` that are `pending` or `stale`, following only
    /// such nodes. Evaluating these first lets `id` see current inputs.
    pub fn unevaluated_dependencies(&self, id: NodeId) -> BTreeSet<NodeId> {
        let mut seen = BTreeSet::new();
        let mut stack: Vec<NodeId> = self.dependency_slice(id).to_vec();
        while let Some(dep) = stack.pop() {
            let Some(node) = self.nodes.get(&dep) else { continue };
            if !node.status().needs_evaluation() || !seen.insert(dep) {
                continue;
            }
            stack.extend(self.dependency_slice(dep).iter().copied());
        }
        seen.remove(&id);
        seen
    }

    /// The dependency tree below `id`, cut off at `max_depth`.
    pub fn dependency_tree(&self, id: NodeId, max_depth: usize) -> Result<DependencyTree> {
        tree::build(self, id, max_depth)
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn check_name(&self, name: &str) -> Result<()> {
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(Error::ConstraintViolation(format!(
                "node name '{name}' must be a non-empty identifier of letters, digits and '_'"
            )));
        }
        if self.reserved.contains(name) {
            return Err(Error::ConstraintViolation(format!(
                "node name '{name}' would shadow a system constant"
            )));
        }
        if self.names.contains_key(name) {
            return Err(Error::ConstraintViolation(format!("node name '{name}' is already taken")));
        }
        Ok(())
    }

    /// Validate a payload and parse it if it is an expression.
    fn check_payload(&self, payload: &Payload, owner: Option<NodeId>) -> Result<Option<Arc<Expr>>> {
        match payload {
            Payload::Literal { value, .. } => {
                if !value.is_finite() {
                    return Err(Error::ConstraintViolation(format!(
                        "literal value must be finite, got {value}"
                    )));
                }
                Ok(None)
            }
            Payload::Expression { source } => Ok(Some(Arc::new(formula::parse(source)?))),
            Payload::Reference { target } => {
                if Some(*target) != owner && !self.contains(*target) {
                    return Err(Error::NotFound(format!("reference target node {target}")));
                }
                Ok(None)
            }
            Payload::TableLookup => Ok(None),
        }
    }

    /// Recompute `id`'s outgoing edges and waiting entries from its payload.
    fn rewire(&mut self, id: NodeId) {
        let Some(node) = self.nodes.get(&id) else { return };
        let (deps, heads) = self.derive_edges(node);

        if let Some(old) = self.dependencies.remove(&id) {
            for d in old {
                if let Some(set) = self.dependents.get_mut(&d) {
                    set.remove(&id);
                }
            }
        }
        self.unwait(id);

        for d in &deps {
            self.dependents.entry(*d).or_default().insert(id);
        }
        for h in &heads {
            self.waiting.entry(h.clone()).or_default().insert(id);
        }
        if !deps.is_empty() {
            self.dependencies.insert(id, deps);
        }
        if !heads.is_empty() {
            self.waiting_on.insert(id, heads);
        }
    }

    fn derive_edges(&self, node: &ValueNode) -> (SmallVec<[NodeId; 4]>, SmallVec<[String; 2]>) {
        let mut deps: SmallVec<[NodeId; 4]> = SmallVec::new();
        let mut heads: SmallVec<[String; 2]> = SmallVec::new();
        match &node.payload {
            Payload::Reference { target } => {
                if self.nodes.contains_key(target) {
                    deps.push(*target);
                }
            }
            Payload::Expression { .. } => {
                for r in node.expression().map(|e| e.references()).unwrap_or_default() {
                    match self.names.get(&r.name) {
                        Some(target) if !deps.contains(target) => deps.push(*target),
                        Some(_) => {}
                        None if !heads.contains(&r.name) => heads.push(r.name.clone()),
                        None => {}
                    }
                }
            }
            Payload::Literal { .. } | Payload::TableLookup => {}
        }
        (deps, heads)
    }

    fn unwait(&mut self, id: NodeId) {
        for head in self.waiting_on.remove(&id).unwrap_or_default() {
            if let Some(set) = self.waiting.get_mut(&head) {
                set.remove(&id);
                if set.is_empty() {
                    self.waiting.remove(&head);
                }
            }
        }
    }

    /// Mark the knot around `id` circular if `id` now sits on a cycle.
    fn check_cycle(&mut self, id: NodeId) -> Option<Cycle> {
        let path = topology::find_cycle(self, id)?;
        let members = topology::knot_members(self, id);
        let cycle = Cycle { path, members };
        for m in &cycle.members {
            if let Some(node) = self.nodes.get_mut(m) {
                node.set_circular(cycle.clone());
            }
        }
        warn!(node = %id, cycle = %crate::model::format_path(&cycle.path), "circular dependency");
        Some(cycle)
    }

    /// After an edit to `edited`, re-examine the members of the knot it used
    /// to belong to. Members still on a cycle get their new knot; the rest go
    /// back to `pending` and are returned.
    fn recheck_former_members(&mut self, former: &[NodeId], edited: NodeId) -> Vec<NodeId> {
        let mut released = Vec::new();
        let mut settled: HashSet<NodeId> = HashSet::new();
        for &m in former {
            if m == edited || settled.contains(&m) || !self.contains(m) {
                continue;
            }
            if self.nodes.get(&m).and_then(|n| n.cycle.as_ref()).is_some_and(|c| c.members.contains(&edited)) {
                if let Some(cycle) = self.check_cycle(m) {
                    settled.extend(cycle.members.iter().copied());
                    continue;
                }
            } else {
                // Already re-marked as part of a new knot.
                settled.insert(m);
                continue;
            }
            if let Some(node) = self.nodes.get_mut(&m) {
                node.mark_pending();
            }
            settled.insert(m);
            released.push(m);
        }
        released
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ComputationStatus;

    fn lit(g: &mut DependencyGraph, name: &str, v: f64) -> NodeId {
        g.insert(Some(name.into()), None, Payload::literal(v, None)).unwrap().node
    }

    fn expr(g: &mut DependencyGraph, name: &str, src: &str) -> NodeId {
        g.insert(Some(name.into()), None, Payload::expression(src)).unwrap().node
    }

    #[test]
    fn test_edges_from_expression() {
        let mut g = DependencyGraph::new();
        let a = lit(&mut g, "a", 1.0);
        let b = lit(&mut g, "b", 2.0);
        let c = expr(&mut g, "c", "#b + #a * #b");
        assert_eq!(g.dependencies_of(c), vec![b, a]);
        assert_eq!(g.dependents_of(a), vec![c]);
        assert_eq!(g.dependents_of(b), vec![c]);
        assert!(g.dependencies_of(a).is_empty());
    }

    #[test]
    fn test_reference_edge() {
        let mut g = DependencyGraph::new();
        let a = lit(&mut g, "a", 1.0);
        let r = g.insert(None, None, Payload::reference(a)).unwrap().node;
        assert_eq!(g.dependencies_of(r), vec![a]);
        let missing = g.insert(None, None, Payload::reference(NodeId(99)));
        assert!(matches!(missing, Err(Error::NotFound(_))));
    }

    #[test]
    fn test_name_rules() {
        let mut g = DependencyGraph::with_reserved_names(["pi", "e"]);
        lit(&mut g, "mass", 1.0);
        let dup = g.insert(Some("mass".into()), None, Payload::literal(2.0, None));
        assert!(matches!(dup, Err(Error::ConstraintViolation(_))));
        let shadow = g.insert(Some("pi".into()), None, Payload::literal(3.0, None));
        assert!(matches!(shadow, Err(Error::ConstraintViolation(_))));
        let bad = g.insert(Some("my mass".into()), None, Payload::literal(3.0, None));
        assert!(matches!(bad, Err(Error::ConstraintViolation(_))));
        assert_eq!(g.len(), 1);
    }

    #[test]
    fn test_parse_error_prevents_insert() {
        let mut g = DependencyGraph::new();
        let err = g.insert(None, None, Payload::expression("#a + (")).unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
        assert!(g.is_empty());
    }

    #[test]
    fn test_waiting_rewired_on_insert() {
        let mut g = DependencyGraph::new();
        let total = expr(&mut g, "total", "#later * 2");
        assert!(g.dependencies_of(total).is_empty());
        assert_eq!(g.waiting_on("later"), vec![total]);

        let m = g.insert(Some("later".into()), None, Payload::literal(4.0, None)).unwrap();
        assert!(m.touched.contains(&total));
        assert_eq!(g.dependencies_of(total), vec![m.node]);
        assert!(g.waiting_on("later").is_empty());
    }

    #[test]
    fn test_self_reference_is_circular() {
        let mut g = DependencyGraph::new();
        let m = g.insert(Some("me".into()), None, Payload::expression("#me + 1")).unwrap();
        let cycle = m.cycle.unwrap();
        assert_eq!(cycle.path, vec![m.node]);
        assert_eq!(g.node(m.node).unwrap().status(), ComputationStatus::Circular);
    }

    #[test]
    fn test_cycle_marks_all_members_with_same_path() {
        let mut g = DependencyGraph::new();
        let a = lit(&mut g, "a", 1.0);
        let b = expr(&mut g, "b", "#a + 1");
        let c = expr(&mut g, "c", "#b + 1");
        let m = g.set_payload(a, Payload::expression("#c + 1"), None).unwrap();
        let cycle = m.cycle.unwrap();
        assert_eq!(cycle.path, vec![a, c, b]);
        assert_eq!(cycle.members, vec![a, b, c]);
        for id in [a, b, c] {
            let node = g.node(id).unwrap();
            assert_eq!(node.status(), ComputationStatus::Circular);
            assert_eq!(node.cycle.as_ref().unwrap().path, cycle.path);
        }
    }

    #[test]
    fn test_breaking_cycle_releases_members() {
        let mut g = DependencyGraph::new();
        let a = expr(&mut g, "a", "#b + 1");
        let b = expr(&mut g, "b", "#a + 1");
        assert!(g.node(a).unwrap().is_circular());

        let m = g.set_payload(a, Payload::literal(3.0, None), None).unwrap();
        assert!(m.cycle.is_none());
        assert_eq!(m.touched, BTreeSet::from([a, b]));
        assert_eq!(g.node(a).unwrap().status(), ComputationStatus::Pending);
        assert_eq!(g.node(b).unwrap().status(), ComputationStatus::Pending);
    }

    #[test]
    fn test_partial_break_keeps_inner_cycle() {
        // a ⇄ b and b ⇄ c form one knot; cutting a leaves b ⇄ c.
        let mut g = DependencyGraph::new();
        let a = expr(&mut g, "a", "#b");
        let b = expr(&mut g, "b", "#a + #c");
        let c = expr(&mut g, "c", "#b");
        assert_eq!(g.node(a).unwrap().cycle.as_ref().unwrap().members, vec![a, b, c]);

        let m = g.set_payload(a, Payload::literal(1.0, None), None).unwrap();
        assert_eq!(m.touched, BTreeSet::from([a]));
        assert_eq!(g.node(a).unwrap().status(), ComputationStatus::Pending);
        assert_eq!(g.node(b).unwrap().cycle.as_ref().unwrap().members, vec![b, c]);
        assert!(g.node(c).unwrap().is_circular());
    }

    #[test]
    fn test_version_conflict() {
        let mut g = DependencyGraph::new();
        let a = lit(&mut g, "a", 1.0);
        g.set_payload(a, Payload::literal(2.0, None), Some(1)).unwrap();
        assert_eq!(g.node(a).unwrap().version, 2);
        let err = g.set_payload(a, Payload::literal(3.0, None), Some(1)).unwrap_err();
        assert!(matches!(err, Error::Conflict { expected: 1, actual: 2, .. }));
        assert_eq!(g.node(a).unwrap().payload, Payload::literal(2.0, None));
    }

    #[test]
    fn test_failed_parse_keeps_previous_payload() {
        let mut g = DependencyGraph::new();
        let a = expr(&mut g, "a", "1 + 1");
        assert!(g.set_payload(a, Payload::expression("1 +"), None).is_err());
        assert_eq!(g.node(a).unwrap().payload, Payload::expression("1 + 1"));
        assert_eq!(g.node(a).unwrap().version, 1);
    }

    #[test]
    fn test_remove_reject_and_cascade() {
        let mut g = DependencyGraph::new();
        let a = lit(&mut g, "a", 1.0);
        let b = expr(&mut g, "b", "#a * 2");
        let c = expr(&mut g, "c", "#b * 2");

        let err = g.remove(a, DeletePolicy::Reject).unwrap_err();
        assert!(matches!(err, Error::ConstraintViolation(_)));
        assert!(g.contains(a));

        let removal = g.remove(a, DeletePolicy::Cascade).unwrap();
        assert_eq!(removal.orphaned, vec![b]);
        let node = g.node(b).unwrap();
        assert_eq!(node.status(), ComputationStatus::Error);
        assert!(node.computation_error.as_ref().unwrap().contains(&a.to_string()));
        assert!(g.dependencies_of(b).is_empty());
        assert_eq!(g.waiting_on("a"), vec![b]);
        assert_eq!(g.dependencies_of(c), vec![b]);
        assert!(g.node(b).unwrap().orphaned_by.is_some());

        // Rebinding the name clears the deletion marker.
        lit(&mut g, "a", 2.0);
        assert!(g.node(b).unwrap().orphaned_by.is_none());
        assert_eq!(g.dependencies_of(b).len(), 1);
    }

    #[test]
    fn test_remove_leaf_is_clean() {
        let mut g = DependencyGraph::new();
        let a = lit(&mut g, "a", 1.0);
        let b = expr(&mut g, "b", "#a * 2");
        g.remove(b, DeletePolicy::Reject).unwrap();
        assert!(g.dependents_of(a).is_empty());
        assert!(g.id_by_name("b").is_none());
        assert!(g.remove(b, DeletePolicy::Reject).is_err());
    }

    #[test]
    fn test_transitive_dependents_skip_circular() {
        let mut g = DependencyGraph::new();
        let a = lit(&mut g, "a", 1.0);
        let b = expr(&mut g, "b", "#a + #c");
        expr(&mut g, "c", "#b");
        let d = expr(&mut g, "d", "#a * 2");
        let e = expr(&mut g, "e", "#d * 2");
        assert!(g.node(b).unwrap().is_circular());
        assert_eq!(g.transitive_dependents([a]), BTreeSet::from([a, d, e]));
    }

    #[test]
    fn test_transitive_dependents_walk_through_cycle() {
        let mut g = DependencyGraph::new();
        let a = lit(&mut g, "a", 1.0);
        let d = expr(&mut g, "d", "#a * 2");
        let b = expr(&mut g, "b", "#a + 1");
        let e = expr(&mut g, "e", "#b * 3");
        g.set_payload(a, Payload::expression("#b + 1"), None).unwrap();
        assert!(g.node(a).unwrap().is_circular());
        assert!(g.node(b).unwrap().is_circular());
        assert_eq!(g.transitive_dependents([a]), BTreeSet::from([d, e]));
    }

    #[test]
    fn test_unevaluated_dependencies() {
        let mut g = DependencyGraph::new();
        let a = lit(&mut g, "a", 1.0);
        let b = expr(&mut g, "b", "#a * 2");
        let c = expr(&mut g, "c", "#b * 2");
        assert_eq!(g.unevaluated_dependencies(c), BTreeSet::from([a, b]));
        assert!(g.unevaluated_dependencies(a).is_empty());
    }
}
