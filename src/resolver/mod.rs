//! # Reference Resolution
//!
//! Maps a `#token` to exactly one source, checked in this order:
//!
//! 1. a value node with that name (`#mass`)
//! 2. a system constant (`#pi`)
//! 3. a component property (`#motor.mass`)
//!
//! Resolution is lookup and typing only. An unknown token is an error that
//! names the token; it never defaults to zero.

pub mod constants;
pub mod properties;

pub use constants::{Constant, ConstantRegistry};
pub use properties::{ComponentProperty, PropertySnapshot, PropertySource};

use crate::formula::Reference;
use crate::graph::DependencyGraph;
use crate::model::NodeId;
use crate::units::Quantity;
use crate::{Error, Result};

/// Field name that reads a node's own value (`#mass.value` == `#mass`).
pub const VALUE_FIELD: &str = "value";

/// What a reference token points at.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedSource {
    Node(NodeId),
    ComponentProperty { component: String, property: String, quantity: Quantity },
    Constant { symbol: String, quantity: Quantity },
}

/// Resolves tokens against one graph, constant table and property snapshot.
#[derive(Clone, Copy)]
pub struct ReferenceResolver<'a> {
    graph: &'a DependencyGraph,
    constants: &'a ConstantRegistry,
    properties: &'a PropertySnapshot,
}

impl<'a> ReferenceResolver<'a> {
    pub fn new(
        graph: &'a DependencyGraph,
        constants: &'a ConstantRegistry,
        properties: &'a PropertySnapshot,
    ) -> Self {
        Self { graph, constants, properties }
    }

    /// Resolve a raw token (`mass`, `#mass`, `motor.mass`).
    pub fn resolve_token(&self, token: &str) -> Result<ResolvedSource> {
        self.resolve(&Reference::parse(token))
    }

    pub fn resolve(&self, reference: &Reference) -> Result<ResolvedSource> {
        let field = reference.field.as_deref();

        if let Some(id) = self.graph.id_by_name(&reference.name) {
            return match field {
                None | Some(VALUE_FIELD) => Ok(ResolvedSource::Node(id)),
                Some(other) => Err(unresolved(
                    reference,
                    format!("value node #{} has no field '{other}'", reference.name),
                )),
            };
        }

        if field.is_none() {
            if let Some(constant) = self.constants.get(&reference.name) {
                return Ok(ResolvedSource::Constant {
                    symbol: constant.symbol.clone(),
                    quantity: constant.quantity(),
                });
            }
            return Err(unresolved(
                reference,
                format!("no value node or system constant named '{}'", reference.name),
            ));
        }

        let property = field.unwrap_or_default();
        match self.properties.get(&reference.name, property) {
            Some(q) => Ok(ResolvedSource::ComponentProperty {
                component: reference.name.clone(),
                property: property.to_string(),
                quantity: q.clone(),
            }),
            None if self.properties.has_component(&reference.name) => Err(unresolved(
                reference,
                format!("component '{}' has no property '{property}'", reference.name),
            )),
            None => Err(unresolved(
                reference,
                format!("no value node or component named '{}'", reference.name),
            )),
        }
    }
}

fn unresolved(reference: &Reference, reason: String) -> Error {
    Error::UnresolvedReference { token: reference.token(), reason }
}
