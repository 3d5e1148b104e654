//! # Value Graph Model
//!
//! Clean DTOs for value nodes and property formulas. These types cross every
//! boundary: graph ↔ evaluator ↔ workspace ↔ caller.
//!
//! This module is pure data: no I/O, no locks, no async.

pub mod node;
pub mod status;
pub mod formula;

pub use node::{NodeId, NodeType, Payload, ValueNode};
pub use status::{ComputationStatus, Cycle, ErrorKind, format_path};
pub use formula::{PropertyFormula, PropertyReference, ReferenceKind};
