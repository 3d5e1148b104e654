//! Unit algebra: dimension vectors, the unit registry, computed unit symbols.

pub mod dimension;
pub mod registry;
pub mod symbol;

pub use dimension::{dimensions_equal, BaseDimension, Dimensions, DIMENSION_COUNT};
pub use registry::{Unit, UnitConversion, UnitId, UnitRegistry};
pub use symbol::{ComputedUnit, Quantity, DIMENSIONLESS_SYMBOL};
