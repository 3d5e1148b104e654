//! System constants (`#pi`, `#e`, configured extras).

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::config::ConstantConfig;
use crate::units::{ComputedUnit, Quantity, UnitRegistry};
use crate::{Error, Result};

/// A named constant with its unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constant {
    pub symbol: String,
    pub value: f64,
    pub unit: ComputedUnit,
    pub description: Option<String>,
}

impl Constant {
    pub fn quantity(&self) -> Quantity {
        Quantity::new(self.value, self.unit.clone())
    }
}

/// Immutable once a workspace is built; shared behind an `Arc`.
#[derive(Debug, Clone, Default)]
pub struct ConstantRegistry {
    constants: HashMap<String, Constant>,
}

impl ConstantRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `pi` and `e`, both dimensionless.
    pub fn with_defaults() -> Self {
        let mut constants = HashMap::new();
        for (symbol, value, description) in [
            ("pi", std::f64::consts::PI, "ratio of a circle's circumference to its diameter"),
            ("e", std::f64::consts::E, "Euler's number"),
        ] {
            constants.insert(
                symbol.to_string(),
                Constant {
                    symbol: symbol.to_string(),
                    value,
                    unit: ComputedUnit::dimensionless(),
                    description: Some(description.to_string()),
                },
            );
        }
        Self { constants }
    }

    /// Defaults plus the configured constants. Unit symbols must be registered.
    pub fn from_config(configured: &[ConstantConfig], units: &UnitRegistry) -> Result<Self> {
        let mut registry = Self::with_defaults();
        for c in configured {
            let unit = units.by_symbol(&c.unit).ok_or_else(|| {
                Error::Config(format!("constant '{}' uses unknown unit '{}'", c.symbol, c.unit))
            })?;
            registry
                .register(&c.symbol, c.value, ComputedUnit::from_unit(unit), c.description.clone())
                .map_err(|e| Error::Config(e.to_string()))?;
        }
        Ok(registry)
    }

    pub fn register(
        &mut self,
        symbol: &str,
        value: f64,
        unit: ComputedUnit,
        description: Option<String>,
    ) -> Result<()> {
        if symbol.is_empty() || !symbol.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(Error::ConstraintViolation(format!(
                "constant symbol '{symbol}' must be a plain identifier"
            )));
        }
        if !value.is_finite() {
            return Err(Error::ConstraintViolation(format!("constant '{symbol}' must be finite")));
        }
        if self.constants.contains_key(symbol) {
            return Err(Error::ConstraintViolation(format!(
                "constant '{symbol}' is already defined"
            )));
        }
        self.constants.insert(
            symbol.to_string(),
            Constant { symbol: symbol.to_string(), value, unit, description },
        );
        Ok(())
    }

    pub fn get(&self, symbol: &str) -> Option<&Constant> {
        self.constants.get(symbol)
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.constants.contains_key(symbol)
    }

    /// Symbols in ascending order.
    pub fn symbols(&self) -> Vec<&str> {
        let mut out: Vec<&str> = self.constants.keys().map(String::as_str).collect();
        out.sort_unstable();
        out
    }

    pub fn len(&self) -> usize {
        self.constants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constants.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let c = ConstantRegistry::with_defaults();
        assert_eq!(c.symbols(), vec!["e", "pi"]);
        assert!(c.get("pi").unwrap().unit.is_plain());
    }

    #[test]
    fn test_from_config() {
        let units = UnitRegistry::with_si_defaults();
        let cfg = vec![ConstantConfig {
            symbol: "g0".into(),
            value: 9.80665,
            unit: "m/s²".into(),
            description: None,
        }];
        // `m/s²` is not a registered unit symbol.
        assert!(matches!(ConstantRegistry::from_config(&cfg, &units), Err(Error::Config(_))));

        let cfg = vec![ConstantConfig {
            symbol: "atm".into(),
            value: 101_325.0,
            unit: "Pa".into(),
            description: Some("standard atmosphere".into()),
        }];
        let c = ConstantRegistry::from_config(&cfg, &units).unwrap();
        assert_eq!(c.get("atm").unwrap().quantity().unit_symbol(), "Pa");
        assert_eq!(c.len(), 3);
    }

    #[test]
    fn test_register_rules() {
        let mut c = ConstantRegistry::with_defaults();
        assert!(c.register("pi", 3.0, ComputedUnit::dimensionless(), None).is_err());
        assert!(c.register("bad name", 1.0, ComputedUnit::dimensionless(), None).is_err());
        assert!(c.register("inf", f64::INFINITY, ComputedUnit::dimensionless(), None).is_err());
        c.register("k_b", 1.380649e-23, ComputedUnit::dimensionless(), None).unwrap();
        assert!(c.contains("k_b"));
    }
}
