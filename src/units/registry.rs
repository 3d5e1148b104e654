//! Unit registry: registered units and the affine conversions between them.
//!
//! Conversions are stored one way (`from → to`); the reverse direction is the
//! algebraic inverse. When no direct conversion exists the registry searches
//! the conversion graph breadth-first and composes transforms along the
//! shortest path, so `°F → K` works through `°F → °C → K`.

use std::collections::VecDeque;
use std::fmt;

use hashbrown::{HashMap, HashSet};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::dimension::{BaseDimension, Dimensions};
use super::symbol::{ComputedUnit, DIMENSIONLESS_SYMBOL};
use crate::{Error, Result};

/// Registered unit identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitId(pub u32);

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unit:{}", self.0)
    }
}

/// A registered unit. Immutable once registered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unit {
    pub id: UnitId,
    pub symbol: String,
    pub name: String,
    pub dimensions: Dimensions,
    pub is_base: bool,
}

/// `value_to = value_from * multiplier + offset`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UnitConversion {
    pub from: UnitId,
    pub to: UnitId,
    pub multiplier: f64,
    pub offset: f64,
}

impl UnitConversion {
    pub fn apply(&self, value: f64) -> f64 {
        value * self.multiplier + self.offset
    }

    /// The reverse direction: `(value - offset) / multiplier`.
    pub fn invert(&self, value: f64) -> f64 {
        (value - self.offset) / self.multiplier
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Affine {
    multiplier: f64,
    offset: f64,
}

impl Affine {
    const IDENTITY: Affine = Affine { multiplier: 1.0, offset: 0.0 };

    /// `next ∘ self`.
    fn then(self, next: Affine) -> Affine {
        Affine {
            multiplier: next.multiplier * self.multiplier,
            offset: next.multiplier * self.offset + next.offset,
        }
    }

    fn inverse(self) -> Affine {
        Affine {
            multiplier: 1.0 / self.multiplier,
            offset: -self.offset / self.multiplier,
        }
    }
}

// ============================================================================
// Registry
// ============================================================================

/// All known units, indexed by id and symbol.
#[derive(Debug, Clone)]
pub struct UnitRegistry {
    units: Vec<Unit>,
    by_symbol: HashMap<String, UnitId>,
    conversions: HashMap<(UnitId, UnitId), UnitConversion>,
    adjacency: HashMap<UnitId, SmallVec<[UnitId; 4]>>,
    /// Units that are their own coherent SI unit: `1`, base and derived units.
    coherent: HashSet<UnitId>,
}

impl Default for UnitRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl UnitRegistry {
    /// An empty registry holding only the dimensionless unit `1`.
    pub fn new() -> Self {
        let mut registry = Self {
            units: Vec::new(),
            by_symbol: HashMap::new(),
            conversions: HashMap::new(),
            adjacency: HashMap::new(),
            coherent: HashSet::from([UnitId(0)]),
        };
        registry.units.push(Unit {
            id: UnitId(0),
            symbol: DIMENSIONLESS_SYMBOL.to_string(),
            name: "dimensionless".to_string(),
            dimensions: Dimensions::DIMENSIONLESS,
            is_base: true,
        });
        registry.by_symbol.insert(DIMENSIONLESS_SYMBOL.to_string(), UnitId(0));
        registry
    }

    /// SI base units plus the derived and scaled units engineers use daily.
    pub fn with_si_defaults() -> Self {
        let mut r = Self::new();
        r.install_si_defaults()
            .unwrap_or_else(|e| unreachable!("built-in unit table is consistent: {e}"));
        r
    }

    fn install_si_defaults(&mut self) -> Result<()> {
        use BaseDimension::*;

        let base = [
            ("m", "metre", Length),
            ("kg", "kilogram", Mass),
            ("s", "second", Time),
            ("A", "ampere", Current),
            ("K", "kelvin", Temperature),
            ("mol", "mole", Amount),
            ("cd", "candela", Luminosity),
        ];
        for (symbol, name, dim) in base {
            self.register(symbol, name, Dimensions::base(dim), true)?;
        }

        let derived = [
            ("N", "newton", [1, 1, -2, 0, 0, 0, 0]),
            ("Pa", "pascal", [-1, 1, -2, 0, 0, 0, 0]),
            ("J", "joule", [2, 1, -2, 0, 0, 0, 0]),
            ("W", "watt", [2, 1, -3, 0, 0, 0, 0]),
            ("Hz", "hertz", [0, 0, -1, 0, 0, 0, 0]),
            ("C", "coulomb", [0, 0, 1, 1, 0, 0, 0]),
            ("V", "volt", [2, 1, -3, -1, 0, 0, 0]),
            ("Ω", "ohm", [2, 1, -3, -2, 0, 0, 0]),
        ];
        for (symbol, name, exps) in derived {
            let id = self.register(symbol, name, Dimensions::new(exps), false)?;
            self.coherent.insert(id);
        }

        // (symbol, name, base symbol, multiplier, offset)
        let scaled: [(&str, &str, &str, f64, f64); 16] = [
            ("%", "percent", "1", 0.01, 0.0),
            ("mm", "millimetre", "m", 1e-3, 0.0),
            ("cm", "centimetre", "m", 1e-2, 0.0),
            ("km", "kilometre", "m", 1e3, 0.0),
            ("g", "gram", "kg", 1e-3, 0.0),
            ("t", "tonne", "kg", 1e3, 0.0),
            ("min", "minute", "s", 60.0, 0.0),
            ("h", "hour", "s", 3600.0, 0.0),
            ("kPa", "kilopascal", "Pa", 1e3, 0.0),
            ("MPa", "megapascal", "Pa", 1e6, 0.0),
            ("bar", "bar", "Pa", 1e5, 0.0),
            ("kN", "kilonewton", "N", 1e3, 0.0),
            ("kW", "kilowatt", "W", 1e3, 0.0),
            ("°C", "degree Celsius", "K", 1.0, 273.15),
            ("°F", "degree Fahrenheit", "°C", 5.0 / 9.0, -160.0 / 9.0),
            ("ms", "millisecond", "s", 1e-3, 0.0),
        ];
        for (symbol, name, target, multiplier, offset) in scaled {
            let to = self.require_symbol(target)?;
            let dims = to.dimensions;
            let to_id = to.id;
            let from_id = self.register(symbol, name, dims, false)?;
            self.register_conversion(from_id, to_id, multiplier, offset)?;
        }
        Ok(())
    }

    /// Register a new unit. Symbols are unique.
    pub fn register(
        &mut self,
        symbol: &str,
        name: &str,
        dimensions: Dimensions,
        is_base: bool,
    ) -> Result<UnitId> {
        let symbol = symbol.trim();
        if symbol.is_empty() {
            return Err(Error::ConstraintViolation("unit symbol must not be empty".into()));
        }
        if self.by_symbol.contains_key(symbol) {
            return Err(Error::ConstraintViolation(format!(
                "unit symbol '{symbol}' is already registered"
            )));
        }
        let id = UnitId(self.units.len() as u32);
        self.units.push(Unit {
            id,
            symbol: symbol.to_string(),
            name: name.to_string(),
            dimensions,
            is_base,
        });
        self.by_symbol.insert(symbol.to_string(), id);
        if is_base {
            self.coherent.insert(id);
        }
        Ok(id)
    }

    /// Register `to = from * multiplier + offset`.
    pub fn register_conversion(
        &mut self,
        from: UnitId,
        to: UnitId,
        multiplier: f64,
        offset: f64,
    ) -> Result<()> {
        let from_unit = self.unit_or_err(from)?;
        let to_unit = self.unit_or_err(to)?;
        if from == to {
            return Err(Error::ConstraintViolation(format!(
                "conversion from '{}' to itself",
                from_unit.symbol
            )));
        }
        if from_unit.dimensions != to_unit.dimensions {
            return Err(Error::ConstraintViolation(format!(
                "conversion '{}' → '{}' joins different dimensions ({} vs {})",
                from_unit.symbol, to_unit.symbol, from_unit.dimensions, to_unit.dimensions
            )));
        }
        if !multiplier.is_finite() || multiplier == 0.0 || !offset.is_finite() {
            return Err(Error::ConstraintViolation(format!(
                "conversion '{}' → '{}' needs a finite, non-zero multiplier and finite offset",
                from_unit.symbol, to_unit.symbol
            )));
        }
        if offset != 0.0 && !from_unit.dimensions.is_temperature() {
            return Err(Error::ConstraintViolation(format!(
                "offset conversions are only allowed for temperature, not '{}'",
                from_unit.symbol
            )));
        }
        if self.conversions.contains_key(&(to, from)) || self.conversions.contains_key(&(from, to)) {
            return Err(Error::ConstraintViolation(format!(
                "conversion between '{}' and '{}' is already registered",
                from_unit.symbol, to_unit.symbol
            )));
        }
        self.conversions.insert((from, to), UnitConversion { from, to, multiplier, offset });
        self.adjacency.entry(from).or_default().push(to);
        self.adjacency.entry(to).or_default().push(from);
        Ok(())
    }

    pub fn get(&self, id: UnitId) -> Option<&Unit> {
        self.units.get(id.0 as usize)
    }

    pub fn by_symbol(&self, symbol: &str) -> Option<&Unit> {
        self.by_symbol.get(symbol).and_then(|id| self.get(*id))
    }

    /// The dimensionless unit `1`.
    pub fn dimensionless(&self) -> &Unit {
        &self.units[0]
    }

    pub fn units(&self) -> impl Iterator<Item = &Unit> {
        self.units.iter()
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// The directly registered conversion, if any (not its inverse).
    pub fn conversion(&self, from: UnitId, to: UnitId) -> Option<&UnitConversion> {
        self.conversions.get(&(from, to))
    }

    /// Convert `value` from one unit to another.
    pub fn convert(&self, value: f64, from: UnitId, to: UnitId) -> Result<f64> {
        let transform = self.transform(from, to)?;
        Ok(value * transform.multiplier + transform.offset)
    }

    /// Convert between units named by symbol.
    pub fn convert_symbols(&self, value: f64, from: &str, to: &str) -> Result<f64> {
        let from = self
            .by_symbol(from)
            .ok_or_else(|| Error::UnitConversion(format!("unknown unit '{from}'")))?
            .id;
        let to = self
            .by_symbol(to)
            .ok_or_else(|| Error::UnitConversion(format!("unknown unit '{to}'")))?
            .id;
        self.convert(value, from, to)
    }

    /// Multiplier taking a value in `symbol` to the coherent SI unit of the
    /// same dimensions: `km` → 1000, `kPa` → 1000, `N` → 1. Offsets are
    /// dropped, so `°C` and `°F` scale as temperature differences.
    pub fn coherent_scale(&self, symbol: &str) -> Result<f64> {
        let unit = self
            .by_symbol(symbol)
            .ok_or_else(|| Error::UnitConversion(format!("unknown unit '{symbol}'")))?;
        if self.coherent.contains(&unit.id) {
            return Ok(1.0);
        }
        let target = self.nearest_coherent(unit.id).ok_or_else(|| {
            Error::UnitConversion(format!("no conversion from '{symbol}' to a coherent SI unit"))
        })?;
        Ok(self.transform(unit.id, target)?.multiplier)
    }

    /// Convert between computed units of equal dimensions.
    ///
    /// Two registered units convert through the registry, offsets included
    /// (`°F` → `K`). Anything else converts term by term through coherent SI:
    /// `kg·m/s²` → `N`, `km/m` → `1`.
    pub fn convert_computed(&self, value: f64, from: &ComputedUnit, to: &ComputedUnit) -> Result<f64> {
        if from == to {
            return Ok(value);
        }
        if from.dimensions != to.dimensions {
            return Err(Error::UnitConversion(format!(
                "cannot convert '{from}' ({}) to '{to}' ({}): dimensions differ",
                from.dimensions, to.dimensions
            )));
        }
        if let (Some(f), Some(t)) = (self.by_symbol(&from.symbol()), self.by_symbol(&to.symbol())) {
            if let Ok(transform) = self.transform(f.id, t.id) {
                return Ok(value * transform.multiplier + transform.offset);
            }
        }
        Ok(value * self.computed_scale(from)? / self.computed_scale(to)?)
    }

    /// Product of the coherent scales of `unit`'s terms.
    fn computed_scale(&self, unit: &ComputedUnit) -> Result<f64> {
        unit.terms().try_fold(1.0, |acc: f64, (symbol, exp)| -> Result<f64> {
            Ok(acc * self.coherent_scale(symbol)?.powi(exp))
        })
    }

    fn nearest_coherent(&self, from: UnitId) -> Option<UnitId> {
        let mut seen: HashSet<UnitId> = HashSet::from([from]);
        let mut queue: VecDeque<UnitId> = VecDeque::from([from]);
        while let Some(current) = queue.pop_front() {
            for &next in self.adjacency.get(&current).map(|n| n.as_slice()).unwrap_or(&[]) {
                if self.coherent.contains(&next) {
                    return Some(next);
                }
                if seen.insert(next) {
                    queue.push_back(next);
                }
            }
        }
        None
    }

    fn transform(&self, from: UnitId, to: UnitId) -> Result<Affine> {
        let from_unit = self
            .get(from)
            .ok_or_else(|| Error::UnitConversion(format!("unknown unit {from}")))?;
        let to_unit = self
            .get(to)
            .ok_or_else(|| Error::UnitConversion(format!("unknown unit {to}")))?;
        if from_unit.dimensions != to_unit.dimensions {
            return Err(Error::UnitConversion(format!(
                "cannot convert '{}' ({}) to '{}' ({}): dimensions differ",
                from_unit.symbol, from_unit.dimensions, to_unit.symbol, to_unit.dimensions
            )));
        }
        if from == to {
            return Ok(Affine::IDENTITY);
        }

        // BFS over the undirected conversion graph, carrying the composed
        // transform from `from` to each visited unit.
        let mut seen: HashSet<UnitId> = HashSet::new();
        let mut queue: VecDeque<(UnitId, Affine)> = VecDeque::new();
        seen.insert(from);
        queue.push_back((from, Affine::IDENTITY));
        while let Some((current, acc)) = queue.pop_front() {
            let Some(neighbours) = self.adjacency.get(&current) else {
                continue;
            };
            for &next in neighbours {
                if !seen.insert(next) {
                    continue;
                }
                let step = self.edge(current, next);
                let composed = acc.then(step);
                if next == to {
                    return Ok(composed);
                }
                queue.push_back((next, composed));
            }
        }

        Err(Error::UnitConversion(format!(
            "no conversion path from '{}' to '{}'",
            from_unit.symbol, to_unit.symbol
        )))
    }

    fn edge(&self, a: UnitId, b: UnitId) -> Affine {
        if let Some(c) = self.conversions.get(&(a, b)) {
            Affine { multiplier: c.multiplier, offset: c.offset }
        } else if let Some(c) = self.conversions.get(&(b, a)) {
            Affine { multiplier: c.multiplier, offset: c.offset }.inverse()
        } else {
            Affine::IDENTITY
        }
    }

    fn unit_or_err(&self, id: UnitId) -> Result<&Unit> {
        self.get(id).ok_or_else(|| Error::NotFound(format!("unit {id}")))
    }

    fn require_symbol(&self, symbol: &str) -> Result<&Unit> {
        self.by_symbol(symbol)
            .ok_or_else(|| Error::NotFound(format!("unit '{symbol}'")))
    }
}
