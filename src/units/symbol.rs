//! Computed unit symbols and quantities.
//!
//! A [`ComputedUnit`] is what an evaluation produces: a dimension vector plus
//! a symbolic product of unit terms. `5 m * 3 s` yields the terms
//! `{m: 1, s: 1}` and renders as `m·s`; `kg·m/s²` is `{kg: 1, m: 1, s: -2}`.
//! Terms are kept in a `BTreeMap` so the rendered symbol is canonical
//! (alphabetical, numerator before denominator).

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::dimension::{parse_superscript, superscript, Dimensions};
use super::registry::Unit;

/// Symbol of the registry's dimensionless unit.
pub const DIMENSIONLESS_SYMBOL: &str = "1";

/// The unit attached to a computed value.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ComputedUnit {
    pub dimensions: Dimensions,
    terms: BTreeMap<String, i32>,
}

impl ComputedUnit {
    /// The plain dimensionless unit, rendered as `1`.
    pub fn dimensionless() -> Self {
        Self::default()
    }

    /// The computed unit for a registered unit.
    pub fn from_unit(unit: &Unit) -> Self {
        Self {
            dimensions: unit.dimensions,
            terms: parse_terms(&unit.symbol),
        }
    }

    /// Build from explicit parts. Zero-exponent terms are dropped.
    pub fn from_terms(dimensions: Dimensions, terms: impl IntoIterator<Item = (String, i32)>) -> Self {
        let mut out = Self { dimensions, terms: BTreeMap::new() };
        for (symbol, exp) in terms {
            out.add_term(symbol, exp);
        }
        out
    }

    pub fn multiply(&self, other: &ComputedUnit) -> ComputedUnit {
        let mut out = self.clone();
        out.dimensions = self.dimensions.multiply(&other.dimensions);
        for (symbol, exp) in &other.terms {
            out.add_term(symbol.clone(), *exp);
        }
        out
    }

    pub fn divide(&self, other: &ComputedUnit) -> ComputedUnit {
        let mut out = self.clone();
        out.dimensions = self.dimensions.divide(&other.dimensions);
        for (symbol, exp) in &other.terms {
            out.add_term(symbol.clone(), exp.saturating_neg());
        }
        out
    }

    pub fn powi(&self, n: i32) -> ComputedUnit {
        ComputedUnit::from_terms(
            self.dimensions.powi(n),
            self.terms.iter().map(|(s, e)| (s.clone(), e.saturating_mul(n))),
        )
    }

    pub fn is_dimensionless(&self) -> bool {
        self.dimensions.is_dimensionless()
    }

    /// True for the bare `1` unit: dimensionless and with no named terms
    /// (so `%` is dimensionless but not plain).
    pub fn is_plain(&self) -> bool {
        self.terms.is_empty() && self.dimensions.is_dimensionless()
    }

    pub fn terms(&self) -> impl Iterator<Item = (&str, i32)> {
        self.terms.iter().map(|(s, e)| (s.as_str(), *e))
    }

    /// Canonical symbol, e.g. `m·s`, `kg·m/s²`, `m/(kg·s)`, `1/s`, `1`.
    pub fn symbol(&self) -> String {
        let numerator: Vec<String> = self
            .terms
            .iter()
            .filter(|(_, e)| **e > 0)
            .map(|(s, e)| render_term(s, *e))
            .collect();
        let denominator: Vec<String> = self
            .terms
            .iter()
            .filter(|(_, e)| **e < 0)
            .map(|(s, e)| render_term(s, e.saturating_neg()))
            .collect();

        let num = if numerator.is_empty() {
            DIMENSIONLESS_SYMBOL.to_string()
        } else {
            numerator.join("·")
        };
        match denominator.len() {
            0 => num,
            1 => format!("{num}/{}", denominator[0]),
            _ => format!("{num}/({})", denominator.join("·")),
        }
    }

    fn add_term(&mut self, symbol: String, exp: i32) {
        if symbol == DIMENSIONLESS_SYMBOL || exp == 0 {
            return;
        }
        let slot = self.terms.entry(symbol).or_insert(0);
        *slot = slot.saturating_add(exp);
        if *slot == 0 {
            self.terms.retain(|_, e| *e != 0);
        }
    }
}

impl fmt::Display for ComputedUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.symbol())
    }
}

fn render_term(symbol: &str, exp: i32) -> String {
    if exp == 1 {
        symbol.to_string()
    } else {
        format!("{symbol}{}", superscript(exp))
    }
}

/// Split a unit symbol into its terms: `kg·m/s²` → `{kg: 1, m: 1, s: -2}`.
///
/// Understands `·` and `*` as product separators, one `/` (with an optional
/// parenthesized denominator), `^n` and superscript exponents. Anything that
/// doesn't fit is kept as a single opaque term (`°C`, `Ω`, `%`).
fn parse_terms(symbol: &str) -> BTreeMap<String, i32> {
    let mut terms = BTreeMap::new();
    if symbol == DIMENSIONLESS_SYMBOL || symbol.is_empty() {
        return terms;
    }
    let parsed = (|| {
        let (num, den) = match symbol.split_once('/') {
            Some((n, d)) => (n, Some(d)),
            None => (symbol, None),
        };
        let mut out: Vec<(String, i32)> = Vec::new();
        if num != DIMENSIONLESS_SYMBOL {
            for factor in split_product(num) {
                out.push(parse_factor(factor)?);
            }
        }
        if let Some(den) = den {
            let den = den
                .strip_prefix('(')
                .and_then(|d| d.strip_suffix(')'))
                .unwrap_or(den);
            for factor in split_product(den) {
                let (s, e) = parse_factor(factor)?;
                out.push((s, -e));
            }
        }
        Some(out)
    })();

    match parsed {
        Some(factors) if !factors.is_empty() => {
            for (s, e) in factors {
                *terms.entry(s).or_insert(0) += e;
            }
            terms.retain(|_, e| *e != 0);
        }
        _ => {
            terms.insert(symbol.to_string(), 1);
        }
    }
    terms
}

fn split_product(s: &str) -> impl Iterator<Item = &str> {
    s.split(['·', '*']).map(str::trim)
}

fn parse_factor(factor: &str) -> Option<(String, i32)> {
    if factor.is_empty() || factor.contains(['(', ')', '/']) {
        return None;
    }
    if let Some((base, exp)) = factor.split_once('^') {
        let exp: i32 = exp.trim().parse().ok()?;
        return (!base.is_empty()).then(|| (base.trim().to_string(), exp));
    }
    let split = factor
        .char_indices()
        .find(|(_, c)| "⁰¹²³⁴⁵⁶⁷⁸⁹⁻".contains(*c))
        .map(|(i, _)| i);
    match split {
        Some(0) => None,
        Some(i) => Some((factor[..i].to_string(), parse_superscript(&factor[i..])?)),
        None => Some((factor.to_string(), 1)),
    }
}

// ============================================================================
// Quantity
// ============================================================================

/// A value together with its unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quantity {
    pub value: f64,
    pub unit: ComputedUnit,
}

impl Quantity {
    pub fn new(value: f64, unit: ComputedUnit) -> Self {
        Self { value, unit }
    }

    pub fn dimensionless(value: f64) -> Self {
        Self { value, unit: ComputedUnit::dimensionless() }
    }

    pub fn unit_symbol(&self) -> String {
        self.unit.symbol()
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.unit.is_plain() {
            write!(f, "{}", self.value)
        } else {
            write!(f, "{} {}", self.value, self.unit)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::dimension::BaseDimension;

    fn unit(symbol: &str, dims: Dimensions) -> ComputedUnit {
        ComputedUnit::from_terms(dims, [(symbol.to_string(), 1)])
    }

    fn metre() -> ComputedUnit {
        unit("m", Dimensions::base(BaseDimension::Length))
    }

    fn second() -> ComputedUnit {
        unit("s", Dimensions::base(BaseDimension::Time))
    }

    #[test]
    fn test_multiply_symbols() {
        let ms = metre().multiply(&second());
        assert_eq!(ms.symbol(), "m·s");
        assert_eq!(ms.dimensions, Dimensions::new([1, 0, 1, 0, 0, 0, 0]));
    }

    #[test]
    fn test_divide_symbols() {
        assert_eq!(metre().divide(&second()).symbol(), "m/s");
        assert_eq!(ComputedUnit::dimensionless().divide(&second()).symbol(), "1/s");
        let kg = unit("kg", Dimensions::base(BaseDimension::Mass));
        let awkward = metre().divide(&kg).divide(&second());
        assert_eq!(awkward.symbol(), "m/(kg·s)");
    }

    #[test]
    fn test_cancellation_renders_one() {
        let ratio = metre().divide(&metre());
        assert_eq!(ratio.symbol(), "1");
        assert!(ratio.is_plain());
    }

    #[test]
    fn test_powi() {
        let area = metre().powi(2);
        assert_eq!(area.symbol(), "m²");
        assert_eq!(area.powi(-1).symbol(), "1/m²");
        assert_eq!(area.powi(0).symbol(), "1");
    }

    #[test]
    fn test_parse_compound_symbols() {
        let newton_like = parse_terms("kg·m/s²");
        assert_eq!(newton_like.get("kg"), Some(&1));
        assert_eq!(newton_like.get("m"), Some(&1));
        assert_eq!(newton_like.get("s"), Some(&-2));

        let caret = parse_terms("m^2*s^-1");
        assert_eq!(caret.get("m"), Some(&2));
        assert_eq!(caret.get("s"), Some(&-1));

        let nested = parse_terms("m/(kg·s)");
        assert_eq!(nested.get("kg"), Some(&-1));
    }

    #[test]
    fn test_opaque_symbols() {
        assert_eq!(parse_terms("°C").get("°C"), Some(&1));
        assert_eq!(parse_terms("Ω").get("Ω"), Some(&1));
        assert!(parse_terms("1").is_empty());
    }

    #[test]
    fn test_rendered_symbol_parses_back() {
        let kg = unit("kg", Dimensions::base(BaseDimension::Mass));
        let u = kg.multiply(&metre()).divide(&second().powi(2));
        assert_eq!(u.symbol(), "kg·m/s²");
        assert_eq!(parse_terms(&u.symbol()), u.terms);
    }

    #[test]
    fn test_quantity_display() {
        assert_eq!(Quantity::new(5.0, metre()).to_string(), "5 m");
        assert_eq!(Quantity::dimensionless(2.5).to_string(), "2.5");
    }
}
