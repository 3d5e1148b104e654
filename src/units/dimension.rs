//! SI dimension vectors.
//!
//! A dimension is a 7-tuple of integer exponents over the SI base
//! quantities. Multiplying quantities adds exponents, dividing subtracts
//! them. Nothing here rounds, allocates per operation, or knows about units.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Number of SI base dimensions.
pub const DIMENSION_COUNT: usize = 7;

/// One of the seven SI base dimensions, in vector order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaseDimension {
    Length,
    Mass,
    Time,
    Current,
    Temperature,
    Amount,
    Luminosity,
}

impl BaseDimension {
    pub const ALL: [BaseDimension; DIMENSION_COUNT] = [
        BaseDimension::Length,
        BaseDimension::Mass,
        BaseDimension::Time,
        BaseDimension::Current,
        BaseDimension::Temperature,
        BaseDimension::Amount,
        BaseDimension::Luminosity,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Conventional dimension symbol (`L`, `M`, `T`, `I`, `Θ`, `N`, `J`).
    pub fn symbol(self) -> &'static str {
        match self {
            BaseDimension::Length => "L",
            BaseDimension::Mass => "M",
            BaseDimension::Time => "T",
            BaseDimension::Current => "I",
            BaseDimension::Temperature => "Θ",
            BaseDimension::Amount => "N",
            BaseDimension::Luminosity => "J",
        }
    }
}

/// Exponent vector over {length, mass, time, current, temperature, amount, luminosity}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Dimensions(pub [i32; DIMENSION_COUNT]);

impl Dimensions {
    pub const DIMENSIONLESS: Dimensions = Dimensions([0; DIMENSION_COUNT]);

    pub const fn new(exponents: [i32; DIMENSION_COUNT]) -> Self {
        Self(exponents)
    }

    /// The dimension of a single base quantity, e.g. `L` for length.
    pub fn base(dim: BaseDimension) -> Self {
        let mut exps = [0; DIMENSION_COUNT];
        exps[dim.index()] = 1;
        Self(exps)
    }

    pub fn exponent(&self, dim: BaseDimension) -> i32 {
        self.0[dim.index()]
    }

    pub fn multiply(&self, other: &Dimensions) -> Dimensions {
        let mut out = self.0;
        for (slot, rhs) in out.iter_mut().zip(other.0) {
            *slot = slot.saturating_add(rhs);
        }
        Dimensions(out)
    }

    pub fn divide(&self, other: &Dimensions) -> Dimensions {
        let mut out = self.0;
        for (slot, rhs) in out.iter_mut().zip(other.0) {
            *slot = slot.saturating_sub(rhs);
        }
        Dimensions(out)
    }

    /// Scales every exponent by `n` (the dimension of `x^n`).
    pub fn powi(&self, n: i32) -> Dimensions {
        let mut out = self.0;
        for slot in out.iter_mut() {
            *slot = slot.saturating_mul(n);
        }
        Dimensions(out)
    }

    pub fn is_dimensionless(&self) -> bool {
        self.0.iter().all(|&e| e == 0)
    }

    /// True for exactly `Θ¹`: the only dimension where affine offsets are allowed.
    pub fn is_temperature(&self) -> bool {
        *self == Dimensions::base(BaseDimension::Temperature)
    }
}

/// `a == b` spelled out, for call sites that read better with a verb.
pub fn dimensions_equal(a: &Dimensions, b: &Dimensions) -> bool {
    a == b
}

impl fmt::Display for Dimensions {
    /// Renders `L·M·T⁻²`; the dimensionless vector renders as `1`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_dimensionless() {
            return write!(f, "1");
        }
        let mut first = true;
        for dim in BaseDimension::ALL {
            let exp = self.exponent(dim);
            if exp == 0 {
                continue;
            }
            if !first {
                write!(f, "·")?;
            }
            first = false;
            write!(f, "{}", dim.symbol())?;
            if exp != 1 {
                write!(f, "{}", superscript(exp))?;
            }
        }
        Ok(())
    }
}

const SUPERSCRIPT_DIGITS: [char; 10] = ['⁰', '¹', '²', '³', '⁴', '⁵', '⁶', '⁷', '⁸', '⁹'];

/// Renders an integer with Unicode superscript digits, e.g. `-2` → `⁻²`.
pub(crate) fn superscript(n: i32) -> String {
    let mut out = String::new();
    if n < 0 {
        out.push('⁻');
    }
    for digit in n.unsigned_abs().to_string().bytes() {
        out.push(SUPERSCRIPT_DIGITS[(digit - b'0') as usize]);
    }
    out
}

/// Inverse of [`superscript`]. Returns `None` if `s` has a non-superscript char.
pub(crate) fn parse_superscript(s: &str) -> Option<i32> {
    let mut chars = s.chars().peekable();
    let negative = chars.peek() == Some(&'⁻');
    if negative {
        chars.next();
    }
    let mut value: i32 = 0;
    let mut any = false;
    for c in chars {
        let digit = SUPERSCRIPT_DIGITS.iter().position(|&d| d == c)? as i32;
        value = value.checked_mul(10)?.checked_add(digit)?;
        any = true;
    }
    if !any {
        return None;
    }
    Some(if negative { -value } else { value })
}

#[cfg(test)]
mod tests {
    use super::*;

    const FORCE: Dimensions = Dimensions::new([1, 1, -2, 0, 0, 0, 0]);

    #[test]
    fn test_multiply_adds_exponents() {
        let length = Dimensions::base(BaseDimension::Length);
        let time = Dimensions::base(BaseDimension::Time);
        assert_eq!(length.multiply(&time), Dimensions::new([1, 0, 1, 0, 0, 0, 0]));
    }

    #[test]
    fn test_divide_subtracts_exponents() {
        let velocity = Dimensions::base(BaseDimension::Length)
            .divide(&Dimensions::base(BaseDimension::Time));
        assert_eq!(velocity.exponent(BaseDimension::Time), -1);
        assert!(velocity.divide(&velocity).is_dimensionless());
    }

    #[test]
    fn test_powi() {
        let area = Dimensions::base(BaseDimension::Length).powi(2);
        assert_eq!(area.exponent(BaseDimension::Length), 2);
        assert!(area.powi(0).is_dimensionless());
    }

    #[test]
    fn test_format_force() {
        assert_eq!(FORCE.to_string(), "L·M·T⁻²");
        assert_eq!(Dimensions::DIMENSIONLESS.to_string(), "1");
        assert_eq!(Dimensions::base(BaseDimension::Temperature).to_string(), "Θ");
    }

    #[test]
    fn test_is_temperature() {
        assert!(Dimensions::base(BaseDimension::Temperature).is_temperature());
        assert!(!Dimensions::base(BaseDimension::Temperature).powi(2).is_temperature());
        assert!(!Dimensions::DIMENSIONLESS.is_temperature());
    }

    #[test]
    fn test_superscript_roundtrip() {
        for n in [-12, -2, -1, 1, 2, 3, 10, 47] {
            assert_eq!(parse_superscript(&superscript(n)), Some(n));
        }
        assert_eq!(parse_superscript("x"), None);
        assert_eq!(parse_superscript("⁻"), None);
    }

    #[test]
    fn test_dimensions_equal() {
        assert!(dimensions_equal(&FORCE, &FORCE));
        assert!(!dimensions_equal(&FORCE, &Dimensions::DIMENSIONLESS));
    }
}
