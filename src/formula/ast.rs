//! Formula AST types.
//!
//! `Display` is the serializer: it writes a fully parenthesized form that
//! parses back to an equal tree.

use std::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// Expressions
// ============================================================================

/// Expression in a formula.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    /// Numeric literal: `12`, `1.5e3`
    Number(f64),
    /// Reference: `#mass`, `#motor.mass`
    Reference(Reference),
    /// Unary operation: `-a`
    Unary { op: UnaryOp, expr: Box<Expr> },
    /// Binary operation: `a + b`, `a ^ b`
    Binary { left: Box<Expr>, op: BinaryOp, right: Box<Expr> },
    /// Function call: `sqrt(a)`
    Function { func: Function, arg: Box<Expr> },
}

impl Expr {
    pub fn number(v: f64) -> Self {
        Expr::Number(v)
    }

    pub fn reference(token: &str) -> Self {
        Expr::Reference(Reference::parse(token))
    }

    pub fn binary(left: Expr, op: BinaryOp, right: Expr) -> Self {
        Expr::Binary { left: Box::new(left), op, right: Box::new(right) }
    }

    pub fn negate(expr: Expr) -> Self {
        Expr::Unary { op: UnaryOp::Negate, expr: Box::new(expr) }
    }

    pub fn call(func: Function, arg: Expr) -> Self {
        Expr::Function { func, arg: Box::new(arg) }
    }

    /// All references in evaluation order (left to right), duplicates included.
    pub fn references(&self) -> Vec<&Reference> {
        let mut out = Vec::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references<'a>(&'a self, out: &mut Vec<&'a Reference>) {
        match self {
            Expr::Number(_) => {}
            Expr::Reference(r) => out.push(r),
            Expr::Unary { expr, .. } => expr.collect_references(out),
            Expr::Binary { left, right, .. } => {
                left.collect_references(out);
                right.collect_references(out);
            }
            Expr::Function { arg, .. } => arg.collect_references(out),
        }
    }

    /// Height of the tree; a lone number or reference is 1.
    pub fn depth(&self) -> usize {
        let mut max = 0;
        let mut stack: Vec<(&Expr, usize)> = vec![(self, 1)];
        while let Some((expr, d)) = stack.pop() {
            max = max.max(d);
            match expr {
                Expr::Number(_) | Expr::Reference(_) => {}
                Expr::Unary { expr, .. } => stack.push((expr, d + 1)),
                Expr::Binary { left, right, .. } => {
                    stack.push((left, d + 1));
                    stack.push((right, d + 1));
                }
                Expr::Function { arg, .. } => stack.push((arg, d + 1)),
            }
        }
        max
    }

    /// Visit every sub-expression, parents before children.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Expr)) {
        visit(self);
        match self {
            Expr::Number(_) | Expr::Reference(_) => {}
            Expr::Unary { expr, .. } => expr.walk(visit),
            Expr::Binary { left, right, .. } => {
                left.walk(visit);
                right.walk(visit);
            }
            Expr::Function { arg, .. } => arg.walk(visit),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Number(v) => write!(f, "{v}"),
            Expr::Reference(r) => write!(f, "#{r}"),
            Expr::Unary { op: UnaryOp::Negate, expr } => write!(f, "(-{expr})"),
            Expr::Binary { left, op, right } => write!(f, "({left} {} {right})", op.symbol()),
            Expr::Function { func, arg } => write!(f, "{}({arg})", func.name()),
        }
    }
}

// ============================================================================
// References
// ============================================================================

/// A `#name` or `#name.field` reference, stored without the `#`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Reference {
    pub name: String,
    pub field: Option<String>,
}

impl Reference {
    /// Split a raw token (`motor.mass`) at its first dot.
    pub fn parse(token: &str) -> Self {
        let token = token.strip_prefix('#').unwrap_or(token);
        match token.split_once('.') {
            Some((name, field)) => Self { name: name.to_string(), field: Some(field.to_string()) },
            None => Self { name: token.to_string(), field: None },
        }
    }

    /// The raw token as `extract_references` reports it.
    pub fn token(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.field {
            Some(field) => write!(f, "{}.{field}", self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

// ============================================================================
// Operators
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOp {
    Negate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Pow => "^",
        }
    }
}

/// Built-in single-argument functions. All take and return dimensionless values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Function {
    Sqrt,
    Sin,
    Cos,
    Tan,
    /// Base-10 logarithm.
    Log,
    Ln,
    Exp,
    Abs,
}

impl Function {
    pub const ALL: [Function; 8] = [
        Function::Sqrt,
        Function::Sin,
        Function::Cos,
        Function::Tan,
        Function::Log,
        Function::Ln,
        Function::Exp,
        Function::Abs,
    ];

    /// Case-sensitive lookup: `sqrt` is a function, `SQRT` is not.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            Function::Sqrt => "sqrt",
            Function::Sin => "sin",
            Function::Cos => "cos",
            Function::Tan => "tan",
            Function::Log => "log",
            Function::Ln => "ln",
            Function::Exp => "exp",
            Function::Abs => "abs",
        }
    }

    pub fn apply(self, x: f64) -> f64 {
        match self {
            Function::Sqrt => x.sqrt(),
            Function::Sin => x.sin(),
            Function::Cos => x.cos(),
            Function::Tan => x.tan(),
            Function::Log => x.log10(),
            Function::Ln => x.ln(),
            Function::Exp => x.exp(),
            Function::Abs => x.abs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_parse() {
        let r = Reference::parse("motor.mass");
        assert_eq!(r.name, "motor");
        assert_eq!(r.field.as_deref(), Some("mass"));
        assert_eq!(r.token(), "motor.mass");
        assert_eq!(Reference::parse("#g").name, "g");
    }

    #[test]
    fn test_display_is_fully_parenthesized() {
        let e = Expr::binary(
            Expr::reference("a"),
            BinaryOp::Add,
            Expr::binary(Expr::number(2.0), BinaryOp::Mul, Expr::negate(Expr::reference("b.c"))),
        );
        assert_eq!(e.to_string(), "(#a + (2 * (-#b.c)))");
        assert_eq!(Expr::call(Function::Sqrt, Expr::number(0.5)).to_string(), "sqrt(0.5)");
    }

    #[test]
    fn test_references_in_order() {
        let e = Expr::binary(
            Expr::call(Function::Abs, Expr::reference("x")),
            BinaryOp::Sub,
            Expr::reference("y"),
        );
        let names: Vec<_> = e.references().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["x", "y"]);
    }

    #[test]
    fn test_function_lookup() {
        assert_eq!(Function::from_name("ln"), Some(Function::Ln));
        assert_eq!(Function::from_name("SQRT"), None);
        assert_eq!(Function::from_name("max"), None);
        assert_eq!(Function::Log.apply(1000.0), 3.0);
    }
}
