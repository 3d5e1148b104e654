//! Formula language: tokenizer, AST and parser.
//!
//! ```text
//! #force / (#width * #height)
//! sqrt(#a ^ 2 + #b ** 2) * 1.5e-3
//! #motor.mass * #g
//! ```
//!
//! Parsing is a pure function of the input string.

pub mod ast;
pub mod lexer;
pub mod parser;

pub use ast::{BinaryOp, Expr, Function, Reference, UnaryOp};
pub use lexer::extract_references;

use crate::api::ValidationReport;
use crate::{Error, Result};

/// Longest accepted formula, in tokens.
pub const MAX_TOKENS: usize = 4096;

/// Tallest accepted AST. Evaluation recurses once per level, so this also
/// bounds evaluator stack use on worker threads. Covers left-leaning
/// operator chains (`#a - #a - ...`), which the nesting limit does not.
pub const MAX_DEPTH: usize = 256;

/// Parse a formula string into an AST.
pub fn parse(formula: &str) -> Result<Expr> {
    let tokens = lexer::tokenize(formula)?;
    if tokens.len() > MAX_TOKENS {
        return Err(Error::Parse {
            position: tokens[MAX_TOKENS].span.start,
            message: format!("Formula longer than {MAX_TOKENS} tokens"),
        });
    }
    let expr = parser::parse_expression(&tokens)?;
    let depth = expr.depth();
    if depth > MAX_DEPTH {
        return Err(Error::Parse {
            position: tokens[0].span.start,
            message: format!("Expression is {depth} operations deep; the limit is {MAX_DEPTH}"),
        });
    }
    Ok(expr)
}

/// Syntax check plus reference extraction; touches nothing else.
pub fn validate(formula: &str) -> ValidationReport {
    match parse(formula).and_then(|_| extract_references(formula)) {
        Ok(references) => ValidationReport {
            valid: true,
            references,
            error: None,
            position: None,
        },
        Err(Error::Parse { position, message }) => ValidationReport {
            valid: false,
            references: extract_references(formula).unwrap_or_default(),
            error: Some(message),
            position: Some(position),
        },
        Err(other) => ValidationReport {
            valid: false,
            references: Vec::new(),
            error: Some(other.to_string()),
            position: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_ok() {
        let report = validate("#a + #b * #a");
        assert!(report.valid);
        assert_eq!(report.references, vec!["a", "b"]);
        assert_eq!(report.error, None);
    }

    #[test]
    fn test_validate_error_keeps_references() {
        let report = validate("#a + (#b * 2");
        assert!(!report.valid);
        assert_eq!(report.position, Some(5));
        assert_eq!(report.references, vec!["a", "b"]);
    }

    #[test]
    fn test_validate_lex_error() {
        let report = validate("#a & #b");
        assert!(!report.valid);
        assert_eq!(report.position, Some(3));
        assert!(report.references.is_empty());
    }

    #[test]
    fn test_token_limit() {
        let long = vec!["1"; MAX_TOKENS].join("+");
        assert!(matches!(parse(&long), Err(Error::Parse { .. })));
        let short = vec!["1"; 100].join("+");
        assert!(parse(&short).is_ok());
    }

    #[test]
    fn test_depth_limit() {
        let at_limit = vec!["#a"; MAX_DEPTH].join(" - ");
        assert_eq!(parse(&at_limit).unwrap().depth(), MAX_DEPTH);

        let (position, message) = match parse(&vec!["#a"; MAX_DEPTH + 1].join(" - ")) {
            Err(Error::Parse { position, message }) => (position, message),
            other => panic!("Expected depth error, got {other:?}"),
        };
        assert_eq!(position, 0);
        assert!(message.contains("limit is 256"));

        // Balanced trees of the same size stay shallow.
        let grouped = (0..64).map(|_| "(#a + #a)").collect::<Vec<_>>().join(" * ");
        assert!(parse(&grouped).unwrap().depth() < 70);
    }
}
