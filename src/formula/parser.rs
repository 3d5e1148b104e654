//! Formula recursive descent parser.
//!
//! Grammar, loosest binding first:
//!
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := unary (('*' | '/') unary)*
//! unary   := ('-' | '+') unary | power
//! power   := primary (('^' | '**') unary)?
//! primary := NUMBER | REFERENCE | FUNC '(' expr ')' | '(' expr ')'
//! ```
//!
//! `^` is right-associative and binds tighter than unary minus, so
//! `-2^2 == -(2^2)`; the exponent may carry its own sign (`2^-1`).

use super::ast::*;
use super::lexer::{Token, TokenKind};
use crate::{Error, Result};

/// Parenthesis/function nesting limit.
pub const MAX_NESTING: usize = 128;

/// Parser state: a token slice and a cursor.
struct Parser<'t> {
    tokens: &'t [Token],
    pos: usize,
    depth: usize,
}

impl<'t> Parser<'t> {
    fn new(tokens: &'t [Token]) -> Self {
        Self { tokens, pos: 0, depth: 0 }
    }

    fn peek(&self) -> &'t Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self) -> TokenKind {
        self.peek().kind
    }

    fn advance(&mut self) -> &'t Token {
        let tok = &self.tokens[self.pos.min(self.tokens.len() - 1)];
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.peek_kind() == kind
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.at(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn error(&self, msg: String) -> Error {
        Error::Parse {
            position: self.peek().span.start,
            message: msg,
        }
    }

    fn enter(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(self.error(format!("Expression nested deeper than {MAX_NESTING} levels")));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    /// Consume the `)` matching an open paren at `open`, or fail pointing at it.
    fn close(&mut self, open: usize) -> Result<()> {
        if self.eat(TokenKind::RParen) {
            return Ok(());
        }
        if self.at(TokenKind::Eof) {
            Err(Error::Parse {
                position: open,
                message: "Unbalanced parentheses: '(' is never closed".into(),
            })
        } else {
            let tok = self.peek();
            Err(self.error(format!("Expected ')', got '{}'", tok.text)))
        }
    }
}

/// Parse a complete formula from tokens. The slice must end with `Eof`.
pub fn parse_expression(tokens: &[Token]) -> Result<Expr> {
    if tokens.is_empty() || tokens[0].kind == TokenKind::Eof {
        return Err(Error::Parse {
            position: 0,
            message: "Empty expression".into(),
        });
    }

    let mut p = Parser::new(tokens);
    let expr = parse_additive(&mut p)?;

    if !p.at(TokenKind::Eof) {
        let tok = p.peek();
        return Err(match tok.kind {
            TokenKind::RParen => p.error("Unbalanced parentheses: unexpected ')'".into()),
            _ => p.error(format!("Unexpected token after expression: '{}'", tok.text)),
        });
    }

    Ok(expr)
}

// ============================================================================
// Precedence levels
// ============================================================================

fn parse_additive(p: &mut Parser) -> Result<Expr> {
    let mut left = parse_multiplicative(p)?;
    loop {
        let op = match p.peek_kind() {
            TokenKind::Plus => BinaryOp::Add,
            TokenKind::Minus => BinaryOp::Sub,
            _ => break,
        };
        p.advance();
        let right = parse_multiplicative(p)?;
        left = Expr::binary(left, op, right);
    }
    Ok(left)
}

fn parse_multiplicative(p: &mut Parser) -> Result<Expr> {
    let mut left = parse_unary(p)?;
    loop {
        let op = match p.peek_kind() {
            TokenKind::Star => BinaryOp::Mul,
            TokenKind::Slash => BinaryOp::Div,
            _ => break,
        };
        p.advance();
        let right = parse_unary(p)?;
        left = Expr::binary(left, op, right);
    }
    Ok(left)
}

fn parse_unary(p: &mut Parser) -> Result<Expr> {
    if p.at(TokenKind::Minus) || p.at(TokenKind::Plus) {
        let negate = p.at(TokenKind::Minus);
        p.advance();
        p.enter()?;
        let operand = parse_unary(p)?;
        p.leave();
        Ok(if negate { Expr::negate(operand) } else { operand })
    } else {
        parse_power(p)
    }
}

fn parse_power(p: &mut Parser) -> Result<Expr> {
    let base = parse_primary(p)?;
    if p.eat(TokenKind::Caret) {
        p.enter()?;
        let exponent = parse_unary(p)?; // right-associative, may be signed
        p.leave();
        Ok(Expr::binary(base, BinaryOp::Pow, exponent))
    } else {
        Ok(base)
    }
}

fn parse_primary(p: &mut Parser) -> Result<Expr> {
    let tok = p.peek();
    match tok.kind {
        TokenKind::Number => {
            let value: f64 = tok
                .text
                .parse()
                .map_err(|_| p.error(format!("Invalid number '{}'", tok.text)))?;
            p.advance();
            Ok(Expr::Number(value))
        }
        TokenKind::Reference => {
            p.advance();
            Ok(Expr::Reference(Reference::parse(&tok.text)))
        }
        TokenKind::LParen => {
            let open = tok.span.start;
            p.advance();
            if p.at(TokenKind::RParen) {
                return Err(p.error("Empty parentheses".into()));
            }
            p.enter()?;
            let inner = parse_additive(p)?;
            p.leave();
            p.close(open)?;
            Ok(inner)
        }
        TokenKind::Identifier => parse_function_call(p),
        TokenKind::RParen => Err(p.error("Unbalanced parentheses: unexpected ')'".into())),
        TokenKind::Eof => Err(p.error("Unexpected end of expression".into())),
        _ => Err(p.error(format!("Unexpected operator '{}'", tok.text))),
    }
}

fn parse_function_call(p: &mut Parser) -> Result<Expr> {
    let name_tok = p.advance();
    let name = name_tok.text.as_str();
    let at_name = |message: String| Error::Parse { position: name_tok.span.start, message };

    if !p.at(TokenKind::LParen) {
        return Err(match Function::from_name(name) {
            Some(_) => at_name(format!("Function '{name}' requires a parenthesized argument")),
            None => at_name(format!("Unexpected identifier '{name}'; references are written as #{name}")),
        });
    }
    let func = Function::from_name(name)
        .ok_or_else(|| at_name(format!("Unknown function '{name}'")))?;

    let open = p.advance().span.start;
    if p.at(TokenKind::RParen) {
        return Err(p.error(format!("Function '{name}' requires one argument")));
    }
    p.enter()?;
    let arg = parse_additive(p)?;
    p.leave();
    p.close(open)?;
    Ok(Expr::call(func, arg))
}
