//! Formula lexer: turns an expression string into tokens.
//!
//! Positions are byte offsets into the input. The accepted alphabet is
//! `[#A-Za-z0-9_.+\-*/^()]` plus whitespace; anything else is rejected at
//! the offending character.

use crate::{Error, Result};

/// A token from the lexer.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    /// Source text; for references this is the token without `#`.
    pub text: String,
}

/// Source span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

/// Token kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    // Literals
    Number,

    // Identifiers and references
    Identifier,
    Reference, // #name or #name.field

    // Punctuation
    LParen, RParen,

    // Operators
    Plus, Minus, Star, Slash,
    Caret, // ^ and **

    Eof,
}

/// Tokenize a formula string.
pub fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(pos, ch)) = chars.peek() {
        match ch {
            c if c.is_whitespace() => { chars.next(); }

            // Numbers: 12, 1.5, .5, 1.5e3, 2E-4
            c if c.is_ascii_digit() || (c == '.' && next_is_digit(input, pos + 1)) => {
                let start = pos;
                let mut num = String::new();
                let mut seen_dot = false;
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_ascii_digit() {
                        num.push(c);
                        chars.next();
                    } else if c == '.' && !seen_dot {
                        seen_dot = true;
                        num.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                // Exponent only if digits follow, otherwise `e` is left for the next token.
                if let Some(&(epos, e)) = chars.peek() {
                    if e == 'e' || e == 'E' {
                        let sign = input[epos + 1..].chars().next();
                        let digits_at = match sign {
                            Some('+') | Some('-') => epos + 2,
                            _ => epos + 1,
                        };
                        if next_is_digit(input, digits_at) {
                            num.push(e);
                            chars.next();
                            if let Some(s @ ('+' | '-')) = sign {
                                num.push(s);
                                chars.next();
                            }
                            while let Some(&(_, c)) = chars.peek() {
                                if c.is_ascii_digit() {
                                    num.push(c);
                                    chars.next();
                                } else {
                                    break;
                                }
                            }
                        }
                    }
                }
                tokens.push(Token {
                    kind: TokenKind::Number,
                    span: Span { start, end: start + num.len() },
                    text: num,
                });
            }

            // Reference: #name or #name.field
            '#' => {
                chars.next();
                let start = pos;
                let name = take_ident(&mut chars);
                if name.is_empty() {
                    return Err(Error::Parse {
                        position: start,
                        message: "Expected identifier after '#'".into(),
                    });
                }
                let mut text = name;
                if let Some(&(dot_pos, '.')) = chars.peek() {
                    chars.next();
                    let field = take_ident(&mut chars);
                    if field.is_empty() {
                        return Err(Error::Parse {
                            position: dot_pos,
                            message: format!("Expected field name after '#{text}.'"),
                        });
                    }
                    text.push('.');
                    text.push_str(&field);
                }
                tokens.push(Token {
                    kind: TokenKind::Reference,
                    span: Span { start, end: start + text.len() + 1 },
                    text,
                });
            }

            // Identifiers (function names)
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = pos;
                let ident = take_ident(&mut chars);
                tokens.push(Token {
                    kind: TokenKind::Identifier,
                    span: Span { start, end: start + ident.len() },
                    text: ident,
                });
            }

            '(' => { chars.next(); tokens.push(punct(TokenKind::LParen, pos, "(")); }
            ')' => { chars.next(); tokens.push(punct(TokenKind::RParen, pos, ")")); }
            '+' => { chars.next(); tokens.push(punct(TokenKind::Plus, pos, "+")); }
            '-' => { chars.next(); tokens.push(punct(TokenKind::Minus, pos, "-")); }
            '/' => { chars.next(); tokens.push(punct(TokenKind::Slash, pos, "/")); }
            '^' => { chars.next(); tokens.push(punct(TokenKind::Caret, pos, "^")); }
            '*' => {
                chars.next();
                if matches!(chars.peek(), Some(&(_, '*'))) {
                    chars.next();
                    tokens.push(punct(TokenKind::Caret, pos, "**"));
                } else {
                    tokens.push(punct(TokenKind::Star, pos, "*"));
                }
            }

            '.' => {
                return Err(Error::Parse {
                    position: pos,
                    message: "Unexpected '.' outside a number or reference".into(),
                });
            }

            other => {
                return Err(Error::Parse {
                    position: pos,
                    message: format!("Unexpected character: '{other}'"),
                });
            }
        }
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        span: Span { start: input.len(), end: input.len() },
        text: String::new(),
    });

    Ok(tokens)
}

/// The raw reference tokens (without `#`), de-duplicated, in order of first appearance.
pub fn extract_references(input: &str) -> Result<Vec<String>> {
    let mut refs: Vec<String> = Vec::new();
    for tok in tokenize(input)? {
        if tok.kind == TokenKind::Reference && !refs.contains(&tok.text) {
            refs.push(tok.text);
        }
    }
    Ok(refs)
}

fn take_ident(chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>) -> String {
    let mut ident = String::new();
    while let Some(&(_, c)) = chars.peek() {
        if c.is_ascii_alphanumeric() || c == '_' {
            ident.push(c);
            chars.next();
        } else {
            break;
        }
    }
    ident
}

fn next_is_digit(input: &str, at: usize) -> bool {
    input.as_bytes().get(at).is_some_and(u8::is_ascii_digit)
}

fn punct(kind: TokenKind, pos: usize, text: &str) -> Token {
    Token {
        kind,
        span: Span { start: pos, end: pos + text.len() },
        text: text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        tokenize(input).unwrap().iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_simple_expression() {
        assert_eq!(kinds("#a + 2 * #b"), vec![
            TokenKind::Reference,
            TokenKind::Plus,
            TokenKind::Number,
            TokenKind::Star,
            TokenKind::Reference,
            TokenKind::Eof,
        ]);
    }

    #[test]
    fn test_double_star_is_caret() {
        let tokens = tokenize("#x ** 2").unwrap();
        assert_eq!(tokens[1].kind, TokenKind::Caret);
        assert_eq!(tokens[1].text, "**");
        assert_eq!(tokens[1].span, Span { start: 3, end: 5 });
    }

    #[test]
    fn test_numbers() {
        let tokens = tokenize("12 1.5 .5 1.5e3 2E-4 3e+2").unwrap();
        let texts: Vec<_> = tokens.iter().take(6).map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["12", "1.5", ".5", "1.5e3", "2E-4", "3e+2"]);
        assert!(tokens.iter().take(6).all(|t| t.kind == TokenKind::Number));
    }

    #[test]
    fn test_exponent_without_digits_is_not_consumed() {
        let tokens = tokenize("2e").unwrap();
        assert_eq!(tokens[0].text, "2");
        assert_eq!(tokens[1].kind, TokenKind::Identifier);
    }

    #[test]
    fn test_reference_with_field() {
        let tokens = tokenize("#motor.mass").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Reference);
        assert_eq!(tokens[0].text, "motor.mass");
        assert_eq!(tokens[0].span, Span { start: 0, end: 11 });
    }

    #[test]
    fn test_function_identifier() {
        let tokens = tokenize("sqrt(#area)").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Identifier);
        assert_eq!(tokens[0].text, "sqrt");
    }

    #[test]
    fn test_invalid_character_position() {
        match tokenize("#a + $b") {
            Err(Error::Parse { position, .. }) => assert_eq!(position, 5),
            other => panic!("Expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_reference() {
        match tokenize("2 * # + 1") {
            Err(Error::Parse { position, message }) => {
                assert_eq!(position, 4);
                assert!(message.contains("identifier"));
            }
            other => panic!("Expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_dangling_field_dot() {
        assert!(matches!(tokenize("#a. + 1"), Err(Error::Parse { position: 2, .. })));
    }

    #[test]
    fn test_stray_dot() {
        assert!(matches!(tokenize("#a . 2"), Err(Error::Parse { position: 3, .. })));
        // A second dot followed by a digit starts a new number; the parser rejects it.
        let tokens = tokenize("1.2.3").unwrap();
        assert_eq!(tokens[1].text, ".3");
    }

    #[test]
    fn test_extract_references_ordered_dedup() {
        assert_eq!(extract_references("#a + #b * #a").unwrap(), vec!["a", "b"]);
        assert_eq!(
            extract_references("#motor.mass * #g + #motor.mass").unwrap(),
            vec!["motor.mass", "g"]
        );
        assert!(extract_references("1 + 2").unwrap().is_empty());
    }
}
