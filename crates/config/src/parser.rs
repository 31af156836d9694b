// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Parser that turns a token stream into a generic key/value tree.
//!
//! The grammar:
//!
//! ```text
//! block       := (assignment | named_block)*
//! assignment  := IDENT '=>' value
//! named_block := IDENT '{' block '}'
//! value       := STRING | NUMBER | array
//! array       := '[' (value (',' value)*)? ']'
//! ```
//!
//! A repeated scalar assignment at the same nesting level promotes into an
//! array (`tags => "a"` followed by `tags => "b"` becomes `tags =>
//! ["a","b"]`); repeated named blocks (`file { ... } file { ... }`) are
//! left as separate entries for the model layer to collect as a list.

use crate::error::ParseError;
use crate::lexer::Lexer;
use crate::token::{Span, Token, TokenKind};

#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Str(String),
    Number(f64),
    Array(Vec<RawValue>),
    Block(Vec<(String, RawValue)>),
}

impl RawValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            RawValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            RawValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_block(&self) -> Option<&[(String, RawValue)]> {
        match self {
            RawValue::Block(pairs) => Some(pairs),
            _ => None,
        }
    }

    /// Returns this value's scalar strings, whether it is a single string
    /// or an array of strings. Used for `host => "a"` vs `host => ["a",
    /// "b"]` equivalence in output blocks.
    pub fn as_str_list(&self) -> Vec<String> {
        match self {
            RawValue::Str(s) => vec![s.clone()],
            RawValue::Array(items) => items.iter().filter_map(|v| v.as_str()).map(String::from).collect(),
            _ => Vec::new(),
        }
    }
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn parse(src: &str) -> Result<Vec<(String, RawValue)>, ParseError> {
        let tokens = Lexer::tokenize(src)?;
        let mut parser = Parser { tokens, pos: 0 };
        let pairs = parser.parse_block_body()?;
        parser.expect_eof()?;
        Ok(merge_duplicate_scalars(pairs))
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn bump(&mut self) -> Token {
        let tok = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Eof)
    }

    fn expect_eof(&mut self) -> Result<(), ParseError> {
        if self.at_eof() {
            Ok(())
        } else {
            Err(self.unexpected("end of input"))
        }
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        let tok = self.peek();
        ParseError::UnexpectedToken {
            found: tok.kind.clone(),
            expected: expected.to_string(),
            span: tok.span,
        }
    }

    fn expect(&mut self, kind: &TokenKind, expected: &str) -> Result<Span, ParseError> {
        if std::mem::discriminant(&self.peek().kind) == std::mem::discriminant(kind) {
            Ok(self.bump().span)
        } else {
            Err(self.unexpected(expected))
        }
    }

    /// Parses a sequence of assignments and named blocks until `}` or EOF.
    fn parse_block_body(&mut self) -> Result<Vec<(String, RawValue)>, ParseError> {
        let mut pairs = Vec::new();
        loop {
            match &self.peek().kind {
                TokenKind::Eof | TokenKind::RBrace => break,
                TokenKind::Ident(name) => {
                    let name = name.clone();
                    self.bump();
                    match &self.peek().kind {
                        TokenKind::FatArrow => {
                            self.bump();
                            let value = self.parse_value()?;
                            pairs.push((name, value));
                        }
                        TokenKind::LBrace => {
                            self.bump();
                            let inner = self.parse_block_body()?;
                            self.expect(&TokenKind::RBrace, "'}'")?;
                            pairs.push((name, RawValue::Block(inner)));
                        }
                        _ => return Err(self.unexpected("'=>' or '{'")),
                    }
                }
                _ => return Err(self.unexpected("identifier, '}', or end of input")),
            }
        }
        Ok(pairs)
    }

    fn parse_value(&mut self) -> Result<RawValue, ParseError> {
        match self.peek().kind.clone() {
            TokenKind::Str(s) => {
                self.bump();
                Ok(RawValue::Str(s))
            }
            TokenKind::Number(n) => {
                self.bump();
                Ok(RawValue::Number(n))
            }
            TokenKind::Ident(word) if word == "true" || word == "false" => {
                self.bump();
                // Bare true/false read as a string; model.rs coerces bools
                // from either a bareword or a quoted string, matching how
                // the reference config format never had a distinct boolean
                // literal.
                Ok(RawValue::Str(word))
            }
            TokenKind::LBracket => {
                self.bump();
                let mut items = Vec::new();
                if !matches!(self.peek().kind, TokenKind::RBracket) {
                    loop {
                        items.push(self.parse_value()?);
                        if matches!(self.peek().kind, TokenKind::Comma) {
                            self.bump();
                        } else {
                            break;
                        }
                    }
                }
                self.expect(&TokenKind::RBracket, "']'")?;
                Ok(RawValue::Array(items))
            }
            _ => Err(self.unexpected("a string, number, or array")),
        }
    }
}

/// Merges consecutive-or-not duplicate scalar keys within one block level
/// into a single array entry, preserving first-occurrence order. Named
/// blocks (whose value is `RawValue::Block`) are never merged this way.
fn merge_duplicate_scalars(pairs: Vec<(String, RawValue)>) -> Vec<(String, RawValue)> {
    let mut order: Vec<String> = Vec::new();
    let mut grouped: std::collections::HashMap<String, Vec<RawValue>> = std::collections::HashMap::new();
    let mut passthrough: Vec<(String, RawValue)> = Vec::new();

    for (key, value) in pairs {
        if matches!(value, RawValue::Block(_)) {
            passthrough.push((key, value));
            continue;
        }
        if !grouped.contains_key(&key) {
            order.push(key.clone());
        }
        grouped.entry(key).or_default().push(value);
    }

    let mut merged: Vec<(String, RawValue)> = order
        .into_iter()
        .map(|key| {
            let mut values = grouped.remove(&key).unwrap_or_default();
            if values.len() == 1 {
                (key, values.remove(0))
            } else {
                (key, RawValue::Array(values))
            }
        })
        .collect();

    merged.extend(passthrough);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_blocks() {
        let pairs = Parser::parse(
            r#"
            input {
              file {
                type => "syslog"
                path => "/var/log/syslog"
              }
            }
            "#,
        )
        .unwrap();
        assert_eq!(pairs.len(), 1);
        let (key, value) = &pairs[0];
        assert_eq!(key, "input");
        let input_body = value.as_block().unwrap();
        assert_eq!(input_body[0].0, "file");
    }

    #[test]
    fn repeated_scalar_key_promotes_to_array() {
        let pairs = Parser::parse(
            r#"
            tags => "a"
            tags => "b"
            "#,
        )
        .unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!(
            pairs[0].1,
            RawValue::Array(vec![RawValue::Str("a".into()), RawValue::Str("b".into())])
        );
    }

    #[test]
    fn repeated_named_blocks_are_not_merged() {
        let pairs = Parser::parse(
            r#"
            input {
              file { type => "a" }
              file { type => "b" }
            }
            "#,
        )
        .unwrap();
        let input_body = pairs[0].1.as_block().unwrap();
        assert_eq!(input_body.len(), 2);
        assert_eq!(input_body[0].0, "file");
        assert_eq!(input_body[1].0, "file");
    }

    #[test]
    fn array_of_strings_parses() {
        let pairs = Parser::parse(r#"host => ["a", "b", "c"]"#).unwrap();
        assert_eq!(pairs[0].1.as_str_list(), vec!["a", "b", "c"]);
    }

    #[test]
    fn unexpected_token_is_reported() {
        let err = Parser::parse("input { => }").unwrap_err();
        assert!(matches!(err, ParseError::UnexpectedToken { .. }));
    }
}
