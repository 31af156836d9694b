// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lexer for the shiplog configuration grammar.
//!
//! The grammar is indent-insensitive and brace-delimited (`input { file {
//! ... } }`), comments start with `#` and run to end of line, and a
//! backslash immediately before a newline joins the next line onto the
//! current one (outside of a quoted string, this just means whitespace;
//! inside one, the literal newline is dropped from the string).

use thiserror::Error;

use crate::token::{Span, Token, TokenKind};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum LexerError {
    #[error("unterminated string literal starting at byte {0}")]
    UnterminatedString(usize),

    #[error("unexpected character '{0}' at byte {1}")]
    UnexpectedChar(char, usize),

    #[error("invalid escape sequence '\\{0}' at byte {1}")]
    InvalidEscape(char, usize),
}

impl LexerError {
    pub fn span(&self) -> Span {
        match self {
            LexerError::UnterminatedString(pos) => Span::empty(*pos),
            LexerError::UnexpectedChar(_, pos) => Span::empty(*pos),
            LexerError::InvalidEscape(_, pos) => Span::empty(*pos),
        }
    }
}

pub struct Lexer<'a> {
    src: &'a str,
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
}

impl<'a> Lexer<'a> {
    pub fn tokenize(src: &'a str) -> Result<Vec<Token>, LexerError> {
        let mut lexer = Lexer {
            src,
            chars: src.char_indices().peekable(),
        };
        let mut tokens = Vec::new();
        loop {
            let tok = lexer.next_token()?;
            let is_eof = tok.kind == TokenKind::Eof;
            tokens.push(tok);
            if is_eof {
                break;
            }
        }
        Ok(tokens)
    }

    fn peek_char(&mut self) -> Option<char> {
        self.chars.peek().map(|&(_, c)| c)
    }

    fn bump(&mut self) -> Option<(usize, char)> {
        self.chars.next()
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek_char() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('#') => {
                    while let Some(c) = self.peek_char() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                Some('\\') => {
                    // Backslash-newline outside a string: treat as whitespace.
                    let mut lookahead = self.chars.clone();
                    lookahead.next();
                    if matches!(lookahead.peek(), Some(&(_, '\n'))) {
                        self.bump();
                        self.bump();
                    } else {
                        break;
                    }
                }
                _ => break,
            }
        }
    }

    fn next_token(&mut self) -> Result<Token, LexerError> {
        self.skip_trivia();
        let (start, c) = match self.bump() {
            Some(pair) => pair,
            None => {
                let end = self.src.len();
                return Ok(Token {
                    kind: TokenKind::Eof,
                    span: Span::new(end, end),
                });
            }
        };

        let kind = match c {
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            ',' => TokenKind::Comma,
            '=' => {
                if self.peek_char() == Some('>') {
                    self.bump();
                    TokenKind::FatArrow
                } else {
                    return Err(LexerError::UnexpectedChar('=', start));
                }
            }
            '"' | '\'' => self.lex_string(start, c)?,
            c if c.is_ascii_digit() || (c == '-' && self.peek_char().is_some_and(|d| d.is_ascii_digit())) => {
                self.lex_number(start, c)
            }
            c if c.is_alphabetic() || c == '_' => self.lex_ident(start, c),
            other => return Err(LexerError::UnexpectedChar(other, start)),
        };

        let end = self.chars.peek().map(|&(i, _)| i).unwrap_or(self.src.len());
        Ok(Token {
            kind,
            span: Span::new(start, end),
        })
    }

    fn lex_string(&mut self, start: usize, quote: char) -> Result<TokenKind, LexerError> {
        let mut value = String::new();
        loop {
            match self.bump() {
                None => return Err(LexerError::UnterminatedString(start)),
                Some((_, c)) if c == quote => break,
                Some((pos, '\\')) => match self.bump() {
                    Some((_, 'n')) => value.push('\n'),
                    Some((_, 't')) => value.push('\t'),
                    Some((_, '\\')) => value.push('\\'),
                    Some((_, '"')) => value.push('"'),
                    Some((_, '\'')) => value.push('\''),
                    Some((_, '\n')) => {} // line continuation: drop the newline
                    Some((_, other)) => return Err(LexerError::InvalidEscape(other, pos)),
                    None => return Err(LexerError::UnterminatedString(start)),
                },
                Some((_, c)) => value.push(c),
            }
        }
        Ok(TokenKind::Str(value))
    }

    fn lex_number(&mut self, start: usize, first: char) -> TokenKind {
        let mut end = start + first.len_utf8();
        while let Some(&(i, c)) = self.chars.peek() {
            if c.is_ascii_digit() || c == '.' {
                end = i + c.len_utf8();
                self.bump();
            } else {
                break;
            }
        }
        let text = &self.src[start..end];
        TokenKind::Number(text.parse().unwrap_or(0.0))
    }

    fn lex_ident(&mut self, start: usize, _first: char) -> TokenKind {
        let mut end = self.src.len();
        while let Some(&(i, c)) = self.chars.peek() {
            if c.is_alphanumeric() || c == '_' || c == '-' {
                self.bump();
            } else {
                end = i;
                break;
            }
        }
        TokenKind::Ident(self.src[start..end].to_string())
    }
}
