// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Errors produced while loading a configuration file.

use std::path::PathBuf;

use thiserror::Error;

use crate::lexer::LexerError;
use crate::token::{Span, TokenKind};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    #[error("lexer error: {0}")]
    Lexer(#[from] LexerError),

    #[error("unexpected {found} at byte {}, expected {expected}", span.start)]
    UnexpectedToken {
        found: TokenKind,
        expected: String,
        span: Span,
    },

    #[error("unexpected end of input, expected {expected}")]
    UnexpectedEof { expected: String },

    #[error("duplicate key '{key}' cannot be merged into a list (value is not scalar)")]
    UnmergeableDuplicateKey { key: String, span: Span },
}

impl ParseError {
    pub fn span(&self) -> Option<Span> {
        match self {
            ParseError::Lexer(e) => Some(e.span()),
            ParseError::UnexpectedToken { span, .. } => Some(*span),
            ParseError::UnexpectedEof { .. } => None,
            ParseError::UnmergeableDuplicateKey { span, .. } => Some(*span),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: ParseError,
    },

    #[error("include cycle detected: {0} includes itself transitively")]
    IncludeCycle(PathBuf),

    #[error("validation error in {path}: {message}")]
    Validation { path: PathBuf, message: String },

    #[error("missing required key '{0}' in {1} block")]
    MissingKey(String, String),

    #[error("key '{key}' in {block} block has the wrong type: expected {expected}")]
    WrongType {
        key: String,
        block: String,
        expected: String,
    },

    #[error("unknown {kind} type '{name}'")]
    UnknownBlockType { kind: String, name: String },
}
