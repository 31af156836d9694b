// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! shiplog-config: parser and typed model for the shiplog configuration
//! file grammar (brace-delimited, `input { ... }` / `output { ... }`
//! blocks, `include` directive).

mod error;
mod include;
mod lexer;
mod model;
mod parser;
mod token;
mod validate;

pub use error::{ConfigError, ParseError};
pub use lexer::LexerError;
pub use model::{
    AmqpOutput, Config, DerivedFieldSpec, InputFormat, FileInput, GelfOutput, InputCommon,
    InputConfig, OutputConfig, RedisDataType, RedisOutput, ScreenOutput, ScreenTarget,
    SocketInput, SocketOutput, StartPosition, TypeMatch,
};
pub use parser::{Parser, RawValue};
pub use token::{Span, Token, TokenKind};

use std::path::Path;

/// Loads and validates a configuration file, resolving `include`
/// directives recursively.
pub fn load_file(path: &Path) -> Result<Config, ConfigError> {
    let pairs = include::load_resolved(path)?;
    let config = Config::from_pairs(pairs, path)?;
    validate::validate(&config, path)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_a_full_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shiplog.conf");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(
                br#"
                poll => 250
                lines => 50
                input {
                  file {
                    type => "app"
                    path => "/var/log/app.log"
                  }
                }
                output {
                  screen {
                    json => true
                  }
                }
                "#,
            )
            .unwrap();

        let config = load_file(&path).unwrap();
        assert_eq!(config.poll_ms, 250);
        assert_eq!(config.inputs.len(), 1);
        assert_eq!(config.outputs.len(), 1);
    }

    #[test]
    fn rejects_unparseable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.conf");
        std::fs::write(&path, "input { file { type => } }").unwrap();
        let err = load_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
