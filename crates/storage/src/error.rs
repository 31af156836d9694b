// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Errors for position-marker persistence.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PositionError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed position marker in {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },
}
