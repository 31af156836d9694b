// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Errors for the file tailer.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TailError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read {path}: {source}")]
    Read {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid skip/grep filter regex: {0}")]
    InvalidFilter(#[from] regex::Error),

    #[error("glob pattern error: {0}")]
    Glob(#[from] glob::PatternError),
}
