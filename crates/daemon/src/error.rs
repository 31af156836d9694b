// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Errors for the supervisor and the `shiplogd` entrypoint.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Config(#[from] shiplog_config::ConfigError),

    #[error(transparent)]
    Engine(#[from] shiplog_engine::EngineError),

    #[error("failed to install signal handler: {0}")]
    Signal(#[source] std::io::Error),
}
