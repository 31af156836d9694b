// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Errors for output sinks and the socket listener.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("connect failed: {0}")]
    Connect(String),

    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("all configured hosts are exhausted")]
    HostsExhausted,
}

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("bind failed on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TLS error: {0}")]
    Tls(String),
}
