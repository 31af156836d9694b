// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Errors for the envelope encoder, routing table, and scheduling engine.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Tail(#[from] shiplog_tail::TailError),

    #[error(transparent)]
    Sink(#[from] shiplog_adapters::SinkError),

    #[error(transparent)]
    Listener(#[from] shiplog_adapters::ListenerError),

    #[error(transparent)]
    Position(#[from] shiplog_storage::PositionError),

    #[error(transparent)]
    DerivedField(#[from] shiplog_core::derived_field::DerivedFieldError),

    /// A socket output's `response` pattern (spec.md §4.3) does not
    /// compile as a regex.
    #[error("invalid socket output response pattern: {0}")]
    InvalidResponsePattern(regex::Error),

    /// A supervisor-assembled worker-group config violated the one-input-
    /// per-`workers`-group invariant (§4.7) the scheduler relies on when a
    /// pre-bound listener is supplied.
    #[error("worker group {0}")]
    InvalidGroup(String),
}
