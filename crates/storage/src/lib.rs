// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! shiplog-storage: durable persistence for per-input tail position
//! markers.

mod error;
mod position;

pub use error::PositionError;
pub use position::{FsPositionWriter, PositionStore, PositionWriter};
