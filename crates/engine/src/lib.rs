// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! shiplog-engine: the envelope encoder, the type-routing table and
//! per-type stash, and the scheduling engine that ties inputs to outputs
//! (spec.md C4, C5, C6).

pub mod encoder;
pub mod error;
pub mod input_state;
pub mod routing;
pub mod scheduler;

pub use encoder::{CompiledInput, Encoder};
pub use error::EngineError;
pub use input_state::{InputState, RawLine};
pub use routing::{RoutingTable, Stash};
pub use scheduler::Scheduler;
