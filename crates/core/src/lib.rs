// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! shiplog-core: the clock abstraction, derived-field recipes, and shared
//! error type used by every other shiplog crate.

pub mod clock;
pub mod derived_field;
pub mod error;

pub use clock::{Clock, FakeClock, SystemClock};
pub use derived_field::{DerivedField, DerivedFieldError};
pub use error::CoreError;
