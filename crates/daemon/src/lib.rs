// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! shiplog-daemon: the Supervisor (C7) and the `shiplogd` CLI entrypoint.
//!
//! Exposed as a library so the integration test suite can drive
//! [`supervisor::run`] directly instead of shelling out to the binary for
//! every scenario.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod env;
pub mod error;
pub mod pidfile;
pub mod supervisor;

pub use error::SupervisorError;
pub use pidfile::PidFile;
