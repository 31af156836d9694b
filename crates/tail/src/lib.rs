// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! shiplog-tail: inode-tracked file tailing with rotation following.

mod error;
mod tailer;
mod watch_set;

pub use error::TailError;
pub use tailer::{FileTailer, StartPosition, TailState, TailedLine};
pub use watch_set::WatchSet;
