// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! shiplog-adapters: the socket listener input and every output sink
//! (Redis, line socket, AMQP, GELF, screen), plus the host-rotation and
//! timeout helpers they share.

mod error;
mod host_rotation;
mod sink;
pub mod sinks;
mod socket_listener;
pub mod timeout;
pub mod tls;

pub use error::{ListenerError, SinkError};
pub use host_rotation::HostRotation;
pub use sink::Sink;
#[cfg(feature = "test-support")]
pub use sink::FakeSink;
pub use socket_listener::{SocketLine, SocketListenerConfig, SocketSource};
