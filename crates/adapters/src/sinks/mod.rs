// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Concrete [`crate::Sink`] implementations, one per output block kind.

mod amqp;
mod gelf;
mod redis;
mod screen;
mod socket;

pub use amqp::{AmqpSink, AmqpSinkConfig};
pub use gelf::{GelfSink, GelfSinkConfig};
pub use redis::{RedisSink, RedisSinkConfig};
pub use screen::{ScreenSink, ScreenTarget};
pub use socket::{SocketSink, SocketSinkConfig};
