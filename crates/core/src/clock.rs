// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Clock abstraction so scheduling and timestamping can be tested without
//! sleeping real time.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};

/// Anything that can tell the current wall-clock time.
pub trait Clock: Clone + Send + Sync + 'static {
    /// Current time as a `chrono::DateTime<Utc>`.
    fn now(&self) -> DateTime<Utc>;

    /// Current time in milliseconds since the Unix epoch.
    fn now_millis(&self) -> i64 {
        self.now().timestamp_millis()
    }
}

/// Real wall-clock time, backed by `SystemTime::now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        DateTime::<Utc>::from_timestamp(now.as_secs() as i64, now.subsec_nanos())
            .unwrap_or_else(Utc::now)
    }
}

/// A controllable clock for deterministic tests. Starts at the Unix epoch
/// unless seeded with [`FakeClock::at_millis`].
#[derive(Debug, Clone)]
pub struct FakeClock {
    millis: std::sync::Arc<AtomicI64>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self {
            millis: std::sync::Arc::new(AtomicI64::new(0)),
        }
    }

    pub fn at_millis(millis: i64) -> Self {
        Self {
            millis: std::sync::Arc::new(AtomicI64::new(millis)),
        }
    }

    pub fn advance_millis(&self, delta: i64) {
        self.millis.fetch_add(delta, Ordering::SeqCst);
    }

    pub fn set_millis(&self, millis: i64) {
        self.millis.store(millis, Ordering::SeqCst);
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> DateTime<Utc> {
        let millis = self.millis.load(Ordering::SeqCst);
        DateTime::from_timestamp_millis(millis).unwrap_or_else(Utc::now)
    }

    fn now_millis(&self) -> i64 {
        self.millis.load(Ordering::SeqCst)
    }
}
