// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `Sink` trait every output adapter implements, plus a fake used by
//! the engine's own test suite.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::SinkError;

/// A destination for encoded envelopes. Each concrete sink decides how to
/// render `envelope` (full JSON object, bare `@message`, gzip-compressed,
/// RESP-encoded, ...); the routing and stash layers only ever see this
/// trait, never a sink's wire format.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Pushes one envelope. Returns `Err` on any failure to deliver it,
    /// at which point the caller is responsible for stashing the line and
    /// retrying on a later tick.
    async fn push(&self, envelope: &Value) -> Result<(), SinkError>;

    /// Human-readable identity for log messages (`"redis#0"`, `"screen#1"`).
    fn name(&self) -> &str;
}

/// In-memory sink used by the engine's test suite, and by other crates
/// under the `test-support` feature.
#[cfg(feature = "test-support")]
pub struct FakeSink {
    name: String,
    pushed: parking_lot::Mutex<Vec<Value>>,
    fail_next: std::sync::atomic::AtomicUsize,
}

#[cfg(feature = "test-support")]
impl FakeSink {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pushed: parking_lot::Mutex::new(Vec::new()),
            fail_next: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// The next `n` pushes fail with [`SinkError::Connect`] before pushes
    /// start succeeding again.
    pub fn fail_next(&self, n: usize) {
        self.fail_next.store(n, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn pushed(&self) -> Vec<Value> {
        self.pushed.lock().clone()
    }
}

#[cfg(feature = "test-support")]
#[async_trait]
impl Sink for FakeSink {
    async fn push(&self, envelope: &Value) -> Result<(), SinkError> {
        use std::sync::atomic::Ordering;
        let remaining = self.fail_next.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_next.store(remaining - 1, Ordering::SeqCst);
            return Err(SinkError::Connect("fake sink forced failure".into()));
        }
        self.pushed.lock().push(envelope.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(all(test, feature = "test-support"))]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn fake_sink_records_pushes() {
        let sink = FakeSink::new("fake#0");
        sink.push(&json!({"@message": "hi"})).await.unwrap();
        assert_eq!(sink.pushed().len(), 1);
    }

    #[tokio::test]
    async fn fake_sink_fails_on_demand() {
        let sink = FakeSink::new("fake#0");
        sink.fail_next(1);
        assert!(sink.push(&json!({})).await.is_err());
        assert!(sink.push(&json!({})).await.is_ok());
    }
}
