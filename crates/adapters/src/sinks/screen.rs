// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `output { screen { ... } }`: writes envelopes to stdout, stderr, or
//! discards them entirely. Used for smoke-testing a configuration before
//! pointing it at a real downstream.

use std::io::Write;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::SinkError;
use crate::Sink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenTarget {
    Stdout,
    Stderr,
    Null,
}

pub struct ScreenSink {
    name: String,
    target: ScreenTarget,
    json: bool,
}

impl ScreenSink {
    pub fn new(name: impl Into<String>, target: ScreenTarget, json: bool) -> Self {
        Self { name: name.into(), target, json }
    }

    fn render(&self, envelope: &Value) -> String {
        if self.json {
            format!("{envelope}\n")
        } else {
            let message = envelope.get("@message").and_then(Value::as_str).unwrap_or("");
            format!("{message}\n")
        }
    }
}

#[async_trait]
impl Sink for ScreenSink {
    async fn push(&self, envelope: &Value) -> Result<(), SinkError> {
        let line = self.render(envelope);
        match self.target {
            ScreenTarget::Stdout => std::io::stdout().write_all(line.as_bytes())?,
            ScreenTarget::Stderr => std::io::stderr().write_all(line.as_bytes())?,
            ScreenTarget::Null => {}
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn null_target_drops_everything() {
        let sink = ScreenSink::new("screen#0", ScreenTarget::Null, true);
        assert!(sink.push(&json!({"@message": "hi"})).await.is_ok());
    }

    #[test]
    fn plain_render_extracts_message() {
        let sink = ScreenSink::new("screen#0", ScreenTarget::Null, false);
        assert_eq!(sink.render(&json!({"@message": "hi"})), "hi\n");
    }

    #[test]
    fn json_render_emits_whole_envelope() {
        let sink = ScreenSink::new("screen#0", ScreenTarget::Null, true);
        let line = sink.render(&json!({"@message": "hi"}));
        assert!(line.contains("@message"));
    }
}
