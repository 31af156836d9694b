// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `output { gelf { ... } }`: one GELF 1.1 datagram per event over UDP.
//!
//! UDP is fire-and-forget: per spec §9's resolution of the GELF
//! partial-write Open Question, an oversize payload is a permanent drop
//! (logged, never stashed) and any send error is a silent transient
//! failure — stashing would retry a line that already left the process
//! with no way to know whether it arrived.

use std::io::Write;
use std::sync::Arc;

use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Serialize;
use serde_json::Value;
use tokio::net::UdpSocket;

use crate::error::SinkError;
use crate::Sink;

/// Maximum UDP datagram size this sink will send; larger payloads are
/// dropped rather than fragmented (spec §4.3).
const MAX_PAYLOAD_BYTES: usize = 8192;

pub struct GelfSinkConfig {
    pub host: String,
    pub port: u16,
    pub facility: String,
    pub gzip: bool,
}

pub struct GelfSink {
    name: String,
    config: GelfSinkConfig,
    socket: Arc<tokio::sync::OnceCell<UdpSocket>>,
}

#[derive(Serialize)]
struct GelfMessage<'a> {
    version: &'a str,
    host: &'a str,
    short_message: &'a str,
    level: &'a str,
    facility: &'a str,
}

impl GelfSink {
    pub fn new(name: impl Into<String>, config: GelfSinkConfig) -> Self {
        Self {
            name: name.into(),
            config,
            socket: Arc::new(tokio::sync::OnceCell::new()),
        }
    }

    async fn socket(&self) -> Result<&UdpSocket, SinkError> {
        self.socket
            .get_or_try_init(|| async { UdpSocket::bind("0.0.0.0:0").await.map_err(SinkError::from) })
            .await
    }

    fn build_payload(&self, envelope: &Value) -> Option<Vec<u8>> {
        let host = envelope.get("@source_host").and_then(Value::as_str).unwrap_or("");
        let message = envelope.get("@message").and_then(Value::as_str).unwrap_or("");
        let gelf = GelfMessage {
            version: "1.1",
            host,
            short_message: message,
            level: "1",
            facility: &self.config.facility,
        };
        let json = serde_json::to_vec(&gelf).ok()?;
        if !self.config.gzip {
            return Some(json);
        }
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&json).ok()?;
        encoder.finish().ok()
    }
}

#[async_trait]
impl Sink for GelfSink {
    async fn push(&self, envelope: &Value) -> Result<(), SinkError> {
        let Some(payload) = self.build_payload(envelope) else {
            tracing::error!(sink = %self.name, "gelf encode failed, dropping event");
            return Ok(());
        };

        if payload.len() > MAX_PAYLOAD_BYTES {
            tracing::error!(
                sink = %self.name,
                bytes = payload.len(),
                "gelf payload exceeds 8192 bytes, dropping"
            );
            return Ok(());
        }

        let socket = self.socket().await?;
        let addr = format!("{}:{}", self.config.host, self.config.port);
        if let Err(e) = socket.send_to(&payload, &addr).await {
            tracing::warn!(sink = %self.name, error = %e, "gelf datagram send failed, dropping");
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
