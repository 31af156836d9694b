// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `output { socket { ... } }`: a line-oriented TCP (optionally TLS)
//! client, mirroring the socket input's handshake from the other side —
//! it sends the auth line first and expects a non-empty reply before any
//! payload is written, per spec.md §4.3.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use rustls::pki_types::ServerName;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_rustls::TlsConnector;

use crate::error::SinkError;
use crate::host_rotation::HostRotation;
use crate::timeout::run_with_timeout;
use crate::tls::verify_mode;
use crate::Sink;

enum Conn {
    Plain(BufReader<TcpStream>),
    Tls(BufReader<tokio_rustls::client::TlsStream<TcpStream>>),
}

impl Conn {
    async fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        match self {
            Conn::Plain(s) => s.get_mut().write_all(buf).await,
            Conn::Tls(s) => s.get_mut().write_all(buf).await,
        }
    }

    async fn read_line(&mut self, out: &mut String) -> std::io::Result<usize> {
        match self {
            Conn::Plain(s) => s.read_line(out).await,
            Conn::Tls(s) => s.read_line(out).await,
        }
    }
}

pub struct SocketSinkConfig {
    pub hosts: Vec<String>,
    pub port: u16,
    pub tls: Option<Arc<rustls::ClientConfig>>,
    /// Carried alongside the already-built `tls` config purely for the
    /// connect-time diagnostic below; the actual verification behavior is
    /// baked into `tls` by `tls::load_client_config`.
    pub ssl_verify: u8,
    pub json: bool,
    pub auth: Option<String>,
    /// Compiled once at construction from the output block's `response`
    /// pattern (spec.md §4.3: the reply is matched as a regex, not
    /// compared for exact equality).
    pub response: Option<Regex>,
    pub persistent: bool,
    pub timeout: Duration,
}

pub struct SocketSink {
    name: String,
    config: SocketSinkConfig,
    rotation: parking_lot::Mutex<HostRotation>,
    conn: Mutex<Option<Conn>>,
}

impl SocketSink {
    pub fn new(name: impl Into<String>, config: SocketSinkConfig) -> Self {
        let rotation = parking_lot::Mutex::new(HostRotation::new(config.hosts.clone()));
        Self {
            name: name.into(),
            config,
            rotation,
            conn: Mutex::new(None),
        }
    }

    fn render(&self, envelope: &Value) -> String {
        if self.config.json {
            format!("{envelope}\n")
        } else {
            let message = envelope.get("@message").and_then(Value::as_str).unwrap_or("");
            format!("{message}\n")
        }
    }

    async fn open(&self, host: &str) -> Result<Conn, SinkError> {
        let addr = format!("{host}:{}", self.config.port);
        let stream = run_with_timeout(self.config.timeout, async {
            TcpStream::connect(&addr)
                .await
                .map_err(|e| SinkError::Connect(format!("{addr}: {e}")))
        })
        .await?;

        let mut conn = match &self.config.tls {
            Some(client_config) => {
                if self.config.ssl_verify & verify_mode::PEER == 0 {
                    tracing::debug!(name = %self.name, host, "tls connection without peer verification");
                }
                let connector = TlsConnector::from(client_config.clone());
                let server_name = ServerName::try_from(host.to_string())
                    .map_err(|e| SinkError::Tls(format!("invalid server name {host}: {e}")))?;
                let tls_stream = connector
                    .connect(server_name, stream)
                    .await
                    .map_err(|e| SinkError::Tls(e.to_string()))?;
                Conn::Tls(BufReader::new(tls_stream))
            }
            None => Conn::Plain(BufReader::new(stream)),
        };

        if let Some(auth) = &self.config.auth {
            conn.write_all(format!("{auth}\n").as_bytes()).await?;
            let mut reply = String::new();
            run_with_timeout(self.config.timeout, async {
                conn.read_line(&mut reply).await.map_err(SinkError::from)
            })
            .await?;
            if reply.trim_end().is_empty() {
                return Err(SinkError::Protocol("socket auth rejected".into()));
            }
        }

        Ok(conn)
    }

    async fn send_and_verify(&self, conn: &mut Conn, line: &str) -> Result<(), SinkError> {
        run_with_timeout(self.config.timeout, async {
            conn.write_all(line.as_bytes()).await?;
            if let Some(pattern) = &self.config.response {
                let mut reply = String::new();
                conn.read_line(&mut reply).await?;
                if !pattern.is_match(reply.trim_end()) {
                    return Err(SinkError::Protocol(format!(
                        "unexpected response: {}",
                        reply.trim_end()
                    )));
                }
            }
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl Sink for SocketSink {
    async fn push(&self, envelope: &Value) -> Result<(), SinkError> {
        let line = self.render(envelope);
        let attempts = self.rotation.lock().len().max(1);

        for _ in 0..attempts {
            let mut guard = self.conn.lock().await;
            if guard.is_none() {
                let host = self
                    .rotation
                    .lock()
                    .current()
                    .ok_or(SinkError::HostsExhausted)?
                    .to_string();
                match self.open(&host).await {
                    Ok(conn) => *guard = Some(conn),
                    Err(_) => {
                        drop(guard);
                        self.rotation.lock().advance();
                        continue;
                    }
                }
            }

            let Some(conn) = guard.as_mut() else {
                return Err(SinkError::Connect("socket connection missing after connect".into()));
            };
            match self.send_and_verify(conn, &line).await {
                Ok(()) => {
                    self.rotation.lock().record_success();
                    if !self.config.persistent {
                        *guard = None;
                    }
                    return Ok(());
                }
                Err(_) => {
                    *guard = None;
                    drop(guard);
                    self.rotation.lock().advance();
                }
            }
        }

        Err(SinkError::HostsExhausted)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
