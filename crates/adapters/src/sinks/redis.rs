// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `output { redis { ... } }`: pushes the encoded envelope onto a Redis
//! list (`LPUSH`) or publishes it to a channel (`PUBLISH`), using a plain
//! RESP connection (no `redis` crate dependency — the subset of the
//! protocol needed here is a handful of fixed commands and a one-line
//! reply).

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

use crate::error::SinkError;
use crate::host_rotation::HostRotation;
use crate::timeout::run_with_timeout;
use crate::Sink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedisDataType {
    List,
    Channel,
}

pub struct RedisSinkConfig {
    pub hosts: Vec<String>,
    pub port: u16,
    pub db: u32,
    pub password: Option<String>,
    pub data_type: RedisDataType,
    pub key: String,
    pub timeout: Duration,
}

pub struct RedisSink {
    name: String,
    config: RedisSinkConfig,
    state: Mutex<State>,
}

struct State {
    rotation: HostRotation,
    stream: Option<BufReader<TcpStream>>,
}

impl RedisSink {
    pub fn new(name: impl Into<String>, config: RedisSinkConfig) -> Self {
        let rotation = HostRotation::new(config.hosts.clone());
        Self {
            name: name.into(),
            config,
            state: Mutex::new(State { rotation, stream: None }),
        }
    }

    async fn connect(&self, host: &str) -> Result<BufReader<TcpStream>, SinkError> {
        let addr = format!("{host}:{}", self.config.port);
        let stream = run_with_timeout(self.config.timeout, async {
            TcpStream::connect(&addr)
                .await
                .map_err(|e| SinkError::Connect(format!("{addr}: {e}")))
        })
        .await?;
        let mut stream = BufReader::new(stream);

        if self.config.db != 0 {
            send_command(&mut stream, &["SELECT", &self.config.db.to_string()], self.config.timeout).await?;
        }
        if let Some(password) = &self.config.password {
            send_command(&mut stream, &["AUTH", password], self.config.timeout).await?;
        }
        Ok(stream)
    }
}

#[async_trait]
impl Sink for RedisSink {
    async fn push(&self, envelope: &Value) -> Result<(), SinkError> {
        let payload = serde_json::to_string(envelope).map_err(|e| SinkError::Protocol(e.to_string()))?;
        let command = match self.config.data_type {
            RedisDataType::List => ["LPUSH", &self.config.key, &payload],
            RedisDataType::Channel => ["PUBLISH", &self.config.key, &payload],
        };

        let mut guard = self.state.lock().await;
        let attempts = guard.rotation.len().max(1);

        for _ in 0..attempts {
            if guard.stream.is_none() {
                let host = guard
                    .rotation
                    .current()
                    .ok_or(SinkError::HostsExhausted)?
                    .to_string();
                match self.connect(&host).await {
                    Ok(stream) => guard.stream = Some(stream),
                    Err(_) => {
                        guard.rotation.advance();
                        continue;
                    }
                }
            }

            let Some(stream) = guard.stream.as_mut() else {
                return Err(SinkError::Connect("redis connection missing after connect".into()));
            };
            match send_command(stream, &command, self.config.timeout).await {
                Ok(()) => {
                    guard.rotation.record_success();
                    return Ok(());
                }
                Err(_) => {
                    guard.stream = None;
                    guard.rotation.advance();
                }
            }
        }

        Err(SinkError::HostsExhausted)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

async fn send_command(
    stream: &mut BufReader<TcpStream>,
    args: &[&str],
    timeout: Duration,
) -> Result<(), SinkError> {
    run_with_timeout(timeout, async {
        let encoded = encode_resp(args);
        stream.write_all(&encoded).await?;
        stream.flush().await?;
        let mut reply = String::new();
        let n = stream.read_line(&mut reply).await?;
        if n == 0 {
            return Err(SinkError::Protocol("connection closed reading reply".into()));
        }
        if is_success_reply(reply.trim_end()) {
            Ok(())
        } else {
            Err(SinkError::Protocol(format!("unexpected reply: {}", reply.trim_end())))
        }
    })
    .await
}

fn encode_resp(args: &[&str]) -> Vec<u8> {
    let mut out = format!("*{}\r\n", args.len()).into_bytes();
    for arg in args {
        out.extend(format!("${}\r\n", arg.len()).into_bytes());
        out.extend(arg.as_bytes());
        out.extend(b"\r\n");
    }
    out
}

fn is_success_reply(line: &str) -> bool {
    if line == "+OK" {
        return true;
    }
    line.strip_prefix(':')
        .map(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
        .unwrap_or(false)
}
