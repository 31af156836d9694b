// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `output { amqp { ... } }`: publishes the encoded envelope to a
//! declared exchange, reconnecting the channel on the next push after
//! any failure.

use std::time::Duration;

use async_trait::async_trait;
use lapin::options::{
    BasicPublishOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::error::SinkError;
use crate::timeout::run_with_timeout;
use crate::Sink;

pub struct AmqpSinkConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub vhost: String,
    pub exchange: String,
    pub exchange_type: String,
    pub durable: bool,
    pub auto_delete: bool,
    pub queue: String,
    pub exclusive: bool,
    pub timeout: Duration,
    pub heartbeat: Option<u16>,
    pub frame_max: Option<u32>,
    pub channel_max: Option<u16>,
}

pub struct AmqpSink {
    name: String,
    config: AmqpSinkConfig,
    state: Mutex<Option<(Connection, Channel)>>,
}

impl AmqpSink {
    pub fn new(name: impl Into<String>, config: AmqpSinkConfig) -> Self {
        Self {
            name: name.into(),
            config,
            state: Mutex::new(None),
        }
    }

    fn exchange_kind(&self) -> ExchangeKind {
        match self.config.exchange_type.as_str() {
            "direct" => ExchangeKind::Direct,
            "topic" => ExchangeKind::Topic,
            "headers" => ExchangeKind::Headers,
            _ => ExchangeKind::Fanout,
        }
    }

    async fn connect(&self) -> Result<(Connection, Channel), SinkError> {
        let mut uri = format!(
            "amqp://{}:{}@{}:{}/{}",
            self.config.user,
            self.config.password,
            self.config.host,
            self.config.port,
            urlencode_vhost(&self.config.vhost),
        );
        // heartbeat/frame_max/channel_max are negotiated with the broker
        // during the AMQP handshake; lapin's AMQPUri reads them as query
        // parameters on the connection string rather than accepting them
        // through ConnectionProperties.
        let mut query = Vec::new();
        if let Some(heartbeat) = self.config.heartbeat {
            query.push(format!("heartbeat={heartbeat}"));
        }
        if let Some(frame_max) = self.config.frame_max {
            query.push(format!("frame_max={frame_max}"));
        }
        if let Some(channel_max) = self.config.channel_max {
            query.push(format!("channel_max={channel_max}"));
        }
        if !query.is_empty() {
            uri.push('?');
            uri.push_str(&query.join("&"));
        }

        let props = ConnectionProperties::default()
            .with_executor(tokio_executor_trait::Tokio::current())
            .with_reactor(tokio_reactor_trait::Tokio);

        let connection = run_with_timeout(self.config.timeout, async {
            Connection::connect(&uri, props.clone())
                .await
                .map_err(|e| SinkError::Connect(e.to_string()))
        })
        .await?;

        let channel = connection
            .create_channel()
            .await
            .map_err(|e| SinkError::Connect(e.to_string()))?;

        channel
            .exchange_declare(
                &self.config.exchange,
                self.exchange_kind(),
                ExchangeDeclareOptions {
                    durable: self.config.durable,
                    auto_delete: self.config.auto_delete,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| SinkError::Protocol(e.to_string()))?;

        if !self.config.queue.is_empty() {
            channel
                .queue_declare(
                    &self.config.queue,
                    QueueDeclareOptions {
                        durable: self.config.durable,
                        auto_delete: self.config.auto_delete,
                        exclusive: self.config.exclusive,
                        ..Default::default()
                    },
                    FieldTable::default(),
                )
                .await
                .map_err(|e| SinkError::Protocol(e.to_string()))?;

            channel
                .queue_bind(
                    &self.config.queue,
                    &self.config.exchange,
                    &self.config.queue,
                    QueueBindOptions::default(),
                    FieldTable::default(),
                )
                .await
                .map_err(|e| SinkError::Protocol(e.to_string()))?;
        }

        Ok((connection, channel))
    }
}

#[async_trait]
impl Sink for AmqpSink {
    async fn push(&self, envelope: &Value) -> Result<(), SinkError> {
        let payload = serde_json::to_vec(envelope).map_err(|e| SinkError::Protocol(e.to_string()))?;

        let mut guard = self.state.lock().await;
        if guard.is_none() {
            *guard = Some(self.connect().await?);
        }

        let Some((_, channel)) = guard.as_ref() else {
            return Err(SinkError::Connect("amqp channel missing after connect".into()));
        };
        let result = run_with_timeout(self.config.timeout, async {
            channel
                .basic_publish(
                    &self.config.exchange,
                    &self.config.queue,
                    BasicPublishOptions::default(),
                    &payload,
                    BasicProperties::default(),
                )
                .await
                .map_err(|e| SinkError::Protocol(e.to_string()))?
                .await
                .map_err(|e| SinkError::Protocol(e.to_string()))
        })
        .await;

        if result.is_err() {
            *guard = None;
        }
        result.map(|_confirmation| ())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

fn urlencode_vhost(vhost: &str) -> String {
    if vhost == "/" {
        "%2f".to_string()
    } else {
        vhost.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_vhost_is_percent_encoded() {
        assert_eq!(urlencode_vhost("/"), "%2f");
        assert_eq!(urlencode_vhost("/custom"), "/custom");
    }
}
