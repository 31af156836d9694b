// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scheduling Engine (C6): the single-threaded cooperative tick loop that
//! drives every input, applies the stash back-pressure rule, and fans out
//! encoded envelopes through the routing table.
//!
//! `Scheduler::tick` runs exactly one pass and returns how long the
//! daemon should sleep before calling it again; the daemon wraps that
//! sleep in a `tokio::select!` alongside its shutdown signals so a
//! pending tick never blocks graceful shutdown for longer than one pull.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use shiplog_adapters::sinks::{
    AmqpSink, AmqpSinkConfig, GelfSink, GelfSinkConfig, RedisSink, RedisSinkConfig, ScreenSink,
    ScreenTarget as AdapterScreenTarget, SocketSink, SocketSinkConfig,
};
use shiplog_adapters::Sink;
use shiplog_config::{Config, InputConfig, OutputConfig, RedisDataType as ConfigRedisDataType, ScreenTarget as ConfigScreenTarget};
use shiplog_core::{Clock, SystemClock};
use shiplog_storage::PositionStore;

use crate::encoder::{CompiledInput, Encoder};
use crate::error::EngineError;
use crate::input_state::InputState;
use crate::routing::{self, RoutingTable, Stash};

struct ScheduledInput {
    state: InputState,
    position_store: Option<PositionStore>,
}

struct BenchmarkAccumulator {
    lines: u64,
    bytes: u64,
    last_emit_millis: i64,
}

impl BenchmarkAccumulator {
    fn new(now: i64) -> Self {
        Self { lines: 0, bytes: 0, last_emit_millis: now }
    }

    fn record(&mut self, lines: usize, bytes: usize) {
        self.lines += lines as u64;
        self.bytes += bytes as u64;
    }

    fn maybe_emit(&mut self, now: i64) {
        if now - self.last_emit_millis >= 1000 {
            tracing::info!(lines = self.lines, bytes = self.bytes, "benchmark tick summary");
            self.lines = 0;
            self.bytes = 0;
            self.last_emit_millis = now;
        }
    }
}

pub struct Scheduler<C: Clock> {
    poll_ms: i64,
    lines_per_tick: usize,
    log_watch_interval_ms: i64,
    benchmark: bool,
    clock: C,
    encoder: Encoder<C>,
    routing: RoutingTable,
    stash: Stash,
    inputs: Vec<ScheduledInput>,
    next_watch_millis: i64,
    bench: BenchmarkAccumulator,
}

impl Scheduler<SystemClock> {
    pub async fn new(config: &Config, hostname: impl Into<String>) -> Result<Self, EngineError> {
        Self::with_clock(config, hostname, SystemClock).await
    }
}

impl<C: Clock> Scheduler<C> {
    pub async fn with_clock(config: &Config, hostname: impl Into<String>, clock: C) -> Result<Self, EngineError> {
        Self::with_clock_inner(config, hostname, clock, None).await
    }

    /// Builds a scheduler for one worker of a `workers`-group (§4.7) whose
    /// single socket input shares a listener the supervisor bound once and
    /// `dup`'d across the group, instead of each worker binding its own.
    pub async fn with_clock_and_listener(
        config: &Config,
        hostname: impl Into<String>,
        clock: C,
        std_listener: std::net::TcpListener,
    ) -> Result<Self, EngineError> {
        Self::with_clock_inner(config, hostname, clock, Some(std_listener)).await
    }

    async fn with_clock_inner(
        config: &Config,
        hostname: impl Into<String>,
        clock: C,
        std_listener: Option<std::net::TcpListener>,
    ) -> Result<Self, EngineError> {
        let routing = RoutingTable::new(build_outputs(&config.outputs)?);
        let encoder = Encoder::new(clock.clone(), hostname, config.milliseconds);

        let mut inputs = Vec::new();
        match std_listener {
            Some(listener) => {
                let socket = config
                    .inputs
                    .iter()
                    .find_map(|i| match i {
                        InputConfig::Socket(s) => Some(s),
                        InputConfig::File(_) => None,
                    })
                    .ok_or_else(|| {
                        EngineError::InvalidGroup(
                            "pre-bound listener supplied but group config has no socket input".into(),
                        )
                    })?;
                let compiled = CompiledInput::compile(&socket.common)?;
                let state = InputState::for_socket_with_std_listener(socket, compiled, listener)?;
                inputs.push(ScheduledInput { state, position_store: None });
            }
            None => {
                for input in &config.inputs {
                    inputs.push(build_scheduled_input(input).await?);
                }
            }
        }

        let now = clock.now_millis();
        Ok(Self {
            poll_ms: config.poll_ms as i64,
            lines_per_tick: config.lines,
            log_watch_interval_ms: config.log_watch_interval_ms as i64,
            benchmark: config.benchmark,
            clock: clock.clone(),
            encoder,
            routing,
            stash: Stash::new(),
            inputs,
            next_watch_millis: now,
            bench: BenchmarkAccumulator::new(now),
        })
    }

    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    /// Runs one scheduling pass (spec.md §4.6) and returns how long to
    /// sleep before the next one.
    pub async fn tick(&mut self) -> Duration {
        let now = self.clock.now_millis();

        if now >= self.next_watch_millis {
            for scheduled in &mut self.inputs {
                scheduled.state.rescan_glob();
            }
            self.next_watch_millis = now + self.log_watch_interval_ms;
        }

        self.inputs.retain(|s| !s.state.is_retired());

        self.stash.drain().await;

        let mut deadline = now + self.poll_ms;
        let mut warned_types: HashSet<String> = HashSet::new();

        for idx in 0..self.inputs.len() {
            let now = self.clock.now_millis();
            if self.inputs[idx].state.next_tick_millis > now {
                continue;
            }

            let type_label = self.inputs[idx].state.compiled.type_label.clone();
            let has_type = !type_label.is_empty();
            let suspended = if has_type {
                self.stash.is_stashed(&type_label)
            } else {
                self.stash.has_any()
            };
            if suspended {
                continue;
            }

            let Some(lines) = self.inputs[idx].state.pull(self.lines_per_tick) else {
                continue;
            };

            if lines.is_empty() {
                self.inputs[idx].state.next_tick_millis = now + self.poll_ms;
                continue;
            }

            deadline = now;

            let total_bytes: usize = lines.iter().map(|l| l.line.len()).sum();
            let mut groups: Vec<(String, Vec<Value>)> = Vec::new();
            for raw in &lines {
                let Some((effective_type, envelope)) =
                    self.encoder.encode(&raw.line, &raw.source_path, &self.inputs[idx].state.compiled)
                else {
                    continue;
                };
                match groups.last_mut() {
                    Some((t, envs)) if *t == effective_type => envs.push(envelope),
                    _ => groups.push((effective_type, vec![envelope])),
                }
            }

            for (effective_type, envelopes) in groups {
                let routed =
                    routing::dispatch_batch(&self.routing, &mut self.stash, &type_label, &effective_type, &envelopes)
                        .await;
                if !routed && warned_types.insert(effective_type.clone()) {
                    tracing::warn!(r#type = %effective_type, "no output registered for type");
                }
            }

            if let Some(store) = &self.inputs[idx].position_store {
                if let Some(state) = self.inputs[idx].state.position() {
                    if let Err(e) = store.persist(state) {
                        tracing::warn!(error = %e, "failed to persist tail position");
                    }
                }
            }

            if self.benchmark {
                self.bench.record(lines.len(), total_bytes);
            }
        }

        let now = self.clock.now_millis();
        if self.benchmark {
            self.bench.maybe_emit(now);
        }

        Duration::from_millis(deadline.saturating_sub(now).max(0) as u64)
    }
}

async fn build_scheduled_input(input: &InputConfig) -> Result<ScheduledInput, EngineError> {
    match input {
        InputConfig::File(file) if input.is_glob() => {
            let compiled = CompiledInput::compile(&file.common)?;
            Ok(ScheduledInput { state: InputState::for_glob(file, compiled)?, position_store: None })
        }
        InputConfig::File(file) => {
            let compiled = CompiledInput::compile(&file.common)?;
            let mut state = InputState::for_file(file, compiled)?;
            let position_store = if file.save_position {
                let store = PositionStore::new(position_marker_path(&file.path));
                if let Some(saved) = store.load()? {
                    state.resume_from(saved)?;
                }
                Some(store)
            } else {
                None
            };
            Ok(ScheduledInput { state, position_store })
        }
        InputConfig::Socket(socket) => {
            let compiled = CompiledInput::compile(&socket.common)?;
            let state = InputState::for_socket(socket, compiled).await?;
            Ok(ScheduledInput { state, position_store: None })
        }
    }
}

/// Marker file path for a tailed file's durable position (spec.md §3);
/// colocated with the source file under a `.pos` suffix.
fn position_marker_path(file_path: &str) -> PathBuf {
    PathBuf::from(format!("{file_path}.pos"))
}

fn build_outputs(outputs: &[OutputConfig]) -> Result<Vec<(shiplog_config::TypeMatch, Arc<dyn Sink>)>, EngineError> {
    let mut counts: HashMap<&'static str, usize> = HashMap::new();
    let mut built = Vec::new();

    for output in outputs {
        let kind = output.kind();
        let idx = {
            let entry = counts.entry(kind).or_insert(0);
            let current = *entry;
            *entry += 1;
            current
        };
        let name = format!("{kind}#{idx}");

        let sink: Arc<dyn Sink> = match output {
            OutputConfig::Redis(cfg) => Arc::new(RedisSink::new(
                name,
                RedisSinkConfig {
                    hosts: cfg.hosts.clone(),
                    port: cfg.port,
                    db: cfg.db,
                    password: cfg.password.clone(),
                    data_type: to_adapter_data_type(cfg.data_type),
                    key: cfg.key.clone(),
                    timeout: cfg.timeout,
                },
            )),
            OutputConfig::Socket(cfg) => {
                let tls = if cfg.ssl {
                    Some(shiplog_adapters::tls::load_client_config(
                        cfg.ssl_ca.as_deref(),
                        cfg.ssl_verify,
                    )?)
                } else {
                    None
                };
                let response = cfg
                    .response
                    .as_deref()
                    .map(regex::Regex::new)
                    .transpose()
                    .map_err(EngineError::InvalidResponsePattern)?;
                Arc::new(SocketSink::new(
                    name,
                    SocketSinkConfig {
                        hosts: cfg.hosts.clone(),
                        port: cfg.port,
                        tls,
                        ssl_verify: cfg.ssl_verify,
                        json: cfg.json,
                        auth: cfg.auth.clone(),
                        response,
                        persistent: cfg.persistent,
                        timeout: cfg.timeout,
                    },
                ))
            }
            OutputConfig::Amqp(cfg) => Arc::new(AmqpSink::new(
                name,
                AmqpSinkConfig {
                    host: cfg.host.clone(),
                    port: cfg.port,
                    user: cfg.user.clone(),
                    password: cfg.password.clone(),
                    vhost: cfg.vhost.clone(),
                    exchange: cfg.exchange.clone(),
                    exchange_type: cfg.exchange_type.clone(),
                    durable: cfg.durable,
                    auto_delete: cfg.auto_delete,
                    queue: cfg.queue.clone(),
                    exclusive: cfg.exclusive,
                    timeout: cfg.timeout,
                    heartbeat: cfg.heartbeat,
                    frame_max: cfg.frame_max,
                    channel_max: cfg.channel_max,
                },
            )),
            OutputConfig::Gelf(cfg) => Arc::new(GelfSink::new(
                name,
                GelfSinkConfig {
                    host: cfg.host.clone(),
                    port: cfg.port,
                    facility: cfg.facility.clone(),
                    gzip: cfg.gzip,
                },
            )),
            OutputConfig::Screen(cfg) => {
                Arc::new(ScreenSink::new(name, to_adapter_screen_target(cfg.target), cfg.json))
            }
        };

        built.push((output.type_match().clone(), sink));
    }

    Ok(built)
}

fn to_adapter_data_type(d: ConfigRedisDataType) -> shiplog_adapters::sinks::RedisDataType {
    match d {
        ConfigRedisDataType::List => shiplog_adapters::sinks::RedisDataType::List,
        ConfigRedisDataType::Channel => shiplog_adapters::sinks::RedisDataType::Channel,
    }
}

fn to_adapter_screen_target(t: ConfigScreenTarget) -> AdapterScreenTarget {
    match t {
        ConfigScreenTarget::Stdout => AdapterScreenTarget::Stdout,
        ConfigScreenTarget::Stderr => AdapterScreenTarget::Stderr,
        ConfigScreenTarget::Null => AdapterScreenTarget::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shiplog_config::{DerivedFieldSpec, FileInput, InputCommon, InputFormat, StartPosition, TypeMatch};
    use shiplog_core::FakeClock;

    fn file_input(path: &str, type_label: &str) -> InputConfig {
        InputConfig::File(FileInput {
            common: InputCommon {
                type_label: type_label.to_string(),
                tags: Vec::new(),
                fields: Vec::new(),
                derived_fields: Vec::new(),
                format: InputFormat::Plain,
                workers: None,
            },
            path: path.to_string(),
            start_position: StartPosition::Beginning,
            skip: None,
            grep: None,
            save_position: false,
            remove_on_errors: false,
        })
    }

    #[tokio::test]
    async fn rotation_is_picked_up_across_ticks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.log");
        std::fs::write(&path, "1\n2\n3\n").unwrap();

        let mut config = Config::default();
        config.inputs.push(file_input(path.to_str().unwrap(), "app"));
        config.outputs.push(OutputConfig::Screen(shiplog_config::ScreenOutput {
            json: false,
            target: ConfigScreenTarget::Null,
            type_match: TypeMatch::Wildcard,
        }));

        let clock = FakeClock::new();
        let mut scheduler = Scheduler::with_clock(&config, "web01", clock.clone()).await.unwrap();
        scheduler.tick().await;

        clock.advance_millis(600);
        std::fs::rename(&path, dir.path().join("a.log.1")).unwrap();
        std::fs::write(&path, "4\n5\n").unwrap();
        scheduler.tick().await;
    }

    #[tokio::test]
    async fn derived_field_recipe_is_wired_through_the_whole_pull() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("apache2/foo.example/bar");
        std::fs::create_dir_all(&nested).unwrap();
        let path = nested.join("error.log");
        std::fs::write(&path, "boom\n").unwrap();

        let mut input = file_input(path.to_str().unwrap(), "apache");
        if let InputConfig::File(f) = &mut input {
            f.common.derived_fields.push(DerivedFieldSpec {
                target_field: "domain".into(),
                source_field: "@source_path".into(),
                pattern: r"([a-z]+\.[a-z]+)/([a-z]+)/[^/]+$".into(),
                concat: "$2.$1".into(),
                default: Some("common".into()),
            });
        }

        let mut config = Config::default();
        config.inputs.push(input);

        let scheduler = Scheduler::with_clock(&config, "web01", FakeClock::new()).await.unwrap();
        assert_eq!(scheduler.input_count(), 1);
    }
}
