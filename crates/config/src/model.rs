// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed configuration tree, built from the generic [`RawValue`] pairs
//! produced by the parser.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::Value as JsonValue;

use crate::error::ConfigError;
use crate::parser::RawValue;

/// Top-level agent configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Scheduler tick interval in milliseconds.
    pub poll_ms: u64,
    /// Max lines read per tail pass before yielding to the next input.
    pub lines: usize,
    /// When set, periodic self-instrumentation counters are written here.
    pub benchmark: bool,
    /// Overrides the detected hostname used in `@source_host`.
    pub hostname: Option<String>,
    /// Whether `@timestamp` carries millisecond precision.
    pub milliseconds: bool,
    /// Emit the legacy (v0, nested `@fields`) JSON event schema.
    pub oldlogstashjson: bool,
    /// How often (ms) glob-watch inputs re-scan for new matching files.
    pub log_watch_interval_ms: u64,
    /// Opaque logger configuration, handed to the logging subsystem
    /// unexamined.
    pub logger: JsonValue,
    pub inputs: Vec<InputConfig>,
    pub outputs: Vec<OutputConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            poll_ms: 500,
            lines: 100,
            benchmark: false,
            hostname: None,
            milliseconds: false,
            oldlogstashjson: false,
            log_watch_interval_ms: 5_000,
            logger: JsonValue::Null,
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }
}

/// A single `field => "$1-$2"` derived-field recipe, compiled later by
/// `shiplog-core::DerivedField`.
#[derive(Debug, Clone)]
pub struct DerivedFieldSpec {
    pub target_field: String,
    pub source_field: String,
    pub pattern: String,
    pub concat: String,
    pub default: Option<String>,
}

/// Shared fields every input block carries regardless of kind.
#[derive(Debug, Clone)]
pub struct InputCommon {
    pub type_label: String,
    pub tags: Vec<String>,
    pub fields: Vec<(String, String)>,
    pub derived_fields: Vec<DerivedFieldSpec>,
    pub format: InputFormat,
    pub workers: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Plain,
    JsonEvent,
}

#[derive(Debug, Clone)]
pub enum InputConfig {
    File(FileInput),
    Socket(SocketInput),
}

#[derive(Debug, Clone)]
pub struct FileInput {
    pub common: InputCommon,
    pub path: String,
    pub start_position: StartPosition,
    pub skip: Option<String>,
    pub grep: Option<String>,
    pub save_position: bool,
    /// Set once this descriptor was created by a glob rescan rather than by
    /// static configuration; such inputs are retired on read failure.
    pub remove_on_errors: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartPosition {
    Beginning,
    End,
}

#[derive(Debug, Clone)]
pub struct SocketInput {
    pub common: InputCommon,
    pub port: u16,
    pub ssl: bool,
    pub ssl_cert: Option<PathBuf>,
    pub ssl_key: Option<PathBuf>,
    pub auth: Option<String>,
    pub response: Option<String>,
}

impl InputConfig {
    pub fn common(&self) -> &InputCommon {
        match self {
            InputConfig::File(f) => &f.common,
            InputConfig::Socket(s) => &s.common,
        }
    }

    pub fn type_label(&self) -> &str {
        &self.common().type_label
    }

    /// A path is only worth glob-watching if it actually contains a glob
    /// metacharacter; see spec.md §9's resolution of the glob-semantics
    /// Open Question.
    pub fn is_glob(&self) -> bool {
        match self {
            InputConfig::File(f) => f.path.contains('*'),
            InputConfig::Socket(_) => false,
        }
    }
}

/// How an output declares which input types it wants to receive.
#[derive(Debug, Clone)]
pub enum TypeMatch {
    /// `type => "*"`: every input type routes here.
    Wildcard,
    /// `type => "a,b"` or repeated `type => "a"` / `type => "b"`.
    List(Vec<String>),
}

impl TypeMatch {
    pub fn matches(&self, event_type: &str) -> bool {
        match self {
            TypeMatch::Wildcard => true,
            TypeMatch::List(types) => types.iter().any(|t| t == event_type),
        }
    }

    fn from_strs(raw: Vec<String>) -> Self {
        if raw.iter().any(|t| t == "*") {
            TypeMatch::Wildcard
        } else {
            TypeMatch::List(raw)
        }
    }
}

#[derive(Debug, Clone)]
pub enum OutputConfig {
    Redis(RedisOutput),
    Socket(SocketOutput),
    Amqp(AmqpOutput),
    Gelf(GelfOutput),
    Screen(ScreenOutput),
}

impl OutputConfig {
    pub fn type_match(&self) -> &TypeMatch {
        match self {
            OutputConfig::Redis(o) => &o.type_match,
            OutputConfig::Socket(o) => &o.type_match,
            OutputConfig::Amqp(o) => &o.type_match,
            OutputConfig::Gelf(o) => &o.type_match,
            OutputConfig::Screen(o) => &o.type_match,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            OutputConfig::Redis(_) => "redis",
            OutputConfig::Socket(_) => "socket",
            OutputConfig::Amqp(_) => "amqp",
            OutputConfig::Gelf(_) => "gelf",
            OutputConfig::Screen(_) => "screen",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RedisOutput {
    pub hosts: Vec<String>,
    pub port: u16,
    pub db: u32,
    pub password: Option<String>,
    pub data_type: RedisDataType,
    pub key: String,
    pub timeout: Duration,
    pub type_match: TypeMatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedisDataType {
    List,
    Channel,
}

#[derive(Debug, Clone)]
pub struct SocketOutput {
    pub hosts: Vec<String>,
    pub port: u16,
    pub ssl: bool,
    pub ssl_ca: Option<PathBuf>,
    pub ssl_verify: u8,
    pub json: bool,
    pub auth: Option<String>,
    pub response: Option<String>,
    pub persistent: bool,
    pub timeout: Duration,
    pub type_match: TypeMatch,
}

#[derive(Debug, Clone)]
pub struct AmqpOutput {
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
    pub type_match: TypeMatch,
}

#[derive(Debug, Clone)]
pub struct GelfOutput {
    pub host: String,
    pub port: u16,
    pub facility: String,
    pub gzip: bool,
    pub type_match: TypeMatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenTarget {
    Stdout,
    Stderr,
    Null,
}

#[derive(Debug, Clone)]
pub struct ScreenOutput {
    pub json: bool,
    pub target: ScreenTarget,
    pub type_match: TypeMatch,
}

fn get<'a>(pairs: &'a [(String, RawValue)], key: &str) -> Option<&'a RawValue> {
    pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v)
}

fn require_str(pairs: &[(String, RawValue)], key: &str, block: &str) -> Result<String, ConfigError> {
    get(pairs, key)
        .and_then(RawValue::as_str)
        .map(String::from)
        .ok_or_else(|| ConfigError::MissingKey(key.to_string(), block.to_string()))
}

fn opt_str(pairs: &[(String, RawValue)], key: &str) -> Option<String> {
    get(pairs, key).and_then(RawValue::as_str).map(String::from)
}

fn opt_number(pairs: &[(String, RawValue)], key: &str) -> Option<f64> {
    get(pairs, key).and_then(RawValue::as_number)
}

fn opt_bool(pairs: &[(String, RawValue)], key: &str) -> Option<bool> {
    opt_str(pairs, key).map(|s| s == "true")
}

fn opt_duration_secs(pairs: &[(String, RawValue)], key: &str, default_secs: u64) -> Duration {
    Duration::from_secs_f64(opt_number(pairs, key).unwrap_or(default_secs as f64))
}

fn str_list(pairs: &[(String, RawValue)], key: &str) -> Vec<String> {
    get(pairs, key).map(RawValue::as_str_list).unwrap_or_default()
}

/// Expands a `type` value that may be either a single comma-separated
/// string (`type => "a,b"`) or a promoted array (repeated `type => ...`
/// assignments) into the flat list [`TypeMatch`] consumes.
fn type_match(pairs: &[(String, RawValue)]) -> TypeMatch {
    let raw = str_list(pairs, "type");
    let expanded: Vec<String> = raw
        .iter()
        .flat_map(|s| s.split(','))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    TypeMatch::from_strs(expanded)
}

fn parse_derived_fields(pairs: &[(String, RawValue)]) -> Vec<DerivedFieldSpec> {
    let Some(entries) = get(pairs, "derived_fields").and_then(RawValue::as_block) else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|(target_field, value)| {
            let spec = value.as_block()?;
            let source_field = opt_str(spec, "field").unwrap_or_else(|| "@source_path".to_string());
            let pattern = opt_str(spec, "match")?;
            let concat = opt_str(spec, "concat")?;
            let default = opt_str(spec, "default");
            Some(DerivedFieldSpec {
                target_field: target_field.clone(),
                source_field,
                pattern,
                concat,
                default,
            })
        })
        .collect()
}

fn parse_common(type_name: &str, pairs: &[(String, RawValue)]) -> Result<InputCommon, ConfigError> {
    let type_label = require_str(pairs, "type", type_name)?;
    let tags = str_list(pairs, "tags");
    let fields = get(pairs, "fields")
        .and_then(RawValue::as_block)
        .map(|p| {
            p.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default();
    let derived_fields = parse_derived_fields(pairs);
    let format = match opt_str(pairs, "format").as_deref() {
        Some("json_event") => InputFormat::JsonEvent,
        _ => InputFormat::Plain,
    };
    let workers = opt_number(pairs, "workers").map(|n| n as usize).filter(|&n| n > 1);
    Ok(InputCommon {
        type_label,
        tags,
        fields,
        derived_fields,
        format,
        workers,
    })
}

impl Config {
    /// Builds a typed `Config` from the fully include-resolved top-level
    /// pairs produced by the parser.
    pub fn from_pairs(pairs: Vec<(String, RawValue)>, path: &Path) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        for (key, value) in &pairs {
            match key.as_str() {
                "poll" => {
                    config.poll_ms = value
                        .as_number()
                        .ok_or_else(|| wrong_type("poll", "root", "number"))? as u64
                }
                "lines" => {
                    config.lines = value
                        .as_number()
                        .ok_or_else(|| wrong_type("lines", "root", "number"))?
                        as usize
                }
                "benchmark" => {
                    config.benchmark = value.as_str().map(is_truthy).unwrap_or(false);
                }
                "hostname" => config.hostname = value.as_str().map(String::from),
                "milliseconds" => config.milliseconds = value.as_str().map(is_truthy).unwrap_or(false),
                "oldlogstashjson" => {
                    config.oldlogstashjson = value.as_str().map(is_truthy).unwrap_or(false)
                }
                "log_watch_interval" => {
                    let secs = value.as_number().unwrap_or(5.0);
                    config.log_watch_interval_ms = (secs * 1000.0) as u64;
                }
                "logger" => config.logger = raw_value_to_json(value),
                "input" => {
                    let body = value
                        .as_block()
                        .ok_or_else(|| wrong_type("input", "root", "block"))?;
                    for (type_name, inner) in body {
                        let inner_pairs = inner
                            .as_block()
                            .ok_or_else(|| wrong_type(type_name, "input", "block"))?;
                        config.inputs.push(InputConfig::from_pairs(type_name, inner_pairs)?);
                    }
                }
                "output" => {
                    let body = value
                        .as_block()
                        .ok_or_else(|| wrong_type("output", "root", "block"))?;
                    for (type_name, inner) in body {
                        let inner_pairs = inner
                            .as_block()
                            .ok_or_else(|| wrong_type(type_name, "output", "block"))?;
                        config
                            .outputs
                            .push(OutputConfig::from_pairs(type_name, inner_pairs)?);
                    }
                }
                other => {
                    tracing::warn!(key = other, path = %path.display(), "ignoring unknown top-level config key");
                }
            }
        }

        Ok(config)
    }
}

fn is_truthy(s: &str) -> bool {
    matches!(s, "yes" | "true" | "1")
}

fn wrong_type(key: &str, block: &str, expected: &str) -> ConfigError {
    ConfigError::WrongType {
        key: key.to_string(),
        block: block.to_string(),
        expected: expected.to_string(),
    }
}

fn raw_value_to_json(value: &RawValue) -> JsonValue {
    match value {
        RawValue::Str(s) => JsonValue::String(s.clone()),
        RawValue::Number(n) => serde_json::Number::from_f64(*n)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        RawValue::Array(items) => JsonValue::Array(items.iter().map(raw_value_to_json).collect()),
        RawValue::Block(pairs) => {
            let mut map = serde_json::Map::new();
            for (k, v) in pairs {
                map.insert(k.clone(), raw_value_to_json(v));
            }
            JsonValue::Object(map)
        }
    }
}

impl InputConfig {
    fn from_pairs(type_name: &str, pairs: &[(String, RawValue)]) -> Result<Self, ConfigError> {
        match type_name {
            "file" => {
                let common = parse_common("file", pairs)?;
                let path = require_str(pairs, "path", "file")?;
                let start_position = match opt_str(pairs, "start_position").as_deref() {
                    Some("end") => StartPosition::End,
                    _ => StartPosition::Beginning,
                };
                let skip = opt_str(pairs, "skip");
                let grep = opt_str(pairs, "grep");
                let save_position = opt_bool(pairs, "save_position").unwrap_or(false);
                Ok(InputConfig::File(FileInput {
                    common,
                    path,
                    start_position,
                    skip,
                    grep,
                    save_position,
                    remove_on_errors: false,
                }))
            }
            "socket" => {
                let common = parse_common("socket", pairs)?;
                let port = opt_number(pairs, "port").unwrap_or(5043.0) as u16;
                let ssl = opt_bool(pairs, "ssl").unwrap_or(false);
                let ssl_cert = opt_str(pairs, "ssl_cert").map(PathBuf::from);
                let ssl_key = opt_str(pairs, "ssl_key").map(PathBuf::from);
                let auth = opt_str(pairs, "auth");
                let response = opt_str(pairs, "response");
                Ok(InputConfig::Socket(SocketInput {
                    common,
                    port,
                    ssl,
                    ssl_cert,
                    ssl_key,
                    auth,
                    response,
                }))
            }
            other => Err(ConfigError::UnknownBlockType {
                kind: "input".to_string(),
                name: other.to_string(),
            }),
        }
    }
}

impl OutputConfig {
    fn from_pairs(type_name: &str, pairs: &[(String, RawValue)]) -> Result<Self, ConfigError> {
        let types = type_match(pairs);
        match type_name {
            "redis" => {
                let hosts = non_empty(str_list(pairs, "host"), || require_str(pairs, "host", "redis"))?;
                let port = opt_number(pairs, "port").unwrap_or(6379.0) as u16;
                let db = opt_number(pairs, "db").unwrap_or(0.0) as u32;
                let password = opt_str(pairs, "password");
                let data_type = match opt_str(pairs, "data_type").as_deref() {
                    Some("channel") => RedisDataType::Channel,
                    _ => RedisDataType::List,
                };
                let key = opt_str(pairs, "key").unwrap_or_else(|| "logstash".to_string());
                let timeout = opt_duration_secs(pairs, "timeout", 10);
                Ok(OutputConfig::Redis(RedisOutput {
                    hosts,
                    port,
                    db,
                    password,
                    data_type,
                    key,
                    timeout,
                    type_match: types,
                }))
            }
            "socket" => {
                let hosts = non_empty(str_list(pairs, "host"), || require_str(pairs, "host", "socket"))?;
                let port = opt_number(pairs, "port").unwrap_or(5043.0) as u16;
                let ssl = opt_bool(pairs, "ssl").unwrap_or(false);
                let ssl_ca = opt_str(pairs, "ssl_ca").map(PathBuf::from);
                let ssl_verify = opt_number(pairs, "ssl_verify_mode").unwrap_or(0.0) as u8;
                let json = opt_bool(pairs, "json").unwrap_or(true);
                let auth = opt_str(pairs, "auth");
                let response = opt_str(pairs, "response");
                let persistent = opt_bool(pairs, "persistent").unwrap_or(true);
                let timeout = opt_duration_secs(pairs, "timeout", 10);
                Ok(OutputConfig::Socket(SocketOutput {
                    hosts,
                    port,
                    ssl,
                    ssl_ca,
                    ssl_verify,
                    json,
                    auth,
                    response,
                    persistent,
                    timeout,
                    type_match: types,
                }))
            }
            "amqp" => {
                let host = require_str(pairs, "host", "amqp")?;
                let port = opt_number(pairs, "port").unwrap_or(5672.0) as u16;
                let user = opt_str(pairs, "user").unwrap_or_else(|| "guest".to_string());
                let password = opt_str(pairs, "password").unwrap_or_else(|| "guest".to_string());
                let vhost = opt_str(pairs, "vhost").unwrap_or_else(|| "/".to_string());
                let exchange = require_str(pairs, "exchange", "amqp")?;
                let exchange_type = opt_str(pairs, "exchange_type").unwrap_or_else(|| "fanout".to_string());
                let durable = opt_bool(pairs, "durable").unwrap_or(false);
                let auto_delete = opt_bool(pairs, "auto_delete").unwrap_or(false);
                let queue = opt_str(pairs, "key").unwrap_or_else(|| "shiplog".to_string());
                let exclusive = opt_bool(pairs, "exclusive").unwrap_or(false);
                let timeout = opt_duration_secs(pairs, "timeout", 10);
                let heartbeat = opt_number(pairs, "heartbeat").map(|n| n as u16);
                let frame_max = opt_number(pairs, "frame_max").map(|n| n as u32);
                let channel_max = opt_number(pairs, "channel_max").map(|n| n as u16);
                Ok(OutputConfig::Amqp(AmqpOutput {
                    host,
                    port,
                    user,
                    password,
                    vhost,
                    exchange,
                    exchange_type,
                    durable,
                    auto_delete,
                    queue,
                    exclusive,
                    timeout,
                    heartbeat,
                    frame_max,
                    channel_max,
                    type_match: types,
                }))
            }
            "gelf" => {
                let host = require_str(pairs, "host", "gelf")?;
                let port = opt_number(pairs, "port").unwrap_or(12201.0) as u16;
                let facility = opt_str(pairs, "facility").unwrap_or_else(|| "shiplog".to_string());
                let gzip = opt_bool(pairs, "gzip").unwrap_or(false);
                Ok(OutputConfig::Gelf(GelfOutput {
                    host,
                    port,
                    facility,
                    gzip,
                    type_match: types,
                }))
            }
            "screen" | "stdout" => {
                let json = opt_bool(pairs, "json").unwrap_or(false);
                let target = match opt_str(pairs, "target").as_deref() {
                    Some("stderr") => ScreenTarget::Stderr,
                    Some("null") => ScreenTarget::Null,
                    _ => ScreenTarget::Stdout,
                };
                Ok(OutputConfig::Screen(ScreenOutput {
                    json,
                    target,
                    type_match: types,
                }))
            }
            other => Err(ConfigError::UnknownBlockType {
                kind: "output".to_string(),
                name: other.to_string(),
            }),
        }
    }
}

fn non_empty(
    list: Vec<String>,
    fallback: impl FnOnce() -> Result<String, ConfigError>,
) -> Result<Vec<String>, ConfigError> {
    if list.is_empty() {
        fallback().map(|s| vec![s])
    } else {
        Ok(list)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;

    #[test]
    fn builds_file_input_and_redis_output() {
        let pairs = Parser::parse(
            r#"
            poll => 250
            input {
              file {
                type => "syslog"
                path => "/var/log/syslog"
              }
            }
            output {
              redis {
                host => ["10.0.0.1", "10.0.0.2"]
                data_type => "list"
                key => "logstash"
              }
            }
            "#,
        )
        .unwrap();
        let config = Config::from_pairs(pairs, Path::new("test.conf")).unwrap();
        assert_eq!(config.poll_ms, 250);
        assert_eq!(config.inputs.len(), 1);
        assert_eq!(config.inputs[0].type_label(), "syslog");
        match &config.outputs[0] {
            OutputConfig::Redis(r) => assert_eq!(r.hosts, vec!["10.0.0.1", "10.0.0.2"]),
            _ => panic!("expected redis output"),
        }
    }

    #[test]
    fn unknown_input_type_is_rejected() {
        let pairs = Parser::parse(r#"input { bogus { type => "x" } }"#).unwrap();
        let err = Config::from_pairs(pairs, Path::new("test.conf")).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownBlockType { .. }));
    }

    #[test]
    fn wildcard_type_match_matches_anything() {
        let pairs = Parser::parse(r#"output { screen { type => "*" } }"#).unwrap();
        let config = Config::from_pairs(pairs, Path::new("test.conf")).unwrap();
        assert!(config.outputs[0].type_match().matches("anything"));
    }

    #[test]
    fn comma_separated_type_expands_to_a_list() {
        let pairs = Parser::parse(r#"output { screen { type => "a,b" } }"#).unwrap();
        let config = Config::from_pairs(pairs, Path::new("test.conf")).unwrap();
        assert!(config.outputs[0].type_match().matches("a"));
        assert!(config.outputs[0].type_match().matches("b"));
        assert!(!config.outputs[0].type_match().matches("c"));
    }

    #[test]
    fn derived_fields_parse_from_nested_block() {
        let pairs = Parser::parse(
            r#"
            input {
              file {
                type => "apache"
                path => "/var/log/apache2/*/error.log"
                derived_fields {
                  domain {
                    field => "@source_path"
                    match => "([a-z]+\\.[a-z]+)/([a-z]+)/[^/]+$"
                    concat => "$2.$1"
                    default => "common"
                  }
                }
              }
            }
            "#,
        )
        .unwrap();
        let config = Config::from_pairs(pairs, Path::new("test.conf")).unwrap();
        let recipe = &config.inputs[0].common().derived_fields[0];
        assert_eq!(recipe.target_field, "domain");
        assert_eq!(recipe.default.as_deref(), Some("common"));
    }

    #[test]
    fn glob_path_is_detected() {
        let pairs = Parser::parse(
            r#"input { file { type => "x" path => "/var/log/*.log" } }"#,
        )
        .unwrap();
        let config = Config::from_pairs(pairs, Path::new("test.conf")).unwrap();
        assert!(config.inputs[0].is_glob());
    }
}
