// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Envelope Encoder (C4): shapes one raw line into a typed JSON event,
//! overlaying the owning input's tags, static fields, and derived-field
//! recipes.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use shiplog_config::{InputCommon, InputFormat};
use shiplog_core::derived_field::{DerivedField, DerivedFieldError};
use shiplog_core::Clock;

/// A recipe paired with the default it falls back to when its pattern
/// does not match (`DerivedField` itself only knows the match/template).
struct CompiledDerivedField {
    recipe: DerivedField,
    default: Option<String>,
}

/// The immutable, per-input properties the encoder needs on every line,
/// compiled once at input-construction time rather than re-read from the
/// raw config on every tick.
pub struct CompiledInput {
    pub type_label: String,
    tags: Vec<String>,
    fields: Vec<(String, String)>,
    derived_fields: Vec<CompiledDerivedField>,
    pub format: InputFormat,
}

impl CompiledInput {
    pub fn compile(common: &InputCommon) -> Result<Self, DerivedFieldError> {
        let derived_fields = common
            .derived_fields
            .iter()
            .map(|spec| {
                Ok(CompiledDerivedField {
                    recipe: DerivedField::compile(
                        &spec.target_field,
                        &spec.source_field,
                        &spec.pattern,
                        &spec.concat,
                    )?,
                    default: spec.default.clone(),
                })
            })
            .collect::<Result<Vec<_>, DerivedFieldError>>()?;
        Ok(Self {
            type_label: common.type_label.clone(),
            tags: common.tags.clone(),
            fields: common.fields.clone(),
            derived_fields,
            format: common.format,
        })
    }
}

/// Turns raw lines into envelopes, holding only what's shared across every
/// input: the wall clock, the agent-wide hostname, and the two timestamp
/// rendering flags from the top-level config.
pub struct Encoder<C: Clock> {
    clock: C,
    hostname: String,
    milliseconds: bool,
}

impl<C: Clock> Encoder<C> {
    pub fn new(clock: C, hostname: impl Into<String>, milliseconds: bool) -> Self {
        Self {
            clock,
            hostname: hostname.into(),
            milliseconds,
        }
    }

    /// Produces `(type, envelope)` from one raw line, or `None` if the
    /// line must be dropped (a `json_event` input whose line did not parse
    /// as a JSON object — logged at the call site, not here, so the
    /// source path stays in the log context).
    pub fn encode(&self, line: &str, source_path: &str, input: &CompiledInput) -> Option<(String, Value)> {
        let mut obj = match input.format {
            InputFormat::JsonEvent => self.build_json_event(line, input)?,
            InputFormat::Plain => self.build_plain(line, source_path, input),
        };
        apply_derived_fields(&mut obj, input);
        let event_type = obj
            .get("@type")
            .and_then(Value::as_str)
            .unwrap_or(&input.type_label)
            .to_string();
        Some((event_type, Value::Object(obj)))
    }

    fn build_json_event(&self, line: &str, input: &CompiledInput) -> Option<Map<String, Value>> {
        let mut map = match serde_json::from_str::<Value>(line) {
            Ok(Value::Object(map)) => map,
            Ok(_) => return None,
            Err(_) => return None,
        };

        let effective_type = map
            .get("@type")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| input.type_label.clone());
        map.insert("@type".into(), Value::String(effective_type));

        if !input.tags.is_empty() {
            let mut tags: Vec<Value> = map
                .remove("@tags")
                .and_then(|v| v.as_array().cloned())
                .unwrap_or_default();
            for tag in &input.tags {
                let value = Value::String(tag.clone());
                if !tags.contains(&value) {
                    tags.push(value);
                }
            }
            map.insert("@tags".into(), Value::Array(tags));
        }

        for (key, value) in &input.fields {
            map.insert(key.clone(), Value::String(value.clone()));
        }

        Some(map)
    }

    fn build_plain(&self, line: &str, source_path: &str, input: &CompiledInput) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert(
            "@timestamp".into(),
            Value::String(self.format_timestamp(self.clock.now())),
        );
        map.insert(
            "@source".into(),
            Value::String(format!("file://{}{source_path}", self.hostname)),
        );
        map.insert("@source_host".into(), Value::String(self.hostname.clone()));
        map.insert("@source_path".into(), Value::String(source_path.to_string()));
        map.insert("@type".into(), Value::String(input.type_label.clone()));
        if !input.tags.is_empty() {
            map.insert(
                "@tags".into(),
                Value::Array(input.tags.iter().cloned().map(Value::String).collect()),
            );
        }
        if !input.fields.is_empty() {
            let fields = input
                .fields
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect();
            map.insert("@fields".into(), Value::Object(fields));
        }
        map.insert("@message".into(), Value::String(line.to_string()));
        map
    }

    /// `%Y-%m-%dT%H:%M:%S%z`, then rewrite the trailing `±HHMM` offset to
    /// `±HH:MM` and force a legacy literal `UTC` suffix to `Z`; optionally
    /// insert `.mmm` milliseconds before the offset (spec.md §4.4).
    fn format_timestamp(&self, ts: DateTime<Utc>) -> String {
        let base = ts.format("%Y-%m-%dT%H:%M:%S").to_string();
        let millis = if self.milliseconds {
            format!(".{:03}", ts.timestamp_subsec_millis())
        } else {
            String::new()
        };
        let offset = rewrite_offset(&ts.format("%z").to_string());
        format!("{base}{millis}{offset}")
    }
}

fn rewrite_offset(raw: &str) -> String {
    if raw.eq_ignore_ascii_case("utc") {
        return "Z".to_string();
    }
    if raw.len() == 5 && (raw.starts_with('+') || raw.starts_with('-')) {
        format!("{}:{}", &raw[0..3], &raw[3..5])
    } else {
        raw.to_string()
    }
}

fn apply_derived_fields(obj: &mut Map<String, Value>, input: &CompiledInput) {
    if input.derived_fields.is_empty() {
        return;
    }
    let mut fields = match obj.remove("@fields") {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    };
    for df in &input.derived_fields {
        let source_value = obj.get(&df.recipe.source_field).and_then(Value::as_str);
        let value = source_value
            .and_then(|s| df.recipe.apply(s))
            .or_else(|| df.default.clone().map(Value::String));
        if let Some(value) = value {
            fields.insert(df.recipe.target_field.clone(), value);
        }
    }
    if !fields.is_empty() {
        obj.insert("@fields".into(), Value::Object(fields));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shiplog_config::DerivedFieldSpec;
    use shiplog_core::FakeClock;

    fn common(format: InputFormat) -> InputCommon {
        InputCommon {
            type_label: "apache".into(),
            tags: vec!["web".into()],
            fields: vec![("env".into(), "prod".into())],
            derived_fields: Vec::new(),
            format,
            workers: None,
        }
    }

    #[test]
    fn plain_envelope_has_canonical_shape() {
        let encoder = Encoder::new(FakeClock::at_millis(0), "web01", false);
        let input = CompiledInput::compile(&common(InputFormat::Plain)).unwrap();
        let (event_type, envelope) = encoder.encode("hello", "/var/log/app.log", &input).unwrap();
        assert_eq!(event_type, "apache");
        assert_eq!(envelope["@message"], "hello");
        assert_eq!(envelope["@source_host"], "web01");
        assert_eq!(envelope["@tags"][0], "web");
        assert_eq!(envelope["@fields"]["env"], "prod");
        assert!(envelope["@timestamp"].as_str().unwrap().ends_with("+00:00"));
    }

    #[test]
    fn milliseconds_flag_inserts_fractional_seconds() {
        let encoder = Encoder::new(FakeClock::at_millis(1234), "web01", true);
        let input = CompiledInput::compile(&common(InputFormat::Plain)).unwrap();
        let (_, envelope) = encoder.encode("hi", "/x.log", &input).unwrap();
        let ts = envelope["@timestamp"].as_str().unwrap();
        assert!(ts.contains(".234"), "got {ts}");
    }

    #[test]
    fn json_event_merges_type_and_tags() {
        let encoder = Encoder::new(FakeClock::at_millis(0), "web01", false);
        let input = CompiledInput::compile(&common(InputFormat::JsonEvent)).unwrap();
        let (event_type, envelope) = encoder
            .encode(r#"{"@type": "custom", "@tags": ["existing"]}"#, "/x.log", &input)
            .unwrap();
        assert_eq!(event_type, "custom");
        let tags = envelope["@tags"].as_array().unwrap();
        assert!(tags.iter().any(|t| t == "existing"));
        assert!(tags.iter().any(|t| t == "web"));
    }

    #[test]
    fn json_event_falls_back_to_input_type_when_absent() {
        let encoder = Encoder::new(FakeClock::at_millis(0), "web01", false);
        let input = CompiledInput::compile(&common(InputFormat::JsonEvent)).unwrap();
        let (event_type, _) = encoder.encode(r#"{"msg": "hi"}"#, "/x.log", &input).unwrap();
        assert_eq!(event_type, "apache");
    }

    #[test]
    fn malformed_json_event_line_is_dropped() {
        let encoder = Encoder::new(FakeClock::at_millis(0), "web01", false);
        let input = CompiledInput::compile(&common(InputFormat::JsonEvent)).unwrap();
        assert!(encoder.encode("not json", "/x.log", &input).is_none());
    }

    #[test]
    fn derived_field_overlays_fields_object() {
        let mut common = common(InputFormat::Plain);
        common.derived_fields = vec![DerivedFieldSpec {
            target_field: "domain".into(),
            source_field: "@source_path".into(),
            pattern: r"([a-z]+\.[a-z]+)/([a-z]+)/[^/]+$".into(),
            concat: "$2.$1".into(),
            default: Some("common".into()),
        }];
        let encoder = Encoder::new(FakeClock::at_millis(0), "web01", false);
        let input = CompiledInput::compile(&common).unwrap();

        let (_, matched) = encoder
            .encode("x", "/var/log/apache2/foo.example/bar/error.log", &input)
            .unwrap();
        assert_eq!(matched["@fields"]["domain"], "bar.foo.example");

        let (_, unmatched) = encoder.encode("x", "/tmp/x.log", &input).unwrap();
        assert_eq!(unmatched["@fields"]["domain"], "common");
    }

    #[test]
    fn offset_rewrite_inserts_colon() {
        assert_eq!(rewrite_offset("+0000"), "+00:00");
        assert_eq!(rewrite_offset("-0530"), "-05:30");
        assert_eq!(rewrite_offset("UTC"), "Z");
    }
}
