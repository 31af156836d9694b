// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Validation pass over a parsed [`Config`], kept separate from parsing so
//! that a syntactically valid but semantically out-of-range file produces
//! a distinct, precise diagnostic.

use std::path::Path;

use crate::error::ConfigError;
use crate::model::{Config, InputConfig, OutputConfig};

const POLL_MS_RANGE: std::ops::RangeInclusive<u64> = 100..=9999;

pub fn validate(config: &Config, path: &Path) -> Result<(), ConfigError> {
    if !POLL_MS_RANGE.contains(&config.poll_ms) {
        return Err(invalid(
            path,
            format!(
                "poll must be between {} and {} milliseconds, got {}",
                POLL_MS_RANGE.start(),
                POLL_MS_RANGE.end(),
                config.poll_ms
            ),
        ));
    }

    if config.lines == 0 {
        return Err(invalid(path, "lines must be at least 1"));
    }

    if config.log_watch_interval_ms == 0 {
        return Err(invalid(path, "log_watch_interval must be positive"));
    }

    if config.inputs.is_empty() {
        return Err(invalid(path, "at least one input block is required"));
    }

    if config.outputs.is_empty() {
        return Err(invalid(path, "at least one output block is required"));
    }

    for input in &config.inputs {
        if let InputConfig::File(file) = input {
            if file.path.is_empty() {
                return Err(invalid(path, "file input path must not be empty"));
            }
            if let Some(skip) = &file.skip {
                regex::Regex::new(skip)
                    .map_err(|e| invalid(path, format!("invalid skip regex: {e}")))?;
            }
            if let Some(grep) = &file.grep {
                regex::Regex::new(grep)
                    .map_err(|e| invalid(path, format!("invalid grep regex: {e}")))?;
            }
        }
        for recipe in &input.common().derived_fields {
            regex::Regex::new(&recipe.pattern)
                .map_err(|e| invalid(path, format!("invalid derived field regex: {e}")))?;
        }
    }

    for output in &config.outputs {
        match output {
            OutputConfig::Redis(r) if r.hosts.is_empty() => {
                return Err(invalid(path, "redis output requires at least one host"));
            }
            OutputConfig::Socket(s) if s.hosts.is_empty() => {
                return Err(invalid(path, "socket output requires at least one host"));
            }
            OutputConfig::Socket(s) => {
                if let Some(response) = &s.response {
                    regex::Regex::new(response)
                        .map_err(|e| invalid(path, format!("invalid socket output response pattern: {e}")))?;
                }
            }
            _ => {}
        }
    }

    Ok(())
}

fn invalid(path: &Path, message: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        path: path.to_path_buf(),
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        InputFormat, FileInput, InputCommon, RedisDataType, RedisOutput, ScreenOutput,
        ScreenTarget, StartPosition, TypeMatch,
    };
    use std::path::PathBuf;

    fn base_config() -> Config {
        let mut config = Config::default();
        config.inputs.push(InputConfig::File(FileInput {
            common: InputCommon {
                type_label: "app".into(),
                tags: Vec::new(),
                fields: Vec::new(),
                derived_fields: Vec::new(),
                format: InputFormat::Plain,
                workers: None,
            },
            path: "/var/log/app.log".into(),
            start_position: StartPosition::Beginning,
            skip: None,
            grep: None,
            save_position: false,
            remove_on_errors: false,
        }));
        config.outputs.push(OutputConfig::Screen(ScreenOutput {
            json: false,
            target: ScreenTarget::Stdout,
            type_match: TypeMatch::Wildcard,
        }));
        config
    }

    #[test]
    fn accepts_a_well_formed_config() {
        let config = base_config();
        assert!(validate(&config, &PathBuf::from("test.conf")).is_ok());
    }

    #[test]
    fn rejects_out_of_range_poll() {
        let mut config = base_config();
        config.poll_ms = 50;
        let err = validate(&config, &PathBuf::from("test.conf")).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { .. }));
    }

    #[test]
    fn rejects_missing_outputs() {
        let mut config = base_config();
        config.outputs.clear();
        assert!(validate(&config, &PathBuf::from("test.conf")).is_err());
    }

    #[test]
    fn rejects_redis_output_without_hosts() {
        let mut config = base_config();
        config.outputs.push(OutputConfig::Redis(RedisOutput {
            hosts: vec![],
            port: 6379,
            db: 0,
            password: None,
            data_type: RedisDataType::List,
            key: "logstash".into(),
            timeout: std::time::Duration::from_secs(10),
            type_match: TypeMatch::Wildcard,
        }));
        assert!(validate(&config, &PathBuf::from("test.conf")).is_err());
    }
}
