// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Derived fields: values computed at startup-compile time from a regex
//! match against an existing field (typically `@source_path`), then
//! expanded through a `$1`..`$9` capture-group template.

use regex::Regex;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DerivedFieldError {
    #[error("invalid regex in derived field recipe: {0}")]
    InvalidRegex(#[from] regex::Error),
}

/// A single derived-field recipe: match `pattern` against the value of
/// `source_field`; if it matches, expand `template` (substituting `$1`
/// through `$9` with the corresponding capture group) and store the result
/// under `target_field`.
///
/// The regex is compiled once at config-load time (`DerivedField::compile`),
/// not per event, so applying a recipe to an event is pure string work.
#[derive(Debug, Clone)]
pub struct DerivedField {
    pub target_field: String,
    pub source_field: String,
    pattern: Regex,
    template: String,
}

impl DerivedField {
    pub fn compile(
        target_field: impl Into<String>,
        source_field: impl Into<String>,
        pattern: &str,
        template: impl Into<String>,
    ) -> Result<Self, DerivedFieldError> {
        Ok(Self {
            target_field: target_field.into(),
            source_field: source_field.into(),
            pattern: Regex::new(pattern)?,
            template: template.into(),
        })
    }

    /// Applies this recipe against `source_value`. Returns `None` if the
    /// pattern does not match, in which case the target field is left
    /// untouched (not set to an empty string).
    pub fn apply(&self, source_value: &str) -> Option<Value> {
        let captures = self.pattern.captures(source_value)?;
        let mut out = String::with_capacity(self.template.len());
        let mut chars = self.template.chars().peekable();
        while let Some(c) = chars.next() {
            if c == '$' {
                if let Some(&next) = chars.peek() {
                    if next.is_ascii_digit() {
                        chars.next();
                        let idx = next.to_digit(10).unwrap_or(0) as usize;
                        if let Some(m) = captures.get(idx) {
                            out.push_str(m.as_str());
                        }
                        continue;
                    }
                }
                out.push('$');
            } else {
                out.push(c);
            }
        }
        Some(Value::String(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_capture_groups() {
        let recipe = DerivedField::compile(
            "environment",
            "@source_path",
            r"^/var/log/(\w+)/(\w+)\.log$",
            "$1-$2",
        )
        .unwrap();
        let value = recipe.apply("/var/log/prod/app.log").unwrap();
        assert_eq!(value, Value::String("prod-app".to_string()));
    }

    #[test]
    fn non_match_returns_none() {
        let recipe =
            DerivedField::compile("environment", "@source_path", r"^/etc/.*$", "$1").unwrap();
        assert!(recipe.apply("/var/log/app.log").is_none());
    }

    #[test]
    fn literal_dollar_not_followed_by_digit_is_preserved() {
        let recipe = DerivedField::compile("price", "@message", r"^(\d+)$", "$1 USD$").unwrap();
        let value = recipe.apply("42").unwrap();
        assert_eq!(value, Value::String("42 USD$".to_string()));
    }

    #[test]
    fn invalid_regex_is_rejected() {
        let err = DerivedField::compile("x", "@message", "(unterminated", "$1");
        assert!(err.is_err());
    }
}
