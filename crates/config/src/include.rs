// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resolves `include => "path/to/file.conf"` directives at the top level
//! of a configuration file, recursively, with cycle detection.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::parser::{Parser, RawValue};

/// Parses `path` and recursively inlines any `include` entries found at the
/// top level, returning the fully-resolved list of top-level pairs.
///
/// Included files are resolved relative to the including file's directory
/// when given as a relative path.
pub fn load_resolved(path: &Path) -> Result<Vec<(String, RawValue)>, ConfigError> {
    let mut visited = HashSet::new();
    load_resolved_inner(path, &mut visited)
}

fn load_resolved_inner(
    path: &Path,
    visited: &mut HashSet<PathBuf>,
) -> Result<Vec<(String, RawValue)>, ConfigError> {
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    if !visited.insert(canonical.clone()) {
        return Err(ConfigError::IncludeCycle(path.to_path_buf()));
    }

    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let pairs = Parser::parse(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
    let mut resolved = Vec::with_capacity(pairs.len());
    for (key, value) in pairs {
        if key == "include" {
            for included in value.as_str_list() {
                let included_path = resolve_relative(&base_dir, &included);
                let nested = load_resolved_inner(&included_path, visited)?;
                resolved.extend(nested);
            }
            continue;
        }
        resolved.push((key, value));
    }

    visited.remove(&canonical);
    Ok(resolved)
}

fn resolve_relative(base_dir: &Path, raw: &str) -> PathBuf {
    let candidate = PathBuf::from(raw);
    if candidate.is_absolute() {
        candidate
    } else {
        base_dir.join(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn inlines_included_file() {
        let dir = tempfile::tempdir().unwrap();
        let included_path = dir.path().join("inputs.conf");
        std::fs::File::create(&included_path)
            .unwrap()
            .write_all(b"poll => 500\n")
            .unwrap();

        let main_path = dir.path().join("main.conf");
        std::fs::File::create(&main_path)
            .unwrap()
            .write_all(b"include => \"inputs.conf\"\nlines => 10\n")
            .unwrap();

        let pairs = load_resolved(&main_path).unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].0, "poll");
        assert_eq!(pairs[1].0, "lines");
    }

    #[test]
    fn detects_cycles() {
        let dir = tempfile::tempdir().unwrap();
        let a_path = dir.path().join("a.conf");
        let b_path = dir.path().join("b.conf");
        std::fs::write(&a_path, "include => \"b.conf\"\n").unwrap();
        std::fs::write(&b_path, "include => \"a.conf\"\n").unwrap();

        let err = load_resolved(&a_path).unwrap_err();
        assert!(matches!(err, ConfigError::IncludeCycle(_)));
    }
}
